use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::destination::Layout;
use crate::error::Error;
use crate::media::ExtensionSets;

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub root: PathBuf,
    pub folders_checked: usize,
    pub media_files: usize,
    /// Relative folder paths whose name does not fit its level.
    pub structure_issues: Vec<String>,
    /// Folders holding more media files than allowed, largest first.
    pub oversized: Vec<(PathBuf, usize)>,
    /// media files per folder → number of folders
    pub distribution: BTreeMap<usize, usize>,
}

impl VerifyReport {
    pub fn issue_count(&self) -> usize {
        self.structure_issues.len() + self.oversized.len()
    }

    pub fn is_clean(&self) -> bool {
        self.issue_count() == 0
    }
}

fn all_digits(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(u8::is_ascii_digit)
}

fn is_decade(name: &str) -> bool {
    let b = name.as_bytes();
    b.len() == 5 && b[4] == b'+' && all_digits(&b[..4])
}

fn is_year(name: &str) -> bool {
    name.len() == 4 && all_digits(name.as_bytes())
}

/// `YYYY-MM` prefix; split folders such as `2021-07-04_02` pass too.
fn is_month(name: &str) -> bool {
    let b = name.as_bytes();
    b.len() >= 7 && all_digits(&b[..4]) && b[4] == b'-' && all_digits(&b[5..7])
}

// The root itself is never filtered, whatever its name
fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

fn check_level(layout: Layout, level: usize, name: &str) -> Option<&'static str> {
    let ok = match (layout, level) {
        (Layout::Full, 0) => is_decade(name),
        (Layout::Full, 1) => is_year(name),
        (Layout::Full, 2) => is_month(name),
        (Layout::MonthOnly, 0) => is_month(name),
        _ => true,
    };
    if ok {
        return None;
    }
    Some(match (layout, level) {
        (Layout::Full, 0) => "decade",
        (Layout::Full, 1) => "year",
        _ => "month",
    })
}

/// Check a reorganized library: folder names match the layout and no folder
/// holds more than `max_files` media files.
pub fn verify_library(
    root: &Path,
    layout: Layout,
    extensions: &ExtensionSets,
    max_files: usize,
) -> Result<VerifyReport, Error> {
    if !root.is_dir() {
        return Err(Error::MissingRoot(root.to_path_buf()));
    }

    let mut report = VerifyReport {
        root: root.to_path_buf(),
        ..VerifyReport::default()
    };

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        report.folders_checked += 1;

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let level = entry.depth() - 1;
        let name = entry.file_name().to_string_lossy();
        if let Some(expected) = check_level(layout, level, &name) {
            report
                .structure_issues
                .push(format!("Invalid {} folder: {}", expected, relative.display()));
        }

        let media = count_media(entry.path(), extensions);
        if media > 0 {
            report.media_files += media;
            *report.distribution.entry(media).or_default() += 1;
            if media > max_files {
                report.oversized.push((relative.to_path_buf(), media));
            }
        }
    }
    report.oversized.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(report)
}

fn count_media(dir: &Path, extensions: &ExtensionSets) -> usize {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|e| extensions.is_media(&e.path()))
            .count(),
        Err(e) => {
            warn!("Cannot read {}: {}", dir.display(), e);
            0
        }
    }
}

/// Number of non-directory entries below `root`, symlinks not followed.
pub fn count_files(root: &Path) -> Result<usize, Error> {
    let mut count = 0;
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        if !entry?.file_type().is_dir() {
            count += 1;
        }
    }
    Ok(count)
}

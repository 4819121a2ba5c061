use chrono::{DateTime, Local};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::Error;

const BANNER: &str = "DIRECTORY STRUCTURE COMPARISON REPORT";
const RULE_WIDTH: usize = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Presence {
    Common,
    SourceOnly,
    TargetOnly,
}

/// One relative path seen in at least one of the two trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub in_source: bool,
    pub in_target: bool,
}

impl ComparisonEntry {
    pub fn presence(&self) -> Presence {
        match (self.in_source, self.in_target) {
            (true, true) => Presence::Common,
            (true, false) => Presence::SourceOnly,
            _ => Presence::TargetOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub directories: usize,
    pub files: usize,
    /// Entries that could not be read during the walk.
    pub errors: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Printed as a `Generated:` line under the banner.
    pub generated: Option<DateTime<Local>>,
    /// Cap on each classification list; `None` prints everything.
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub source_root: PathBuf,
    pub target_root: PathBuf,
    pub source: TreeStats,
    pub target: TreeStats,
    /// Sorted by path.
    pub directories: Vec<ComparisonEntry>,
    /// Sorted by path.
    pub files: Vec<ComparisonEntry>,
}

impl Report {
    pub fn entries(&self, kind: EntryKind) -> &[ComparisonEntry] {
        match kind {
            EntryKind::Directory => &self.directories,
            EntryKind::File => &self.files,
        }
    }

    pub fn list(&self, kind: EntryKind, presence: Presence) -> Vec<&Path> {
        self.entries(kind)
            .iter()
            .filter(|e| e.presence() == presence)
            .map(|e| e.path.as_path())
            .collect()
    }

    pub fn count(&self, kind: EntryKind, presence: Presence) -> usize {
        self.entries(kind)
            .iter()
            .filter(|e| e.presence() == presence)
            .count()
    }

    pub fn has_differences(&self) -> bool {
        self.directories
            .iter()
            .chain(self.files.iter())
            .any(|e| e.presence() != Presence::Common)
    }

    pub fn source_label(&self) -> String {
        label(&self.source_root)
    }

    pub fn target_label(&self) -> String {
        label(&self.target_root)
    }

    /// Human-readable report. Identical trees and options give identical text.
    pub fn render(&self, options: &RenderOptions) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let src = self.source_label();
        let tgt = self.target_label();
        let mut out = String::new();

        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "{}", BANNER);
        if let Some(generated) = options.generated {
            let _ = writeln!(out, "Generated: {}", generated.format("%Y-%m-%d %H:%M:%S"));
        }
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out);
        let _ = writeln!(out, "Source directory: {}", self.source_root.display());
        let _ = writeln!(out, "Target directory: {}", self.target_root.display());
        let _ = writeln!(out);

        let _ = writeln!(out, "--- DIRECTORY STATISTICS ---");
        for (name, stats) in [(&src, &self.source), (&tgt, &self.target)] {
            let _ = writeln!(out, "{}:", name);
            let _ = writeln!(out, "  Directories: {}", thousands(stats.directories as i64));
            let _ = writeln!(out, "  Files: {}", thousands(stats.files as i64));
            if stats.errors > 0 {
                let _ = writeln!(out, "  Unreadable entries: {}", thousands(stats.errors as i64));
            }
            let _ = writeln!(out);
        }

        let dir_diff = self.target.directories as i64 - self.source.directories as i64;
        let file_diff = self.target.files as i64 - self.source.files as i64;
        let _ = writeln!(out, "--- DIFFERENCE SUMMARY ---");
        let _ = writeln!(out, "Directory difference: {} ({} vs {})", signed(dir_diff), tgt, src);
        let _ = writeln!(out, "File difference: {} ({} vs {})", signed(file_diff), tgt, src);
        let _ = writeln!(out);
        for (kind, noun) in [(EntryKind::Directory, "Directories"), (EntryKind::File, "Files")] {
            let _ = writeln!(out, "{} unique to {}: {}", noun, src, thousands(self.count(kind, Presence::SourceOnly) as i64));
            let _ = writeln!(out, "{} unique to {}: {}", noun, tgt, thousands(self.count(kind, Presence::TargetOnly) as i64));
            let _ = writeln!(out, "{} in both: {}", noun, thousands(self.count(kind, Presence::Common) as i64));
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "--- STRUCTURE DIFFERENCES ---");
        if self.has_differences() {
            for (kind, noun) in [(EntryKind::Directory, "Directories"), (EntryKind::File, "Files")] {
                let heading = format!("{} in {} but NOT in {}:", noun, src, tgt);
                self.render_list(&mut out, &heading, kind, Presence::SourceOnly, options.limit);
                let heading = format!("{} in {} but NOT in {}:", noun, tgt, src);
                self.render_list(&mut out, &heading, kind, Presence::TargetOnly, options.limit);
            }
        } else {
            let _ = writeln!(out, "No structural differences found - directories have identical structure");
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "--- COMMON ---");
        self.render_list(&mut out, "Directories in both:", EntryKind::Directory, Presence::Common, options.limit);
        self.render_list(&mut out, "Files in both:", EntryKind::File, Presence::Common, options.limit);

        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "END OF COMPARISON REPORT");
        let _ = writeln!(out, "{}", rule);
        out
    }

    fn render_list(
        &self,
        out: &mut String,
        heading: &str,
        kind: EntryKind,
        presence: Presence,
        limit: Option<usize>,
    ) {
        let paths = self.list(kind, presence);
        if paths.is_empty() {
            return;
        }
        let _ = writeln!(out, "{}", heading);
        let shown = limit.unwrap_or(paths.len()).min(paths.len());
        for path in &paths[..shown] {
            match kind {
                EntryKind::Directory => {
                    let _ = writeln!(out, "  {}/", path.display());
                }
                EntryKind::File => {
                    let _ = writeln!(out, "  {}", path.display());
                }
            }
        }
        if paths.len() > shown {
            let _ = writeln!(out, "  ... and {} more", thousands((paths.len() - shown) as i64));
        }
        let _ = writeln!(out);
    }

    pub fn write_to(&self, path: &Path, options: &RenderOptions) -> Result<(), Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render(options))?;
        Ok(())
    }
}

fn label(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}

fn thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if n < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn signed(n: i64) -> String {
    if n < 0 {
        thousands(n)
    } else {
        format!("+{}", thousands(n))
    }
}

/// Sorted relative-path listings of one tree, kept in scratch files.
struct Listing {
    directories: PathBuf,
    files: PathBuf,
    stats: TreeStats,
}

/// Compares two trees. Scratch listings live in a temporary directory that is
/// removed when the comparison returns, on success or error.
#[derive(Debug, Clone, Default)]
pub struct Comparator {
    scratch_root: Option<PathBuf>,
}

impl Comparator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create scratch directories under `dir` instead of the system temp dir.
    pub fn with_scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(dir.into());
        self
    }

    pub fn compare(&self, source_root: &Path, target_root: &Path) -> Result<Report, Error> {
        let scratch = self.scratch()?;
        debug!("Comparison scratch area {}", scratch.path().display());

        let (source, target) = rayon::join(
            || write_listing(source_root, scratch.path(), "source"),
            || write_listing(target_root, scratch.path(), "target"),
        );
        let source = source?;
        let target = target?;
        info!(
            "Source: {} dirs, {} files; target: {} dirs, {} files",
            source.stats.directories, source.stats.files, target.stats.directories, target.stats.files
        );

        let directories = merge_listings(&source.directories, &target.directories, EntryKind::Directory)?;
        let files = merge_listings(&source.files, &target.files, EntryKind::File)?;

        Ok(Report {
            source_root: source_root.to_path_buf(),
            target_root: target_root.to_path_buf(),
            source: source.stats,
            target: target.stats,
            directories,
            files,
        })
    }

    fn scratch(&self) -> io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("reshelve-compare-");
        match &self.scratch_root {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }
}

/// `compare(source_root, target_root)` with default settings.
pub fn compare(source_root: &Path, target_root: &Path) -> Result<Report, Error> {
    Comparator::new().compare(source_root, target_root)
}

fn write_listing(root: &Path, scratch: &Path, label: &str) -> Result<Listing, Error> {
    fs::read_dir(root).map_err(|source| Error::TreeWalk {
        root: root.to_path_buf(),
        source,
    })?;

    let directories = scratch.join(format!("{}-directories.txt", label));
    let files = scratch.join(format!("{}-files.txt", label));
    let mut dir_out = BufWriter::new(File::create(&directories)?);
    let mut file_out = BufWriter::new(File::create(&files)?);
    let mut stats = TreeStats::default();

    // Pre-order with siblings sorted by name is exactly `Path` ordering
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Unreadable entry under {}: {}", root.display(), e);
                stats.errors += 1;
                continue;
            }
        };
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if entry.file_type().is_dir() {
            writeln!(dir_out, "{}", relative.to_string_lossy())?;
            stats.directories += 1;
        } else {
            writeln!(file_out, "{}", relative.to_string_lossy())?;
            stats.files += 1;
        }
    }
    dir_out.flush()?;
    file_out.flush()?;

    Ok(Listing {
        directories,
        files,
        stats,
    })
}

struct ListingReader {
    lines: Lines<BufReader<File>>,
    current: Option<PathBuf>,
}

impl ListingReader {
    fn open(path: &Path) -> io::Result<Self> {
        let mut reader = Self {
            lines: BufReader::new(File::open(path)?).lines(),
            current: None,
        };
        reader.advance()?;
        Ok(reader)
    }

    fn advance(&mut self) -> io::Result<Option<PathBuf>> {
        let next = self.lines.next().transpose()?.map(PathBuf::from);
        Ok(std::mem::replace(&mut self.current, next))
    }
}

/// Merge-join two sorted listings.
fn merge_listings(source: &Path, target: &Path, kind: EntryKind) -> io::Result<Vec<ComparisonEntry>> {
    let mut left = ListingReader::open(source)?;
    let mut right = ListingReader::open(target)?;
    let mut entries = Vec::new();

    loop {
        let order = match (&left.current, &right.current) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(l), Some(r)) => l.cmp(r),
        };
        let (path, in_source, in_target) = match order {
            Ordering::Less => (left.advance()?, true, false),
            Ordering::Greater => (right.advance()?, false, true),
            Ordering::Equal => {
                right.advance()?;
                (left.advance()?, true, true)
            }
        };
        if let Some(path) = path {
            entries.push(ComparisonEntry {
                path,
                kind,
                in_source,
                in_target,
            });
        }
    }
    Ok(entries)
}

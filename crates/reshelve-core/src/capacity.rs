use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::date::filename_date_token;
use crate::error::Error;
use crate::media::ExtensionSets;
use crate::progress::ProgressReporter;
use crate::sidecar::SidecarLocator;

/// Files bound for one numbered sibling folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderChunk {
    /// The sibling folder, `<original-name>_<NN>`.
    pub folder: PathBuf,
    pub sequence: usize,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebalanceStats {
    pub splits_created: usize,
    pub files_moved: usize,
}

impl std::ops::AddAssign for RebalanceStats {
    fn add_assign(&mut self, other: Self) {
        self.splits_created += other.splits_created;
        self.files_moved += other.files_moved;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OversizedFolder {
    pub path: PathBuf,
    pub files: usize,
    pub subdirectories: usize,
}

impl OversizedFolder {
    pub fn is_leaf(&self) -> bool {
        self.subdirectories == 0
    }
}

/// Folders over the threshold. Only leaves are split; the rest are reported.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OversizedReport {
    pub leaves: Vec<OversizedFolder>,
    pub non_leaves: Vec<OversizedFolder>,
}

impl OversizedReport {
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty() && self.non_leaves.is_empty()
    }
}

#[derive(Debug, Default, Serialize)]
pub struct TreeRebalance {
    pub totals: RebalanceStats,
    pub rebalanced: Vec<(PathBuf, RebalanceStats)>,
    /// Planned but not moved, in dry-run mode.
    pub planned: Vec<FolderChunk>,
    pub non_leaves: Vec<OversizedFolder>,
    pub errors: Vec<(PathBuf, String)>,
}

impl TreeRebalance {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

// Files without a date token sort after every dated group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum DateGroup {
    Dated(String),
    Unknown,
}

fn date_group(name: &OsStr) -> DateGroup {
    match filename_date_token(&name.to_string_lossy()) {
        Some(token) => DateGroup::Dated(token.to_string()),
        None => DateGroup::Unknown,
    }
}

/// Splits leaf folders holding more than `max_files` files into date-ordered
/// sibling folders `<name>_01`, `<name>_02`, ...
#[derive(Debug, Clone)]
pub struct CapacityManager {
    max_files: usize,
    dry_run: bool,
    locator: Option<SidecarLocator>,
}

impl CapacityManager {
    pub fn new(max_files: usize) -> Self {
        Self {
            max_files: max_files.max(1),
            dry_run: false,
            locator: None,
        }
    }

    /// Keep each media file and its sidecars in the same chunk.
    pub fn with_sidecars(mut self, extensions: &ExtensionSets) -> Self {
        self.locator = Some(SidecarLocator::new(extensions));
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Walk `root` and report every folder below it with more than `max_files`
    /// files directly inside.
    pub fn find_oversized(&self, root: &Path) -> Result<OversizedReport, Error> {
        if !root.is_dir() {
            return Err(Error::MissingRoot(root.to_path_buf()));
        }

        let mut report = OversizedReport::default();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();
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
            let (files, subdirectories) = match count_entries(entry.path()) {
                Ok(counts) => counts,
                Err(e) => {
                    warn!("Cannot read {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            if files > self.max_files {
                let folder = OversizedFolder {
                    path: entry.path().to_path_buf(),
                    files,
                    subdirectories,
                };
                if folder.is_leaf() {
                    report.leaves.push(folder);
                } else {
                    report.non_leaves.push(folder);
                }
            }
        }
        Ok(report)
    }

    /// Decide which files go to which sibling folder, without touching disk.
    pub fn plan_chunks(&self, folder: &Path) -> Result<Vec<FolderChunk>, Error> {
        let names = file_names(folder)?;
        if names.len() <= self.max_files {
            return Ok(Vec::new());
        }

        let parent = folder.parent().unwrap_or_else(|| Path::new(""));
        let base = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut chunks: Vec<FolderChunk> = Vec::new();
        let mut current: Vec<PathBuf> = Vec::new();
        for unit in self.units(folder, &names) {
            if unit.len() > self.max_files {
                // A chunk over the threshold would be split again on the next run.
                warn!(
                    "{} and its {} sidecars exceed {} files; splitting them across folders",
                    unit[0].display(),
                    unit.len() - 1,
                    self.max_files
                );
                if !current.is_empty() {
                    chunks.push(self.chunk(parent, &base, chunks.len() + 1, std::mem::take(&mut current)));
                }
                for piece in unit.chunks(self.max_files) {
                    chunks.push(self.chunk(parent, &base, chunks.len() + 1, piece.to_vec()));
                }
                continue;
            }
            if !current.is_empty() && current.len() + unit.len() > self.max_files {
                chunks.push(self.chunk(parent, &base, chunks.len() + 1, std::mem::take(&mut current)));
            }
            current.extend(unit);
        }
        if !current.is_empty() {
            chunks.push(self.chunk(parent, &base, chunks.len() + 1, current));
        }
        Ok(chunks)
    }

    fn chunk(&self, parent: &Path, base: &str, sequence: usize, files: Vec<PathBuf>) -> FolderChunk {
        FolderChunk {
            folder: parent.join(format!("{}_{:02}", base, sequence)),
            sequence,
            files,
        }
    }

    /// Files grouped into indivisible units, in date order then name order.
    fn units(&self, folder: &Path, names: &[OsString]) -> Vec<Vec<PathBuf>> {
        let mut claimed: HashSet<&OsStr> = HashSet::new();
        let mut groups: BTreeMap<(DateGroup, OsString), Vec<PathBuf>> = BTreeMap::new();

        if let Some(locator) = &self.locator {
            for name in names.iter().filter(|n| !locator.is_sidecar_name(n)) {
                let primary = folder.join(name);
                let sidecars: Vec<PathBuf> = locator
                    .locate_among(&primary, names)
                    .into_iter()
                    .filter(|sidecar| {
                        let sidecar_name = sidecar.file_name();
                        match sidecar_name.and_then(|s| names.iter().find(|n| n.as_os_str() == s)) {
                            Some(owned) => claimed.insert(owned.as_os_str()),
                            None => false,
                        }
                    })
                    .collect();
                if sidecars.is_empty() {
                    continue;
                }
                claimed.insert(name.as_os_str());
                let mut unit = vec![primary];
                unit.extend(sidecars);
                groups.insert((date_group(name), name.clone()), unit);
            }
        }

        for name in names {
            if !claimed.contains(name.as_os_str()) {
                groups.insert((date_group(name), name.clone()), vec![folder.join(name)]);
            }
        }
        groups.into_values().collect()
    }

    /// Split one folder. A folder at or under the threshold, or one with
    /// sub-directories, is left alone.
    pub fn rebalance(&self, folder: &Path) -> Result<RebalanceStats, Error> {
        let (_, subdirectories) = count_entries(folder)?;
        if subdirectories > 0 {
            warn!("{} has sub-directories; reporting only", folder.display());
            return Ok(RebalanceStats::default());
        }

        let chunks = self.plan_chunks(folder)?;
        if chunks.is_empty() {
            return Ok(RebalanceStats::default());
        }
        if let Some(existing) = chunks.iter().find(|c| fs::symlink_metadata(&c.folder).is_ok()) {
            return Err(Error::SplitTargetExists {
                path: existing.folder.clone(),
            });
        }
        if self.dry_run {
            info!("Would split {} into {} folders", folder.display(), chunks.len());
            return Ok(RebalanceStats::default());
        }

        self.apply_chunks(folder, &chunks)
    }

    /// Move every chunk's files into its folder. A file that cannot be moved
    /// is logged and skipped; whatever is left behind afterwards is reported
    /// as `CapacityImbalance` and the original folder is kept.
    fn apply_chunks(&self, folder: &Path, chunks: &[FolderChunk]) -> Result<RebalanceStats, Error> {
        let mut stats = RebalanceStats::default();
        for chunk in chunks {
            if let Err(e) = fs::create_dir(&chunk.folder) {
                error!("Cannot create {}: {}", chunk.folder.display(), e);
                continue;
            }
            stats.splits_created += 1;
            let mut moved = 0;
            for file in &chunk.files {
                let Some(name) = file.file_name() else {
                    continue;
                };
                match fs::rename(file, chunk.folder.join(name)) {
                    Ok(()) => moved += 1,
                    Err(e) => error!("Cannot move {}: {}", file.display(), e),
                }
            }
            stats.files_moved += moved;
            info!("Created {} with {} files", chunk.folder.display(), moved);
        }

        let remaining = fs::read_dir(folder)?.count();
        if remaining > 0 {
            return Err(Error::CapacityImbalance {
                folder: folder.to_path_buf(),
                remaining,
                files_moved: stats.files_moved,
            });
        }
        fs::remove_dir(folder)?;
        info!("Removed empty folder {}", folder.display());
        Ok(stats)
    }

    /// Find every oversized leaf under `root` and split it. A failure in one
    /// folder is recorded and the rest are still processed.
    pub fn rebalance_tree(
        &self,
        root: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<TreeRebalance, Error> {
        let report = self.find_oversized(root)?;
        info!(
            "Found {} oversized leaf folders, {} oversized non-leaf folders",
            report.leaves.len(),
            report.non_leaves.len()
        );
        for folder in &report.non_leaves {
            warn!(
                "{} has {} files and {} sub-directories; not split",
                folder.path.display(),
                folder.files,
                folder.subdirectories
            );
        }

        let mut outcome = TreeRebalance {
            non_leaves: report.non_leaves,
            ..TreeRebalance::default()
        };
        for folder in &report.leaves {
            if self.dry_run {
                match self.plan_chunks(&folder.path) {
                    Ok(chunks) => {
                        reporter.on_rebalance_folder(&folder.path.to_string_lossy(), chunks.len());
                        outcome.planned.extend(chunks);
                    }
                    Err(e) => outcome.errors.push((folder.path.clone(), e.to_string())),
                }
                continue;
            }

            match self.rebalance(&folder.path) {
                Ok(stats) => {
                    reporter.on_rebalance_folder(&folder.path.to_string_lossy(), stats.splits_created);
                    outcome.totals += stats;
                    outcome.rebalanced.push((folder.path.clone(), stats));
                }
                Err(e) => {
                    error!("Rebalancing {} failed: {}", folder.path.display(), e);
                    outcome.errors.push((folder.path.clone(), e.to_string()));
                }
            }
        }
        Ok(outcome)
    }
}

/// (non-directory entries, directories) directly inside `dir`.
fn count_entries(dir: &Path) -> io::Result<(usize, usize)> {
    let mut files = 0;
    let mut dirs = 0;
    for entry in fs::read_dir(dir)? {
        if entry?.file_type()?.is_dir() {
            dirs += 1;
        } else {
            files += 1;
        }
    }
    Ok((files, dirs))
}

fn file_names(dir: &Path) -> io::Result<Vec<OsString>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            names.push(entry.file_name());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn fill(dir: &Path, names: &[String]) {
        fs::create_dir_all(dir).unwrap();
        for name in names {
            fs::write(dir.join(name), name.as_bytes()).unwrap();
        }
    }

    fn chunk_of(folder: PathBuf, sequence: usize, files: Vec<PathBuf>) -> FolderChunk {
        FolderChunk {
            folder,
            sequence,
            files,
        }
    }

    #[test]
    fn test_date_groups_sort_unknown_last() {
        let tmp = tempfile::tempdir().unwrap();
        let folder = tmp.path().join("mixed");
        let names: Vec<String> = vec![
            "IMG_0001.jpg".into(),
            "2021-01-02_b.jpg".into(),
            "2020-12-31_a.jpg".into(),
        ];
        fill(&folder, &names);

        let chunks = CapacityManager::new(2).plan_chunks(&folder).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].files,
            vec![folder.join("2020-12-31_a.jpg"), folder.join("2021-01-02_b.jpg")]
        );
        assert_eq!(chunks[1].files, vec![folder.join("IMG_0001.jpg")]);
        assert_eq!(chunks[1].folder, tmp.path().join("mixed_02"));
    }

    #[test]
    fn test_sidecars_stay_with_primary() {
        let tmp = tempfile::tempdir().unwrap();
        let folder = tmp.path().join("day");
        let names: Vec<String> = vec![
            "2021-01-01_a.jpg".into(),
            "2021-01-01_b.jpg".into(),
            "2021-01-01_b.xmp".into(),
        ];
        fill(&folder, &names);

        let manager = CapacityManager::new(2)
            .with_sidecars(&ExtensionSets::from_config(&AppConfig::default()));
        let chunks = manager.plan_chunks(&folder).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].files, vec![folder.join("2021-01-01_a.jpg")]);
        assert_eq!(
            chunks[1].files,
            vec![folder.join("2021-01-01_b.jpg"), folder.join("2021-01-01_b.xmp")]
        );
    }

    #[test]
    fn test_under_threshold_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let folder = tmp.path().join("small");
        fill(&folder, &["a.jpg".to_string(), "b.jpg".to_string()]);
        let stats = CapacityManager::new(2).rebalance(&folder).unwrap();
        assert_eq!(stats, RebalanceStats::default());
        assert!(folder.exists());
    }

    #[test]
    fn test_existing_sibling_blocks_split() {
        let tmp = tempfile::tempdir().unwrap();
        let folder = tmp.path().join("day");
        fill(&folder, &["a.jpg".to_string(), "b.jpg".to_string(), "c.jpg".to_string()]);
        fs::create_dir_all(tmp.path().join("day_02")).unwrap();

        let err = CapacityManager::new(2).rebalance(&folder).unwrap_err();
        assert!(matches!(err, Error::SplitTargetExists { .. }));
        assert_eq!(fs::read_dir(&folder).unwrap().count(), 3, "nothing moved");
    }

    #[test]
    fn test_non_leaf_is_reported_not_split() {
        let tmp = tempfile::tempdir().unwrap();
        let folder = tmp.path().join("event");
        fill(&folder, &["a.jpg".to_string(), "b.jpg".to_string(), "c.jpg".to_string()]);
        fs::create_dir_all(folder.join("nested")).unwrap();

        let manager = CapacityManager::new(2);
        let report = manager.find_oversized(tmp.path()).unwrap();
        assert!(report.leaves.is_empty());
        assert_eq!(report.non_leaves.len(), 1);
        assert_eq!(manager.rebalance(&folder).unwrap(), RebalanceStats::default());
    }

    #[test]
    fn test_dry_run_plans_without_moving() {
        let tmp = tempfile::tempdir().unwrap();
        let folder = tmp.path().join("day");
        fill(&folder, &["a.jpg".to_string(), "b.jpg".to_string(), "c.jpg".to_string()]);

        let manager = CapacityManager::new(2).with_dry_run(true);
        let outcome = manager
            .rebalance_tree(tmp.path(), &crate::progress::SilentReporter)
            .unwrap();
        assert_eq!(outcome.planned.len(), 2);
        assert_eq!(outcome.totals, RebalanceStats::default());
        assert_eq!(fs::read_dir(&folder).unwrap().count(), 3);
        assert!(!tmp.path().join("day_01").exists());
    }

    #[test]
    fn test_leftover_file_reports_imbalance() {
        let tmp = tempfile::tempdir().unwrap();
        let folder = tmp.path().join("day");
        fill(&folder, &["a.jpg".to_string(), "b.jpg".to_string(), "c.jpg".to_string()]);

        let chunks = vec![chunk_of(
            tmp.path().join("day_01"),
            1,
            vec![folder.join("a.jpg"), folder.join("b.jpg")],
        )];
        let err = CapacityManager::new(2).apply_chunks(&folder, &chunks).unwrap_err();
        match err {
            Error::CapacityImbalance {
                remaining,
                files_moved,
                ..
            } => {
                assert_eq!(remaining, 1);
                assert_eq!(files_moved, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(folder.join("c.jpg").exists(), "original folder is kept");
        assert!(tmp.path().join("day_01/a.jpg").exists());
    }

    #[test]
    fn test_failed_move_does_not_abort_split() {
        let tmp = tempfile::tempdir().unwrap();
        let folder = tmp.path().join("day");
        fill(&folder, &["a.jpg".to_string(), "c.jpg".to_string()]);

        let chunks = vec![
            chunk_of(
                tmp.path().join("day_01"),
                1,
                vec![folder.join("a.jpg"), folder.join("b.jpg")],
            ),
            chunk_of(tmp.path().join("day_02"), 2, vec![folder.join("c.jpg")]),
        ];
        let stats = CapacityManager::new(2).apply_chunks(&folder, &chunks).unwrap();
        assert_eq!(stats.splits_created, 2);
        assert_eq!(stats.files_moved, 2);
        assert!(tmp.path().join("day_02/c.jpg").exists());
        assert!(!folder.exists());
    }

    #[test]
    fn test_oversized_sidecar_unit_settles_after_one_pass() {
        let tmp = tempfile::tempdir().unwrap();
        let folder = tmp.path().join("day");
        let names: Vec<String> = vec![
            "2021-01-01_a.jpg".into(),
            "2021-01-01_a.xmp".into(),
            "2021-01-01_a.jpg.json".into(),
        ];
        fill(&folder, &names);

        let manager = CapacityManager::new(2)
            .with_sidecars(&ExtensionSets::from_config(&AppConfig::default()));
        let first = manager
            .rebalance_tree(tmp.path(), &crate::progress::SilentReporter)
            .unwrap();
        assert!(first.is_success());
        assert_eq!(first.totals.files_moved, 3);
        assert_eq!(first.totals.splits_created, 2);
        for split in ["day_01", "day_02"] {
            let count = fs::read_dir(tmp.path().join(split)).unwrap().count();
            assert!(count <= 2, "{split} holds {count} files");
        }

        let second = manager
            .rebalance_tree(tmp.path(), &crate::progress::SilentReporter)
            .unwrap();
        assert!(second.is_success());
        assert_eq!(second.totals, RebalanceStats::default());
        assert!(!tmp.path().join("day_01_01").exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_rebalance_keeps_raw_file_names() {
        use std::os::unix::ffi::OsStrExt;

        let tmp = tempfile::tempdir().unwrap();
        let folder = tmp.path().join("day");
        fill(&folder, &["2021-01-01_a.jpg".to_string(), "2021-01-02_b.jpg".to_string()]);
        let raw = OsStr::from_bytes(b"2021-01-03_\xff.jpg");
        fs::write(folder.join(raw), b"raw").unwrap();

        let stats = CapacityManager::new(2).rebalance(&folder).unwrap();
        assert_eq!(stats.files_moved, 3);
        assert!(!folder.exists());
        assert!(tmp.path().join("day_02").join(raw).exists());
    }
}

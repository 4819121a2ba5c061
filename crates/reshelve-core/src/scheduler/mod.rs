mod summary;
mod transfer;

pub use summary::{FailureReason, SidecarOutcome, SidecarStatus, Summary, TaskFailure};
pub use transfer::{copy_file_with_metadata, transfer, Transfer};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_PROGRESS_INTERVAL;
use crate::error::Error;
use crate::plan::PlacementTask;
use crate::progress::ProgressReporter;

/// Knobs for one scheduler run. The transfer mode travels on each task.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub target_root: PathBuf,
    pub workers: usize,
    pub dry_run: bool,
    pub progress_interval: usize,
}

impl ExecuteOptions {
    pub fn new(target_root: impl Into<PathBuf>) -> Self {
        Self {
            target_root: target_root.into(),
            workers: 1,
            dry_run: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

fn build_pool(workers: usize) -> Option<ThreadPool> {
    match ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("reshelve-worker-{}", i))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!(
                "Failed to initialize thread pool (workers={}): {}; falling back to serial",
                workers, e
            );
            None
        }
    }
}

/// Map `f` over `items` on a pool of `workers` threads, preserving order.
/// One worker (or a pool that cannot be built) runs on the calling thread.
pub fn map_with_workers<T, R, F>(workers: usize, items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    if workers > 1 {
        if let Some(pool) = build_pool(workers) {
            return pool.install(|| items.par_iter().map(&f).collect());
        }
    }
    items.iter().map(f).collect()
}

/// Directories created during one run. Creation happens under the lock so two
/// workers never race on the same directory.
#[derive(Debug, Default)]
struct DirectoryRegistry {
    created: Mutex<HashSet<PathBuf>>,
}

impl DirectoryRegistry {
    fn ensure(&self, dir: &Path) -> std::io::Result<()> {
        let mut created = self.created.lock().unwrap_or_else(|e| e.into_inner());
        if created.contains(dir) {
            return Ok(());
        }
        fs::create_dir_all(dir)?;
        created.insert(dir.to_path_buf());
        Ok(())
    }
}

enum TaskResult {
    Placed { transfer: Transfer, sidecars: usize },
    Skipped,
    Failed(FailureReason),
}

/// Execute placement tasks with bounded parallelism.
///
/// Individual failures are recorded in the summary and never abort the run.
/// A plan that assigns one destination twice is rejected before anything is
/// touched.
pub fn execute(
    tasks: &[PlacementTask],
    options: &ExecuteOptions,
    reporter: &dyn ProgressReporter,
) -> Result<Summary, Error> {
    validate_unique_destinations(tasks)?;

    let start = Instant::now();
    let total = tasks.len();
    let interval = options.progress_interval.max(1);
    reporter.on_execute_start(total);
    if options.dry_run {
        info!("Dry run: validating {} tasks, nothing will be written", total);
    } else {
        info!("Executing {} tasks with {} worker(s)...", total, options.workers);
    }

    let dirs = DirectoryRegistry::default();
    let done = AtomicUsize::new(0);
    let results = map_with_workers(options.workers, tasks, |task| {
        let result = if options.dry_run {
            dry_run_task(task, &options.target_root)
        } else {
            run_task(task, &options.target_root, &dirs)
        };
        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        if finished % interval == 0 || finished == total {
            info!("Progress: {}/{} tasks", finished, total);
            reporter.on_execute_progress(finished, total);
        }
        result
    });

    let mut summary = Summary {
        attempted: total,
        dry_run: options.dry_run,
        ..Summary::default()
    };
    for (task, result) in tasks.iter().zip(results) {
        match result {
            TaskResult::Placed { transfer, sidecars } => {
                summary.succeeded += 1;
                summary.sidecars_placed += sidecars;
                if transfer == Transfer::AlreadyPresent {
                    summary.already_present += 1;
                }
            }
            TaskResult::Skipped => summary.skipped += 1,
            TaskResult::Failed(reason) => {
                error!("{} failed: {}", task.source().display(), reason);
                summary.failed.push(TaskFailure {
                    task: task.clone(),
                    reason,
                });
            }
        }
    }
    summary.duration = start.elapsed();

    reporter.on_execute_complete(
        summary.succeeded,
        summary.failed.len(),
        summary.duration.as_secs_f64(),
    );
    info!("Finished in {:.2}s: {}", summary.duration.as_secs_f64(), summary);
    Ok(summary)
}

fn validate_unique_destinations(tasks: &[PlacementTask]) -> Result<(), Error> {
    let mut seen: HashMap<&Path, &Path> = HashMap::new();
    for task in tasks {
        for destination in task.destinations() {
            if let Some(other) = seen.insert(destination.as_path(), task.source()) {
                return Err(Error::InvalidPlan(format!(
                    "{} is claimed by both {} and {}",
                    destination,
                    other.display(),
                    task.source().display()
                )));
            }
        }
    }
    Ok(())
}

fn run_task(task: &PlacementTask, target_root: &Path, dirs: &DirectoryRegistry) -> TaskResult {
    let destination = task.destination.under(target_root);
    if let Some(dir) = destination.parent() {
        if let Err(e) = dirs.ensure(dir) {
            return TaskResult::Failed(FailureReason::Primary(format!(
                "cannot create {}: {}",
                dir.display(),
                e
            )));
        }
    }

    let placed = match transfer(task.source(), &destination, task.mode) {
        Ok(placed) => placed,
        Err(e) => {
            return TaskResult::Failed(FailureReason::Primary(format!(
                "{} {} -> {}: {}",
                task.mode.verb(),
                task.source().display(),
                destination.display(),
                e
            )))
        }
    };
    debug!("{} {} -> {}", task.mode.verb(), task.source().display(), destination.display());

    let outcomes: Vec<SidecarOutcome> = task
        .sidecars
        .iter()
        .map(|sidecar| {
            let to = sidecar.destination.under(target_root);
            let status = match transfer(&sidecar.source, &to, task.mode) {
                Ok(Transfer::Placed) => SidecarStatus::Transferred,
                Ok(Transfer::AlreadyPresent) => SidecarStatus::AlreadyPresent,
                Err(e) => SidecarStatus::Failed(e.to_string()),
            };
            SidecarOutcome {
                source: sidecar.source.clone(),
                destination: to,
                status,
            }
        })
        .collect();

    let placed_sidecars = outcomes.iter().filter(|o| !o.is_failed()).count();
    let failures: Vec<SidecarOutcome> = outcomes.into_iter().filter(|o| o.is_failed()).collect();
    if failures.is_empty() {
        TaskResult::Placed {
            transfer: placed,
            sidecars: placed_sidecars,
        }
    } else {
        TaskResult::Failed(FailureReason::Sidecars(failures))
    }
}

/// Dry run: no mutation, only check the destination directory could be made.
fn dry_run_task(task: &PlacementTask, target_root: &Path) -> TaskResult {
    let destination = task.destination.under(target_root);
    let dir = destination.parent().unwrap_or(target_root);
    match blocking_ancestor(dir) {
        Some(blocker) => TaskResult::Failed(FailureReason::InvalidPlan(format!(
            "{} is not a directory",
            blocker.display()
        ))),
        None => TaskResult::Skipped,
    }
}

/// The nearest existing ancestor of `dir` (inclusive) if it is not a directory.
fn blocking_ancestor(dir: &Path) -> Option<&Path> {
    dir.ancestors()
        .find(|p| fs::symlink_metadata(p).is_ok())
        .filter(|p| !p.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferMode;
    use crate::destination::{DestinationPath, SidecarPlacement};
    use crate::media::{Asset, MediaKind};
    use crate::progress::SilentReporter;
    use std::time::UNIX_EPOCH;

    fn task(id: usize, source: &Path, destination: &str, sidecars: Vec<SidecarPlacement>) -> PlacementTask {
        PlacementTask {
            id,
            asset: Asset {
                path: source.to_path_buf(),
                extension: Some(".jpg".to_string()),
                kind: MediaKind::Image,
                size: 0,
                modified: UNIX_EPOCH,
                capture: None,
                sidecars: sidecars.iter().map(|s| s.source.clone()).collect(),
            },
            destination: DestinationPath::new(destination),
            sidecars,
            mode: TransferMode::Copy,
        }
    }

    #[test]
    fn test_copy_tasks_serial() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.jpg"), b"a").unwrap();
        fs::write(src.path().join("b.jpg"), b"b").unwrap();

        let tasks = vec![
            task(0, &src.path().join("a.jpg"), "x/a.jpg", vec![]),
            task(1, &src.path().join("b.jpg"), "x/b.jpg", vec![]),
        ];
        let summary = execute(&tasks, &ExecuteOptions::new(dst.path()), &SilentReporter).unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.succeeded, 2);
        assert_eq!(fs::read(dst.path().join("x/a.jpg")).unwrap(), b"a");
        assert!(src.path().join("a.jpg").exists(), "copy keeps the source");
    }

    #[test]
    fn test_missing_source_does_not_abort_run() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("b.jpg"), b"b").unwrap();

        let tasks = vec![
            task(0, &src.path().join("gone.jpg"), "x/gone.jpg", vec![]),
            task(1, &src.path().join("b.jpg"), "x/b.jpg", vec![]),
        ];
        let options = ExecuteOptions::new(dst.path()).with_workers(4);
        let summary = execute(&tasks, &options, &SilentReporter).unwrap();
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed.len(), 1);
        assert!(matches!(summary.failed[0].reason, FailureReason::Primary(_)));
        assert!(dst.path().join("x/b.jpg").exists());
    }

    #[test]
    fn test_sidecar_failure_is_reported_individually() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.jpg"), b"a").unwrap();
        fs::write(src.path().join("a.xmp"), b"x").unwrap();

        let sidecars = vec![
            SidecarPlacement {
                source: src.path().join("a.xmp"),
                destination: DestinationPath::new("x/a.xmp"),
            },
            SidecarPlacement {
                source: src.path().join("a.jpg.json"),
                destination: DestinationPath::new("x/a.jpg.json"),
            },
        ];
        let tasks = vec![task(0, &src.path().join("a.jpg"), "x/a.jpg", sidecars)];
        let summary = execute(&tasks, &ExecuteOptions::new(dst.path()), &SilentReporter).unwrap();

        assert_eq!(summary.succeeded, 0);
        assert!(dst.path().join("x/a.jpg").exists(), "primary is still placed");
        assert!(dst.path().join("x/a.xmp").exists());
        match &summary.failed[0].reason {
            FailureReason::Sidecars(failed) => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].source, src.path().join("a.jpg.json"));
            }
            other => panic!("unexpected reason {:?}", other),
        }
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.jpg"), b"a").unwrap();
        fs::write(dst.path().join("blocker"), b"file").unwrap();

        let tasks = vec![
            task(0, &src.path().join("a.jpg"), "x/a.jpg", vec![]),
            task(1, &src.path().join("a.jpg"), "blocker/a.jpg", vec![]),
        ];
        let options = ExecuteOptions::new(dst.path()).with_dry_run(true);
        let summary = execute(&tasks, &options, &SilentReporter).unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed.len(), 1);
        assert!(matches!(summary.failed[0].reason, FailureReason::InvalidPlan(_)));
        assert!(!dst.path().join("x").exists());
    }

    #[test]
    fn test_duplicate_destination_rejected() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.jpg"), b"a").unwrap();
        fs::write(src.path().join("b.jpg"), b"b").unwrap();

        let tasks = vec![
            task(0, &src.path().join("a.jpg"), "x/a.jpg", vec![]),
            task(1, &src.path().join("b.jpg"), "x/a.jpg", vec![]),
        ];
        let err = execute(&tasks, &ExecuteOptions::new(dst.path()), &SilentReporter).unwrap_err();
        assert!(matches!(err, Error::InvalidPlan(_)));
        assert!(!dst.path().join("x").exists(), "nothing written for an invalid plan");
    }

    #[test]
    fn test_map_with_workers_preserves_order() {
        let items: Vec<usize> = (0..100).collect();
        let doubled = map_with_workers(4, &items, |n| n * 2);
        assert_eq!(doubled, (0..100).map(|n| n * 2).collect::<Vec<_>>());
    }
}

/// Trait for reporting run progress.
///
/// The CLI implements it with indicatif bars. All methods have default no-op
/// implementations, and every method may be called from worker threads.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self) {}
    fn on_scan_complete(&self, _media_files: usize, _duration_secs: f64) {}
    fn on_plan_start(&self, _assets: usize) {}
    fn on_plan_progress(&self, _resolved: usize, _total: usize) {}
    fn on_plan_complete(&self, _tasks: usize, _duration_secs: f64) {}
    fn on_execute_start(&self, _tasks: usize) {}
    fn on_execute_progress(&self, _done: usize, _total: usize) {}
    fn on_execute_complete(&self, _succeeded: usize, _failed: usize, _duration_secs: f64) {}
    fn on_rebalance_folder(&self, _folder: &str, _chunks: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use reshelve_core::ProgressReporter;

const TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Scan: spinner (file count unknown upfront)
/// - Plan: bar over resolved capture dates
/// - Execute: bar over placement tasks
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.slot();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.slot().take() {
            pb.finish_and_clear();
        }
    }

    fn update(&self, done: usize, total: usize) {
        if let Some(pb) = self.slot().as_ref() {
            if pb.length() != Some(total as u64) {
                pb.set_length(total as u64);
            }
            pb.set_position(done as u64);
        }
    }

    fn spinner(message: &'static str) -> ProgressBar {
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars(TICKS);
        let pb = ProgressBar::new_spinner();
        pb.set_style(style);
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    fn bar(label: &str, total: usize, unit: &str) -> ProgressBar {
        let template = format!(
            "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} {} ({{eta}} remaining)",
            label, unit
        );
        let style = ProgressStyle::with_template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸─")
            .tick_chars(TICKS);
        let pb = ProgressBar::new(total as u64);
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }
}

fn done(line: String) {
    eprintln!("  \x1b[32m✓\x1b[0m {}", line);
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self) {
        self.set_bar(Self::spinner("Scanning source..."));
    }

    fn on_scan_complete(&self, media_files: usize, duration_secs: f64) {
        self.finish_bar();
        done(format!(
            "Scan complete: {} media files in {:.2}s",
            media_files, duration_secs
        ));
    }

    fn on_plan_start(&self, assets: usize) {
        self.set_bar(Self::bar("Dating", assets, "files"));
    }

    fn on_plan_progress(&self, resolved: usize, total: usize) {
        self.update(resolved, total);
    }

    fn on_plan_complete(&self, tasks: usize, duration_secs: f64) {
        self.finish_bar();
        done(format!(
            "Plan complete: {} placements in {:.2}s",
            tasks, duration_secs
        ));
    }

    fn on_execute_start(&self, tasks: usize) {
        self.set_bar(Self::bar("Placing", tasks, "tasks"));
    }

    fn on_execute_progress(&self, done: usize, total: usize) {
        self.update(done, total);
    }

    fn on_execute_complete(&self, succeeded: usize, failed: usize, duration_secs: f64) {
        self.finish_bar();
        if failed == 0 {
            done(format!(
                "Placement complete: {} succeeded in {:.2}s",
                succeeded, duration_secs
            ));
        } else {
            eprintln!(
                "  \x1b[31m✗\x1b[0m Placement finished: {} succeeded, {} failed in {:.2}s",
                succeeded, failed, duration_secs
            );
        }
    }

    fn on_rebalance_folder(&self, folder: &str, chunks: usize) {
        done(format!("{} -> {} folders", folder, chunks));
    }
}

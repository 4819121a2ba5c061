use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::{paths_overlap, AppConfig};
use crate::date::DateResolver;
use crate::error::Error;
use crate::metadata::{provider_for, MetadataProvider};
use crate::plan::{Plan, PlanStats, Planner, UnplannedAsset};
use crate::progress::ProgressReporter;
use crate::scheduler::{self, ExecuteOptions, Summary};

pub struct ReorganizeEngine {
    config: AppConfig,
    metadata: Box<dyn MetadataProvider>,
    resolver: Option<DateResolver>,
    plan_output: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ReorganizeResult {
    pub plan_duration: Duration,
    pub execute_duration: Duration,
    pub plan_stats: PlanStats,
    /// Media that could not be read while planning and was never placed.
    pub unplanned: Vec<UnplannedAsset>,
    pub summary: Summary,
}

impl ReorganizeResult {
    /// Every scanned media file was planned and every task succeeded.
    pub fn is_success(&self) -> bool {
        self.unplanned.is_empty() && self.summary.is_success()
    }
}

impl ReorganizeEngine {
    pub fn new(config: AppConfig) -> Self {
        let metadata = provider_for(config.metadata);
        Self {
            config,
            metadata,
            resolver: None,
            plan_output: None,
        }
    }

    pub fn with_metadata(mut self, provider: Box<dyn MetadataProvider>) -> Self {
        self.metadata = provider;
        self
    }

    /// Fix the accepted date range instead of deriving it from today.
    pub fn with_resolver(mut self, resolver: DateResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Also write the plan as JSON to `path` before executing it.
    pub fn with_plan_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.plan_output = Some(path.into());
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Phase 1 only: scan the source and compute every placement.
    pub fn plan(&self, reporter: &dyn ProgressReporter) -> Result<Plan, Error> {
        let source_root = &self.config.source_root;
        let target_root = &self.config.target_root;
        if !source_root.is_dir() {
            return Err(Error::MissingRoot(source_root.clone()));
        }
        if paths_overlap(source_root, target_root) {
            return Err(Error::Overlap {
                source_root: source_root.clone(),
                target_root: target_root.clone(),
            });
        }

        let mut planner = Planner::new(&self.config, self.metadata.as_ref());
        if let Some(resolver) = self.resolver {
            planner = planner.with_resolver(resolver);
        }
        planner.plan(reporter)
    }

    /// Plan, then place every asset:
    /// 1. Scan the source and resolve capture dates (parallel)
    /// 2. Claim destinations in sorted source order (serial)
    /// 3. Copy or move with `workers` threads
    pub fn run(&self, reporter: &dyn ProgressReporter) -> Result<ReorganizeResult, Error> {
        info!(
            "Reorganizing {} -> {} ({}, {:?} layout{})",
            self.config.source_root.display(),
            self.config.target_root.display(),
            self.config.mode.verb(),
            self.config.layout,
            if self.config.dry_run { ", dry run" } else { "" }
        );

        // Phase 1: Plan
        let plan_start = Instant::now();
        let plan = self.plan(reporter)?;
        let plan_duration = plan_start.elapsed();
        debug!("Planning completed in {:.2}s", plan_duration.as_secs_f64());

        if let Some(path) = &self.plan_output {
            plan.write_json(path)?;
        }

        // Phase 2: Execute
        let options = ExecuteOptions {
            target_root: self.config.target_root.clone(),
            workers: self.config.workers,
            dry_run: self.config.dry_run,
            progress_interval: self.config.progress_interval,
        };
        let execute_start = Instant::now();
        let summary = scheduler::execute(&plan.tasks, &options, reporter)?;
        let execute_duration = execute_start.elapsed();

        Ok(ReorganizeResult {
            plan_duration,
            execute_duration,
            plan_stats: plan.stats,
            unplanned: plan.unplanned,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(unplanned: Vec<UnplannedAsset>) -> ReorganizeResult {
        ReorganizeResult {
            plan_duration: Duration::ZERO,
            execute_duration: Duration::ZERO,
            plan_stats: PlanStats::default(),
            unplanned,
            summary: Summary::default(),
        }
    }

    #[test]
    fn test_unplanned_media_fails_the_run() {
        assert!(result(Vec::new()).is_success());

        let skipped = UnplannedAsset {
            path: PathBuf::from("/photos/2021-07-04_a.jpg"),
            reason: "permission denied".to_string(),
        };
        assert!(!result(vec![skipped]).is_success());
    }
}

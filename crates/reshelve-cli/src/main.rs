mod commands;
mod logging;
mod progress;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, LayoutArg};
use dotenv::dotenv;
use progress::CliReporter;
use reshelve_core::analysis::{Comparator, EntryKind, Presence, RenderOptions};
use reshelve_core::media::ExtensionSets;
use reshelve_core::{AppConfig, CapacityManager, MetadataSource, ReorganizeEngine, TransferMode};
use tracing::{error, info, warn};

/// Failures listed on the console before the rest are left to the log file.
const SHOWN_FAILURES: usize = 20;

fn main() {
    dotenv().ok();

    let guard = logging::init_logger();

    let config = match reshelve_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            drop(guard);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let code = match args.command {
        Some(command) => match run(command, config) {
            Ok(code) => code,
            Err(err) => {
                error!("Error: {:#}", err);
                2
            }
        },
        None => {
            let _ = Cli::command().print_long_help();
            0
        }
    };

    drop(guard);
    process::exit(code);
}

fn run(command: Commands, config: AppConfig) -> Result<i32> {
    match command {
        Commands::Organize {
            source,
            target,
            move_files,
            workers,
            dry_run,
            layout,
            exiftool,
            plan_out,
        } => {
            let mut config = config;
            if let Some(source) = source {
                config.source_root = source;
            }
            if let Some(target) = target {
                config.target_root = target;
            }
            if move_files {
                config.mode = TransferMode::Move;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if dry_run {
                config.dry_run = true;
            }
            if let Some(layout) = layout {
                config.layout = layout.into();
            }
            if exiftool {
                config.metadata = MetadataSource::Exiftool;
            }
            run_organize(config.resolved(), plan_out)
        }
        Commands::Rebalance {
            root,
            max_files,
            dry_run,
        } => run_rebalance(&config, &root, max_files, dry_run),
        Commands::Compare {
            source,
            target,
            report,
            limit,
        } => run_compare(&source, &target, report, limit),
        Commands::Verify {
            root,
            max_files,
            layout,
        } => run_verify(&config, &root, max_files, layout),
        Commands::PrintConfig => {
            println!("Configuration: {:#?}", config);
            Ok(0)
        }
    }
}

fn run_organize(config: AppConfig, plan_out: Option<PathBuf>) -> Result<i32> {
    if config.source_root.as_os_str().is_empty() || config.target_root.as_os_str().is_empty() {
        bail!("both --source and --target are required (or RESHELVE_SOURCE_ROOT / RESHELVE_TARGET_ROOT)");
    }

    let mut engine = ReorganizeEngine::new(config);
    if let Some(path) = plan_out {
        engine = engine.with_plan_output(path);
    }
    let reporter = CliReporter::new();
    let result = engine.run(&reporter).context("reorganization aborted")?;

    let stats = &result.plan_stats;
    let summary = &result.summary;
    println!();
    info!(
        "Plan: {}, Execute: {}",
        format!("{:.2}s", result.plan_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.execute_duration.as_secs_f64()).green(),
    );
    info!(
        "{} media files ({} exact, {} from filename, {} from mtime), {} renamed with a suffix",
        format!("{}", stats.media_files).cyan(),
        stats.exact,
        stats.filename_derived,
        stats.filesystem_fallback,
        format!("{}", stats.suffixed).yellow(),
    );
    info!(
        "{} sidecars attached, {} orphaned, {} disabled, {} other files ignored",
        stats.sidecars_attached, stats.orphan_sidecars, stats.disabled_sidecars, stats.other_files,
    );
    if stats.unreadable > 0 {
        warn!(
            "{} media files could not be read and were left in the source",
            format!("{}", stats.unreadable).red()
        );
    }
    if summary.dry_run {
        info!("{} {}", "Dry run:".yellow(), summary);
    } else {
        info!("{}", summary);
    }

    if result.is_success() {
        return Ok(0);
    }
    for skipped in result.unplanned.iter().take(SHOWN_FAILURES) {
        warn!(
            "{} {}: {}",
            "UNREADABLE".red(),
            skipped.path.display(),
            skipped.reason
        );
    }
    if result.unplanned.len() > SHOWN_FAILURES {
        warn!(
            "... and {} more unreadable files (see log file)",
            result.unplanned.len() - SHOWN_FAILURES
        );
    }
    for failure in summary.failed.iter().take(SHOWN_FAILURES) {
        warn!(
            "{} {}: {}",
            "FAILED".red(),
            failure.task.source().display(),
            failure.reason
        );
    }
    if summary.failed.len() > SHOWN_FAILURES {
        warn!(
            "... and {} more failures (see log file)",
            summary.failed.len() - SHOWN_FAILURES
        );
    }
    Ok(1)
}

fn run_rebalance(
    config: &AppConfig,
    root: &Path,
    max_files: Option<usize>,
    dry_run: bool,
) -> Result<i32> {
    let max_files = max_files.unwrap_or(config.max_files_per_folder);
    if max_files == 0 {
        bail!("--max-files must be at least 1");
    }
    let manager = CapacityManager::new(max_files)
        .with_sidecars(&ExtensionSets::from_config(config))
        .with_dry_run(dry_run || config.dry_run);

    let reporter = CliReporter::new();
    let outcome = manager
        .rebalance_tree(root, &reporter)
        .with_context(|| format!("cannot rebalance {}", root.display()))?;

    if manager.is_dry_run() {
        for chunk in &outcome.planned {
            info!(
                "would move {} files into {}",
                chunk.files.len(),
                chunk.folder.display()
            );
        }
    } else {
        info!(
            "{} folders created, {} files moved",
            format!("{}", outcome.totals.splits_created).green(),
            format!("{}", outcome.totals.files_moved).green(),
        );
    }
    if !outcome.non_leaves.is_empty() {
        warn!(
            "{} oversized folders have sub-directories and were left alone",
            format!("{}", outcome.non_leaves.len()).yellow()
        );
    }
    for (folder, err) in &outcome.errors {
        error!("{} {}: {}", "FAILED".red(), folder.display(), err);
    }
    Ok(if outcome.is_success() { 0 } else { 1 })
}

fn run_compare(source: &Path, target: &Path, report_path: Option<PathBuf>, limit: usize) -> Result<i32> {
    let report = Comparator::new().compare(source, target)?;

    let console = RenderOptions {
        generated: None,
        limit: Some(limit),
    };
    println!("{}", report.render(&console));

    if let Some(path) = report_path {
        let full = RenderOptions {
            generated: Some(Local::now()),
            limit: None,
        };
        report
            .write_to(&path, &full)
            .with_context(|| format!("cannot write report to {}", path.display()))?;
        info!("Full report written to {}", path.display().to_string().cyan());
    }

    if report.has_differences() {
        info!(
            "{} directories and {} files differ",
            report.count(EntryKind::Directory, Presence::SourceOnly)
                + report.count(EntryKind::Directory, Presence::TargetOnly),
            report.count(EntryKind::File, Presence::SourceOnly)
                + report.count(EntryKind::File, Presence::TargetOnly),
        );
    } else {
        info!("{}", "Structures are identical".green());
    }
    Ok(0)
}

fn run_verify(
    config: &AppConfig,
    root: &Path,
    max_files: Option<usize>,
    layout: Option<LayoutArg>,
) -> Result<i32> {
    let max_files = max_files.unwrap_or(config.max_files_per_folder);
    let layout = layout.map(Into::into).unwrap_or(config.layout);
    let report = reshelve_core::analysis::verify_library(
        root,
        layout,
        &ExtensionSets::from_config(config),
        max_files,
    )?;

    info!(
        "{} folders checked, {} media files",
        report.folders_checked,
        format!("{}", report.media_files).cyan()
    );
    for (count, folders) in &report.distribution {
        info!("  {:>5} files: {} folders", count, folders);
    }
    for issue in report.structure_issues.iter().take(SHOWN_FAILURES) {
        warn!("{} {}", "BAD NAME".red(), issue);
    }
    for (folder, count) in report.oversized.iter().take(SHOWN_FAILURES) {
        warn!(
            "{} {} ({} > {})",
            "OVERSIZED".red(),
            folder.display(),
            count,
            max_files
        );
    }

    if report.is_clean() {
        info!("{}", "Library structure verified".green());
        Ok(0)
    } else {
        warn!("{} issues found", format!("{}", report.issue_count()).red());
        Ok(1)
    }
}

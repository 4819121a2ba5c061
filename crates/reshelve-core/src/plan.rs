use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, TransferMode};
use crate::date::{mtime_date, Confidence, DateResolver};
use crate::destination::{DestinationBuilder, DestinationPath, Layout, SidecarPlacement};
use crate::error::Error;
use crate::hasher;
use crate::media::{Asset, ExtensionSets};
use crate::metadata::MetadataProvider;
use crate::progress::ProgressReporter;
use crate::scanner::{self, SourceScan};
use crate::scheduler::map_with_workers;
use crate::sidecar::SidecarLocator;

/// One unit of work for the scheduler: place `asset` (and its sidecars).
#[derive(Debug, Clone, Serialize)]
pub struct PlacementTask {
    pub id: usize,
    pub asset: Asset,
    pub destination: DestinationPath,
    pub sidecars: Vec<SidecarPlacement>,
    pub mode: TransferMode,
}

impl PlacementTask {
    pub fn source(&self) -> &Path {
        &self.asset.path
    }

    /// Every destination this task writes, primary first.
    pub fn destinations(&self) -> impl Iterator<Item = &DestinationPath> {
        std::iter::once(&self.destination).chain(self.sidecars.iter().map(|s| &s.destination))
    }
}

/// Counts gathered while planning.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanStats {
    pub media_files: usize,
    pub sidecar_files: usize,
    pub sidecars_attached: usize,
    pub orphan_sidecars: usize,
    pub disabled_sidecars: usize,
    pub other_files: usize,
    pub unreadable: usize,
    pub exact: usize,
    pub filename_derived: usize,
    pub filesystem_fallback: usize,
    pub invalid_dates: usize,
    pub metadata_errors: usize,
    pub suffixed: usize,
}

impl PlanStats {
    fn record(&mut self, confidence: Confidence) {
        match confidence {
            Confidence::Exact => self.exact += 1,
            Confidence::FilenameDerived => self.filename_derived += 1,
            Confidence::FilesystemFallback => self.filesystem_fallback += 1,
        }
    }
}

/// A media file found by the scan that could not be turned into a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnplannedAsset {
    pub path: PathBuf,
    pub reason: String,
}

/// The full set of placement tasks for one run.
#[derive(Debug, Serialize)]
pub struct Plan {
    pub source_root: PathBuf,
    pub target_root: PathBuf,
    pub mode: TransferMode,
    pub layout: Layout,
    pub tasks: Vec<PlacementTask>,
    /// Media left in the source because it could not be read while planning.
    pub unplanned: Vec<UnplannedAsset>,
    pub stats: PlanStats,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        info!("Plan written to {}", path.display());
        Ok(())
    }
}

#[derive(Default)]
struct Counters {
    resolved: AtomicUsize,
    invalid_dates: AtomicUsize,
    metadata_errors: AtomicUsize,
}

/// Builds a [`Plan`]: scan, resolve dates in parallel, then claim destinations
/// serially in sorted source order so suffixes never depend on thread timing.
pub struct Planner<'a> {
    config: &'a AppConfig,
    extensions: ExtensionSets,
    locator: SidecarLocator,
    resolver: DateResolver,
    metadata: &'a dyn MetadataProvider,
    builder: DestinationBuilder,
}

impl<'a> Planner<'a> {
    pub fn new(config: &'a AppConfig, metadata: &'a dyn MetadataProvider) -> Self {
        let extensions = ExtensionSets::from_config(config);
        let locator = SidecarLocator::new(&extensions);
        Self {
            config,
            extensions,
            locator,
            resolver: DateResolver::for_today(config.min_year),
            metadata,
            builder: DestinationBuilder::new(config.layout),
        }
    }

    pub fn with_resolver(mut self, resolver: DateResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn plan(&self, reporter: &dyn ProgressReporter) -> Result<Plan, Error> {
        let source_root = &self.config.source_root;

        reporter.on_scan_start();
        let scan_start = Instant::now();
        let scan = scanner::scan_source(
            source_root,
            &self.extensions,
            &self.config.ignore_patterns,
            self.config.skip_hidden,
        )?;
        reporter.on_scan_complete(scan.media.len(), scan_start.elapsed().as_secs_f64());

        Ok(self.plan_scan(&scan, reporter))
    }

    /// Resolve and place every media file of an existing scan.
    fn plan_scan(&self, scan: &SourceScan, reporter: &dyn ProgressReporter) -> Plan {
        let target_root = &self.config.target_root;
        let plan_start = Instant::now();
        let total = scan.media.len();
        reporter.on_plan_start(total);
        info!("Resolving capture dates for {} media files...", total);

        let counters = Counters::default();
        let interval = self.config.progress_interval.max(1);
        let resolved: Vec<Result<Asset, UnplannedAsset>> =
            map_with_workers(self.config.workers, &scan.media, |path| {
                let asset = self.resolve_asset(path, scan, &counters);
                let done = counters.resolved.fetch_add(1, Ordering::Relaxed) + 1;
                if done % interval == 0 || done == total {
                    reporter.on_plan_progress(done, total);
                }
                asset
            });

        let mut stats = PlanStats {
            media_files: total,
            sidecar_files: scan.sidecar_files,
            disabled_sidecars: scan.disabled_sidecars,
            other_files: scan.other_files,
            invalid_dates: counters.invalid_dates.load(Ordering::Relaxed),
            metadata_errors: counters.metadata_errors.load(Ordering::Relaxed),
            ..PlanStats::default()
        };

        let mut assets: Vec<Asset> = Vec::with_capacity(resolved.len());
        let mut unplanned = Vec::new();
        for result in resolved {
            match result {
                Ok(asset) => assets.push(asset),
                Err(skipped) => unplanned.push(skipped),
            }
        }
        stats.unreadable = unplanned.len();
        assign_sidecar_owners(&mut assets);

        self.builder.reset();
        let mut tasks = Vec::with_capacity(assets.len());
        for asset in assets {
            let capture = match asset.capture {
                Some(capture) => capture,
                None => mtime_date(asset.modified),
            };
            stats.record(capture.confidence);
            stats.sidecars_attached += asset.sidecars.len();

            let placement = self.builder.build_with(&asset, capture.date, |relative, owner| {
                free_on_disk(target_root, relative, owner)
            });
            if placement.suffix.is_some() {
                stats.suffixed += 1;
            }
            debug!("{} -> {}", asset.path.display(), placement.destination);

            tasks.push(PlacementTask {
                id: tasks.len(),
                asset,
                destination: placement.destination,
                sidecars: placement.sidecars,
                mode: self.config.mode,
            });
        }
        stats.orphan_sidecars = stats.sidecar_files.saturating_sub(stats.sidecars_attached);

        reporter.on_plan_complete(tasks.len(), plan_start.elapsed().as_secs_f64());
        info!(
            "Planned {} tasks ({} exact, {} filename-derived, {} filesystem-fallback, {} suffixed)",
            tasks.len(),
            stats.exact,
            stats.filename_derived,
            stats.filesystem_fallback,
            stats.suffixed,
        );
        if !unplanned.is_empty() {
            warn!("{} media file(s) could not be read and stay in place", unplanned.len());
        }
        if stats.orphan_sidecars > 0 {
            warn!("{} sidecar file(s) have no matching media file and stay in place", stats.orphan_sidecars);
        }

        Plan {
            source_root: self.config.source_root.clone(),
            target_root: target_root.clone(),
            mode: self.config.mode,
            layout: self.config.layout,
            tasks,
            unplanned,
            stats,
        }
    }

    fn resolve_asset(
        &self,
        path: &Path,
        scan: &SourceScan,
        counters: &Counters,
    ) -> Result<Asset, UnplannedAsset> {
        let mut asset = match Asset::from_path(path, &self.extensions) {
            Ok(asset) => asset,
            Err(e) => {
                error!("Cannot read {}: {}", path.display(), e);
                return Err(UnplannedAsset {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        let external = match self.metadata.capture_timestamp(path) {
            Ok(value) => value,
            Err(e) => {
                warn!("{}", e);
                counters.metadata_errors.fetch_add(1, Ordering::Relaxed);
                None
            }
        };

        let file_name = asset.file_name();
        let (capture, rejected) =
            self.resolver
                .resolve_or_fallback(&file_name, external.as_deref(), asset.modified);
        if rejected.is_some() {
            counters.invalid_dates.fetch_add(1, Ordering::Relaxed);
        }
        asset.capture = Some(capture);
        asset.sidecars = self.locator.locate_among(path, scan.siblings_of(path));
        Ok(asset)
    }
}

/// A sidecar matching several assets (`IMG_01.xmp` next to `IMG_01.jpg` and
/// `IMG_01.mov`) belongs to the first asset in sorted order.
fn assign_sidecar_owners(assets: &mut [Asset]) {
    let mut owned: HashSet<PathBuf> = HashSet::new();
    for asset in assets.iter_mut() {
        asset.sidecars.retain(|sidecar| owned.insert(sidecar.clone()));
    }
}

/// A name under the target root is usable if nothing is there, or if what is
/// there is already a byte-identical copy of `source`. A name that cannot be
/// inspected is left to fail at execution.
fn free_on_disk(target_root: &Path, relative: &Path, source: &Path) -> bool {
    let existing = target_root.join(relative);
    match fs::symlink_metadata(&existing) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            debug!("cannot inspect {}: {}", existing.display(), e);
            true
        }
        Ok(meta) if meta.is_file() => hasher::files_identical(source, &existing).unwrap_or(false),
        Ok(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::NoMetadata;
    use crate::progress::SilentReporter;
    use chrono::NaiveDate;

    fn config(source: &Path, target: &Path) -> AppConfig {
        AppConfig {
            source_root: source.to_path_buf(),
            target_root: target.to_path_buf(),
            workers: 2,
            ..AppConfig::default()
        }
    }

    fn resolver() -> DateResolver {
        DateResolver::new(1900, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())
    }

    #[test]
    fn test_plan_uses_filename_dates_and_sidecars() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let trip = src.path().join("trip");
        fs::create_dir_all(&trip).unwrap();
        fs::write(trip.join("2021-07-04_beach.jpg"), b"img").unwrap();
        fs::write(trip.join("2021-07-04_beach.xmp"), b"xmp").unwrap();
        fs::write(trip.join("lonely.json"), b"{}").unwrap();

        let config = config(src.path(), dst.path());
        let plan = Planner::new(&config, &NoMetadata)
            .with_resolver(resolver())
            .plan(&SilentReporter)
            .unwrap();

        assert_eq!(plan.len(), 1);
        let task = &plan.tasks[0];
        assert_eq!(
            task.destination.as_path(),
            Path::new("2020+/2021/2021-07/trip/2021-07-04_beach.jpg")
        );
        assert_eq!(task.sidecars.len(), 1);
        assert_eq!(
            task.sidecars[0].destination.as_path(),
            Path::new("2020+/2021/2021-07/trip/2021-07-04_beach.xmp")
        );
        assert_eq!(plan.stats.filename_derived, 1);
        assert_eq!(plan.stats.orphan_sidecars, 1);
    }

    #[test]
    fn test_shared_sidecar_has_one_owner() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("2020-01-01_a.jpg"), b"j").unwrap();
        fs::write(src.path().join("2020-01-01_a.mov"), b"m").unwrap();
        fs::write(src.path().join("2020-01-01_a.xmp"), b"x").unwrap();

        let config = config(src.path(), dst.path());
        let plan = Planner::new(&config, &NoMetadata)
            .with_resolver(resolver())
            .plan(&SilentReporter)
            .unwrap();

        let total: usize = plan.tasks.iter().map(|t| t.sidecars.len()).sum();
        assert_eq!(total, 1, "a sidecar must be attached to exactly one asset");
        assert_eq!(plan.tasks[0].asset.file_name(), "2020-01-01_a.jpg");
        assert_eq!(plan.tasks[0].sidecars.len(), 1);
    }

    #[test]
    fn test_identical_file_on_disk_keeps_name() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let trip = src.path().join("trip");
        fs::create_dir_all(&trip).unwrap();
        fs::write(trip.join("2021-07-04_a.jpg"), b"same").unwrap();
        fs::write(trip.join("2021-07-04_b.jpg"), b"new").unwrap();

        let placed = dst.path().join("2020+/2021/2021-07/trip");
        fs::create_dir_all(&placed).unwrap();
        fs::write(placed.join("2021-07-04_a.jpg"), b"same").unwrap();
        fs::write(placed.join("2021-07-04_b.jpg"), b"old").unwrap();

        let config = config(src.path(), dst.path());
        let plan = Planner::new(&config, &NoMetadata)
            .with_resolver(resolver())
            .plan(&SilentReporter)
            .unwrap();

        let names: Vec<String> = plan.tasks.iter().map(|t| t.destination.file_name()).collect();
        assert_eq!(names, vec!["2021-07-04_a.jpg".to_string(), "2021-07-04_b_2.jpg".to_string()]);
    }

    #[test]
    fn test_unreadable_media_is_recorded_not_dropped() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let present = src.path().join("2021-07-04_a.jpg");
        let vanished = src.path().join("2021-07-04_gone.jpg");
        fs::write(&present, b"a").unwrap();
        let scan = SourceScan {
            media: vec![present, vanished.clone()],
            ..SourceScan::default()
        };

        let config = config(src.path(), dst.path());
        let planner = Planner::new(&config, &NoMetadata).with_resolver(resolver());
        let plan = planner.plan_scan(&scan, &SilentReporter);

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.unplanned.len(), 1);
        assert_eq!(plan.unplanned[0].path, vanished);
        assert!(!plan.unplanned[0].reason.is_empty());
        assert_eq!(plan.stats.unreadable, 1);
        assert_eq!(plan.stats.media_files, 2);
    }

    #[test]
    fn test_plan_json_export() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("2019-03-02.png"), b"p").unwrap();

        let config = config(src.path(), dst.path());
        let plan = Planner::new(&config, &NoMetadata)
            .with_resolver(resolver())
            .plan(&SilentReporter)
            .unwrap();
        let out = dst.path().join("reports/plan.json");
        plan.write_json(&out).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(value["tasks"][0]["asset"]["capture"]["confidence"], "filename-derived");
        assert_eq!(value["stats"]["filename_derived"], 1);
        assert_eq!(value["mode"], "copy");
    }
}

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::date::{decade_label, year_month_label};
use crate::media::Asset;
use crate::sidecar::sidecar_suffix;

/// Shape of the directory tree under the target root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    /// `<decade>/<year>/<year>-<month>/<parent-folder>/<filename>`
    #[default]
    Full,
    /// `<year>-<month>/<filename>`
    MonthOnly,
}

/// A path relative to the target root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DestinationPath(PathBuf);

impl DestinationPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn directory(&self) -> &Path {
        self.0.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn under(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl fmt::Display for DestinationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A sidecar and the destination claimed for it alongside its asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SidecarPlacement {
    pub source: PathBuf,
    pub destination: DestinationPath,
}

/// Destinations claimed for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub destination: DestinationPath,
    pub sidecars: Vec<SidecarPlacement>,
    /// `Some(n)` when the name had to be suffixed with `_n`.
    pub suffix: Option<u32>,
}

/// Directory part of the destination for a source file captured on `date`.
pub fn destination_dir(source: &Path, date: NaiveDate, layout: Layout) -> PathBuf {
    let year_month = year_month_label(date);
    match layout {
        Layout::MonthOnly => PathBuf::from(year_month),
        Layout::Full => {
            let mut dir = PathBuf::from(decade_label(date.year()));
            dir.push(format!("{:04}", date.year()));
            dir.push(year_month);
            if let Some(parent) = source.parent().and_then(|p| p.file_name()) {
                dir.push(parent);
            }
            dir
        }
    }
}

/// Destination → claiming source, for one run.
///
/// All access goes through one lock so that checking a name and claiming it
/// is a single step.
#[derive(Debug, Default)]
pub struct CollisionTable {
    claimed: Mutex<HashMap<PathBuf, PathBuf>>,
}

impl CollisionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Source currently holding `destination`, if any.
    pub fn claimant(&self, destination: &Path) -> Option<PathBuf> {
        self.lock().get(destination).cloned()
    }

    /// Claim `dir/<stem><ext>` for `source` together with one name per sidecar
    /// (`dir/<stem><suffix>`), appending `_2`, `_3`, ... to the stem until every
    /// name is free. A name is free when nobody claimed it, or `source`'s own
    /// group claimed it, and `is_free_on_disk(relative_name, claimant_source)`
    /// agrees.
    pub fn claim<F>(
        &self,
        source: &Path,
        dir: &Path,
        sidecars: &[(PathBuf, String)],
        is_free_on_disk: F,
    ) -> Placement
    where
        F: Fn(&Path, &Path) -> bool,
    {
        let (stem, ext) = split_name(source);
        let mut claimed = self.lock();

        let mut n: u32 = 1;
        loop {
            let stem_n = if n == 1 {
                stem.clone()
            } else {
                with_tail(&stem, &format!("_{}", n))
            };

            let mut wanted: Vec<(PathBuf, &Path)> = Vec::with_capacity(sidecars.len() + 1);
            wanted.push((dir.join(with_tail(&stem_n, &ext)), source));
            for (sidecar_source, suffix) in sidecars {
                wanted.push((dir.join(with_tail(&stem_n, suffix)), sidecar_source.as_path()));
            }

            let free = wanted.iter().all(|(name, owner)| {
                let unclaimed = match claimed.get(name) {
                    None => true,
                    Some(existing) => existing.as_path() == *owner,
                };
                unclaimed && is_free_on_disk(name, owner)
            });

            if free {
                for (name, owner) in &wanted {
                    claimed.insert(name.clone(), owner.to_path_buf());
                }
                let mut names = wanted.into_iter().map(|(name, _)| name);
                let destination = DestinationPath(names.next().unwrap_or_default());
                let sidecars = sidecars
                    .iter()
                    .zip(names)
                    .map(|((sidecar_source, _), name)| SidecarPlacement {
                        source: sidecar_source.clone(),
                        destination: DestinationPath(name),
                    })
                    .collect();
                if n > 1 {
                    debug!("{} collides, claimed {}", source.display(), destination);
                }
                return Placement {
                    destination,
                    sidecars,
                    suffix: (n > 1).then_some(n),
                };
            }

            n += 1;
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, PathBuf>> {
        // A poisoned table is still consistent: inserts happen after all checks.
        self.claimed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Raw stem and `.ext` of a file name. The stem is kept byte-exact.
fn split_name(path: &Path) -> (OsString, String) {
    let stem = path.file_stem().unwrap_or_default().to_os_string();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

fn with_tail(stem: &OsStr, tail: &str) -> OsString {
    let mut name = stem.to_os_string();
    name.push(tail);
    name
}

/// Maps assets to destinations, owning the collision table for one run.
#[derive(Debug, Default)]
pub struct DestinationBuilder {
    layout: Layout,
    table: CollisionTable,
}

impl DestinationBuilder {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            table: CollisionTable::new(),
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn table(&self) -> &CollisionTable {
        &self.table
    }

    /// Forget every claim; call at the start of a run.
    pub fn reset(&self) {
        self.table.reset();
    }

    /// Compute and claim the destination for `asset` and its sidecars.
    pub fn build(&self, asset: &Asset, date: NaiveDate) -> Placement {
        self.build_with(asset, date, |_, _| true)
    }

    /// [`build`](Self::build) with an extra check against files already on disk.
    pub fn build_with<F>(&self, asset: &Asset, date: NaiveDate, is_free_on_disk: F) -> Placement
    where
        F: Fn(&Path, &Path) -> bool,
    {
        let dir = destination_dir(&asset.path, date, self.layout);
        let sidecars: Vec<(PathBuf, String)> = asset
            .sidecars
            .iter()
            .map(|sidecar| (sidecar.clone(), sidecar_suffix(&asset.path, sidecar)))
            .collect();
        self.table.claim(&asset.path, &dir, &sidecars, is_free_on_disk)
    }
}

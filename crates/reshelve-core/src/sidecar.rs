use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::media::{extension_of, ExtensionSets};

/// Finds the metadata files that travel with a primary asset.
///
/// For `IMG_01.jpg` the recognized companions are:
/// - `IMG_01.xmp` (stem plus sidecar extension)
/// - `IMG_01.jpg.xmp`, `IMG_01.jpg.json` (full name plus sidecar extension)
/// - `IMG_01.jpg.supplemental-metadata.json` and any other `IMG_01.jpg.*.json`
///
/// Disabled sidecars (e.g. `IMG_01.xmp.bak`) never match. Names are compared
/// as raw bytes, so non-UTF-8 names match exactly.
#[derive(Debug, Clone)]
pub struct SidecarLocator {
    sidecar: HashSet<String>,
    disabled: HashSet<String>,
}

impl SidecarLocator {
    pub fn new(extensions: &ExtensionSets) -> Self {
        Self {
            sidecar: extensions.sidecar.clone(),
            disabled: extensions.disabled_sidecar.clone(),
        }
    }

    /// Sidecars of `asset` among `siblings`, the file names of its directory.
    pub fn locate_among(&self, asset: &Path, siblings: &[OsString]) -> Vec<PathBuf> {
        let (name, stem) = match (asset.file_name(), asset.file_stem()) {
            (Some(name), Some(stem)) => (name, stem),
            _ => return Vec::new(),
        };
        let dir = asset.parent().unwrap_or_else(|| Path::new(""));

        let mut found: Vec<PathBuf> = siblings
            .iter()
            .filter(|candidate| candidate.as_os_str() != name)
            .filter(|candidate| self.is_sidecar_name(candidate))
            .filter(|candidate| belongs_to(candidate, name, stem))
            .map(|candidate| dir.join(candidate))
            .collect();
        found.sort();
        found
    }

    pub fn is_sidecar_name(&self, name: &OsStr) -> bool {
        match extension_of(Path::new(name)) {
            Some(ext) => self.sidecar.contains(&ext) && !self.disabled.contains(&ext),
            None => false,
        }
    }
}

fn belongs_to(candidate: &OsStr, asset_name: &OsStr, asset_stem: &OsStr) -> bool {
    let bytes = candidate.as_encoded_bytes();
    if let Some(rest) = bytes.strip_prefix(asset_name.as_encoded_bytes()) {
        if rest.first() == Some(&b'.') {
            return true;
        }
    }
    // stem + exactly one extension
    Path::new(candidate).file_stem() == Some(asset_stem)
}

/// The part of a sidecar's name that follows the asset's stem, e.g. `.jpg.xmp`.
///
/// Renaming `IMG_01.jpg` to `IMG_01_2.jpg` renames `IMG_01.jpg.xmp` to
/// `IMG_01_2` + this suffix.
pub fn sidecar_suffix(asset: &Path, sidecar: &Path) -> String {
    let stem = asset.file_stem().unwrap_or_default().as_encoded_bytes();
    let name = sidecar.file_name().unwrap_or_default();
    match name.as_encoded_bytes().strip_prefix(stem) {
        Some(rest) => String::from_utf8_lossy(rest).into_owned(),
        None => format!(".{}", name.to_string_lossy()),
    }
}

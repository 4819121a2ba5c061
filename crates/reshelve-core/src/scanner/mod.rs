mod walk;

pub use walk::{build_dir_to_files_map, compile_patterns};

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Error;
use crate::media::{ExtensionSets, FileClass};

/// Everything found under a source root, classified.
#[derive(Debug, Default)]
pub struct SourceScan {
    /// Primary media files, sorted by path.
    pub media: Vec<PathBuf>,
    /// Directory → sorted names of the regular files directly inside it.
    pub listings: HashMap<PathBuf, Vec<OsString>>,
    pub sidecar_files: usize,
    pub disabled_sidecars: usize,
    pub other_files: usize,
}

impl SourceScan {
    pub fn total_files(&self) -> usize {
        self.media.len() + self.sidecar_files + self.disabled_sidecars + self.other_files
    }

    /// Sibling file names of `path`, as seen by the scan.
    pub fn siblings_of(&self, path: &Path) -> &[OsString] {
        path.parent()
            .and_then(|dir| self.listings.get(dir))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Walk `root` and classify every file found.
pub fn scan_source(
    root: &Path,
    extensions: &ExtensionSets,
    ignore_patterns: &[String],
    skip_hidden: bool,
) -> Result<SourceScan, Error> {
    if !root.is_dir() {
        return Err(Error::MissingRoot(root.to_path_buf()));
    }

    let patterns = compile_patterns(ignore_patterns);
    let map = build_dir_to_files_map(root, &patterns, skip_hidden)?;

    let mut scan = SourceScan::default();
    for (dir, mut names) in map.into_iter() {
        names.sort();
        for name in &names {
            let path = dir.join(name);
            match extensions.classify(&path) {
                FileClass::Media(_) => scan.media.push(path),
                FileClass::Sidecar => scan.sidecar_files += 1,
                FileClass::DisabledSidecar => scan.disabled_sidecars += 1,
                FileClass::Other => scan.other_files += 1,
            }
        }
        scan.listings.insert(dir, names);
    }
    scan.media.sort();

    debug!(
        "Scanned {}: {} files, {} media, {} sidecars, {} disabled sidecars, {} other",
        root.display(),
        scan.total_files(),
        scan.media.len(),
        scan.sidecar_files,
        scan.disabled_sidecars,
        scan.other_files,
    );
    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use std::fs;

    #[test]
    fn test_scan_classifies_files() {
        let tmp = tempfile::tempdir().unwrap();
        let trip = tmp.path().join("trip");
        fs::create_dir_all(&trip).unwrap();
        for name in ["b.jpg", "a.mov", "a.mov.xmp", "b.xmp.bak", "notes.txt"] {
            fs::write(trip.join(name), name).unwrap();
        }

        let sets = ExtensionSets::from_config(&AppConfig::default());
        let scan = scan_source(tmp.path(), &sets, &[], true).unwrap();
        assert_eq!(scan.media, vec![trip.join("a.mov"), trip.join("b.jpg")]);
        assert_eq!(scan.sidecar_files, 1);
        assert_eq!(scan.disabled_sidecars, 1);
        assert_eq!(scan.other_files, 1);
        assert_eq!(scan.total_files(), 5);
        assert_eq!(scan.siblings_of(&trip.join("b.jpg")).len(), 5);
    }

    #[test]
    fn test_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let sets = ExtensionSets::default();
        let err = scan_source(&tmp.path().join("nope"), &sets, &[], true).unwrap_err();
        assert!(matches!(err, Error::MissingRoot(_)));
    }
}

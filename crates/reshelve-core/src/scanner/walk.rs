use dashmap::DashMap;
use glob::Pattern;
use rayon::prelude::*;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, trace};

/// Compile glob ignore patterns, logging and dropping invalid ones.
pub fn compile_patterns(globs: &[String]) -> Vec<Pattern> {
    globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect()
}

/// Parallel directory traversal. Builds a map of directory → regular file names
/// directly inside it (kept as raw `OsString`s), skipping ignored and (optionally) hidden entries.
/// Symlinks are never followed or recorded.
pub fn build_dir_to_files_map(
    root: &Path,
    ignore_patterns: &[Pattern],
    skip_hidden: bool,
) -> io::Result<DashMap<PathBuf, Vec<OsString>>> {
    let map: DashMap<PathBuf, Vec<OsString>> = DashMap::new();
    visit_dirs(root, &map, ignore_patterns, skip_hidden)?;
    Ok(map)
}

fn is_ignored(path: &Path, ignore_patterns: &[Pattern]) -> bool {
    ignore_patterns
        .iter()
        .any(|pattern| pattern.matches_path(path))
}

fn is_hidden(name: &OsStr) -> bool {
    name.as_encoded_bytes().first() == Some(&b'.')
}

fn visit_dirs(
    dir: &Path,
    map: &DashMap<PathBuf, Vec<OsString>>,
    ignore_patterns: &[Pattern],
    skip_hidden: bool,
) -> io::Result<()> {
    if is_ignored(dir, ignore_patterns) {
        return Ok(());
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() == io::ErrorKind::PermissionDenied {
                error!("Access denied reading directory {}: {}", dir.display(), err);
                return Ok(());
            } else {
                return Err(io::Error::new(
                    err.kind(),
                    format!("Error reading directory {}: {}", dir.display(), err),
                ));
            }
        }
    };

    entries.par_bridge().try_for_each(|entry_result| -> io::Result<()> {
        let entry = entry_result.map_err(|err| {
            io::Error::new(
                err.kind(),
                format!("Error reading entry in directory {}: {}", dir.display(), err),
            )
        })?;

        let name = entry.file_name();
        if skip_hidden && is_hidden(&name) {
            trace!("Skipping hidden {}", entry.path().display());
            return Ok(());
        }

        let path = entry.path();
        // DirEntry::file_type does not follow symlinks
        let file_type = entry.file_type().map_err(|err| {
            io::Error::new(
                err.kind(),
                format!("Error getting file type for {}: {}", path.display(), err),
            )
        })?;

        if file_type.is_dir() {
            visit_dirs(&path, map, ignore_patterns, skip_hidden)?;
        } else if file_type.is_file() && !is_ignored(&path, ignore_patterns) {
            map.entry(dir.to_path_buf()).or_default().push(name);
        }
        Ok(())
    })?;

    Ok(())
}

use filetime::{set_file_times, FileTime};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use tracing::{debug, trace};

use crate::config::TransferMode;
use crate::hasher;

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Placed,
    /// An identical file was already at the destination.
    AlreadyPresent,
}

/// Copy or move `source` to `destination`. Never overwrites: an existing
/// destination is accepted only if its content equals the source.
pub fn transfer(source: &Path, destination: &Path, mode: TransferMode) -> io::Result<Transfer> {
    if fs::symlink_metadata(destination).is_ok() {
        if !hasher::files_identical(source, destination)? {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists with different content", destination.display()),
            ));
        }
        if mode == TransferMode::Move {
            remove_duplicate_source(source, destination)?;
        }
        debug!("{} already present at {}", source.display(), destination.display());
        return Ok(Transfer::AlreadyPresent);
    }

    match mode {
        TransferMode::Copy => copy_file_with_metadata(source, destination)?,
        TransferMode::Move => move_file(source, destination)?,
    }
    Ok(Transfer::Placed)
}

/// Delete a moved file's source only once `destination` holds the same bytes.
fn remove_duplicate_source(source: &Path, destination: &Path) -> io::Result<()> {
    if !hasher::contents_equal(source, destination)? {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(
                "{} exists with different content (hash collision)",
                destination.display()
            ),
        ));
    }
    fs::remove_file(source)
}

fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) => {
            // Cross-device rename; fall back to copy then delete
            trace!("rename {} failed ({}), copying", source.display(), e);
            copy_file_with_metadata(source, destination)?;
            fs::remove_file(source)
        }
    }
}

/// Copy content, permissions and access/modification times. The destination
/// is created exclusively; a partial copy is removed on error.
pub fn copy_file_with_metadata(source: &Path, destination: &Path) -> io::Result<()> {
    let stat_src = fs::metadata(source)?;
    let mut reader = File::open(source)?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;

    let copied = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all());
    drop(writer);
    if let Err(e) = copied {
        let _ = fs::remove_file(destination);
        return Err(e);
    }

    fs::set_permissions(destination, stat_src.permissions())?;
    let file_time_access = FileTime::from_last_access_time(&stat_src);
    let file_time_modify = FileTime::from_last_modification_time(&stat_src);
    set_file_times(destination, file_time_access, file_time_modify)?;
    Ok(())
}

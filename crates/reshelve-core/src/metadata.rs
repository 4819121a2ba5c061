use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::config::MetadataSource;
use crate::error::Error;

/// Supplies an exact capture timestamp for a file, when one is recorded.
///
/// The returned string is raw tool output; parsing happens in
/// [`crate::date::parse_timestamp`]. An `Err` is never fatal for a run: the
/// asset degrades to its filename or modification date.
pub trait MetadataProvider: Send + Sync {
    fn capture_timestamp(&self, path: &Path) -> Result<Option<String>, Error>;
}

/// Provider that never knows anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataProvider for NoMetadata {
    fn capture_timestamp(&self, _path: &Path) -> Result<Option<String>, Error> {
        Ok(None)
    }
}

/// Reads `DateTimeOriginal`, `CreateDate` or `MediaCreateDate` through `exiftool`.
#[derive(Debug, Clone)]
pub struct ExifTool {
    binary: PathBuf,
}

const EXIFTOOL_TAGS: &[&str] = &["-DateTimeOriginal", "-CreateDate", "-MediaCreateDate"];

impl ExifTool {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("exiftool"),
        }
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Checks that the binary runs and returns its version string.
    pub fn version(&self) -> Result<String, Error> {
        let output = Command::new(&self.binary)
            .arg("-ver")
            .output()
            .map_err(|e| Error::Metadata(format!("{} not runnable: {}", self.binary.display(), e)))?;
        if !output.status.success() {
            return Err(Error::Metadata(format!(
                "{} -ver exited with {}",
                self.binary.display(),
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataProvider for ExifTool {
    fn capture_timestamp(&self, path: &Path) -> Result<Option<String>, Error> {
        let output = Command::new(&self.binary)
            .arg("-s3")
            .args(EXIFTOOL_TAGS)
            .arg(path)
            .output()
            .map_err(|e| Error::Metadata(format!("{}: {}", path.display(), e)))?;

        if !output.status.success() {
            return Err(Error::Metadata(format!(
                "exiftool failed on {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // -s3 prints one bare value per tag that is present, in argument order
        let stdout = String::from_utf8_lossy(&output.stdout);
        let value = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string);
        debug!("exiftool {} -> {:?}", path.display(), value);
        Ok(value)
    }
}

/// Build the provider selected in configuration. A missing `exiftool` degrades to
/// [`NoMetadata`] rather than aborting the run.
pub fn provider_for(source: MetadataSource) -> Box<dyn MetadataProvider> {
    match source {
        MetadataSource::None => Box::new(NoMetadata),
        MetadataSource::Exiftool => {
            let tool = ExifTool::new();
            match tool.version() {
                Ok(version) => {
                    info!("Using exiftool {}", version);
                    Box::new(tool)
                }
                Err(e) => {
                    warn!("{}; falling back to filename and modification dates", e);
                    Box::new(NoMetadata)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_metadata_knows_nothing() {
        let value = NoMetadata.capture_timestamp(Path::new("/photos/IMG_0001.jpg")).unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_missing_binary_is_a_metadata_error() {
        let tool = ExifTool::with_binary("/nonexistent/reshelve-exiftool");
        assert!(matches!(tool.version(), Err(Error::Metadata(_))));
        assert!(matches!(
            tool.capture_timestamp(Path::new("/photos/IMG_0001.jpg")),
            Err(Error::Metadata(_))
        ));
    }
}

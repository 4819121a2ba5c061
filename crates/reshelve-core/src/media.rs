use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::AppConfig;
use crate::date::{Confidence, ResolvedDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// How a file found in the source tree is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Media(MediaKind),
    Sidecar,
    /// A sidecar that was switched off by renaming (e.g. `.bak`); never moved.
    DisabledSidecar,
    Other,
}

/// Recognized extension sets, lower-case with a leading dot.
#[derive(Debug, Clone, Default)]
pub struct ExtensionSets {
    pub image: HashSet<String>,
    pub video: HashSet<String>,
    pub sidecar: HashSet<String>,
    pub disabled_sidecar: HashSet<String>,
}

impl ExtensionSets {
    pub fn from_config(config: &AppConfig) -> Self {
        let collect = |exts: &[String]| exts.iter().map(|e| e.to_lowercase()).collect();
        Self {
            image: collect(&config.image_extensions),
            video: collect(&config.video_extensions),
            sidecar: collect(&config.sidecar_extensions),
            disabled_sidecar: collect(&config.disabled_sidecar_extensions),
        }
    }

    pub fn classify(&self, path: &Path) -> FileClass {
        let ext = match extension_of(path) {
            Some(ext) => ext,
            None => return FileClass::Other,
        };

        if self.disabled_sidecar.contains(&ext) {
            FileClass::DisabledSidecar
        } else if self.image.contains(&ext) {
            FileClass::Media(MediaKind::Image)
        } else if self.video.contains(&ext) {
            FileClass::Media(MediaKind::Video)
        } else if self.sidecar.contains(&ext) {
            FileClass::Sidecar
        } else {
            FileClass::Other
        }
    }

    pub fn kind_of(&self, path: &Path) -> MediaKind {
        match self.classify(path) {
            FileClass::Media(kind) => kind,
            _ => MediaKind::Other,
        }
    }

    pub fn is_media(&self, path: &Path) -> bool {
        matches!(self.classify(path), FileClass::Media(_))
    }
}

/// Lower-case extension with a leading dot, e.g. `.jpg`.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

/// A primary media file together with everything the run knows about it.
#[derive(Debug, Clone, Serialize)]
pub struct Asset {
    pub path: PathBuf,
    pub extension: Option<String>,
    pub kind: MediaKind,
    pub size: u64,
    #[serde(skip)]
    pub modified: SystemTime,
    pub capture: Option<ResolvedDate>,
    pub sidecars: Vec<PathBuf>,
}

impl Asset {
    /// Builds an asset from the file's metadata; date and sidecars are filled in later.
    pub fn from_path(path: &Path, extensions: &ExtensionSets) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            extension: extension_of(path),
            kind: extensions.kind_of(path),
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
            capture: None,
            sidecars: Vec::new(),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn confidence(&self) -> Option<Confidence> {
        self.capture.as_ref().map(|c| c.confidence)
    }
}

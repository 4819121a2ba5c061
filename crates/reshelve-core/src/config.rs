use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::destination::Layout;
use crate::error::Error;

pub const DEFAULT_MAX_FILES_PER_FOLDER: usize = 50;
pub const DEFAULT_PROGRESS_INTERVAL: usize = 50;
pub const DEFAULT_MIN_YEAR: i32 = 1900;

/// Whether placement leaves the source file in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    #[default]
    Copy,
    Move,
}

impl TransferMode {
    pub fn verb(&self) -> &'static str {
        match self {
            TransferMode::Copy => "copy",
            TransferMode::Move => "move",
        }
    }
}

/// Where exact capture timestamps come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataSource {
    #[default]
    None,
    Exiftool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source_root: PathBuf,
    #[serde(default)]
    pub target_root: PathBuf,
    #[serde(default)]
    pub mode: TransferMode,
    /// Resolved once at load time; `0` in a config file means "auto".
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_max_files")]
    pub max_files_per_folder: usize,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
    #[serde(default = "default_sidecar_extensions")]
    pub sidecar_extensions: Vec<String>,
    #[serde(default = "default_disabled_sidecar_extensions")]
    pub disabled_sidecar_extensions: Vec<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub skip_hidden: bool,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
    #[serde(default = "default_min_year")]
    pub min_year: i32,
    #[serde(default)]
    pub metadata: MetadataSource,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::new(),
            target_root: PathBuf::new(),
            mode: TransferMode::default(),
            workers: default_worker_count(),
            dry_run: false,
            max_files_per_folder: default_max_files(),
            layout: Layout::default(),
            image_extensions: default_image_extensions(),
            video_extensions: default_video_extensions(),
            sidecar_extensions: default_sidecar_extensions(),
            disabled_sidecar_extensions: default_disabled_sidecar_extensions(),
            ignore_patterns: Vec::new(),
            skip_hidden: true,
            progress_interval: default_progress_interval(),
            min_year: default_min_year(),
            metadata: MetadataSource::default(),
        }
    }
}

impl AppConfig {
    /// Normalizes extension lists and resolves the worker count.
    pub fn resolved(mut self) -> Self {
        if self.workers == 0 {
            self.workers = default_worker_count();
        }
        if self.max_files_per_folder == 0 {
            self.max_files_per_folder = DEFAULT_MAX_FILES_PER_FOLDER;
        }
        if self.progress_interval == 0 {
            self.progress_interval = DEFAULT_PROGRESS_INTERVAL;
        }
        normalize_extensions(&mut self.image_extensions);
        normalize_extensions(&mut self.video_extensions);
        normalize_extensions(&mut self.sidecar_extensions);
        normalize_extensions(&mut self.disabled_sidecar_extensions);
        self
    }
}

/// Load `Config.toml` (optional) layered with `RESHELVE_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, Error> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("RESHELVE").try_parsing(true))
        .build()?;
    let config = builder.try_deserialize::<AppConfig>()?;
    Ok(config.resolved())
}

/// Number of available execution units, queried once per process start.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// True if either directory contains the other.
pub fn paths_overlap(a: &Path, b: &Path) -> bool {
    let a = absolutize(a);
    let b = absolutize(b);
    a.starts_with(&b) || b.starts_with(&a)
}

fn absolutize(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

fn normalize_extensions(exts: &mut Vec<String>) {
    for ext in exts.iter_mut() {
        let lower = ext.trim().to_lowercase();
        *ext = if lower.starts_with('.') {
            lower
        } else {
            format!(".{}", lower)
        };
    }
    exts.sort();
    exts.dedup();
}

fn default_true() -> bool {
    true
}

fn default_max_files() -> usize {
    DEFAULT_MAX_FILES_PER_FOLDER
}

fn default_progress_interval() -> usize {
    DEFAULT_PROGRESS_INTERVAL
}

fn default_min_year() -> i32 {
    DEFAULT_MIN_YEAR
}

fn to_strings(exts: &[&str]) -> Vec<String> {
    exts.iter().map(|s| s.to_string()).collect()
}

fn default_image_extensions() -> Vec<String> {
    to_strings(&[
        ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".tif", ".webp", ".heic", ".heif",
        ".raw", ".cr2", ".nef", ".arw", ".dng", ".orf", ".rw2", ".pef", ".srw", ".x3f",
    ])
}

fn default_video_extensions() -> Vec<String> {
    to_strings(&[
        ".mp4", ".mov", ".avi", ".mkv", ".wmv", ".flv", ".webm", ".m4v", ".3gp", ".mpg",
        ".mpeg", ".mts", ".m2ts", ".ts",
    ])
}

fn default_sidecar_extensions() -> Vec<String> {
    to_strings(&[".xmp", ".json", ".yml", ".yaml"])
}

fn default_disabled_sidecar_extensions() -> Vec<String> {
    to_strings(&[".bak"])
}

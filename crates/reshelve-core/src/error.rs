use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A parsed capture date fell outside the accepted range.
    #[error("Invalid capture date {date} (accepted range {min} to {max})")]
    InvalidDate {
        date: NaiveDate,
        min: NaiveDate,
        max: NaiveDate,
    },

    /// Files were left behind in a folder after it was split.
    #[error("{remaining} file(s) remain in {} after moving {files_moved}", folder.display())]
    CapacityImbalance {
        folder: PathBuf,
        remaining: usize,
        files_moved: usize,
    },

    #[error("Split target {} already exists", path.display())]
    SplitTargetExists { path: PathBuf },

    #[error("Cannot walk tree {}: {source}", root.display())]
    TreeWalk {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory does not exist: {}", .0.display())]
    MissingRoot(PathBuf),

    #[error("{} and {} overlap", source_root.display(), target_root.display())]
    Overlap {
        source_root: PathBuf,
        target_root: PathBuf,
    },

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Metadata provider error: {0}")]
    Metadata(String),
}

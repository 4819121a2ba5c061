use clap::{Parser, Subcommand, ValueEnum};
use reshelve_core::Layout;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "reshelve")]
#[command(about = "Reorganize a photo library into a date-based folder tree", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LayoutArg {
    /// <decade>+/<year>/<year>-<month>/<parent-folder>
    Full,
    /// year-month
    MonthOnly,
}

impl From<LayoutArg> for Layout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Full => Layout::Full,
            LayoutArg::MonthOnly => Layout::MonthOnly,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Plan and place every media file from the source into the target tree
    Organize {
        /// Source library root (overrides RESHELVE_SOURCE_ROOT)
        #[arg(long)]
        source: Option<PathBuf>,
        /// Target library root (overrides RESHELVE_TARGET_ROOT)
        #[arg(long)]
        target: Option<PathBuf>,
        /// Move files instead of copying them
        #[arg(long = "move")]
        move_files: bool,
        /// Worker threads; 0 uses every available core
        #[arg(long)]
        workers: Option<usize>,
        /// Report what would happen without touching the filesystem
        #[arg(long)]
        dry_run: bool,
        #[arg(long, value_enum)]
        layout: Option<LayoutArg>,
        /// Read capture timestamps with exiftool
        #[arg(long)]
        exiftool: bool,
        /// Write the computed plan as JSON to this file
        #[arg(long)]
        plan_out: Option<PathBuf>,
    },
    /// Split folders holding too many files into numbered siblings
    Rebalance {
        root: PathBuf,
        #[arg(long)]
        max_files: Option<usize>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Compare the directory structure of two trees
    Compare {
        source: PathBuf,
        target: PathBuf,
        /// Write the full report to this file
        #[arg(long)]
        report: Option<PathBuf>,
        /// Maximum entries printed per difference list
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Check an organized library's folder naming and capacity
    Verify {
        root: PathBuf,
        #[arg(long)]
        max_files: Option<usize>,
        #[arg(long, value_enum)]
        layout: Option<LayoutArg>,
    },
    /// Print configuration values
    PrintConfig,
}

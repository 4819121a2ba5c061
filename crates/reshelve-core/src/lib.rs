pub mod analysis;
pub mod capacity;
pub mod config;
pub mod date;
pub mod destination;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod media;
pub mod metadata;
pub mod plan;
pub mod progress;
pub mod scanner;
pub mod scheduler;
pub mod sidecar;

pub use capacity::{CapacityManager, FolderChunk, RebalanceStats};
pub use config::{AppConfig, MetadataSource, TransferMode};
pub use date::{Confidence, DateResolver, ResolvedDate};
pub use destination::{DestinationBuilder, DestinationPath, Layout};
pub use engine::{ReorganizeEngine, ReorganizeResult};
pub use error::Error;
pub use media::{Asset, MediaKind};
pub use plan::{PlacementTask, Plan, Planner, UnplannedAsset};
pub use progress::{ProgressReporter, SilentReporter};
pub use scheduler::{ExecuteOptions, Summary};

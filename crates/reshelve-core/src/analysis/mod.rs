pub mod compare;
pub mod verify;

pub use compare::{
    compare, Comparator, ComparisonEntry, EntryKind, Presence, RenderOptions, Report, TreeStats,
};
pub use verify::{count_files, verify_library, VerifyReport};

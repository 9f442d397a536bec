pub mod backfill;
pub mod fixups;
pub mod jsx;
pub mod lookup;
pub mod merge;
pub mod sources;

// Re-export main functions
pub use fixups::{FixupOptions, FixupReport, apply_fixups};
pub use merge::{
    MergeStrategy, MergeWithBaseResult, merge_coverage_maps, merge_maps_with_base,
    merge_with_base,
};
pub use sources::{FsSourceProvider, SourceProvider};

//! Reconciles JavaScript coverage from different instrumenters into one
//! istanbul-shaped map.
//!
//! Engine coverage is converted per script on a [`WorkerPool`], cleaned of
//! bundler artifacts by [`apply_fixups`] and combined with
//! [`merge_coverage_maps`].

pub mod cli;
pub mod convert;
pub mod coverage;
pub mod ranges;
pub mod resolve;
pub mod types;
pub mod utils;

pub use convert::{
    ConversionResult, ConversionTask, OffsetMapper, PoolConfig, WorkerPool, convert_entry,
    convert_scripts, default_pool, reset_default_pool,
};
pub use coverage::{
    FixupOptions, FixupReport, MergeStrategy, apply_fixups, merge_coverage_maps, merge_with_base,
};
pub use ranges::{RangeOptions, compute_code_ranges};
pub use types::*;

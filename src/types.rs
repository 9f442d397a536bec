// src/types.rs
pub mod errors;
pub mod models;
pub mod raw;

pub use errors::Error;
pub use models::{
    BranchKind, BranchMapping, CoverageMap, CoverageSummary, FileCoverage, FunctionMapping,
    Location, SourceRange, Totals,
};
pub use raw::{CodeRange, PositionMap, RawFunction, RawRange, RawScriptCoverage};

use crate::convert::syntax::{Dialect, parse_source};
use crate::types::errors::Error;
use crate::types::models::CoverageMap;
use crate::types::raw::{CodeRange, PositionMap, RawFunction};
use log::debug;
use std::time::{Duration, Instant};
use tree_sitter::{Node, Tree};

/// One script's worth of conversion work
#[derive(Debug, Clone, Default)]
pub struct ConversionTask {
    pub url: String,
    pub code: String,
    pub position_map: Option<PositionMap>,
    pub functions: Vec<RawFunction>,
    pub ranges: Vec<CodeRange>,
    /// Single-range form accepted from older callers; `ranges` wins when non-empty
    pub range: Option<CodeRange>,
}

impl ConversionTask {
    pub fn new(url: impl Into<String>, code: impl Into<String>, functions: Vec<RawFunction>) -> Self {
        Self {
            url: url.into(),
            code: code.into(),
            functions,
            ..Default::default()
        }
    }

    pub fn with_position_map(mut self, position_map: PositionMap) -> Self {
        self.position_map = Some(position_map);
        self
    }

    pub fn with_ranges(mut self, ranges: Vec<CodeRange>) -> Self {
        self.ranges = ranges;
        self
    }

    pub fn with_range(mut self, range: CodeRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Ranges that actually drive node skipping
    pub fn effective_ranges(&self) -> Vec<CodeRange> {
        if !self.ranges.is_empty() {
            self.ranges.clone()
        } else {
            self.range.into_iter().collect()
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub parse: Duration,
    pub convert: Duration,
    pub total: Duration,
}

impl Timings {
    fn new(parse: Duration, convert: Duration) -> Self {
        Self {
            parse,
            convert,
            total: parse + convert,
        }
    }
}

/// Outcome of one conversion. Failures are carried here rather than raised.
#[derive(Debug)]
pub struct ConversionResult {
    pub url: String,
    pub outcome: Result<CoverageMap, Error>,
    pub timings: Timings,
}

impl ConversionResult {
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn fragment(&self) -> Option<&CoverageMap> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().err()
    }

    pub fn into_fragment(self) -> Result<CoverageMap, Error> {
        self.outcome
    }
}

/// Decides which syntax nodes the mapper may skip along with their subtrees
#[derive(Debug, Clone, Default)]
pub struct SkipPredicate {
    ranges: Vec<CodeRange>,
}

impl SkipPredicate {
    pub fn new(ranges: Vec<CodeRange>) -> Self {
        Self { ranges }
    }

    pub fn is_filtering(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// A span is skipped when it overlaps none of the ranges
    pub fn should_skip(&self, start: usize, end: usize) -> bool {
        self.is_filtering() && !self.ranges.iter().any(|range| range.overlaps(start, end))
    }

    pub fn should_skip_node(&self, node: &Node) -> bool {
        self.should_skip(node.start_byte(), node.end_byte())
    }
}

/// Everything the offset-to-location mapper gets for one script
pub struct MapperInput<'a> {
    pub url: &'a str,
    pub code: &'a str,
    pub tree: &'a Tree,
    pub position_map: Option<&'a PositionMap>,
    pub functions: &'a [RawFunction],
    pub skip: &'a SkipPredicate,
}

/// Maps byte-offset hit counts through a parsed script into structured coverage
pub trait OffsetMapper: Send + Sync {
    fn map_coverage(&self, input: &MapperInput<'_>) -> Result<CoverageMap, Error>;
}

impl<F> OffsetMapper for F
where
    F: Fn(&MapperInput<'_>) -> Result<CoverageMap, Error> + Send + Sync,
{
    fn map_coverage(&self, input: &MapperInput<'_>) -> Result<CoverageMap, Error> {
        self(input)
    }
}

/// Parse one script, narrow it to its ranges, and run the mapper over it
pub fn convert_entry(task: &ConversionTask, mapper: &dyn OffsetMapper) -> ConversionResult {
    let parse_started = Instant::now();
    let parsed = parse_source(&task.code, Dialect::for_path(&task.url));
    let parse = parse_started.elapsed();

    let tree = match parsed {
        Ok(tree) => tree,
        Err(e) => {
            debug!("Parse failed for '{}': {}", task.url, e);
            return ConversionResult {
                url: task.url.clone(),
                outcome: Err(e),
                timings: Timings::new(parse, Duration::ZERO),
            };
        }
    };

    let skip = SkipPredicate::new(task.effective_ranges());
    let convert_started = Instant::now();
    let outcome = mapper.map_coverage(&MapperInput {
        url: &task.url,
        code: &task.code,
        tree: &tree,
        position_map: task.position_map.as_ref(),
        functions: &task.functions,
        skip: &skip,
    });
    let convert = convert_started.elapsed();

    if let Err(e) = &outcome {
        debug!("Mapper failed for '{}': {}", task.url, e);
    }

    ConversionResult {
        url: task.url.clone(),
        outcome,
        timings: Timings::new(parse, convert),
    }
}

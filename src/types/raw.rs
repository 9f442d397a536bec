use serde::{Deserialize, Serialize};

/// Engine coverage for one generated script, as reported by the runtime profiler
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawScriptCoverage {
    #[serde(default)]
    pub url: String,
    #[serde(default, alias = "source")]
    pub source_code: Option<String>,
    #[serde(default)]
    pub functions: Vec<RawFunction>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFunction {
    #[serde(default, alias = "functionName")]
    pub name: String,
    #[serde(default)]
    pub is_block_coverage: bool,
    #[serde(default)]
    pub ranges: Vec<RawRange>,
}

/// Byte offsets into the generated script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRange {
    pub start_offset: usize,
    pub end_offset: usize,
    #[serde(alias = "hitCount")]
    pub count: u64,
}

/// Half-open byte interval `[min_offset, max_offset)` of generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRange {
    pub min_offset: usize,
    pub max_offset: usize,
}

impl CodeRange {
    pub fn new(min_offset: usize, max_offset: usize) -> Self {
        Self {
            min_offset,
            max_offset,
        }
    }

    /// Whether the byte span `[start, end)` shares at least one byte with this range.
    /// Empty spans count when they sit inside the range.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        if start == end {
            return start >= self.min_offset && start < self.max_offset;
        }
        start < self.max_offset && end > self.min_offset
    }

    pub fn len(&self) -> usize {
        self.max_offset.saturating_sub(self.min_offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source map (v3) resolved for a generated script
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionMap {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub mappings: String,
    #[serde(default)]
    pub names: Vec<String>,
}

impl PositionMap {
    /// Original text embedded for `sources[index]`, if any
    pub fn source_content(&self, index: usize) -> Option<&str> {
        self.sources_content
            .as_ref()
            .and_then(|contents| contents.get(index))
            .and_then(|content| content.as_deref())
    }
}

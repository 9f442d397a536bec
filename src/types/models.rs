use crate::types::errors::Error;
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A line/column position in an original source file (1-based line, 0-based column)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, deserialize_with = "nullable_u32")]
    pub line: u32,
    #[serde(default, deserialize_with = "nullable_u32")]
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

// Instrumenters write `null` for open-ended columns
fn nullable_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(0))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    #[serde(default)]
    pub start: Location,
    #[serde(default)]
    pub end: Location,
}

impl SourceRange {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    /// Shorthand used heavily when building maps by hand
    pub fn span(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self::new(
            Location::new(start_line, start_col),
            Location::new(end_line, end_col),
        )
    }

    /// Zero-width range collapsed onto the very start of the file
    pub fn is_file_origin(&self) -> bool {
        self.start == Location::new(1, 0) && self.end == self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMapping {
    #[serde(default)]
    pub name: String,
    pub decl: SourceRange,
    pub loc: SourceRange,
    #[serde(default)]
    pub line: u32,
}

impl FunctionMapping {
    /// Instrumenters name unnamed functions `(anonymous_N)`
    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty() || self.name == "anonymous" || self.name.starts_with("(anonymous")
    }
}

/// Branch type tag as written by istanbul-style instrumenters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BranchKind {
    If,
    CondExpr,
    BinaryExpr,
    Switch,
    DefaultArg,
    Other(String),
}

impl From<String> for BranchKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "if" => BranchKind::If,
            "cond-expr" => BranchKind::CondExpr,
            "binary-expr" => BranchKind::BinaryExpr,
            "switch" => BranchKind::Switch,
            "default-arg" => BranchKind::DefaultArg,
            _ => BranchKind::Other(value),
        }
    }
}

impl From<BranchKind> for String {
    fn from(value: BranchKind) -> Self {
        value.to_string()
    }
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchKind::If => write!(f, "if"),
            BranchKind::CondExpr => write!(f, "cond-expr"),
            BranchKind::BinaryExpr => write!(f, "binary-expr"),
            BranchKind::Switch => write!(f, "switch"),
            BranchKind::DefaultArg => write!(f, "default-arg"),
            BranchKind::Other(kind) => write!(f, "{}", kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchMapping {
    pub loc: SourceRange,
    #[serde(rename = "type")]
    pub kind: BranchKind,
    #[serde(default)]
    pub locations: Vec<SourceRange>,
    #[serde(default)]
    pub line: u32,
}

/// Structured coverage for one original source file
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCoverage {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub statement_map: BTreeMap<u32, SourceRange>,
    #[serde(default)]
    pub fn_map: BTreeMap<u32, FunctionMapping>,
    #[serde(default)]
    pub branch_map: BTreeMap<u32, BranchMapping>,
    #[serde(default)]
    pub s: BTreeMap<u32, u64>,
    #[serde(default)]
    pub f: BTreeMap<u32, u64>,
    #[serde(default)]
    pub b: BTreeMap<u32, Vec<u64>>,
}

impl FileCoverage {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn add_statement(&mut self, range: SourceRange, hits: u64) -> u32 {
        let id = next_id(&self.statement_map);
        self.statement_map.insert(id, range);
        self.s.insert(id, hits);
        id
    }

    pub fn add_function(&mut self, mapping: FunctionMapping, hits: u64) -> u32 {
        let id = next_id(&self.fn_map);
        self.fn_map.insert(id, mapping);
        self.f.insert(id, hits);
        id
    }

    pub fn add_branch(&mut self, mapping: BranchMapping, hits: Vec<u64>) -> u32 {
        let id = next_id(&self.branch_map);
        self.branch_map.insert(id, mapping);
        self.b.insert(id, hits);
        id
    }

    pub fn remove_branch(&mut self, id: u32) {
        self.branch_map.remove(&id);
        self.b.remove(&id);
    }

    pub fn remove_function(&mut self, id: u32) {
        self.fn_map.remove(&id);
        self.f.remove(&id);
    }

    /// Check that every mapped id has a count entry of the right shape
    pub fn validate(&self) -> Result<(), Error> {
        for id in self.statement_map.keys() {
            if !self.s.contains_key(id) {
                return Err(Error::invalid(&self.path, format!("statement {id} has no count")));
            }
        }
        for id in self.fn_map.keys() {
            if !self.f.contains_key(id) {
                return Err(Error::invalid(&self.path, format!("function {id} has no count")));
            }
        }
        for (id, branch) in &self.branch_map {
            match self.b.get(id) {
                None => {
                    return Err(Error::invalid(&self.path, format!("branch {id} has no counts")));
                }
                Some(counts) if counts.len() != branch.locations.len() => {
                    return Err(Error::invalid(
                        &self.path,
                        format!(
                            "branch {id} has {} counts for {} locations",
                            counts.len(),
                            branch.locations.len()
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Number of structural records across all three maps
    pub fn total_items(&self) -> usize {
        self.statement_map.len() + self.fn_map.len() + self.branch_map.len()
    }

    pub fn has_statement_at(&self, line: u32, column: u32) -> bool {
        let target = Location::new(line, column);
        self.statement_map.values().any(|range| range.start == target)
    }

    pub fn has_statement_on_line(&self, line: u32) -> bool {
        self.statement_map.values().any(|range| range.start.line == line)
    }

    /// Whether anything in the file recorded a hit
    pub fn has_hits(&self) -> bool {
        self.s.values().any(|&hits| hits > 0)
            || self.f.values().any(|&hits| hits > 0)
            || self.b.values().flatten().any(|&hits| hits > 0)
    }

    pub fn summary(&self) -> CoverageSummary {
        let mut summary = CoverageSummary::default();
        summary.add_file(self);
        summary
    }
}

fn next_id<V>(map: &BTreeMap<u32, V>) -> u32 {
    map.keys().next_back().map_or(0, |last| last + 1)
}

/// Structured coverage for a set of files, keyed by file path
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageMap {
    files: BTreeMap<String, FileCoverage>,
}

impl CoverageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an istanbul-shaped JSON document, dropping files that fail validation
    pub fn from_json_str(content: &str) -> Result<Self, Error> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, Error> {
        let serde_json::Value::Object(entries) = value else {
            return Err(Error::invalid("<root>", "coverage document is not an object"));
        };

        let mut map = CoverageMap::new();
        for (path, entry) in entries {
            let mut file: FileCoverage = match serde_json::from_value(entry) {
                Ok(file) => file,
                Err(e) => {
                    warn!("Skipping malformed coverage for '{}': {}", path, e);
                    continue;
                }
            };
            if file.path.is_empty() {
                file.path = path.clone();
            }
            if let Err(e) = file.validate() {
                warn!("Skipping {}", e);
                continue;
            }
            map.insert(path, file);
        }
        Ok(map)
    }

    pub fn to_json_pretty(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn insert(&mut self, path: impl Into<String>, file: FileCoverage) {
        self.files.insert(path.into(), file);
    }

    pub fn get(&self, path: &str) -> Option<&FileCoverage> {
        self.files.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut FileCoverage> {
        self.files.get_mut(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<FileCoverage> {
        self.files.remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.files.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileCoverage)> {
        self.files.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut FileCoverage)> {
        self.files.iter_mut()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &FileCoverage) -> bool) {
        self.files.retain(|path, file| keep(path, file));
    }

    pub fn summary(&self) -> CoverageSummary {
        let mut summary = CoverageSummary::default();
        for file in self.files.values() {
            summary.add_file(file);
        }
        summary
    }
}

impl FromIterator<(String, FileCoverage)> for CoverageMap {
    fn from_iter<T: IntoIterator<Item = (String, FileCoverage)>>(iter: T) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for CoverageMap {
    type Item = (String, FileCoverage);
    type IntoIter = std::collections::btree_map::IntoIter<String, FileCoverage>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub covered: usize,
    pub total: usize,
}

impl Totals {
    fn record(&mut self, hits: u64) {
        self.total += 1;
        if hits > 0 {
            self.covered += 1;
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.covered as f64 / self.total as f64) * 100.0
        }
    }
}

/// Covered/total counts per record type
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoverageSummary {
    pub files: usize,
    pub statements: Totals,
    pub functions: Totals,
    pub branches: Totals,
}

impl CoverageSummary {
    fn add_file(&mut self, file: &FileCoverage) {
        self.files += 1;
        for id in file.statement_map.keys() {
            self.statements.record(file.s.get(id).copied().unwrap_or(0));
        }
        for id in file.fn_map.keys() {
            self.functions.record(file.f.get(id).copied().unwrap_or(0));
        }
        for id in file.branch_map.keys() {
            for &hits in file.b.get(id).map(Vec::as_slice).unwrap_or_default() {
                self.branches.record(hits);
            }
        }
    }
}

impl fmt::Display for CoverageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Files:      {}", self.files)?;
        writeln!(
            f,
            "Statements: {}/{} ({:.1}%)",
            self.statements.covered,
            self.statements.total,
            self.statements.percent()
        )?;
        writeln!(
            f,
            "Functions:  {}/{} ({:.1}%)",
            self.functions.covered,
            self.functions.total,
            self.functions.percent()
        )?;
        write!(
            f,
            "Branches:   {}/{} ({:.1}%)",
            self.branches.covered,
            self.branches.total,
            self.branches.percent()
        )
    }
}

use crate::types::models::{BranchKind, FileCoverage, Location};
use std::collections::HashMap;

/// `(line, column)` of a record's start
pub type LocationKey = (u32, u32);

pub fn location_key(location: &Location) -> LocationKey {
    (location.line, location.column)
}

/// Record indexes by exact start and by line
#[derive(Debug, Default)]
struct Positions {
    exact: HashMap<LocationKey, Vec<usize>>,
    lines: HashMap<u32, Vec<usize>>,
    records: usize,
}

impl Positions {
    fn push(&mut self, start: &Location) {
        let record = self.records;
        self.exact.entry(location_key(start)).or_default().push(record);
        self.lines.entry(start.line).or_default().push(record);
        self.records += 1;
    }

    /// Resolve every query to a record: exact starts first, then the line.
    ///
    /// `pick` chooses among the open candidates for one query. With
    /// `exclusive`, a record answers at most one query, and every exact match
    /// is settled before any line fallback is tried.
    fn resolve(
        &self,
        starts: &[&Location],
        exclusive: bool,
        pick: impl Fn(usize, &[usize]) -> Option<usize>,
    ) -> Vec<Option<usize>> {
        let mut claimed = vec![false; self.records];
        let mut found = vec![None; starts.len()];

        for by_line in [false, true] {
            for (query, start) in starts.iter().enumerate() {
                if found[query].is_some() {
                    continue;
                }
                let candidates = if by_line {
                    self.lines.get(&start.line)
                } else {
                    self.exact.get(&location_key(start))
                };
                let Some(candidates) = candidates else {
                    continue;
                };
                let open: Vec<usize> = candidates
                    .iter()
                    .copied()
                    .filter(|record| !claimed[*record])
                    .collect();
                if let Some(record) = pick(query, &open) {
                    if exclusive {
                        claimed[record] = true;
                    }
                    found[query] = Some(record);
                }
            }
        }

        found
    }
}

/// Hit counts of one record type, findable by exact start or by line alone
#[derive(Debug, Default)]
pub struct HitIndex {
    positions: Positions,
    hits: Vec<u64>,
}

impl HitIndex {
    fn from_records<'a>(records: impl Iterator<Item = (&'a Location, u64)>) -> Self {
        let mut index = HitIndex::default();
        for (start, hits) in records {
            index.positions.push(start);
            index.hits.push(hits);
        }
        index
    }

    pub fn statements(file: &FileCoverage) -> Self {
        Self::from_records(file.statement_map.iter().map(|(id, range)| {
            (&range.start, file.s.get(id).copied().unwrap_or(0))
        }))
    }

    /// Functions are keyed by their declaration start
    pub fn functions(file: &FileCoverage) -> Self {
        Self::from_records(file.fn_map.iter().map(|(id, function)| {
            (&function.decl.start, file.f.get(id).copied().unwrap_or(0))
        }))
    }

    /// Exact match first, then the highest count on the same line
    pub fn lookup(&self, start: &Location) -> Option<u64> {
        self.match_all(&[start], false).into_iter().next().flatten()
    }

    /// Counts for each start, preferring the highest candidate.
    ///
    /// With `exclusive` each indexed record is handed out once, so summing
    /// the results never counts one record twice.
    pub fn match_all(&self, starts: &[&Location], exclusive: bool) -> Vec<Option<u64>> {
        self.positions
            .resolve(starts, exclusive, |_, open| {
                open.iter().copied().max_by_key(|record| self.hits[*record])
            })
            .into_iter()
            .map(|record| record.map(|record| self.hits[record]))
            .collect()
    }
}

/// What a branch lookup is looking for
#[derive(Debug, Clone, Copy)]
pub struct BranchQuery<'a> {
    pub start: &'a Location,
    pub kind: &'a BranchKind,
    pub arity: usize,
}

/// Branch count arrays, findable by exact start or by line alone
#[derive(Debug, Default)]
pub struct BranchIndex {
    positions: Positions,
    records: Vec<(BranchKind, Vec<u64>)>,
}

impl BranchIndex {
    pub fn branches(file: &FileCoverage) -> Self {
        let mut index = BranchIndex::default();
        for (id, branch) in &file.branch_map {
            let counts = file.b.get(id).cloned().unwrap_or_default();
            index.positions.push(&branch.loc.start);
            index.records.push((branch.kind.clone(), counts));
        }
        index
    }

    pub fn lookup(&self, query: BranchQuery<'_>) -> Option<&[u64]> {
        self.match_all(&[query], false).into_iter().next().flatten()
    }

    /// Count arrays for each query, exact start before line.
    ///
    /// Among candidates the same kind and arity wins, then the same arity,
    /// then the first indexed.
    pub fn match_all(&self, queries: &[BranchQuery<'_>], exclusive: bool) -> Vec<Option<&[u64]>> {
        let starts: Vec<&Location> = queries.iter().map(|query| query.start).collect();
        self.positions
            .resolve(&starts, exclusive, |query, open| {
                let BranchQuery { kind, arity, .. } = queries[query];
                let same_arity = |record: &usize| self.records[*record].1.len() == arity;
                open.iter()
                    .copied()
                    .find(|record| same_arity(record) && self.records[*record].0 == *kind)
                    .or_else(|| open.iter().copied().find(same_arity))
                    .or_else(|| open.first().copied())
            })
            .into_iter()
            .map(|record| record.map(|record| self.records[record].1.as_slice()))
            .collect()
    }
}

/// Combine `other` into `counts` element-wise without changing its length
pub fn combine_counts(counts: &mut [u64], other: &[u64], combine: fn(u64, u64) -> u64) {
    for (index, count) in counts.iter_mut().enumerate() {
        *count = combine(*count, other.get(index).copied().unwrap_or(0));
    }
}

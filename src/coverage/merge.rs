//! Combining coverage maps produced by different instrumenters.
//!
//! Sources disagree about structure: column conventions differ, and one
//! source may track statements, branches or functions another one does not.
//! Records are matched on their exact `(line, column)` start and, failing
//! that, on the line alone. Counts are only ever carried over onto records
//! of the chosen skeleton; nothing is invented.

use crate::coverage::lookup::{BranchIndex, BranchQuery, HitIndex, combine_counts};
use crate::types::errors::Error;
use crate::types::models::{CoverageMap, FileCoverage, Location};
use crate::utils::paths::normalize_map_keys;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MergeStrategy {
    /// Per record type keep the richest structure and the highest count
    #[default]
    Max,
    /// Sum counts of matching records; only sound for disjoint runs
    Add,
    /// Keep the first source's structure and raise its counts from the others
    PreferFirst,
    /// Keep the last source's structure and raise its counts from the others
    PreferLast,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStrategy::Max => write!(f, "max"),
            MergeStrategy::Add => write!(f, "add"),
            MergeStrategy::PreferFirst => write!(f, "prefer-first"),
            MergeStrategy::PreferLast => write!(f, "prefer-last"),
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max" => Ok(MergeStrategy::Max),
            "add" => Ok(MergeStrategy::Add),
            "prefer-first" => Ok(MergeStrategy::PreferFirst),
            "prefer-last" => Ok(MergeStrategy::PreferLast),
            other => Err(format!("unknown merge strategy '{other}'")),
        }
    }
}

impl MergeStrategy {
    fn combine(self) -> fn(u64, u64) -> u64 {
        match self {
            MergeStrategy::Add => u64::saturating_add,
            MergeStrategy::Max | MergeStrategy::PreferFirst | MergeStrategy::PreferLast => u64::max,
        }
    }
}

/// Which source supplies the structure of each record type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Skeletons {
    statements: usize,
    functions: usize,
    branches: usize,
}

impl Skeletons {
    fn uniform(index: usize) -> Self {
        Self {
            statements: index,
            functions: index,
            branches: index,
        }
    }
}

/// Merge any number of maps into one. The inputs are left untouched.
pub fn merge_coverage_maps(maps: &[CoverageMap], strategy: MergeStrategy) -> CoverageMap {
    match maps {
        [] => return CoverageMap::new(),
        [only] => return only.clone(),
        _ => {}
    }

    let paths: BTreeSet<&String> = maps.iter().flat_map(CoverageMap::paths).collect();

    let merged: Vec<(String, FileCoverage)> = paths
        .into_par_iter()
        .filter_map(|path| {
            let sources: Vec<&FileCoverage> = maps.iter().filter_map(|map| map.get(path)).collect();
            merge_file(path, &sources, strategy).map(|file| (path.clone(), file))
        })
        .collect();

    merged.into_iter().collect()
}

/// Merge every source's view of one file
pub(crate) fn merge_file(path: &str, sources: &[&FileCoverage], strategy: MergeStrategy) -> Option<FileCoverage> {
    let valid: Vec<&FileCoverage> = sources
        .iter()
        .copied()
        .filter(|file| match file.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!("Ignoring one source during merge: {}", e);
                false
            }
        })
        .collect();

    match valid.as_slice() {
        [] => {
            warn!("No usable coverage for '{}', keeping it as first seen", path);
            sources.first().map(|file| (*file).clone())
        }
        [only] => Some((*only).clone()),
        _ => {
            let skeletons = match strategy {
                MergeStrategy::Max | MergeStrategy::Add => Skeletons {
                    statements: richest(&valid, |file| file.statement_map.len()),
                    functions: richest(&valid, |file| file.fn_map.len()),
                    branches: richest(&valid, |file| file.branch_map.len()),
                },
                MergeStrategy::PreferFirst => Skeletons::uniform(0),
                MergeStrategy::PreferLast => Skeletons::uniform(valid.len() - 1),
            };
            Some(reconcile(path, &valid, skeletons, strategy))
        }
    }
}

/// Index of the source with the most items; ties go to the later source
fn richest(sources: &[&FileCoverage], count: impl Fn(&FileCoverage) -> usize) -> usize {
    let mut best = 0;
    for (index, file) in sources.iter().enumerate() {
        if count(*file) >= count(sources[best]) {
            best = index;
        }
    }
    best
}

/// Pick the source whose structure is most trustworthy for a two-way merge.
///
/// Empty sources never win. Sources without a `(1, 0)` statement (a module
/// directive one instrumenter records and the other does not) beat those with
/// one, and among them the latest wins. If all carry the directive, the
/// smallest structure wins.
pub fn select_skeleton(sources: &[&FileCoverage]) -> usize {
    let candidates: Vec<usize> = (0..sources.len())
        .filter(|&index| sources[index].total_items() > 0)
        .collect();

    match candidates.as_slice() {
        [] => sources.len().saturating_sub(1),
        [only] => *only,
        _ => {
            let directive_free = candidates
                .iter()
                .copied()
                .filter(|&index| !sources[index].has_statement_at(1, 0))
                .last();
            directive_free.unwrap_or_else(|| {
                candidates
                    .iter()
                    .copied()
                    .rev()
                    .min_by_key(|&index| sources[index].total_items())
                    .unwrap_or(candidates[0])
            })
        }
    }
}

fn reconcile(
    path: &str,
    sources: &[&FileCoverage],
    skeletons: Skeletons,
    strategy: MergeStrategy,
) -> FileCoverage {
    let combine = strategy.combine();
    // summed counts must not reuse one source record for several skeleton records
    let exclusive = strategy == MergeStrategy::Add;

    debug!(
        "Merging '{}' from {} sources (skeletons: statements {}, functions {}, branches {})",
        path,
        sources.len(),
        skeletons.statements,
        skeletons.functions,
        skeletons.branches
    );

    let mut merged = FileCoverage::new(path);

    let statement_source = sources[skeletons.statements];
    merged.statement_map = statement_source.statement_map.clone();
    merged.s = statement_source.s.clone();
    let (statement_ids, starts): (Vec<u32>, Vec<&Location>) = statement_source
        .statement_map
        .iter()
        .map(|(id, range)| (*id, &range.start))
        .unzip();
    for other in others(sources, skeletons.statements) {
        let index = HitIndex::statements(other);
        for (id, hits) in statement_ids.iter().zip(index.match_all(&starts, exclusive)) {
            if let (Some(hits), Some(count)) = (hits, merged.s.get_mut(id)) {
                *count = combine(*count, hits);
            }
        }
    }

    let function_source = sources[skeletons.functions];
    merged.fn_map = function_source.fn_map.clone();
    merged.f = function_source.f.clone();
    let (function_ids, declarations): (Vec<u32>, Vec<&Location>) = function_source
        .fn_map
        .iter()
        .map(|(id, function)| (*id, &function.decl.start))
        .unzip();
    for other in others(sources, skeletons.functions) {
        let index = HitIndex::functions(other);
        for (id, hits) in function_ids.iter().zip(index.match_all(&declarations, exclusive)) {
            if let (Some(hits), Some(count)) = (hits, merged.f.get_mut(id)) {
                *count = combine(*count, hits);
            }
        }
    }

    let branch_source = sources[skeletons.branches];
    merged.branch_map = branch_source.branch_map.clone();
    merged.b = branch_source.b.clone();
    let (branch_ids, queries): (Vec<u32>, Vec<BranchQuery<'_>>) = branch_source
        .branch_map
        .iter()
        .map(|(id, branch)| {
            let query = BranchQuery {
                start: &branch.loc.start,
                kind: &branch.kind,
                arity: branch_source.b.get(id).map_or(0, Vec::len),
            };
            (*id, query)
        })
        .unzip();
    for other in others(sources, skeletons.branches) {
        let index = BranchIndex::branches(other);
        for (id, found) in branch_ids.iter().zip(index.match_all(&queries, exclusive)) {
            if let (Some(found), Some(counts)) = (found, merged.b.get_mut(id)) {
                combine_counts(counts, found, combine);
            }
        }
    }

    normalize_directive(&mut merged, sources, skeletons.statements);
    merged
}

fn others<'a>(
    sources: &'a [&'a FileCoverage],
    skeleton: usize,
) -> impl Iterator<Item = &'a FileCoverage> + 'a {
    sources
        .iter()
        .enumerate()
        .filter(move |(index, _)| *index != skeleton)
        .map(|(_, file)| *file)
}

/// Treat a `(1, 0)` statement as a module directive when another source has
/// nothing on line 1, and count it as run once if anything else in the file ran.
fn normalize_directive(merged: &mut FileCoverage, sources: &[&FileCoverage], skeleton: usize) {
    let directive = Location::new(1, 0);
    let Some(directive_id) = merged
        .statement_map
        .iter()
        .find(|(_, range)| range.start == directive)
        .map(|(id, _)| *id)
    else {
        return;
    };

    let others_lack_line_one = sources
        .iter()
        .enumerate()
        .any(|(index, file)| index != skeleton && !file.has_statement_on_line(1));
    if !others_lack_line_one {
        return;
    }

    let executed_elsewhere = merged
        .s
        .iter()
        .any(|(id, &hits)| *id != directive_id && hits > 0)
        || merged.f.values().any(|&hits| hits > 0);

    if executed_elsewhere {
        if let Some(count) = merged.s.get_mut(&directive_id) {
            if *count == 0 {
                debug!("Counting directive statement in '{}' as executed", merged.path);
                *count = 1;
            }
        }
    }
}

/// Outcome of merging fresh coverage onto a base coverage file
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeWithBaseResult {
    #[serde(skip)]
    pub coverage: CoverageMap,
    /// Files present in the base
    pub base_files: usize,
    /// Files present in the additional coverage
    pub additional_files: usize,
    /// Files only the base knows about, passed through unchanged
    pub base_only_files: usize,
    /// Files present in both and reconciled
    pub merged_files: usize,
    /// Files only the additional coverage knows about
    pub new_files: usize,
}

/// Merge `additional` onto the coverage stored at `base_path`.
///
/// A missing or unreadable base file is a cold start, not an error. Keys on
/// both sides are normalised before files are paired up.
pub fn merge_with_base(base_path: &Path, additional: &CoverageMap) -> MergeWithBaseResult {
    let base = match load_base(base_path) {
        Ok(base) => base,
        Err(e) => {
            info!(
                "No usable base coverage at '{}' ({}), using new coverage alone",
                base_path.display(),
                e
            );
            CoverageMap::new()
        }
    };
    merge_maps_with_base(&normalize_map_keys(base), &normalize_map_keys(additional.clone()))
}

fn load_base(base_path: &Path) -> Result<CoverageMap, Error> {
    let content = std::fs::read_to_string(base_path)?;
    CoverageMap::from_json_str(&content)
}

pub fn merge_maps_with_base(base: &CoverageMap, additional: &CoverageMap) -> MergeWithBaseResult {
    let mut result = MergeWithBaseResult {
        base_files: base.len(),
        additional_files: additional.len(),
        ..Default::default()
    };

    let mut coverage = CoverageMap::new();
    for (path, file) in base.iter() {
        if !additional.contains(path) {
            result.base_only_files += 1;
            coverage.insert(path.clone(), file.clone());
        }
    }

    for (path, file) in additional.iter() {
        match base.get(path) {
            None => {
                result.new_files += 1;
                coverage.insert(path.clone(), file.clone());
            }
            Some(base_file) => {
                let sources = [base_file, file];
                let valid = sources.iter().all(|source| source.validate().is_ok());
                let merged = if valid {
                    let skeleton = select_skeleton(&sources);
                    reconcile(path, &sources, Skeletons::uniform(skeleton), MergeStrategy::Max)
                } else {
                    warn!("Keeping new coverage for '{}', base entry is inconsistent", path);
                    file.clone()
                };
                result.merged_files += 1;
                coverage.insert(path.clone(), merged);
            }
        }
    }

    info!(
        "Merged with base: {} base-only, {} merged, {} new",
        result.base_only_files, result.merged_files, result.new_files
    );
    result.coverage = coverage;
    result
}

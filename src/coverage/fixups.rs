//! Passes that strip bundler and transpiler artifacts from assembled coverage.
//!
//! Passes run per file in a fixed order. The source-text passes and backfill
//! need the original file and do nothing without it.

use crate::coverage::backfill::{LOGICAL_OPERATORS, backfill_structure, needs_backfill};
use crate::coverage::jsx::{SourceLines, is_markup_callback};
use crate::coverage::sources::SourceProvider;
use crate::types::errors::Error;
use crate::types::models::{BranchKind, CoverageMap, FileCoverage, Location};
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FixupOptions {
    /// Rebuild structure for files that have hits but no statements
    pub backfill_structure: bool,
}

impl FixupOptions {
    pub fn with_backfill(mut self, enabled: bool) -> Self {
        self.backfill_structure = enabled;
        self
    }
}

/// How many records each pass touched
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FixupReport {
    pub phantom_branches: usize,
    pub reconciled_statements: usize,
    pub duplicate_functions: usize,
    pub markup_callbacks: usize,
    pub spurious_branches: usize,
    pub backfilled_records: usize,
    pub failed_files: usize,
}

impl FixupReport {
    fn absorb(&mut self, other: FixupReport) {
        self.phantom_branches += other.phantom_branches;
        self.reconciled_statements += other.reconciled_statements;
        self.duplicate_functions += other.duplicate_functions;
        self.markup_callbacks += other.markup_callbacks;
        self.spurious_branches += other.spurious_branches;
        self.backfilled_records += other.backfilled_records;
        self.failed_files += other.failed_files;
    }

    pub fn total_changes(&self) -> usize {
        self.phantom_branches
            + self.reconciled_statements
            + self.duplicate_functions
            + self.markup_callbacks
            + self.spurious_branches
            + self.backfilled_records
    }
}

/// Run every pass over every file. A file whose passes fail keeps its prior state.
pub fn apply_fixups(
    map: &mut CoverageMap,
    sources: &dyn SourceProvider,
    options: &FixupOptions,
) -> FixupReport {
    let mut report = FixupReport::default();

    for (path, file) in map.iter_mut() {
        let snapshot = file.clone();
        match fix_file(path, file, sources, options) {
            Ok(file_report) => {
                if file_report.total_changes() > 0 {
                    debug!("Fixups for '{}': {:?}", path, file_report);
                }
                report.absorb(file_report);
            }
            Err(e) => {
                warn!("Fixups skipped for '{}': {}", path, e);
                *file = snapshot;
                report.failed_files += 1;
            }
        }
    }

    report
}

fn fix_file(
    path: &str,
    file: &mut FileCoverage,
    sources: &dyn SourceProvider,
    options: &FixupOptions,
) -> Result<FixupReport, Error> {
    let mut report = FixupReport {
        phantom_branches: remove_phantom_branches(file),
        reconciled_statements: reconcile_declaration_statements(file),
        duplicate_functions: remove_duplicate_functions(file),
        ..Default::default()
    };

    let source = sources.source(path);
    if let Some(text) = source.as_deref() {
        let lines = SourceLines::new(text);
        report.markup_callbacks = remove_markup_callbacks(file, &lines);
        report.spurious_branches = remove_spurious_branches(file, &lines);
    }

    if options.backfill_structure && needs_backfill(file) {
        match source.as_deref() {
            Some(text) => report.backfilled_records = backfill_structure(file, text)?,
            None => debug!("Cannot backfill '{}' without its source", path),
        }
    }

    file.validate()?;
    Ok(report)
}

/// Drop `if` branches collapsed onto the file origin. Async module wrappers
/// emit one whose mapped position lands on `(1, 0)` with zero width.
pub fn remove_phantom_branches(file: &mut FileCoverage) -> usize {
    let phantoms: Vec<u32> = file
        .branch_map
        .iter()
        .filter(|(_, branch)| branch.kind == BranchKind::If && branch.loc.is_file_origin())
        .map(|(id, _)| *id)
        .collect();

    for id in &phantoms {
        file.remove_branch(*id);
    }
    phantoms.len()
}

/// A statement sitting exactly on an executed function's declaration ran too
pub fn reconcile_declaration_statements(file: &mut FileCoverage) -> usize {
    let mut reconciled = 0;

    for (fn_id, function) in &file.fn_map {
        let hits = file.f.get(fn_id).copied().unwrap_or(0);
        if hits == 0 {
            continue;
        }
        for (id, range) in &file.statement_map {
            if *range != function.decl {
                continue;
            }
            if let Some(count) = file.s.get_mut(id) {
                if *count == 0 {
                    *count = hits;
                    reconciled += 1;
                }
            }
        }
    }

    reconciled
}

/// Keep one function per declaration start.
///
/// Bundled arrow exports yield an export-binding record next to the real one.
/// The higher count wins; on a tie the record whose body starts on a
/// different line than its declaration is the real function.
pub fn remove_duplicate_functions(file: &mut FileCoverage) -> usize {
    let mut by_declaration: BTreeMap<Location, Vec<u32>> = BTreeMap::new();
    for (id, function) in &file.fn_map {
        by_declaration.entry(function.decl.start).or_default().push(*id);
    }

    let mut losers = Vec::new();
    for ids in by_declaration.values().filter(|ids| ids.len() > 1) {
        let rank = |id: &u32| {
            let function = &file.fn_map[id];
            let hits = file.f.get(id).copied().unwrap_or(0);
            let separate_body = function.loc.start.line != function.decl.start.line;
            (hits, separate_body)
        };
        // max_by_key keeps the last maximum, so walk ids in reverse to favour the lowest id
        let Some(winner) = ids.iter().rev().max_by_key(|id| rank(*id)) else {
            continue;
        };
        losers.extend(ids.iter().filter(|id| *id != winner).copied());
    }

    for id in &losers {
        file.remove_function(*id);
    }
    losers.len()
}

/// Remove anonymous array-method callbacks that only render markup
pub fn remove_markup_callbacks(file: &mut FileCoverage, lines: &SourceLines<'_>) -> usize {
    let callbacks: Vec<u32> = file
        .fn_map
        .iter()
        .filter(|(_, function)| is_markup_callback(function, lines))
        .map(|(id, _)| *id)
        .collect();

    for id in &callbacks {
        file.remove_function(*id);
    }
    callbacks.len()
}

/// Drop logical-expression branches whose source has no logical operator
pub fn remove_spurious_branches(file: &mut FileCoverage, lines: &SourceLines<'_>) -> usize {
    let spurious: Vec<u32> = file
        .branch_map
        .iter()
        .filter(|(_, branch)| branch.kind == BranchKind::BinaryExpr)
        .filter(|(_, branch)| {
            let mut span = lines.lines(branch.loc.start.line, branch.loc.end.line).peekable();
            // Keep records pointing outside the file; there is nothing to check them against
            span.peek().is_some()
                && !span.any(|text| LOGICAL_OPERATORS.iter().any(|op| text.contains(op)))
        })
        .map(|(id, _)| *id)
        .collect();

    for id in &spurious {
        file.remove_branch(*id);
    }
    spurious.len()
}

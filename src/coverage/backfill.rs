//! Rebuilding statement and branch structure from a fresh parse.
//!
//! Only used for files whose statement map came back empty even though the
//! file recorded hits. Counts are derived from the enclosing function, so the
//! result is an estimate.

use crate::convert::syntax::{Dialect, fields, node_text, nodes, parse_source, visit_nodes};
use crate::types::errors::Error;
use crate::types::models::{BranchKind, BranchMapping, FileCoverage, Location, SourceRange};
use tree_sitter::Node;

const STATEMENT_KINDS: &[&str] = &[
    nodes::EXPRESSION_STATEMENT,
    nodes::RETURN_STATEMENT,
    nodes::VARIABLE_DECLARATION,
    nodes::LEXICAL_DECLARATION,
    nodes::IF_STATEMENT,
    nodes::WHILE_STATEMENT,
    nodes::FOR_STATEMENT,
    nodes::FOR_IN_STATEMENT,
    nodes::DO_STATEMENT,
    nodes::THROW_STATEMENT,
    nodes::SWITCH_STATEMENT,
];

pub(crate) const LOGICAL_OPERATORS: &[&str] = &["&&", "||", "??"];

pub fn needs_backfill(file: &FileCoverage) -> bool {
    file.statement_map.is_empty() && file.has_hits()
}

/// Regenerate statements (and branches, when none exist) for `file` from `source`.
///
/// Returns the number of records added.
pub fn backfill_structure(file: &mut FileCoverage, source: &str) -> Result<usize, Error> {
    let tree = parse_source(source, Dialect::for_path(&file.path))?;
    let module_ran = file.has_hits();
    let add_branches = file.branch_map.is_empty();

    let mut statements = Vec::new();
    let mut branches = Vec::new();
    visit_nodes(tree.root_node(), &mut |node| {
        let kind = node.kind();
        if STATEMENT_KINDS.contains(&kind) {
            statements.push(range_of(&node));
        }
        if add_branches {
            if let Some(branch) = branch_for(&node, source) {
                branches.push(branch);
            }
        }
        true
    });

    let added = statements.len() + branches.len();
    for range in statements {
        let hits = enclosing_function_hits(file, &range.start).unwrap_or(u64::from(module_ran));
        file.add_statement(range, hits);
    }
    for branch in branches {
        let arms = branch.locations.len();
        file.add_branch(branch, vec![0; arms]);
    }
    Ok(added)
}

fn range_of(node: &Node) -> SourceRange {
    let start = node.start_position();
    let end = node.end_position();
    SourceRange::span(
        start.row as u32 + 1,
        start.column as u32,
        end.row as u32 + 1,
        end.column as u32,
    )
}

fn branch_for(node: &Node, source: &str) -> Option<BranchMapping> {
    let loc = range_of(node);
    let (kind, locations) = match node.kind() {
        nodes::IF_STATEMENT => {
            let consequence = node.child_by_field_name(fields::CONSEQUENCE)?;
            let alternative = node
                .child_by_field_name(fields::ALTERNATIVE)
                .map_or(loc, |alt| range_of(&alt));
            (BranchKind::If, vec![range_of(&consequence), alternative])
        }
        nodes::TERNARY_EXPRESSION => {
            let consequence = node.child_by_field_name(fields::CONSEQUENCE)?;
            let alternative = node.child_by_field_name(fields::ALTERNATIVE)?;
            (
                BranchKind::CondExpr,
                vec![range_of(&consequence), range_of(&alternative)],
            )
        }
        nodes::BINARY_EXPRESSION => {
            let operator = node.child_by_field_name(fields::OPERATOR)?;
            let operator = node_text(&operator, source);
            if !LOGICAL_OPERATORS.iter().any(|logical| *logical == operator) {
                return None;
            }
            let left = node.child_by_field_name(fields::LEFT)?;
            let right = node.child_by_field_name(fields::RIGHT)?;
            (BranchKind::BinaryExpr, vec![range_of(&left), range_of(&right)])
        }
        _ => return None,
    };

    Some(BranchMapping {
        line: loc.start.line,
        loc,
        kind,
        locations,
    })
}

/// Count of the innermost function whose body contains `at`
fn enclosing_function_hits(file: &FileCoverage, at: &Location) -> Option<u64> {
    file.fn_map
        .iter()
        .filter(|(_, function)| function.loc.start <= *at && *at < function.loc.end)
        .max_by_key(|(_, function)| function.loc.start)
        .and_then(|(id, _)| file.f.get(id).copied())
}

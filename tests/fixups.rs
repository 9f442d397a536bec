// tests/fixups.rs
use covfuse::coverage::fixups::{FixupOptions, apply_fixups};
use covfuse::types::models::{
    BranchKind, BranchMapping, CoverageMap, FileCoverage, FunctionMapping, SourceRange,
};
use rstest::*;
use std::collections::HashMap;

fn single(file: FileCoverage) -> CoverageMap {
    let mut map = CoverageMap::new();
    map.insert(file.path.clone(), file);
    map
}

fn function(name: &str, decl: SourceRange, loc: SourceRange) -> FunctionMapping {
    FunctionMapping {
        name: name.to_string(),
        line: decl.start.line,
        decl,
        loc,
    }
}

fn branch(kind: BranchKind, loc: SourceRange) -> BranchMapping {
    BranchMapping {
        line: loc.start.line,
        loc,
        kind,
        locations: vec![loc, loc],
    }
}

#[fixture]
fn no_sources() -> HashMap<String, String> {
    HashMap::new()
}

#[rstest]
#[case::file_origin(SourceRange::span(1, 0, 1, 0), BranchKind::If, 0)]
#[case::same_line_other_column(SourceRange::span(1, 5, 1, 5), BranchKind::If, 1)]
#[case::not_zero_width(SourceRange::span(1, 0, 1, 30), BranchKind::If, 1)]
#[case::other_kind(SourceRange::span(1, 0, 1, 0), BranchKind::CondExpr, 1)]
fn test_phantom_branch_removal(
    #[case] loc: SourceRange,
    #[case] kind: BranchKind,
    #[case] expected_branches: usize,
    no_sources: HashMap<String, String>,
) {
    // Setup test data
    let mut file = FileCoverage::new("/src/app.ts");
    file.add_branch(branch(kind, loc), vec![1, 0]);
    let mut map = single(file);

    // Execute
    let report = apply_fixups(&mut map, &no_sources, &FixupOptions::default());

    // Verify
    let file = map.get("/src/app.ts").unwrap();
    assert_eq!(file.branch_map.len(), expected_branches);
    assert_eq!(file.b.len(), expected_branches);
    assert_eq!(report.phantom_branches, 1 - expected_branches);
}

#[rstest]
fn test_declaration_statement_takes_function_count(no_sources: HashMap<String, String>) {
    let decl = SourceRange::span(3, 0, 3, 20);
    let mut file = FileCoverage::new("/src/app.ts");
    let statement = file.add_statement(decl, 0);
    let other = file.add_statement(SourceRange::span(4, 2, 4, 12), 0);
    file.add_function(function("handler", decl, SourceRange::span(3, 20, 6, 1)), 3);
    let mut map = single(file);

    let report = apply_fixups(&mut map, &no_sources, &FixupOptions::default());

    let file = map.get("/src/app.ts").unwrap();
    assert_eq!(file.s[&statement], 3);
    assert_eq!(file.s[&other], 0);
    assert_eq!(report.reconciled_statements, 1);
}

#[rstest]
#[case::higher_count_wins(
    (3, 0, 3, 30), 0,
    (3, 0, 3, 30), 2,
    1
)]
#[case::separate_body_wins_tie(
    (3, 0, 3, 30), 1,
    (4, 2, 8, 1), 1,
    1
)]
#[case::lowest_id_wins_full_tie(
    (3, 0, 3, 30), 1,
    (3, 0, 3, 30), 1,
    0
)]
fn test_duplicate_functions_collapse(
    #[case] first_loc: (u32, u32, u32, u32),
    #[case] first_hits: u64,
    #[case] second_loc: (u32, u32, u32, u32),
    #[case] second_hits: u64,
    #[case] expected_survivor: u32,
    no_sources: HashMap<String, String>,
) {
    // Setup test data
    let decl = SourceRange::span(3, 0, 3, 30);
    let span = |(sl, sc, el, ec): (u32, u32, u32, u32)| SourceRange::span(sl, sc, el, ec);
    let mut file = FileCoverage::new("/src/app.ts");
    file.add_function(function("render", decl, span(first_loc)), first_hits);
    file.add_function(function("render", decl, span(second_loc)), second_hits);
    file.add_function(
        function("other", SourceRange::span(10, 0, 10, 9), SourceRange::span(10, 9, 12, 1)),
        0,
    );
    let mut map = single(file);

    // Execute
    let report = apply_fixups(&mut map, &no_sources, &FixupOptions::default());

    // Verify
    let file = map.get("/src/app.ts").unwrap();
    assert_eq!(report.duplicate_functions, 1);
    assert_eq!(file.fn_map.len(), 2);
    assert!(file.fn_map.contains_key(&expected_survivor));
    assert!(file.fn_map.contains_key(&2));
}

#[test]
fn test_markup_callbacks_removed() {
    // Setup test data
    let source = "const list = items.map((item) => <li>{item}</li>);\nconst ids = items.map((item) => item.id);\n";
    let mut file = FileCoverage::new("/src/List.tsx");
    let markup = file.add_function(
        function("(anonymous_0)", SourceRange::span(1, 23, 1, 48), SourceRange::span(1, 23, 1, 48)),
        2,
    );
    let plain = file.add_function(
        function("(anonymous_1)", SourceRange::span(2, 22, 2, 40), SourceRange::span(2, 22, 2, 40)),
        2,
    );
    let mut map = single(file);
    let sources = HashMap::from([("/src/List.tsx".to_string(), source.to_string())]);

    // Execute
    let report = apply_fixups(&mut map, &sources, &FixupOptions::default());

    // Verify
    let file = map.get("/src/List.tsx").unwrap();
    assert!(!file.fn_map.contains_key(&markup));
    assert!(!file.f.contains_key(&markup));
    assert!(file.fn_map.contains_key(&plain));
    assert_eq!(report.markup_callbacks, 1);
}

#[test]
fn test_named_markup_function_kept() {
    let source = "rows.map(function Row(item) { return <tr />; });\n";
    let mut file = FileCoverage::new("/src/Table.jsx");
    file.add_function(
        function("Row", SourceRange::span(1, 9, 1, 46), SourceRange::span(1, 9, 1, 46)),
        1,
    );
    let mut map = single(file);
    let sources = HashMap::from([("/src/Table.jsx".to_string(), source.to_string())]);

    let report = apply_fixups(&mut map, &sources, &FixupOptions::default());

    assert_eq!(report.markup_callbacks, 0);
    assert_eq!(map.get("/src/Table.jsx").unwrap().fn_map.len(), 1);
}

#[test]
fn test_spurious_logical_branches_removed() {
    // Setup test data
    let source = "const total = a + b;\nconst pick = a && b;\nconst fallback =\n  a ??\n  b;\n";
    let mut file = FileCoverage::new("/src/math.ts");
    let spurious = file.add_branch(
        branch(BranchKind::BinaryExpr, SourceRange::span(1, 14, 1, 19)),
        vec![1, 1],
    );
    let real = file.add_branch(
        branch(BranchKind::BinaryExpr, SourceRange::span(2, 13, 2, 19)),
        vec![1, 0],
    );
    let multiline = file.add_branch(
        branch(BranchKind::BinaryExpr, SourceRange::span(3, 16, 5, 3)),
        vec![1, 0],
    );
    let outside = file.add_branch(
        branch(BranchKind::BinaryExpr, SourceRange::span(40, 0, 40, 5)),
        vec![0, 0],
    );
    let mut map = single(file);
    let sources = HashMap::from([("/src/math.ts".to_string(), source.to_string())]);

    // Execute
    let report = apply_fixups(&mut map, &sources, &FixupOptions::default());

    // Verify
    let file = map.get("/src/math.ts").unwrap();
    assert!(!file.branch_map.contains_key(&spurious));
    assert!(file.branch_map.contains_key(&real));
    assert!(file.branch_map.contains_key(&multiline));
    assert!(file.branch_map.contains_key(&outside));
    assert_eq!(report.spurious_branches, 1);
}

#[rstest]
fn test_source_passes_skip_without_text(no_sources: HashMap<String, String>) {
    let mut file = FileCoverage::new("/src/math.ts");
    file.add_branch(
        branch(BranchKind::BinaryExpr, SourceRange::span(1, 14, 1, 19)),
        vec![1, 1],
    );
    let mut map = single(file.clone());

    let report = apply_fixups(&mut map, &no_sources, &FixupOptions::default());

    assert_eq!(report.total_changes(), 0);
    assert_eq!(map.get("/src/math.ts"), Some(&file));
}

#[rstest]
#[case::disabled(false, 0)]
#[case::enabled(true, 2)]
fn test_backfill_rebuilds_statements(#[case] enabled: bool, #[case] expected_statements: usize) {
    // Setup test data
    let source = "function greet() {\n  return 1;\n}\ngreet();\n";
    let mut file = FileCoverage::new("/src/greet.js");
    file.add_function(
        function("greet", SourceRange::span(1, 9, 1, 14), SourceRange::span(1, 17, 3, 1)),
        1,
    );
    let mut map = single(file);
    let sources = HashMap::from([("/src/greet.js".to_string(), source.to_string())]);

    // Execute
    let options = FixupOptions::default().with_backfill(enabled);
    let report = apply_fixups(&mut map, &sources, &options);

    // Verify
    let file = map.get("/src/greet.js").unwrap();
    assert_eq!(file.statement_map.len(), expected_statements);
    assert_eq!(report.backfilled_records, expected_statements);
    assert!(file.s.values().all(|&hits| hits >= 1));
    assert!(file.validate().is_ok());
}

#[test]
fn test_failed_file_keeps_prior_state() {
    // Setup test data: backfill cannot parse the source, so every pass is undone
    let source = "function broken( {\n";
    let mut file = FileCoverage::new("/src/broken.js");
    file.add_branch(branch(BranchKind::If, SourceRange::span(1, 0, 1, 0)), vec![0, 0]);
    file.add_function(
        function("broken", SourceRange::span(1, 9, 1, 15), SourceRange::span(1, 0, 1, 18)),
        1,
    );
    let mut map = single(file.clone());
    let sources = HashMap::from([("/src/broken.js".to_string(), source.to_string())]);

    // Execute
    let report = apply_fixups(&mut map, &sources, &FixupOptions::default().with_backfill(true));

    // Verify
    assert_eq!(report.failed_files, 1);
    assert_eq!(report.phantom_branches, 0);
    assert_eq!(map.get("/src/broken.js"), Some(&file));
}

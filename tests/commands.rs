// tests/commands.rs
use covfuse::cli::{execute_fixup_command, execute_merge_base_command, execute_merge_command};
use covfuse::coverage::merge::MergeStrategy;
use covfuse::types::models::{BranchKind, BranchMapping, CoverageMap, FileCoverage, SourceRange};
use covfuse::utils::io::{load_coverage_map, save_coverage_map};
use covfuse::utils::paths::{DEFAULT_COVERAGE_FILE, discover_coverage_files};
use rstest::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[fixture]
fn temp_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

fn write_map(path: &Path, entries: &[(&str, u64)]) {
    let mut map = CoverageMap::new();
    for &(file_path, hits) in entries {
        let mut file = FileCoverage::new(file_path);
        file.add_statement(SourceRange::span(2, 0, 2, 12), hits);
        map.insert(file_path, file);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    save_coverage_map(&map, path).unwrap();
}

fn statement_hits(map: &CoverageMap, path: &str) -> Vec<u64> {
    map.get(path).unwrap().s.values().copied().collect()
}

#[rstest]
fn test_discovers_coverage_files_in_directories(temp_dir: TempDir) {
    // Setup test data
    let root = temp_dir.path();
    write_map(&root.join("unit").join(DEFAULT_COVERAGE_FILE), &[("/src/a.ts", 1)]);
    write_map(&root.join("e2e").join(DEFAULT_COVERAGE_FILE), &[("/src/a.ts", 2)]);
    fs::write(root.join("e2e").join("other.json"), "{}").unwrap();

    // Execute
    let found = discover_coverage_files(&[root.to_path_buf()], DEFAULT_COVERAGE_FILE).unwrap();

    // Verify - walk order is sorted
    assert_eq!(
        found,
        vec![
            root.join("e2e").join(DEFAULT_COVERAGE_FILE),
            root.join("unit").join(DEFAULT_COVERAGE_FILE),
        ]
    );
}

#[rstest]
fn test_discovery_without_matches_is_an_error(temp_dir: TempDir) {
    let result = discover_coverage_files(&[temp_dir.path().to_path_buf()], DEFAULT_COVERAGE_FILE);
    assert!(result.is_err());

    let missing = temp_dir.path().join("missing.json");
    assert!(discover_coverage_files(&[missing], DEFAULT_COVERAGE_FILE).is_err());
}

#[rstest]
#[case::max(MergeStrategy::Max, vec![3])]
#[case::add(MergeStrategy::Add, vec![4])]
fn test_execute_merge_command(
    #[case] strategy: MergeStrategy,
    #[case] expected: Vec<u64>,
    temp_dir: TempDir,
) {
    // Setup test data
    let root = temp_dir.path();
    let first = root.join("first.json");
    let second = root.join("second.json");
    write_map(&first, &[("file:///src/a.ts", 1), ("/src/b.ts", 0)]);
    write_map(&second, &[("/src/a.ts", 3)]);
    let output = root.join("out").join("merged.json");

    // Execute
    execute_merge_command(
        &[first, second],
        strategy,
        &output,
        &[],
        &["b.ts".to_string()],
        DEFAULT_COVERAGE_FILE,
    )
    .unwrap();

    // Verify
    let merged = load_coverage_map(&output).unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(statement_hits(&merged, "/src/a.ts"), expected);
}

#[rstest]
fn test_merge_command_rejects_empty_result(temp_dir: TempDir) {
    let input = temp_dir.path().join("only.json");
    write_map(&input, &[("/src/a.ts", 1)]);
    let output = temp_dir.path().join("merged.json");

    let result = execute_merge_command(
        &[input],
        MergeStrategy::Max,
        &output,
        &["*.vue".to_string()],
        &[],
        DEFAULT_COVERAGE_FILE,
    );

    assert!(result.is_err());
    assert!(!output.exists());
}

#[rstest]
#[case::existing_base(true, 3)]
#[case::missing_base(false, 2)]
fn test_execute_merge_base_command(
    #[case] with_base: bool,
    #[case] expected_files: usize,
    temp_dir: TempDir,
) {
    // Setup test data
    let root = temp_dir.path();
    let base: PathBuf = root.join("base.json");
    if with_base {
        write_map(&base, &[("/src/a.ts", 4), ("/src/old.ts", 1)]);
    }
    let additional = root.join("additional.json");
    write_map(&additional, &[("/src/a.ts", 1), ("/src/new.ts", 2)]);
    let output = root.join("merged.json");

    // Execute
    execute_merge_base_command(&base, &additional, &output).unwrap();

    // Verify
    let merged = load_coverage_map(&output).unwrap();
    assert_eq!(merged.len(), expected_files);
    let expected_a = if with_base { 4 } else { 1 };
    assert_eq!(statement_hits(&merged, "/src/a.ts"), vec![expected_a]);
}

#[rstest]
fn test_execute_fixup_command(temp_dir: TempDir) {
    // Setup test data
    let root = temp_dir.path();
    fs::write(root.join("app.ts"), "export const x = a + b;\n").unwrap();
    let mut file = FileCoverage::new("app.ts");
    file.add_statement(SourceRange::span(1, 0, 1, 24), 1);
    file.add_branch(
        BranchMapping {
            loc: SourceRange::span(1, 0, 1, 0),
            kind: BranchKind::If,
            locations: vec![SourceRange::span(1, 0, 1, 0), SourceRange::span(1, 0, 1, 0)],
            line: 1,
        },
        vec![1, 0],
    );
    file.add_branch(
        BranchMapping {
            loc: SourceRange::span(1, 17, 1, 22),
            kind: BranchKind::BinaryExpr,
            locations: vec![SourceRange::span(1, 17, 1, 18), SourceRange::span(1, 21, 1, 22)],
            line: 1,
        },
        vec![1, 1],
    );
    let mut map = CoverageMap::new();
    map.insert("app.ts", file);
    let input = root.join("coverage.json");
    save_coverage_map(&map, &input).unwrap();
    let output = root.join("fixed.json");

    // Execute
    execute_fixup_command(&input, Some(output.as_path()), false, Some(root)).unwrap();

    // Verify
    let fixed = load_coverage_map(&output).unwrap();
    let file = fixed.get("app.ts").unwrap();
    assert!(file.branch_map.is_empty());
    assert_eq!(file.statement_map.len(), 1);
    assert_eq!(load_coverage_map(&input).unwrap(), map);
}

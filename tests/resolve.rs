use covfuse::resolve::{filter_coverage_map, resolve_file_patterns};
use covfuse::types::models::{CoverageMap, FileCoverage};

fn available() -> Vec<String> {
    vec![
        "/repo/src/app.ts".to_string(),
        "/repo/src/components/List.tsx".to_string(),
        "/repo/src/utils/math.ts".to_string(),
        "/repo/test/helpers.ts".to_string(),
    ]
}

fn map_of(paths: &[String]) -> CoverageMap {
    paths
        .iter()
        .map(|path| (path.clone(), FileCoverage::new(path.as_str())))
        .collect()
}

#[test]
fn test_exact_path_match() {
    // Setup test data
    let patterns = vec!["/repo/src/app.ts".to_string()];

    // Execute
    let (matched, unmatched) = resolve_file_patterns(&available(), &patterns);

    // Verify
    assert_eq!(matched, vec!["/repo/src/app.ts".to_string()]);
    assert!(unmatched.is_empty());
}

#[test]
fn test_bare_name_matches_file_name() {
    // Setup test data
    let patterns = vec!["math.ts".to_string()];

    // Execute
    let (matched, unmatched) = resolve_file_patterns(&available(), &patterns);

    // Verify - this should match against the last path segment
    assert_eq!(matched, vec!["/repo/src/utils/math.ts".to_string()]);
    assert!(unmatched.is_empty());
}

#[test]
fn test_name_wildcard() {
    // Setup test data
    let patterns = vec!["*.tsx".to_string()];

    // Execute
    let (matched, _) = resolve_file_patterns(&available(), &patterns);

    // Verify
    assert_eq!(matched, vec!["/repo/src/components/List.tsx".to_string()]);
}

#[test]
fn test_path_wildcard() {
    // Setup test data
    let patterns = vec!["/repo/src/*".to_string()];

    // Execute
    let (matched, unmatched) = resolve_file_patterns(&available(), &patterns);

    // Verify - '*' crosses directory separators
    assert_eq!(matched.len(), 3);
    assert!(!matched.contains(&"/repo/test/helpers.ts".to_string()));
    assert!(unmatched.is_empty());
}

#[test]
fn test_unmatched_patterns_reported() {
    // Setup test data
    let patterns = vec![
        "app.ts".to_string(),
        "/repo/missing.ts".to_string(),
        "*.vue".to_string(),
    ];

    // Execute
    let (matched, unmatched) = resolve_file_patterns(&available(), &patterns);

    // Verify
    assert_eq!(matched, vec!["/repo/src/app.ts".to_string()]);
    assert_eq!(unmatched.len(), 2);
    assert!(unmatched.contains(&"/repo/missing.ts".to_string()));
    assert!(unmatched.contains(&"*.vue".to_string()));
}

#[test]
fn test_overlapping_patterns_deduplicated() {
    // Setup test data
    let patterns = vec!["*.ts".to_string(), "/repo/src/*".to_string()];

    // Execute
    let (matched, _) = resolve_file_patterns(&available(), &patterns);

    // Verify
    assert_eq!(matched.len(), 4);
    let mut sorted = matched.clone();
    sorted.sort();
    assert_eq!(matched, sorted);
}

#[test]
fn test_filter_with_include_and_exclude() {
    // Setup test data
    let mut map = map_of(&available());
    let include = vec!["/repo/src/*".to_string()];
    let exclude = vec!["*.tsx".to_string(), "nothing.js".to_string()];

    // Execute
    let unmatched = filter_coverage_map(&mut map, &include, &exclude);

    // Verify
    assert_eq!(
        map.paths().cloned().collect::<Vec<_>>(),
        vec![
            "/repo/src/app.ts".to_string(),
            "/repo/src/utils/math.ts".to_string(),
        ]
    );
    assert_eq!(unmatched, vec!["nothing.js".to_string()]);
}

#[test]
fn test_filter_without_patterns_keeps_everything() {
    let mut map = map_of(&available());

    let unmatched = filter_coverage_map(&mut map, &[], &[]);

    assert_eq!(map.len(), 4);
    assert!(unmatched.is_empty());
}

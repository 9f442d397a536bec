use crate::types::models::CoverageMap;
use wildmatch::WildMatch;

// Split patterns into exact keys, exact file names, path wildcards and name wildcards
fn categorize_patterns(
    patterns: &[String],
) -> (Vec<String>, Vec<String>, Vec<String>, Vec<String>) {
    let mut exact_paths = Vec::new();
    let mut exact_names = Vec::new();
    let mut path_wildcard_patterns = Vec::new();
    let mut name_wildcard_patterns = Vec::new();

    for pattern in patterns {
        let is_path = pattern.contains('/');
        if pattern.contains('*') || pattern.contains('?') {
            if is_path {
                path_wildcard_patterns.push(pattern.clone());
            } else {
                name_wildcard_patterns.push(pattern.clone());
            }
        } else if is_path {
            exact_paths.push(pattern.clone());
        } else {
            exact_names.push(pattern.clone());
        }
    }

    (
        exact_paths,
        exact_names,
        path_wildcard_patterns,
        name_wildcard_patterns,
    )
}

/// Resolve patterns against file keys.
///
/// Returns the selected keys (sorted, deduplicated) and the patterns that
/// matched nothing.
pub fn resolve_file_patterns(
    available_files: &[String],
    patterns: &[String],
) -> (Vec<String>, Vec<String>) {
    let mut selected_files = Vec::new();
    let mut unmatched_patterns = Vec::new();

    let (exact_paths, exact_names, path_wildcard_patterns, name_wildcard_patterns) =
        categorize_patterns(patterns);

    for pattern in exact_paths {
        if available_files.contains(&pattern) {
            selected_files.push(pattern);
        } else {
            unmatched_patterns.push(pattern);
        }
    }

    for pattern in exact_names.into_iter().chain(name_wildcard_patterns) {
        let matches = match_file_by_name(available_files, &pattern);
        if matches.is_empty() {
            unmatched_patterns.push(pattern);
        } else {
            selected_files.extend(matches);
        }
    }

    for pattern in path_wildcard_patterns {
        let matches = match_file_by_path(available_files, &pattern);
        if matches.is_empty() {
            unmatched_patterns.push(pattern);
        } else {
            selected_files.extend(matches);
        }
    }

    selected_files.sort();
    selected_files.dedup();

    (selected_files, unmatched_patterns)
}

// Match against the full key
fn match_file_by_path(available_files: &[String], pattern: &str) -> Vec<String> {
    let wildcard = WildMatch::new(pattern);
    available_files
        .iter()
        .filter(|file| wildcard.matches(file))
        .cloned()
        .collect()
}

// Match against the file name only (part after the last '/')
fn match_file_by_name(available_files: &[String], pattern: &str) -> Vec<String> {
    let wildcard = WildMatch::new(pattern);
    available_files
        .iter()
        .filter(|file| {
            file.rsplit('/')
                .next()
                .is_some_and(|name| wildcard.matches(name))
        })
        .cloned()
        .collect()
}

/// Keep files selected by `include` (all when empty) and not selected by `exclude`.
///
/// Returns the patterns that matched nothing, from both lists.
pub fn filter_coverage_map(
    map: &mut CoverageMap,
    include: &[String],
    exclude: &[String],
) -> Vec<String> {
    let available: Vec<String> = map.paths().cloned().collect();
    let mut unmatched = Vec::new();

    let included = if include.is_empty() {
        available.clone()
    } else {
        let (selected, missed) = resolve_file_patterns(&available, include);
        unmatched.extend(missed);
        selected
    };

    let (excluded, missed) = if exclude.is_empty() {
        (Vec::new(), Vec::new())
    } else {
        resolve_file_patterns(&available, exclude)
    };
    unmatched.extend(missed);

    map.retain(|path, _| {
        let path = path.to_string();
        included.binary_search(&path).is_ok() && excluded.binary_search(&path).is_err()
    });
    unmatched
}

use crate::coverage::merge::{MergeStrategy, merge_file};
use crate::types::errors::Error;
use crate::types::models::{CoverageMap, FileCoverage};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::PathBuf;
use walkdir::WalkDir;
use wildmatch::WildMatch;

/// File name looked for when an input is a directory
pub const DEFAULT_COVERAGE_FILE: &str = "coverage-final.json";

/// Expand inputs into coverage files.
///
/// Files are taken as given. Directories are walked for files whose name
/// matches `name_pattern`, in sorted order so merge order is reproducible.
pub fn discover_coverage_files(inputs: &[PathBuf], name_pattern: &str) -> Result<Vec<PathBuf>, Error> {
    let wildcard = WildMatch::new(name_pattern);
    let mut found = Vec::new();

    for input in inputs {
        if input.is_file() {
            found.push(input.clone());
            continue;
        }
        if !input.is_dir() {
            return Err(Error::NoInputs(format!(
                "'{}' is neither a file nor a directory",
                input.display()
            )));
        }

        let mut matches: Vec<PathBuf> = WalkDir::new(input)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| wildcard.matches(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.into_path())
            .collect();
        matches.sort();
        debug!("Found {} coverage files under '{}'", matches.len(), input.display());
        found.extend(matches);
    }

    if found.is_empty() {
        return Err(Error::NoInputs(format!(
            "no files matching '{}' found",
            name_pattern
        )));
    }
    Ok(found)
}

/// Normalise a file key: drop a `file://` prefix and use forward slashes
pub fn normalize_file_key(key: &str) -> String {
    key.strip_prefix("file://").unwrap_or(key).replace('\\', "/")
}

/// Re-key a map with normalised keys.
///
/// Files whose keys collide once normalised are merged with
/// [`MergeStrategy::Max`] so neither spelling's counts are lost.
pub fn normalize_map_keys(map: CoverageMap) -> CoverageMap {
    let mut grouped: BTreeMap<String, Vec<FileCoverage>> = BTreeMap::new();
    for (key, mut file) in map {
        let key = normalize_file_key(&key);
        file.path = key.clone();
        grouped.entry(key).or_default().push(file);
    }

    grouped
        .into_iter()
        .filter_map(|(key, files)| {
            if files.len() > 1 {
                warn!("{} coverage entries normalise to '{}', merging them", files.len(), key);
            }
            let sources: Vec<&FileCoverage> = files.iter().collect();
            merge_file(&key, &sources, MergeStrategy::Max).map(|file| (key, file))
        })
        .collect()
}

use crate::types::errors::Error;
use crate::types::models::CoverageMap;
use serde::Serialize;
use std::path::Path;

/// Load a coverage map, skipping malformed files inside it
pub fn load_coverage_map(path: &Path) -> Result<CoverageMap, Error> {
    let content = std::fs::read_to_string(path)?;
    CoverageMap::from_json_str(&content)
}

/// Load every input, failing on the first unreadable one
pub fn load_coverage_maps(paths: &[impl AsRef<Path>]) -> Result<Vec<CoverageMap>, Error> {
    paths
        .iter()
        .map(|path| load_coverage_map(path.as_ref()))
        .collect()
}

/// Save the coverage map to a JSON file
pub fn save_coverage_map(map: &CoverageMap, output_path: &Path) -> Result<(), Error> {
    save_json(map, output_path)
}

/// Save any serializable value as pretty JSON, creating parent directories
pub fn save_json<T: Serialize + ?Sized>(value: &T, output_path: &Path) -> Result<(), Error> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(output_path, json)?;
    Ok(())
}

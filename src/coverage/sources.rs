use log::debug;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Supplies original source text for files named in a coverage map
pub trait SourceProvider: Sync {
    fn source(&self, path: &str) -> Option<Arc<str>>;
}

/// Reads sources from disk, remembering each file (or its absence) for the run
#[derive(Debug, Default)]
pub struct FsSourceProvider {
    root: Option<PathBuf>,
    cache: Mutex<HashMap<String, Option<Arc<str>>>>,
}

impl FsSourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative coverage paths against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Default::default()
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path.strip_prefix("file://").unwrap_or(path));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }
}

impl SourceProvider for FsSourceProvider {
    fn source(&self, path: &str) -> Option<Arc<str>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .entry(path.to_string())
            .or_insert_with(|| {
                let resolved = self.resolve(path);
                match std::fs::read_to_string(&resolved) {
                    Ok(text) => Some(Arc::from(text)),
                    Err(e) => {
                        debug!("Source for '{}' unavailable: {}", resolved.display(), e);
                        None
                    }
                }
            })
            .clone()
    }
}

impl SourceProvider for HashMap<String, String> {
    fn source(&self, path: &str) -> Option<Arc<str>> {
        self.get(path).map(|text| Arc::from(text.as_str()))
    }
}

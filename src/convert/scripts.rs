use crate::convert::entry::{ConversionTask, OffsetMapper};
use crate::convert::pool::WorkerPool;
use crate::coverage::merge::{MergeStrategy, merge_coverage_maps};
use crate::ranges::{RangeOptions, ranges_for_script};
use crate::types::errors::Error;
use crate::types::models::CoverageMap;
use crate::types::raw::{PositionMap, RawScriptCoverage};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Looks up the position map for a generated script
pub trait PositionMapResolver: Send + Sync {
    fn resolve(&self, script: &RawScriptCoverage) -> Option<PositionMap>;
}

/// Resolver for runs without source maps; every script is converted unfiltered
pub struct NoPositionMaps;

impl PositionMapResolver for NoPositionMaps {
    fn resolve(&self, _script: &RawScriptCoverage) -> Option<PositionMap> {
        None
    }
}

impl PositionMapResolver for HashMap<String, PositionMap> {
    fn resolve(&self, script: &RawScriptCoverage) -> Option<PositionMap> {
        self.get(&script.url).cloned()
    }
}

/// Assembled coverage for a batch of scripts plus what happened along the way
#[derive(Debug, Default)]
pub struct ScriptConversion {
    pub coverage: CoverageMap,
    pub converted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub parse_time: Duration,
    pub convert_time: Duration,
}

/// Build one conversion task per usable script.
///
/// Entries without a url or without code are skipped.
pub fn build_tasks(
    scripts: &[RawScriptCoverage],
    resolver: &dyn PositionMapResolver,
    options: &RangeOptions,
) -> (Vec<ConversionTask>, usize) {
    let mut tasks = Vec::with_capacity(scripts.len());
    let mut skipped = 0;

    for script in scripts {
        let code = match script.source_code.as_deref() {
            Some(code) if !script.url.is_empty() && !code.is_empty() => code,
            _ => {
                warn!("Skipping script coverage without url or code: '{}'", script.url);
                skipped += 1;
                continue;
            }
        };

        let position_map = resolver.resolve(script);
        let ranges = ranges_for_script(code, position_map.as_ref(), options);
        let mut task = ConversionTask::new(&script.url, code, script.functions.clone())
            .with_ranges(ranges);
        task.position_map = position_map;
        tasks.push(task);
    }

    (tasks, skipped)
}

/// Convert raw script coverage into one structured map.
///
/// Every task is waited on before the fragments are combined.
pub fn convert_scripts(
    pool: &WorkerPool,
    scripts: &[RawScriptCoverage],
    resolver: &dyn PositionMapResolver,
    mapper: Arc<dyn OffsetMapper>,
    options: &RangeOptions,
) -> Result<ScriptConversion, Error> {
    let (tasks, skipped) = build_tasks(scripts, resolver, options);

    let mut conversion = ScriptConversion {
        skipped,
        ..Default::default()
    };

    // a rejected submission fails its own script; the rest still run
    let mut handles = Vec::with_capacity(tasks.len());
    for task in tasks {
        let url = task.url.clone();
        match pool.submit(task, Arc::clone(&mapper)) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                warn!("Could not submit '{}': {}", url, e);
                conversion.failed += 1;
            }
        }
    }

    let mut fragments = Vec::new();
    for handle in handles {
        let url = handle.url().to_string();
        match handle.wait() {
            Ok(result) => {
                conversion.parse_time += result.timings.parse;
                conversion.convert_time += result.timings.convert;
                match result.into_fragment() {
                    Ok(fragment) => {
                        conversion.converted += 1;
                        fragments.push(fragment);
                    }
                    Err(e) => {
                        warn!("Conversion failed for '{}': {}", url, e);
                        conversion.failed += 1;
                    }
                }
            }
            Err(e) => {
                warn!("Conversion aborted for '{}': {}", url, e);
                conversion.failed += 1;
            }
        }
    }

    conversion.coverage = merge_coverage_maps(&fragments, MergeStrategy::Max);
    info!(
        "Converted {} scripts ({} failed, {} skipped) into {} files",
        conversion.converted,
        conversion.failed,
        conversion.skipped,
        conversion.coverage.len()
    );

    Ok(conversion)
}

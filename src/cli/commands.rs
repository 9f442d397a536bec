use crate::coverage::fixups::{FixupOptions, apply_fixups};
use crate::coverage::merge::{MergeStrategy, merge_coverage_maps, merge_with_base};
use crate::coverage::sources::FsSourceProvider;
use crate::resolve::filter_coverage_map;
use crate::types::models::CoverageMap;
use crate::utils::io::{load_coverage_map, load_coverage_maps, save_coverage_map};
use crate::utils::paths::{DEFAULT_COVERAGE_FILE, discover_coverage_files, normalize_map_keys};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "covfuse",
    about = "Merge and clean up istanbul-style JavaScript coverage",
    version
)]
pub struct Cli {
    /// Log level written to stderr
    #[arg(long, global = true, default_value = "info")]
    pub log_level: LevelFilter,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Merge coverage files (or directories containing them) into one
    Merge {
        /// Coverage files or directories to search
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// How counts and structure are combined
        #[arg(short, long, value_enum, default_value_t = MergeStrategy::Max)]
        strategy: MergeStrategy,

        /// Output file for the merged coverage
        #[arg(short, long, default_value = "coverage-merged.json")]
        output: PathBuf,

        /// Only keep files matching these patterns
        #[arg(short, long)]
        include: Vec<String>,

        /// Drop files matching these patterns
        #[arg(short, long)]
        exclude: Vec<String>,

        /// File name pattern used when an input is a directory
        #[arg(short, long, default_value = DEFAULT_COVERAGE_FILE)]
        pattern: String,
    },

    /// Merge new coverage onto an existing base coverage file
    MergeBase {
        /// Base coverage; a missing file is treated as empty
        #[arg(short, long)]
        base: PathBuf,

        /// Coverage to merge onto the base
        #[arg(short, long)]
        additional: PathBuf,

        /// Output file for the merged coverage
        #[arg(short, long, default_value = "coverage-merged.json")]
        output: PathBuf,
    },

    /// Remove bundler and transpiler artifacts from a coverage file
    Fixup {
        /// Coverage file to clean up
        input: PathBuf,

        /// Output file (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rebuild statements for files that have hits but no statements
        #[arg(long)]
        backfill: bool,

        /// Directory that relative source paths are resolved against
        #[arg(long)]
        source_root: Option<PathBuf>,
    },
}

fn print_summary(map: &CoverageMap) {
    let summary = map.summary();
    println!("{}", summary);
}

pub fn execute_merge_command(
    inputs: &[PathBuf],
    strategy: MergeStrategy,
    output: &Path,
    include: &[String],
    exclude: &[String],
    pattern: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = discover_coverage_files(inputs, pattern)?;
    println!("Merging {} coverage files with strategy '{}'", files.len(), strategy);
    for file in &files {
        println!("  {}", file.display());
    }

    let maps: Vec<CoverageMap> = load_coverage_maps(&files)?
        .into_iter()
        .map(normalize_map_keys)
        .collect();
    let mut merged = merge_coverage_maps(&maps, strategy);

    let unmatched = filter_coverage_map(&mut merged, include, exclude);
    if !unmatched.is_empty() {
        println!("Warning: The following patterns did not match any files:");
        for pattern in &unmatched {
            println!("  {}", pattern);
        }
    }
    if merged.is_empty() {
        return Err("No files left to write after filtering".into());
    }

    save_coverage_map(&merged, output)?;
    println!("Merge complete! Results saved to {}", output.display());
    print_summary(&merged);
    Ok(())
}

pub fn execute_merge_base_command(
    base: &Path,
    additional: &Path,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let additional_map = load_coverage_map(additional)?;
    let result = merge_with_base(base, &additional_map);

    save_coverage_map(&result.coverage, output)?;
    println!("Merged onto base! Results saved to {}", output.display());
    println!(
        "  base files: {}, additional files: {}",
        result.base_files, result.additional_files
    );
    println!(
        "  kept from base: {}, merged: {}, new: {}",
        result.base_only_files, result.merged_files, result.new_files
    );
    print_summary(&result.coverage);
    Ok(())
}

pub fn execute_fixup_command(
    input: &Path,
    output: Option<&Path>,
    backfill: bool,
    source_root: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut map = load_coverage_map(input)?;
    let sources = match source_root {
        Some(root) => FsSourceProvider::with_root(root),
        None => FsSourceProvider::new(),
    };
    let options = FixupOptions::default().with_backfill(backfill);

    let report = apply_fixups(&mut map, &sources, &options);

    let output = output.unwrap_or(input);
    save_coverage_map(&map, output)?;
    println!("Fixups applied! Results saved to {}", output.display());
    println!("  phantom branches removed: {}", report.phantom_branches);
    println!("  declaration statements reconciled: {}", report.reconciled_statements);
    println!("  duplicate functions removed: {}", report.duplicate_functions);
    println!("  markup callbacks removed: {}", report.markup_callbacks);
    println!("  spurious branches removed: {}", report.spurious_branches);
    if backfill {
        println!("  records backfilled: {}", report.backfilled_records);
    }
    if report.failed_files > 0 {
        println!("  files left unchanged after errors: {}", report.failed_files);
    }
    print_summary(&map);
    Ok(())
}

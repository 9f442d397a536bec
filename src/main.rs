use clap::Parser;
use covfuse::cli::{
    Cli, Commands, execute_fixup_command, execute_merge_base_command, execute_merge_command,
};
use covfuse::utils::logging::init_logging;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_level)?;

    match cli.command {
        Commands::Merge {
            inputs,
            strategy,
            output,
            include,
            exclude,
            pattern,
        } => {
            execute_merge_command(&inputs, strategy, &output, &include, &exclude, &pattern)?;
        }
        Commands::MergeBase {
            base,
            additional,
            output,
        } => {
            execute_merge_base_command(&base, &additional, &output)?;
        }
        Commands::Fixup {
            input,
            output,
            backfill,
            source_root,
        } => {
            execute_fixup_command(&input, output.as_deref(), backfill, source_root.as_deref())?;
        }
    }

    Ok(())
}

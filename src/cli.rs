pub mod commands;

pub use commands::{
    Cli, Commands, execute_fixup_command, execute_merge_base_command, execute_merge_command,
};

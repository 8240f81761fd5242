//! CLI command-name contract for logging and routing.

use crate::cli::parse::{CardCommands, Commands};

/// Command name string for log fields (e.g. "generate", "cards.list").
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::Generate { .. } => "generate".to_string(),
        Commands::Regenerate { .. } => "regenerate".to_string(),
        Commands::RetryFailed { .. } => "retry_failed".to_string(),
        Commands::Cards { command } => format!("cards.{}", card_command_name(command)),
        Commands::Requirement { .. } => "requirement".to_string(),
        Commands::Models { .. } => "models".to_string(),
        Commands::Providers { .. } => "providers".to_string(),
    }
}

pub fn card_command_name(command: &CardCommands) -> &'static str {
    match command {
        CardCommands::List { .. } => "list",
        CardCommands::Remove { .. } => "remove",
        CardCommands::Clear { .. } => "clear",
    }
}

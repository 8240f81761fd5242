//! CLI domain: parse, route, help, output, and presentation only.
//! No domain orchestration; single route table dispatches to domain services.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::{card_command_name, command_name};
pub use output::map_error;
pub use parse::{CardCommands, Cli, Commands, ReferenceArgs, RunOverrides};
pub use presentation::{
    format_batch_report_json, format_batch_report_text, format_card_detail_text,
    format_card_list_json, format_card_list_text, format_models_json, format_models_text,
    format_providers_json, format_providers_text, format_requirement_json,
    format_requirement_text, status_label,
};
pub use route::RunContext;

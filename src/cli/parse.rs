//! CLI parse: clap types for batch-studio. No behavior; definitions only.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Batch Studio CLI - prompt-to-image batches across image providers
#[derive(Parser)]
#[command(name = "batch-studio")]
#[command(about = "Generate images for many prompts concurrently across interchangeable providers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config file)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for the card database and requirement cache
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Provider/model overrides applied to this run only
#[derive(Args, Debug, Clone, Default)]
pub struct RunOverrides {
    /// Provider to generate with (fal, google, firefly)
    #[arg(long)]
    pub provider: Option<String>,

    /// Model id for the selected provider
    #[arg(long)]
    pub model: Option<String>,

    /// Concurrent generations (1-4)
    #[arg(long)]
    pub concurrency: Option<usize>,
}

/// Reference image passed to models that accept one
#[derive(Args, Debug, Clone, Default)]
pub struct ReferenceArgs {
    /// Reference image URL (http, https or data)
    #[arg(long, conflicts_with = "reference_file")]
    pub reference_url: Option<String>,

    /// Reference image file, sent inline as a data URL
    #[arg(long)]
    pub reference_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add prompts as cards and generate them; without prompts, generate every card
    Generate {
        /// Prompt text, one prompt per line
        #[arg(long)]
        prompts: Option<String>,
        /// File with one prompt per line
        #[arg(long, conflicts_with = "prompts")]
        file: Option<PathBuf>,
        #[command(flatten)]
        overrides: RunOverrides,
        #[command(flatten)]
        reference: ReferenceArgs,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Regenerate a single card
    Regenerate {
        /// Card id
        id: String,
        #[command(flatten)]
        overrides: RunOverrides,
        #[command(flatten)]
        reference: ReferenceArgs,
    },
    /// Regenerate every failed card
    RetryFailed {
        #[command(flatten)]
        overrides: RunOverrides,
        #[command(flatten)]
        reference: ReferenceArgs,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Manage cards
    Cards {
        #[command(subcommand)]
        command: CardCommands,
    },
    /// Show whether a model accepts a reference image
    Requirement {
        #[command(flatten)]
        overrides: RunOverrides,
        /// Ignore the cached requirement and resolve again
        #[arg(long)]
        refresh: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List the models a provider offers
    Models {
        /// Provider to list (fal or google; defaults to the active provider)
        #[arg(long)]
        provider: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show provider setup status
    Providers {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum CardCommands {
    /// List cards with status
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Remove one card
    Remove {
        /// Card id
        id: String,
    },
    /// Remove every card
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

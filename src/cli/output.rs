//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ErrorKind, GenerationError};

/// Map domain errors to a string for CLI output.
/// Configuration problems carry a hint about where settings live.
pub fn map_error(e: &GenerationError) -> String {
    match e.kind() {
        ErrorKind::Config => format!(
            "{}\nSettings are read from the config file and BATCH_STUDIO__* environment variables.",
            e
        ),
        _ => e.to_string(),
    }
}

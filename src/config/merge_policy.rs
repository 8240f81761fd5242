//! Merge rules: defaults applied before any file or environment source.

use crate::error::GenerationError;
use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;

/// Create a Config builder with the studio defaults applied.
///
/// Nested provider defaults come from the serde defaults on the settings
/// structs; only the top-level scalars are seeded here so that a partial file
/// still deserializes.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, GenerationError> {
    let builder = Config::builder()
        .set_default("active_provider", "fal")?
        .set_default("mode", "simple")?
        .set_default("common_prompt", "")?
        .set_default("concurrency", super::DEFAULT_GENERATION_CONCURRENCY as i64)?;
    Ok(builder)
}

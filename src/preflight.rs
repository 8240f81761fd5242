//! Preflight Validation
//!
//! Sequential gate run before any generation attempt. The first failing
//! stage stops the run and carries the message shown to the user.

use crate::capability::{CapabilityRequirement, ImageSupport, RequirementStatus, RequirementTracker};
use crate::config::{PromptMode, StudioConfig};
use crate::error::GenerationError;
use crate::provider::ProviderKind;
use crate::template::{validate_template, ALLOWED_TEMPLATE_VARIABLES};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightStage {
    Template,
    ReferenceImage,
    ProviderConfig,
}

impl PreflightStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreflightStage::Template => "template",
            PreflightStage::ReferenceImage => "reference_image",
            PreflightStage::ProviderConfig => "provider_config",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreflightFailure {
    pub stage: PreflightStage,
    pub error: GenerationError,
}

impl PreflightFailure {
    fn new(stage: PreflightStage, error: GenerationError) -> Self {
        Self { stage, error }
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

impl fmt::Display for PreflightFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for PreflightFailure {}

/// Template checks; only advanced mode treats the common prompt as a template.
pub fn check_template(config: &StudioConfig) -> Result<(), GenerationError> {
    if config.mode != PromptMode::Advanced {
        return Ok(());
    }
    let template = config.common_prompt.trim();
    if template.is_empty() {
        return Err(GenerationError::Validation(
            "Advanced mode requires a common prompt template".to_string(),
        ));
    }

    let validation = validate_template(template, ALLOWED_TEMPLATE_VARIABLES);
    let mut problems: Vec<String> = validation.message().into_iter().collect();
    if !validation.used_variables.iter().any(|name| name == "item") {
        problems.push("Include {{item}} (or ${item}, {$item}) in the template".to_string());
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(GenerationError::Validation(problems.join(". ")))
    }
}

/// Whether the resolved requirement allows generation with the supplied reference.
pub fn check_reference_image(
    requirement: &CapabilityRequirement,
    reference: Option<&str>,
) -> Result<(), GenerationError> {
    match requirement.status {
        RequirementStatus::Loading => {
            return Err(GenerationError::ReferenceImage(
                "Model input requirements are still loading. Try again shortly".to_string(),
            ))
        }
        RequirementStatus::Error => {
            return Err(GenerationError::ReferenceImage(format!(
                "Failed to read model input requirements: {}",
                requirement.error
            )))
        }
        RequirementStatus::Idle | RequirementStatus::Ready => {}
    }

    if !requirement.unsupported_reason.is_empty() {
        return Err(GenerationError::ReferenceImage(format!(
            "This model's image inputs are not supported: {}",
            requirement.unsupported_reason
        )));
    }

    let has_reference = reference.map(|v| !v.trim().is_empty()).unwrap_or(false);
    if requirement.image_support == ImageSupport::Required && !has_reference {
        return Err(GenerationError::ReferenceImage(
            "This model requires a reference image. Provide an image file or URL".to_string(),
        ));
    }
    Ok(())
}

pub fn check_provider_config(
    provider: ProviderKind,
    config: &StudioConfig,
) -> Result<(), GenerationError> {
    if provider.is_configured(config) {
        return Ok(());
    }
    Err(GenerationError::Config(format!(
        "{} is not configured. Check the API settings",
        provider.label()
    )))
}

/// Run every stage in order for the active provider and model.
///
/// Resolves the model requirement through the tracker (cached unless stale).
/// A resolution superseded while waiting is treated as still loading.
pub async fn run_preflight(
    config: &StudioConfig,
    tracker: &RequirementTracker,
    reference: Option<&str>,
) -> Result<(), PreflightFailure> {
    check_template(config).map_err(|e| PreflightFailure::new(PreflightStage::Template, e))?;

    let provider = config.active_provider;
    let model = config.active_model();
    if provider.accepts_reference_image() {
        let requirement = match tracker.fetch(provider, model, config, false).await {
            Ok(requirement) => requirement,
            Err(e) if e.is_cancelled() => CapabilityRequirement::loading(provider, model),
            Err(e) => CapabilityRequirement::failed(provider, model, e.to_string()),
        };
        check_reference_image(&requirement, reference)
            .map_err(|e| PreflightFailure::new(PreflightStage::ReferenceImage, e))?;
    }

    check_provider_config(provider, config)
        .map_err(|e| PreflightFailure::new(PreflightStage::ProviderConfig, e))?;

    debug!(provider = %provider, model, "Preflight passed");
    Ok(())
}

pub(crate) fn log_failure(failure: &PreflightFailure) {
    info!(stage = failure.stage.as_str(), error = %failure.error, "Preflight blocked generation");
}

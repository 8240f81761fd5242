//! Resolve a provider/model's reference image requirement over the network.

use super::schema::infer_image_requirement;
use super::{CapabilityRequirement, RequirementStatus};
use crate::catalog::fetch_fal_model_openapi;
use crate::config::StudioConfig;
use crate::error::GenerationError;
use crate::provider::ProviderKind;
use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Source of capability requirements
#[async_trait]
pub trait RequirementSource: Send + Sync {
    /// Resolve the requirement for `model_id`.
    ///
    /// Failures resolve to a requirement with `status = Error`; only
    /// cancellation is returned as `Err(GenerationError::Cancelled)`.
    async fn resolve(
        &self,
        provider: ProviderKind,
        model_id: &str,
        config: &StudioConfig,
        cancel: &CancellationToken,
    ) -> Result<CapabilityRequirement, GenerationError>;
}

/// Reads fal.ai model schemas; every other provider takes no reference image.
pub struct CapabilityResolver {
    http: Client,
}

impl CapabilityResolver {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    async fn resolve_fal(
        &self,
        model_id: &str,
        config: &StudioConfig,
        cancel: &CancellationToken,
    ) -> Result<CapabilityRequirement, GenerationError> {
        let openapi = fetch_fal_model_openapi(&self.http, config, model_id, cancel).await?;
        let inferred = infer_image_requirement(&openapi).ok_or_else(|| {
            GenerationError::ReferenceImage("request schema not found".to_string())
        })?;
        Ok(CapabilityRequirement {
            status: RequirementStatus::Ready,
            provider: ProviderKind::Fal,
            model_id: model_id.to_string(),
            image_support: inferred.image_support,
            fields: inferred.fields,
            preferred_field: inferred.preferred_field,
            unsupported_reason: inferred.unsupported_reason,
            error: String::new(),
        })
    }
}

/// Whether a provider/model has anything to resolve at all
pub(crate) fn needs_resolution(provider: ProviderKind, model_id: &str, config: &StudioConfig) -> bool {
    provider.accepts_reference_image()
        && !config.providers.fal.api_key.trim().is_empty()
        && !model_id.trim().is_empty()
}

#[async_trait]
impl RequirementSource for CapabilityResolver {
    async fn resolve(
        &self,
        provider: ProviderKind,
        model_id: &str,
        config: &StudioConfig,
        cancel: &CancellationToken,
    ) -> Result<CapabilityRequirement, GenerationError> {
        let model_id = model_id.trim();
        if !needs_resolution(provider, model_id, config) {
            return Ok(CapabilityRequirement::no_image(provider, model_id));
        }

        match self.resolve_fal(model_id, config, cancel).await {
            Ok(requirement) => {
                debug!(
                    provider = %provider,
                    model = model_id,
                    image_support = requirement.image_support.as_str(),
                    fields = requirement.fields.len(),
                    "Resolved model input requirement"
                );
                Ok(requirement)
            }
            Err(GenerationError::Cancelled) => Err(GenerationError::Cancelled),
            Err(e) => {
                warn!(provider = %provider, model = model_id, error = %e, "Model requirement lookup failed");
                Ok(CapabilityRequirement::failed(provider, model_id, e.to_string()))
            }
        }
    }
}

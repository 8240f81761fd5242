//! Capability Resolution
//!
//! Determines whether a provider/model accepts a reference image, and through
//! which request field, by reading the model's published request schema.

use crate::provider::ProviderKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod cache;
pub mod resolver;
pub mod schema;

pub use cache::{credential_fingerprint, RequirementCache, RequirementTracker};
pub use resolver::{CapabilityResolver, RequirementSource};
pub use schema::{infer_image_requirement, SchemaResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSupport {
    #[default]
    None,
    Optional,
    Required,
    Unknown,
}

impl ImageSupport {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSupport::None => "none",
            ImageSupport::Optional => "optional",
            ImageSupport::Required => "required",
            ImageSupport::Unknown => "unknown",
        }
    }

    pub fn accepts_image(&self) -> bool {
        matches!(self, ImageSupport::Optional | ImageSupport::Required)
    }
}

/// A request field that can carry a reference image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageField {
    pub name: String,
    pub required: bool,
    pub expects_array: bool,
}

/// Reference image requirement of one provider/model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRequirement {
    pub status: RequirementStatus,
    pub provider: ProviderKind,
    pub model_id: String,
    pub image_support: ImageSupport,
    #[serde(default)]
    pub fields: Vec<ImageField>,
    #[serde(default)]
    pub preferred_field: Option<ImageField>,
    /// Set when the schema is understood but cannot be targeted safely
    #[serde(default)]
    pub unsupported_reason: String,
    #[serde(default)]
    pub error: String,
}

impl CapabilityRequirement {
    pub fn idle() -> Self {
        Self {
            status: RequirementStatus::Idle,
            provider: ProviderKind::default(),
            model_id: String::new(),
            image_support: ImageSupport::None,
            fields: Vec::new(),
            preferred_field: None,
            unsupported_reason: String::new(),
            error: String::new(),
        }
    }

    /// Resolved requirement for a model that takes no reference image
    pub fn no_image(provider: ProviderKind, model_id: &str) -> Self {
        Self {
            status: RequirementStatus::Ready,
            provider,
            model_id: model_id.trim().to_string(),
            ..Self::idle()
        }
    }

    pub fn loading(provider: ProviderKind, model_id: &str) -> Self {
        Self {
            status: RequirementStatus::Loading,
            image_support: ImageSupport::Unknown,
            ..Self::no_image(provider, model_id)
        }
    }

    pub fn failed(provider: ProviderKind, model_id: &str, error: impl Into<String>) -> Self {
        Self {
            status: RequirementStatus::Error,
            image_support: ImageSupport::Unknown,
            error: error.into(),
            ..Self::no_image(provider, model_id)
        }
    }

    pub fn cache_key(&self) -> String {
        requirement_cache_key(self.provider, &self.model_id)
    }

    pub fn is_for(&self, provider: ProviderKind, model_id: &str) -> bool {
        self.status != RequirementStatus::Idle
            && self.provider == provider
            && self.model_id == model_id.trim()
    }
}

pub fn requirement_cache_key(provider: ProviderKind, model_id: &str) -> String {
    format!("{}:{}", provider, model_id.trim())
}

/// Request fields that deliver `reference` to the model's preferred image field.
///
/// Empty unless the model accepts an image and a reference value is present.
pub fn build_reference_image_payload(
    requirement: &CapabilityRequirement,
    reference: Option<&str>,
) -> Map<String, Value> {
    let mut payload = Map::new();
    let Some(value) = reference.map(str::trim).filter(|v| !v.is_empty()) else {
        return payload;
    };
    if !requirement.image_support.accepts_image() {
        return payload;
    }
    let Some(field) = requirement
        .preferred_field
        .as_ref()
        .filter(|f| !f.name.is_empty())
    else {
        return payload;
    };

    let value = Value::String(value.to_string());
    let value = if field.expects_array {
        Value::Array(vec![value])
    } else {
        value
    };
    payload.insert(field.name.clone(), value);
    payload
}

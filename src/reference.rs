//! Reference image input shared by every card in a batch.

use crate::error::GenerationError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceImage {
    pub file_name: String,
    pub mime_type: String,
    /// `data:` URL of a local file; wins over `url`
    pub file_data_url: String,
    pub url: String,
}

impl ReferenceImage {
    pub fn from_url(raw: &str) -> Result<Self, GenerationError> {
        Ok(Self {
            url: parse_reference_image_url(raw)?,
            ..Self::default()
        })
    }

    /// Read a local image and embed it as a base64 data URL.
    pub fn from_file(path: &Path) -> Result<Self, GenerationError> {
        let bytes = std::fs::read(path).map_err(|e| {
            GenerationError::ReferenceImage(format!(
                "Failed to read reference image {}: {}",
                path.display(),
                e
            ))
        })?;
        let mime_type = mime_type_for(path).to_string();
        let file_data_url = format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes));
        Ok(Self {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            mime_type,
            file_data_url,
            url: String::new(),
        })
    }

    /// Value sent to the provider, if any.
    pub fn value(&self) -> Option<&str> {
        let file_value = self.file_data_url.trim();
        if !file_value.is_empty() {
            return Some(file_value);
        }
        let url = self.url.trim();
        (!url.is_empty()).then_some(url)
    }

    pub fn has_value(&self) -> bool {
        self.value().is_some()
    }
}

/// Accept `http`, `https` and `data` URLs. Empty input yields an empty string.
pub fn parse_reference_image_url(raw: &str) -> Result<String, GenerationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(String::new());
    }
    let parsed = Url::parse(value)
        .map_err(|e| GenerationError::ReferenceImage(format!("Invalid reference image URL: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" | "data" => Ok(value.to_string()),
        other => Err(GenerationError::ReferenceImage(format!(
            "Reference image must be an http(s) or data URL, got '{}:'",
            other
        ))),
    }
}

fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/png",
    }
}

//! Image Provider Abstraction
//!
//! Unified interface over three structurally different image-generation
//! APIs: an immediate-response endpoint, a queue with status polling, and an
//! async submit that may finish immediately or need polling. Each provider is
//! one variant of [`ProviderClient`]; all implement [`ImageProvider`].

use crate::config::StudioConfig;
use crate::error::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod extract;
pub mod fal;
pub mod firefly;
pub mod google;
pub mod http;

pub use extract::extract_image_url;
pub use fal::FalClient;
pub use firefly::FireflyClient;
pub use google::GoogleClient;
pub use http::{PollPolicy, PollSettings};

/// Supported image providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Fal,
    Google,
    Firefly,
}

impl ProviderKind {
    pub fn all() -> [ProviderKind; 3] {
        [ProviderKind::Fal, ProviderKind::Google, ProviderKind::Firefly]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Fal => "fal",
            ProviderKind::Google => "google",
            ProviderKind::Firefly => "firefly",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::Fal => "fal.ai",
            ProviderKind::Google => "Google AI Studio",
            ProviderKind::Firefly => "Adobe Firefly",
        }
    }

    fn setup_description(&self) -> &'static str {
        match self {
            ProviderKind::Fal => "Set an API key to start generating.",
            ProviderKind::Google => "Set an API key to enable image generation.",
            ProviderKind::Firefly => "Set a proxy URL, or a client ID and access token.",
        }
    }

    /// Only fal.ai publishes a request schema, so only it takes reference images.
    pub fn accepts_reference_image(&self) -> bool {
        matches!(self, ProviderKind::Fal)
    }

    /// Whether the credentials this provider needs are present
    pub fn is_configured(&self, config: &StudioConfig) -> bool {
        let providers = &config.providers;
        match self {
            ProviderKind::Fal => !providers.fal.api_key.trim().is_empty(),
            ProviderKind::Google => !providers.google.api_key.trim().is_empty(),
            ProviderKind::Firefly => {
                providers.firefly.uses_proxy() || providers.firefly.has_direct_token()
            }
        }
    }

    /// One-line setup status for display
    pub fn configuration_hint(&self, config: &StudioConfig) -> String {
        if *self == ProviderKind::Firefly {
            let firefly = &config.providers.firefly;
            if firefly.uses_proxy() {
                return format!("{}: configured (proxy)", self.label());
            }
            if firefly.has_direct_token() {
                return format!("{}: configured (direct token)", self.label());
            }
        } else if self.is_configured(config) {
            return format!("{}: configured", self.label());
        }
        format!("{}: not configured. {}", self.label(), self.setup_description())
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fal" => Ok(ProviderKind::Fal),
            "google" => Ok(ProviderKind::Google),
            "firefly" => Ok(ProviderKind::Firefly),
            other => Err(GenerationError::Config(format!("Unsupported provider: {}", other))),
        }
    }
}

/// One generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub final_prompt: String,
    /// Frozen settings snapshot with the provider and model override applied
    pub config: StudioConfig,
    /// Extra request fields merged into the body (reference image payload)
    pub provider_input: Map<String, Value>,
    pub cancel: CancellationToken,
}

impl GenerationRequest {
    pub fn new(final_prompt: impl Into<String>, config: StudioConfig) -> Self {
        Self {
            final_prompt: final_prompt.into(),
            config,
            provider_input: Map::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_provider_input(mut self, input: Map<String, Value>) -> Self {
        self.provider_input = input;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Successful generation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub image_url: String,
    pub provider: ProviderKind,
    pub model: String,
    pub raw: Value,
}

/// Image provider client trait
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generate one image. A cancelled request returns `GenerationError::Cancelled`.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError>;

    fn kind(&self) -> ProviderKind;
}

/// Closed set of provider clients
pub enum ProviderClient {
    Fal(FalClient),
    Google(GoogleClient),
    Firefly(FireflyClient),
}

#[async_trait]
impl ImageProvider for ProviderClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError> {
        match self {
            ProviderClient::Fal(client) => client.generate(request).await,
            ProviderClient::Google(client) => client.generate(request).await,
            ProviderClient::Firefly(client) => client.generate(request).await,
        }
    }

    fn kind(&self) -> ProviderKind {
        match self {
            ProviderClient::Fal(_) => ProviderKind::Fal,
            ProviderClient::Google(_) => ProviderKind::Google,
            ProviderClient::Firefly(_) => ProviderKind::Firefly,
        }
    }
}

/// Provider factory for creating provider clients
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_client(kind: ProviderKind, http: Client, polling: PollSettings) -> ProviderClient {
        match kind {
            ProviderKind::Fal => ProviderClient::Fal(FalClient::new(http, polling.fal_queue)),
            ProviderKind::Google => ProviderClient::Google(GoogleClient::new(http)),
            ProviderKind::Firefly => {
                ProviderClient::Firefly(FireflyClient::new(http, polling.firefly))
            }
        }
    }
}

/// Resolve the client that serves a provider
pub trait ProviderClientResolver: Send + Sync {
    fn client_for(&self, kind: ProviderKind) -> Arc<dyn ImageProvider>;
}

/// One client per provider sharing a single HTTP connection pool
pub struct ProviderRegistry {
    fal: Arc<ProviderClient>,
    google: Arc<ProviderClient>,
    firefly: Arc<ProviderClient>,
}

impl ProviderRegistry {
    pub fn new() -> Result<Self, GenerationError> {
        Self::with_polling(PollSettings::default())
    }

    pub fn with_polling(polling: PollSettings) -> Result<Self, GenerationError> {
        let http = http::build_provider_http_client()?;
        let create = |kind| Arc::new(ProviderFactory::create_client(kind, http.clone(), polling));
        Ok(Self {
            fal: create(ProviderKind::Fal),
            google: create(ProviderKind::Google),
            firefly: create(ProviderKind::Firefly),
        })
    }
}

impl ProviderClientResolver for ProviderRegistry {
    fn client_for(&self, kind: ProviderKind) -> Arc<dyn ImageProvider> {
        match kind {
            ProviderKind::Fal => self.fal.clone(),
            ProviderKind::Google => self.google.clone(),
            ProviderKind::Firefly => self.firefly.clone(),
        }
    }
}

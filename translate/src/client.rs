//! Client for the remote realtime translation API.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::wire::{Wire, WireSession};

/// Default WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default model serving translation sessions.
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";

/// Client for the remote realtime translation API.
#[derive(Clone)]
pub struct TranslateClient {
    config: Arc<ClientConfig>,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub(crate) struct ClientConfig {
    pub api_key: String,
    pub model: String,
    pub ws_url: String,
    pub organization: Option<String>,
}

impl TranslateClient {
    /// Creates a client builder.
    pub fn builder(api_key: impl Into<String>) -> TranslateClientBuilder {
        TranslateClientBuilder::new(api_key)
    }

    /// Returns the configured model.
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

/// Opens wire connections to the remote. The pool is generic over this
/// seam; tests substitute a scripted remote.
#[async_trait::async_trait]
pub trait Connect: Send + Sync {
    /// Establishes one wire session. The session serves exactly one
    /// language pair, configured via the setup message the pool session
    /// sends once the remote announces itself.
    async fn connect(&self) -> Result<Box<dyn Wire>>;
}

#[async_trait::async_trait]
impl Connect for TranslateClient {
    async fn connect(&self) -> Result<Box<dyn Wire>> {
        Ok(Box::new(WireSession::connect(self.config.clone()).await?))
    }
}

/// Builder for [`TranslateClient`].
pub struct TranslateClientBuilder {
    api_key: String,
    model: Option<String>,
    ws_url: Option<String>,
    organization: Option<String>,
}

impl TranslateClientBuilder {
    /// Creates a new builder.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
            ws_url: None,
            organization: None,
        }
    }

    /// Sets the model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the WebSocket URL.
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// Sets the organization id.
    pub fn organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<TranslateClient> {
        if self.api_key.is_empty() {
            return Err(Error::InvalidConfig("API key is required".to_string()));
        }

        Ok(TranslateClient {
            config: Arc::new(ClientConfig {
                api_key: self.api_key,
                model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                ws_url: self.ws_url.unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
                organization: self.organization,
            }),
        })
    }
}

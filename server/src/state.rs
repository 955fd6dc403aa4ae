//! Shared application state.

use std::sync::Arc;

use tracing::warn;

use lingcast_orchestrator::{MemoryUsageSink, OrchestratorManager, ProviderSet};
use lingcast_route::Provider;
use lingcast_session::SessionRegistry;
use lingcast_translate::{TranslateClient, TranslationPool};
use lingcast_tts::{ElevenLabsTts, GoogleCloudTts};

use crate::config::Settings;
use crate::entitlements::{EntitlementResolver, StaticResolver};

/// Shared handle to every owned service. Constructed once in `main` and
/// cloned into handlers.
#[derive(Clone)]
pub struct AppState(Arc<StateInner>);

pub struct StateInner {
    pub settings: Settings,
    pub registry: SessionRegistry,
    pub orchestrators: OrchestratorManager,
    pub pool: TranslationPool,
    pub resolver: Arc<dyn EntitlementResolver>,
}

impl std::ops::Deref for AppState {
    type Target = StateInner;

    fn deref(&self) -> &StateInner {
        &self.0
    }
}

impl AppState {
    /// Builds the service graph from settings.
    pub fn build(settings: Settings) -> anyhow::Result<Self> {
        let translation = &settings.translation;
        let api_key = if translation.api_key.is_empty() {
            warn!("translation.api_key is unset; remote translation will fail to connect");
            "unconfigured".to_string()
        } else {
            translation.api_key.clone()
        };
        let mut client = TranslateClient::builder(api_key);
        if !translation.model.is_empty() {
            client = client.model(&translation.model);
        }
        if !translation.ws_url.is_empty() {
            client = client.ws_url(&translation.ws_url);
        }
        let pool = TranslationPool::new(Arc::new(client.build()?), translation.pool_config());

        let mut providers = ProviderSet::new();
        if settings.tts.elevenlabs_api_key.is_empty() {
            warn!("tts.elevenlabs_api_key is unset; elevenlabs routes will fail");
        } else {
            providers.insert(
                Provider::Elevenlabs,
                Arc::new(ElevenLabsTts::new(&settings.tts.elevenlabs_api_key)),
            );
        }
        if settings.tts.google_auth_token.is_empty() {
            warn!("tts.google_auth_token is unset; google routes will fail");
        } else {
            providers.insert(
                Provider::Google,
                Arc::new(GoogleCloudTts::new(&settings.tts.google_auth_token)?),
            );
        }

        let orchestrators = OrchestratorManager::new(
            Arc::new(providers),
            Arc::new(MemoryUsageSink::new()),
            settings.streaming.orchestrator_config()?,
        );

        let resolver = Arc::new(StaticResolver::new(
            settings.entitlements.default.clone(),
            settings.entitlements.tenants.clone(),
        ));

        Ok(Self(Arc::new(StateInner {
            settings,
            registry: SessionRegistry::new(),
            orchestrators,
            pool,
            resolver,
        })))
    }
}

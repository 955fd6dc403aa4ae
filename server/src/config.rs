//! Service configuration.
//!
//! Layering: built-in defaults, then an optional TOML file, then
//! `LINGCAST_`-prefixed environment variables (`__` as the section
//! separator, e.g. `LINGCAST_SERVER__BIND_ADDR`).

use std::collections::HashMap;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use lingcast_orchestrator::OrchestratorConfig;
use lingcast_session::Entitlements;
use lingcast_translate::PoolConfig;
use lingcast_transport::Codec;

/// Root settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub streaming: StreamingSettings,
    pub translation: TranslationSettings,
    pub tts: TtsSettings,
    pub entitlements: EntitlementSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address.
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Master enable flag; when off, attaches and ingress are refused.
    pub enabled: bool,
    /// Codec assumed when a client declares no capabilities.
    pub default_codec: Codec,
    /// Sample rate advertised and requested from providers.
    pub default_sample_rate: u32,
    /// Four-character frame magic.
    pub frame_magic: String,
    /// Jitter-buffer hint advertised in `audio.ready`.
    pub jitter_buffer_ms: u32,
    /// Segment queue capacity per session.
    pub max_queued: usize,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_codec: Codec::Mp3,
            default_sample_rate: 44_100,
            frame_magic: "EXA1".to_string(),
            jitter_buffer_ms: 150,
            max_queued: 10,
        }
    }
}

impl StreamingSettings {
    /// Parses the configured frame magic.
    pub fn magic(&self) -> Result<[u8; 4], ConfigError> {
        let bytes = self.frame_magic.as_bytes();
        <[u8; 4]>::try_from(bytes).map_err(|_| {
            ConfigError::Message(format!(
                "frame_magic must be exactly 4 bytes, got {:?}",
                self.frame_magic
            ))
        })
    }

    /// Builds the orchestrator configuration.
    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig, ConfigError> {
        Ok(OrchestratorConfig {
            max_queued: self.max_queued,
            frame_magic: self.magic()?,
            sample_rate: self.default_sample_rate,
            ..OrchestratorConfig::default()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationSettings {
    /// API key for the remote realtime translation service.
    pub api_key: String,
    /// Model override; empty keeps the client default.
    pub model: String,
    /// Endpoint override; empty keeps the client default.
    pub ws_url: String,
    /// Pool sessions per language pair.
    pub max_concurrent: usize,
    pub partial_timeout_secs: u64,
    pub final_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub heartbeat_secs: u64,
    pub partial_cache_capacity: usize,
    pub partial_cache_ttl_secs: u64,
    pub final_cache_capacity: usize,
    pub final_cache_ttl_secs: u64,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: String::new(),
            ws_url: String::new(),
            max_concurrent: 5,
            partial_timeout_secs: 15,
            final_timeout_secs: 20,
            connect_timeout_secs: 10,
            heartbeat_secs: 30,
            partial_cache_capacity: 200,
            partial_cache_ttl_secs: 120,
            final_cache_capacity: 100,
            final_cache_ttl_secs: 600,
        }
    }
}

impl TranslationSettings {
    /// Builds the pool configuration.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_concurrent: self.max_concurrent,
            partial_timeout: Duration::from_secs(self.partial_timeout_secs),
            final_timeout: Duration::from_secs(self.final_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
            partial_cache_capacity: self.partial_cache_capacity,
            partial_cache_ttl: Duration::from_secs(self.partial_cache_ttl_secs),
            final_cache_capacity: self.final_cache_capacity,
            final_cache_ttl: Duration::from_secs(self.final_cache_ttl_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    /// ElevenLabs API key; empty disables the adapter.
    pub elevenlabs_api_key: String,
    /// Google Cloud bearer token; empty disables the adapter.
    pub google_auth_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitlementSettings {
    /// Snapshot applied when no tenant override matches.
    pub default: Entitlements,
    /// Per-tenant overrides.
    pub tenants: HashMap<String, Entitlements>,
}

impl Settings {
    /// Loads settings from defaults, an optional file and the
    /// environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder
            .add_source(Environment::with_prefix("LINGCAST").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_defaults() {
        let settings = Settings::default();
        assert!(settings.streaming.enabled);
        assert_eq!(settings.streaming.default_codec, Codec::Mp3);
        assert_eq!(settings.streaming.default_sample_rate, 44_100);
        assert_eq!(settings.streaming.frame_magic, "EXA1");
        assert_eq!(settings.streaming.jitter_buffer_ms, 150);
        assert_eq!(settings.streaming.max_queued, 10);
        assert_eq!(settings.translation.max_concurrent, 5);
        assert_eq!(settings.translation.partial_timeout_secs, 15);
        assert_eq!(settings.translation.final_timeout_secs, 20);
        assert_eq!(settings.translation.heartbeat_secs, 30);
        assert_eq!(settings.translation.partial_cache_capacity, 200);
        assert_eq!(settings.translation.final_cache_capacity, 100);
    }

    #[test]
    fn test_magic_parse() {
        let settings = Settings::default();
        assert_eq!(settings.streaming.magic().unwrap(), *b"EXA1");

        let mut bad = settings.streaming;
        bad.frame_magic = "TOOLONG".to_string();
        assert!(bad.magic().is_err());
    }

    #[test]
    fn test_pool_config_mapping() {
        let pool = Settings::default().translation.pool_config();
        assert_eq!(pool.partial_timeout, Duration::from_secs(15));
        assert_eq!(pool.final_timeout, Duration::from_secs(20));
        assert_eq!(pool.max_concurrent, 5);
    }
}

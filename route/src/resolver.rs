//! The route resolver.

use serde::{Deserialize, Serialize};

use lingcast_session::Entitlements;
use lingcast_transport::Codec;

use crate::error::{Result, RouteError};
use crate::locale::normalize_language;
use crate::tier::{Provider, Tier};
use crate::voice::VoiceSelector;

/// Synthesis mode requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMode {
    /// Chunked synthesis for live delivery.
    #[default]
    Streaming,
    /// One-shot synthesis.
    Batch,
}

/// Input to route resolution.
#[derive(Debug, Clone)]
pub struct RouteRequest<'a> {
    /// Explicitly requested tier, when the voice selector does not carry
    /// one.
    pub tier: Option<&'a str>,
    /// Voice selector or bare voice name.
    pub voice: &'a str,
    /// Target language, bare code or BCP-47.
    pub language: &'a str,
    /// Synthesis mode.
    pub mode: RouteMode,
}

/// The concrete decision for one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDecision {
    /// Provider to synthesise with.
    pub provider: Provider,
    /// Voice tier.
    pub tier: Tier,
    /// Concrete voice name or id.
    pub voice_name: String,
    /// Provider model, when the routing table names one.
    pub model: Option<String>,
    /// Normalised BCP-47 language code.
    pub language_code: String,
    /// Codec emitted to listeners.
    pub codec: Codec,
}

/// Resolves a route or fails with a categorised error.
///
/// Steps: parse the voice selector, settle the tier, assert the
/// entitlement gate, normalise the language, pick the codec, and
/// substitute non-streaming voices with their streaming equivalents.
pub fn resolve(req: &RouteRequest<'_>, ent: &Entitlements) -> Result<RouteDecision> {
    let selector = VoiceSelector::parse(req.voice)?;

    let tier = match selector.tier.or_else(|| req.tier.and_then(Tier::parse)) {
        Some(tier) => tier,
        None => {
            // A requested-but-unknown tier is a bad request, a missing one
            // for an ElevenLabs id defaults to the flash tier.
            if let Some(requested) = req.tier {
                return Err(RouteError::InvalidRequest(format!(
                    "unknown tier: {requested}"
                )));
            }
            match selector.provider {
                Some(Provider::Elevenlabs) => Tier::ElevenlabsFlash,
                _ => {
                    return Err(RouteError::InvalidRequest(format!(
                        "tier unspecified for voice {}",
                        req.voice
                    )));
                }
            }
        }
    };

    // An explicit provider must own the tier it is paired with.
    if let Some(provider) = selector.provider
        && provider != tier.provider()
    {
        return Err(RouteError::VoiceNotAllowed(format!(
            "voice {} does not belong to provider {}",
            selector.voice_name,
            tier.provider().as_str()
        )));
    }
    let provider = tier.provider();

    if !ent.allows_tier(tier.as_str()) {
        return Err(RouteError::TierNotAllowed(tier.as_str().to_string()));
    }

    let language_code = normalize_language(req.language)?;
    let model = ent
        .routing
        .get(tier.as_str())
        .and_then(|entry| entry.split_once('/'))
        .map(|(_, model)| model.to_string());

    // Non-streaming voices are substituted in streaming mode: Gemini
    // prebuilt names map onto their Chirp3-HD namesakes with the model
    // downgraded; anything else without a streaming path is refused.
    let mut voice_name = selector.voice_name;
    let mut tier = tier;
    let mut model = model;
    if req.mode == RouteMode::Streaming && !tier.supports_streaming() {
        match tier {
            Tier::Gemini => {
                voice_name = format!("{language_code}-Chirp3-HD-{voice_name}");
                tier = Tier::Chirp3Hd;
                model = None;
            }
            _ => {
                return Err(RouteError::StreamingNotImplemented(voice_name));
            }
        }
    }

    Ok(RouteDecision {
        provider,
        tier,
        codec: provider.listener_codec(tier),
        voice_name,
        model,
        language_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use lingcast_session::{Limits, Subscription, SubscriptionStatus};

    fn entitled(tiers: &[&str]) -> Entitlements {
        Entitlements {
            subscription: Subscription {
                status: SubscriptionStatus::Active,
            },
            limits: Limits::default(),
            routing: tiers
                .iter()
                .map(|t| (t.to_string(), format!("provider/{t}-model")))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_elevenlabs_full_selector() {
        let req = RouteRequest {
            tier: None,
            voice: "elevenlabs:elevenlabs_flash:-:3qAbeQHx5LFO5BGhoRFu",
            language: "es",
            mode: RouteMode::Streaming,
        };
        let decision = resolve(&req, &entitled(&["elevenlabs_flash"])).unwrap();

        assert_eq!(decision.provider, Provider::Elevenlabs);
        assert_eq!(decision.tier, Tier::ElevenlabsFlash);
        assert_eq!(decision.voice_name, "3qAbeQHx5LFO5BGhoRFu");
        assert_eq!(decision.language_code, "es-ES");
        assert_eq!(decision.codec, Codec::Mp3);
    }

    #[test]
    fn test_tier_gate() {
        let req = RouteRequest {
            tier: Some("studio"),
            voice: "en-US-Studio-O",
            language: "en",
            mode: RouteMode::Batch,
        };
        assert_eq!(
            resolve(&req, &entitled(&["standard"])).unwrap_err(),
            RouteError::TierNotAllowed("studio".to_string())
        );
    }

    #[test]
    fn test_gemini_streaming_substitution() {
        let req = RouteRequest {
            tier: None,
            voice: "Puck",
            language: "es",
            mode: RouteMode::Streaming,
        };
        let decision = resolve(&req, &entitled(&["gemini", "chirp3_hd"])).unwrap();

        assert_eq!(decision.tier, Tier::Chirp3Hd);
        assert_eq!(decision.voice_name, "es-ES-Chirp3-HD-Puck");
        assert!(decision.model.is_none());
        assert_eq!(decision.codec, Codec::OpusWebm);
    }

    #[test]
    fn test_gemini_batch_not_substituted() {
        let req = RouteRequest {
            tier: None,
            voice: "Puck",
            language: "es",
            mode: RouteMode::Batch,
        };
        let decision = resolve(&req, &entitled(&["gemini"])).unwrap();
        assert_eq!(decision.tier, Tier::Gemini);
        assert_eq!(decision.voice_name, "Puck");
        assert_eq!(decision.model.as_deref(), Some("gemini-model"));
    }

    #[test]
    fn test_studio_streaming_not_implemented() {
        let req = RouteRequest {
            tier: None,
            voice: "en-US-Studio-O",
            language: "en",
            mode: RouteMode::Streaming,
        };
        assert!(matches!(
            resolve(&req, &entitled(&["studio"])).unwrap_err(),
            RouteError::StreamingNotImplemented(_)
        ));
    }

    #[test]
    fn test_provider_tier_mismatch() {
        let req = RouteRequest {
            tier: None,
            voice: "elevenlabs:neural2:-:whatever12345678901x",
            language: "en",
            mode: RouteMode::Streaming,
        };
        assert!(matches!(
            resolve(&req, &entitled(&["neural2"])).unwrap_err(),
            RouteError::VoiceNotAllowed(_)
        ));
    }

    #[test]
    fn test_bare_elevenlabs_defaults_to_flash() {
        let req = RouteRequest {
            tier: None,
            voice: "3qAbeQHx5LFO5BGhoRFu",
            language: "fr",
            mode: RouteMode::Streaming,
        };
        let decision = resolve(&req, &entitled(&["elevenlabs_flash"])).unwrap();
        assert_eq!(decision.tier, Tier::ElevenlabsFlash);
        assert_eq!(decision.language_code, "fr-FR");
    }
}

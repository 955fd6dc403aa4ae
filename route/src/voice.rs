//! Voice selector parsing.
//!
//! A voice identifier is a colon-separated tuple
//! `provider:tier:engine:voiceName`; any field may be the literal `-`.
//! A bare name (no colons) is resolved through the provider inference
//! table below:
//!
//! | pattern | provider / tier |
//! |---|---|
//! | `xx-XX-Neural2-*` | google / neural2 |
//! | `xx-XX-Wavenet-*` | google / wavenet |
//! | `xx-XX-Studio-*` | google / studio |
//! | `xx-XX-Standard-*` | google / standard |
//! | `xx-XX-Chirp3-HD-*` | google / chirp3_hd |
//! | prebuilt name (Puck, Charon, Kore, ...) | google / gemini |
//! | 20-char alphanumeric id | elevenlabs / (tier from request) |

use crate::error::{Result, RouteError};
use crate::tier::{Provider, Tier};

/// Gemini prebuilt voice names recognised as bare identifiers.
const GEMINI_VOICES: [&str; 8] = [
    "Puck", "Charon", "Kore", "Fenrir", "Aoede", "Leda", "Orus", "Zephyr",
];

/// A parsed voice request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSelector {
    /// Explicit or inferred provider.
    pub provider: Option<Provider>,
    /// Explicit or inferred tier.
    pub tier: Option<Tier>,
    /// Engine field, rarely used; `-` parses to `None`.
    pub engine: Option<String>,
    /// The concrete voice name or id.
    pub voice_name: String,
}

impl VoiceSelector {
    /// Parses a voice identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RouteError::InvalidRequest("empty voice request".into()));
        }

        let parts: Vec<&str> = raw.split(':').collect();
        match parts.len() {
            1 => Self::infer_bare(raw),
            4 => {
                let field = |s: &str| (s != "-").then(|| s.to_string());
                let provider = match field(parts[0]) {
                    Some(p) => Some(Provider::parse(&p).ok_or_else(|| {
                        RouteError::InvalidRequest(format!("unknown provider: {p}"))
                    })?),
                    None => None,
                };
                let tier = match field(parts[1]) {
                    Some(t) => Some(
                        Tier::parse(&t)
                            .ok_or_else(|| RouteError::InvalidRequest(format!("unknown tier: {t}")))?,
                    ),
                    None => None,
                };
                let voice_name = field(parts[3]).ok_or_else(|| {
                    RouteError::InvalidRequest(format!("voice name missing in {raw}"))
                })?;

                Ok(Self {
                    provider,
                    tier,
                    engine: field(parts[2]),
                    voice_name,
                })
            }
            n => Err(RouteError::InvalidRequest(format!(
                "voice selector has {n} fields, expected 1 or 4: {raw}"
            ))),
        }
    }

    fn infer_bare(name: &str) -> Result<Self> {
        // Google voice names embed their locale and model family:
        // "es-ES-Neural2-A", "en-US-Chirp3-HD-Puck".
        if let Some(tier) = google_tier_from_name(name) {
            return Ok(Self {
                provider: Some(Provider::Google),
                tier: Some(tier),
                engine: None,
                voice_name: name.to_string(),
            });
        }

        if GEMINI_VOICES.contains(&name) {
            return Ok(Self {
                provider: Some(Provider::Google),
                tier: Some(Tier::Gemini),
                engine: None,
                voice_name: name.to_string(),
            });
        }

        // ElevenLabs voice ids are opaque 20-character alphanumerics.
        if name.len() == 20 && name.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Ok(Self {
                provider: Some(Provider::Elevenlabs),
                tier: None,
                engine: None,
                voice_name: name.to_string(),
            });
        }

        Err(RouteError::InvalidRequest(format!(
            "cannot infer provider for voice: {name}"
        )))
    }
}

fn google_tier_from_name(name: &str) -> Option<Tier> {
    let bytes = name.as_bytes();
    let has_locale_prefix = bytes.len() > 6
        && bytes[0].is_ascii_lowercase()
        && bytes[1].is_ascii_lowercase()
        && bytes[2] == b'-'
        && bytes[3].is_ascii_uppercase()
        && bytes[4].is_ascii_uppercase()
        && bytes[5] == b'-';
    if !has_locale_prefix {
        return None;
    }

    let family = &name[6..];
    if family.starts_with("Neural2-") {
        Some(Tier::Neural2)
    } else if family.starts_with("Wavenet-") {
        Some(Tier::Wavenet)
    } else if family.starts_with("Studio-") {
        Some(Tier::Studio)
    } else if family.starts_with("Standard-") {
        Some(Tier::Standard)
    } else if family.starts_with("Chirp3-HD-") {
        Some(Tier::Chirp3Hd)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_selector() {
        let v = VoiceSelector::parse("elevenlabs:elevenlabs_flash:-:3qAbeQHx5LFO5BGhoRFu").unwrap();
        assert_eq!(v.provider, Some(Provider::Elevenlabs));
        assert_eq!(v.tier, Some(Tier::ElevenlabsFlash));
        assert!(v.engine.is_none());
        assert_eq!(v.voice_name, "3qAbeQHx5LFO5BGhoRFu");
    }

    #[test]
    fn test_wildcard_fields() {
        let v = VoiceSelector::parse("-:-:-:es-ES-Neural2-A").unwrap();
        assert!(v.provider.is_none());
        assert!(v.tier.is_none());
        assert_eq!(v.voice_name, "es-ES-Neural2-A");
    }

    #[test]
    fn test_bare_google_names() {
        let v = VoiceSelector::parse("es-ES-Neural2-A").unwrap();
        assert_eq!(v.provider, Some(Provider::Google));
        assert_eq!(v.tier, Some(Tier::Neural2));

        let v = VoiceSelector::parse("en-US-Chirp3-HD-Puck").unwrap();
        assert_eq!(v.tier, Some(Tier::Chirp3Hd));
    }

    #[test]
    fn test_bare_gemini_name() {
        let v = VoiceSelector::parse("Puck").unwrap();
        assert_eq!(v.provider, Some(Provider::Google));
        assert_eq!(v.tier, Some(Tier::Gemini));
    }

    #[test]
    fn test_bare_elevenlabs_id() {
        let v = VoiceSelector::parse("3qAbeQHx5LFO5BGhoRFu").unwrap();
        assert_eq!(v.provider, Some(Provider::Elevenlabs));
        assert!(v.tier.is_none());
    }

    #[test]
    fn test_unparseable() {
        assert!(VoiceSelector::parse("").is_err());
        assert!(VoiceSelector::parse("a:b").is_err());
        assert!(VoiceSelector::parse("who-is-this").is_err());
        assert!(VoiceSelector::parse("acme:standard:-:v1").is_err());
        assert!(VoiceSelector::parse("google:shiny_new:-:v1").is_err());
    }

    #[test]
    fn test_missing_voice_name() {
        assert!(matches!(
            VoiceSelector::parse("google:neural2:-:-"),
            Err(RouteError::InvalidRequest(_))
        ));
    }
}

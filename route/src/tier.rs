//! Providers and voice tiers.

use serde::{Deserialize, Serialize};

use lingcast_transport::Codec;

/// A TTS provider the core can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Google Cloud Text-to-Speech.
    Google,
    /// ElevenLabs.
    Elevenlabs,
}

impl Provider {
    /// Returns the provider as a short string identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Elevenlabs => "elevenlabs",
        }
    }

    /// Parses a provider prefix from a voice selector.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "google" => Some(Provider::Google),
            "elevenlabs" => Some(Provider::Elevenlabs),
            _ => None,
        }
    }

    /// The codec emitted to listeners for this provider's streams.
    ///
    /// Providers whose native wire format is Opus-in-Ogg are rewrapped to
    /// Opus-in-WebM on the way out; everything else emits MP3.
    pub fn listener_codec(&self, tier: Tier) -> Codec {
        match (self, tier) {
            (Provider::Google, Tier::Chirp3Hd) | (Provider::Google, Tier::Gemini) => {
                Codec::OpusWebm
            }
            _ => Codec::Mp3,
        }
    }
}

/// A grouping of voices by capability and price, gated by entitlements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Standard,
    Neural2,
    Wavenet,
    Studio,
    Chirp3Hd,
    Gemini,
    ElevenlabsFlash,
    ElevenlabsTurbo,
    ElevenlabsMultilingual,
}

impl Tier {
    /// Returns the tier as its wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Standard => "standard",
            Tier::Neural2 => "neural2",
            Tier::Wavenet => "wavenet",
            Tier::Studio => "studio",
            Tier::Chirp3Hd => "chirp3_hd",
            Tier::Gemini => "gemini",
            Tier::ElevenlabsFlash => "elevenlabs_flash",
            Tier::ElevenlabsTurbo => "elevenlabs_turbo",
            Tier::ElevenlabsMultilingual => "elevenlabs_multilingual",
        }
    }

    /// Parses a tier name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(Tier::Standard),
            "neural2" => Some(Tier::Neural2),
            "wavenet" => Some(Tier::Wavenet),
            "studio" => Some(Tier::Studio),
            "chirp3_hd" => Some(Tier::Chirp3Hd),
            "gemini" => Some(Tier::Gemini),
            "elevenlabs_flash" => Some(Tier::ElevenlabsFlash),
            "elevenlabs_turbo" => Some(Tier::ElevenlabsTurbo),
            "elevenlabs_multilingual" => Some(Tier::ElevenlabsMultilingual),
            _ => None,
        }
    }

    /// The provider this tier belongs to.
    pub fn provider(&self) -> Provider {
        match self {
            Tier::Standard
            | Tier::Neural2
            | Tier::Wavenet
            | Tier::Studio
            | Tier::Chirp3Hd
            | Tier::Gemini => Provider::Google,
            Tier::ElevenlabsFlash | Tier::ElevenlabsTurbo | Tier::ElevenlabsMultilingual => {
                Provider::Elevenlabs
            }
        }
    }

    /// Whether voices in this tier synthesise as a chunk stream.
    pub fn supports_streaming(&self) -> bool {
        !matches!(self, Tier::Gemini | Tier::Studio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_roundtrip() {
        for tier in [
            Tier::Standard,
            Tier::Neural2,
            Tier::Wavenet,
            Tier::Studio,
            Tier::Chirp3Hd,
            Tier::Gemini,
            Tier::ElevenlabsFlash,
            Tier::ElevenlabsTurbo,
            Tier::ElevenlabsMultilingual,
        ] {
            assert_eq!(Tier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(Tier::parse("premium"), None);
    }

    #[test]
    fn test_listener_codec_table() {
        assert_eq!(
            Provider::Google.listener_codec(Tier::Chirp3Hd),
            Codec::OpusWebm
        );
        assert_eq!(Provider::Google.listener_codec(Tier::Neural2), Codec::Mp3);
        assert_eq!(
            Provider::Elevenlabs.listener_codec(Tier::ElevenlabsFlash),
            Codec::Mp3
        );
    }
}

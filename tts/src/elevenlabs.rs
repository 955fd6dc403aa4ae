//! HTTP-streaming TTS adapter (ElevenLabs wire shape).
//!
//! One POST per synthesis; the response body is the audio chunk stream.
//! Cancellation drops the transfer; time-to-first-byte is recorded when
//! the first body chunk arrives.

use futures::StreamExt;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::{AudioEncoding, SynthesisRequest, TtsProvider, TtsStream, stream_pair};

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";

/// Default synthesis model.
pub const DEFAULT_MODEL: &str = "eleven_flash_v2_5";

/// ElevenLabs streaming TTS adapter.
pub struct ElevenLabsTts {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ElevenLabsTts {
    /// Creates an adapter with the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Overrides the API endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Maps the requested encoding to the provider's output format
    /// parameter.
    fn output_format(encoding: AudioEncoding, sample_rate: u32) -> &'static str {
        match (encoding, sample_rate) {
            (AudioEncoding::Mp3, 22050) => "mp3_22050_32",
            (AudioEncoding::Mp3, _) => "mp3_44100_128",
            (AudioEncoding::OggOpus | AudioEncoding::WebmOpus, _) => "opus_48000_64",
            (AudioEncoding::Linear16, 16000) => "pcm_16000",
            (AudioEncoding::Linear16, _) => "pcm_44100",
        }
    }
}

#[async_trait::async_trait]
impl TtsProvider for ElevenLabsTts {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    async fn synthesize(&self, req: &SynthesisRequest) -> Result<TtsStream> {
        let url = format!(
            "{}/v1/text-to-speech/{}/stream?output_format={}",
            self.base_url,
            req.voice_name,
            Self::output_format(req.encoding, req.sample_rate),
        );

        let body = json!({
            "text": req.text,
            "model_id": req.model.as_deref().unwrap_or(DEFAULT_MODEL),
            "language_code": bare_language(&req.language_code),
        });

        let response = self
            .http
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Rejected(format!("{status}: {detail}")));
        }

        let (sender, stream) = stream_pair();
        let voice = req.voice_name.clone();
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let cancel = sender.cancel_token();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(voice, "synthesis cancelled, dropping transfer");
                        break;
                    }
                    item = body.next() => match item {
                        Some(Ok(chunk)) => {
                            if sender.send(chunk).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(voice, "stream body error: {e}");
                            sender.fail(Error::Http(e)).await;
                            break;
                        }
                        None => break,
                    },
                }
            }
        });

        Ok(stream)
    }
}

/// The provider wants the bare language code, not the full locale.
fn bare_language(locale: &str) -> &str {
    locale.split('-').next().unwrap_or(locale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_table() {
        assert_eq!(
            ElevenLabsTts::output_format(AudioEncoding::Mp3, 44100),
            "mp3_44100_128"
        );
        assert_eq!(
            ElevenLabsTts::output_format(AudioEncoding::OggOpus, 48000),
            "opus_48000_64"
        );
        assert_eq!(
            ElevenLabsTts::output_format(AudioEncoding::Linear16, 16000),
            "pcm_16000"
        );
    }

    #[test]
    fn test_bare_language() {
        assert_eq!(bare_language("es-ES"), "es");
        assert_eq!(bare_language("cmn-CN"), "cmn");
        assert_eq!(bare_language("fr"), "fr");
    }
}

//! gRPC bidirectional TTS adapter (Google Cloud wire shape).
//!
//! Streaming synthesis sends a config frame and a text frame, half-closes,
//! and reads audio chunks until the server ends the stream. Voices
//! without a streaming family fall back to the unary call, exposed as a
//! one-shot chunk stream. When the caller asks for WebM output the
//! provider's Ogg-Opus is rewrapped by packet copy, never re-encoded.

use bytes::Bytes;
use http::uri::PathAndQuery;
use tonic::codec::ProstCodec;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, ClientTlsConfig};
use tracing::{debug, warn};

use lingcast_audio::{ContainerFormat, Rewrap, rewrapper_for};

use crate::error::{Error, Result};
use crate::{AudioEncoding, SynthesisRequest, TtsProvider, TtsStream, TtsStreamSender, stream_pair};

/// Default API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://texttospeech.googleapis.com";

const STREAMING_METHOD: &str = "/google.cloud.texttospeech.v1.TextToSpeech/StreamingSynthesize";
const UNARY_METHOD: &str = "/google.cloud.texttospeech.v1.TextToSpeech/SynthesizeSpeech";

/// Hand-written subset of the provider's protobuf surface.
pub mod proto {
    /// Output audio encodings.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
    #[repr(i32)]
    pub enum AudioEncoding {
        Unspecified = 0,
        Linear16 = 1,
        Mp3 = 2,
        OggOpus = 3,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct VoiceSelectionParams {
        #[prost(string, tag = "1")]
        pub language_code: String,
        #[prost(string, tag = "2")]
        pub name: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct StreamingAudioConfig {
        #[prost(enumeration = "AudioEncoding", tag = "1")]
        pub audio_encoding: i32,
        #[prost(int32, tag = "2")]
        pub sample_rate_hertz: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct StreamingSynthesizeConfig {
        #[prost(message, optional, tag = "1")]
        pub voice: Option<VoiceSelectionParams>,
        #[prost(message, optional, tag = "4")]
        pub streaming_audio_config: Option<StreamingAudioConfig>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct StreamingSynthesisInput {
        #[prost(oneof = "streaming_synthesis_input::InputSource", tags = "1")]
        pub input_source: Option<streaming_synthesis_input::InputSource>,
    }

    pub mod streaming_synthesis_input {
        #[derive(Clone, PartialEq, prost::Oneof)]
        pub enum InputSource {
            #[prost(string, tag = "1")]
            Text(String),
        }
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct StreamingSynthesizeRequest {
        #[prost(oneof = "streaming_synthesize_request::StreamingRequest", tags = "1, 2")]
        pub streaming_request: Option<streaming_synthesize_request::StreamingRequest>,
    }

    pub mod streaming_synthesize_request {
        #[derive(Clone, PartialEq, prost::Oneof)]
        pub enum StreamingRequest {
            #[prost(message, tag = "1")]
            StreamingConfig(super::StreamingSynthesizeConfig),
            #[prost(message, tag = "2")]
            Input(super::StreamingSynthesisInput),
        }
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct StreamingSynthesizeResponse {
        #[prost(bytes = "vec", tag = "1")]
        pub audio_content: Vec<u8>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SynthesisInput {
        #[prost(oneof = "synthesis_input::InputSource", tags = "1")]
        pub input_source: Option<synthesis_input::InputSource>,
    }

    pub mod synthesis_input {
        #[derive(Clone, PartialEq, prost::Oneof)]
        pub enum InputSource {
            #[prost(string, tag = "1")]
            Text(String),
        }
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct AudioConfig {
        #[prost(enumeration = "AudioEncoding", tag = "1")]
        pub audio_encoding: i32,
        #[prost(int32, tag = "5")]
        pub sample_rate_hertz: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SynthesizeSpeechRequest {
        #[prost(message, optional, tag = "1")]
        pub input: Option<SynthesisInput>,
        #[prost(message, optional, tag = "2")]
        pub voice: Option<VoiceSelectionParams>,
        #[prost(message, optional, tag = "3")]
        pub audio_config: Option<AudioConfig>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SynthesizeSpeechResponse {
        #[prost(bytes = "vec", tag = "1")]
        pub audio_content: Vec<u8>,
    }
}

/// Google Cloud TTS adapter.
pub struct GoogleCloudTts {
    channel: Channel,
    auth_token: String,
}

impl GoogleCloudTts {
    /// Creates an adapter against the default endpoint. The connection
    /// is established lazily on first use.
    pub fn new(auth_token: impl Into<String>) -> Result<Self> {
        Self::with_endpoint(auth_token, DEFAULT_ENDPOINT)
    }

    /// Creates an adapter against a custom endpoint.
    pub fn with_endpoint(auth_token: impl Into<String>, endpoint: &str) -> Result<Self> {
        let channel = Channel::from_shared(endpoint.to_string())
            .map_err(|e| Error::InvalidConfig(format!("bad endpoint: {e}")))?
            .tls_config(ClientTlsConfig::new().with_native_roots())?
            .connect_lazy();
        Ok(Self {
            channel,
            auth_token: auth_token.into(),
        })
    }

    /// Whether the voice family supports server-side streaming.
    pub fn voice_supports_streaming(voice_name: &str) -> bool {
        voice_name.contains("Chirp3-HD")
    }

    fn wire_encoding(encoding: AudioEncoding) -> proto::AudioEncoding {
        match encoding {
            AudioEncoding::Mp3 => proto::AudioEncoding::Mp3,
            AudioEncoding::OggOpus | AudioEncoding::WebmOpus => proto::AudioEncoding::OggOpus,
            AudioEncoding::Linear16 => proto::AudioEncoding::Linear16,
        }
    }

    fn rewrapper(encoding: AudioEncoding) -> Option<Box<dyn Rewrap>> {
        match encoding {
            AudioEncoding::WebmOpus => {
                rewrapper_for(ContainerFormat::OggOpus, ContainerFormat::WebmOpus)
            }
            _ => None,
        }
    }

    fn authorized<T>(&self, message: T) -> Result<tonic::Request<T>> {
        let mut request = tonic::Request::new(message);
        let value = MetadataValue::try_from(format!("Bearer {}", self.auth_token))
            .map_err(|e| Error::InvalidConfig(format!("bad auth token: {e}")))?;
        request.metadata_mut().insert("authorization", value);
        Ok(request)
    }

    async fn synthesize_streaming(&self, req: &SynthesisRequest) -> Result<TtsStream> {
        let config = proto::StreamingSynthesizeRequest {
            streaming_request: Some(
                proto::streaming_synthesize_request::StreamingRequest::StreamingConfig(
                    proto::StreamingSynthesizeConfig {
                        voice: Some(proto::VoiceSelectionParams {
                            language_code: req.language_code.clone(),
                            name: req.voice_name.clone(),
                        }),
                        streaming_audio_config: Some(proto::StreamingAudioConfig {
                            audio_encoding: Self::wire_encoding(req.encoding) as i32,
                            sample_rate_hertz: req.sample_rate as i32,
                        }),
                    },
                ),
            ),
        };
        let input = proto::StreamingSynthesizeRequest {
            streaming_request: Some(proto::streaming_synthesize_request::StreamingRequest::Input(
                proto::StreamingSynthesisInput {
                    input_source: Some(proto::streaming_synthesis_input::InputSource::Text(
                        req.text.clone(),
                    )),
                },
            )),
        };

        // Config then text, then half-close.
        let outbound = futures::stream::iter(vec![config, input]);
        let request = self.authorized(outbound)?;

        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready().await?;
        let codec: ProstCodec<proto::StreamingSynthesizeRequest, proto::StreamingSynthesizeResponse> =
            ProstCodec::default();
        let response = grpc
            .streaming(request, PathAndQuery::from_static(STREAMING_METHOD), codec)
            .await?;
        let mut inbound = response.into_inner();

        let (sender, stream) = stream_pair();
        let mut rewrap = Self::rewrapper(req.encoding);
        let voice = req.voice_name.clone();
        tokio::spawn(async move {
            let cancel = sender.cancel_token();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(voice, "synthesis cancelled, dropping grpc stream");
                        return;
                    }
                    message = inbound.message() => match message {
                        Ok(Some(chunk)) => {
                            if forward(&sender, &mut rewrap, chunk.audio_content).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(status) => {
                            warn!(voice, "grpc stream error: {status}");
                            sender.fail(Error::Grpc(status)).await;
                            return;
                        }
                    },
                }
            }

            if let Some(ref mut rewrap) = rewrap {
                match rewrap.finish() {
                    Ok(tail) if !tail.is_empty() => {
                        let _ = sender.send(Bytes::from(tail)).await;
                    }
                    Ok(_) => {}
                    Err(e) => sender.fail(Error::Rewrap(e)).await,
                }
            }
        });

        Ok(stream)
    }

    async fn synthesize_unary(&self, req: &SynthesisRequest) -> Result<TtsStream> {
        let message = proto::SynthesizeSpeechRequest {
            input: Some(proto::SynthesisInput {
                input_source: Some(proto::synthesis_input::InputSource::Text(req.text.clone())),
            }),
            voice: Some(proto::VoiceSelectionParams {
                language_code: req.language_code.clone(),
                name: req.voice_name.clone(),
            }),
            audio_config: Some(proto::AudioConfig {
                audio_encoding: Self::wire_encoding(req.encoding) as i32,
                sample_rate_hertz: req.sample_rate as i32,
            }),
        };
        let request = self.authorized(message)?;

        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready().await?;
        let codec: ProstCodec<proto::SynthesizeSpeechRequest, proto::SynthesizeSpeechResponse> =
            ProstCodec::default();
        let response = grpc
            .unary(request, PathAndQuery::from_static(UNARY_METHOD), codec)
            .await?;
        let audio = response.into_inner().audio_content;

        // A one-shot result exposed through the same chunk contract.
        let (sender, stream) = stream_pair();
        let mut rewrap = Self::rewrapper(req.encoding);
        tokio::spawn(async move {
            if sender.is_cancelled() {
                return;
            }
            if forward(&sender, &mut rewrap, audio).await.is_err() {
                return;
            }
            if let Some(ref mut rewrap) = rewrap {
                match rewrap.finish() {
                    Ok(tail) if !tail.is_empty() => {
                        let _ = sender.send(Bytes::from(tail)).await;
                    }
                    Ok(_) => {}
                    Err(e) => sender.fail(Error::Rewrap(e)).await,
                }
            }
        });
        Ok(stream)
    }
}

/// Pushes one provider chunk through the optional rewrapper and on to
/// the consumer.
async fn forward(
    sender: &TtsStreamSender,
    rewrap: &mut Option<Box<dyn Rewrap>>,
    audio: Vec<u8>,
) -> Result<()> {
    match rewrap {
        Some(rewrap) => match rewrap.push(&audio) {
            Ok(out) if out.is_empty() => Ok(()),
            Ok(out) => sender.send(Bytes::from(out)).await,
            Err(e) => {
                sender.fail(Error::Rewrap(e)).await;
                Err(Error::Cancelled)
            }
        },
        None => sender.send(Bytes::from(audio)).await,
    }
}

#[async_trait::async_trait]
impl TtsProvider for GoogleCloudTts {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn synthesize(&self, req: &SynthesisRequest) -> Result<TtsStream> {
        if Self::voice_supports_streaming(&req.voice_name) {
            self.synthesize_streaming(req).await
        } else {
            debug!(voice = req.voice_name, "voice has no streaming family, using unary call");
            self.synthesize_unary(req).await
        }
    }
}

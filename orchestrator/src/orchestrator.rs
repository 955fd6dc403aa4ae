//! The per-session speech orchestrator.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lingcast_route::{Provider, RouteDecision, RouteMode, RouteRequest, resolve};
use lingcast_session::{CommittedSegment, QueuedSegment, Session, assert_subscription_active};
use lingcast_transport::{
    AudioFrame, Codec, ErrorCode, FrameCodec, FrameMeta, RoutingInfo, ServerMessage,
};
use lingcast_tts::{AudioEncoding, SynthesisRequest, TtsProvider};

use crate::usage::{UsageEvent, UsageSink, usage_key};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Queue capacity; the oldest segment is evicted beyond it.
    pub max_queued: usize,
    /// Frame magic used on the wire.
    pub frame_magic: [u8; 4],
    /// Sample rate requested from providers.
    pub sample_rate: u32,
    /// Characters of segment text surfaced in `audio.start`.
    pub text_preview_len: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_queued: 10,
            frame_magic: lingcast_transport::DEFAULT_MAGIC,
            sample_rate: 44_100,
            text_preview_len: 60,
        }
    }
}

/// The provider adapters available for routing.
#[derive(Default)]
pub struct ProviderSet {
    providers: HashMap<Provider, Arc<dyn TtsProvider>>,
}

impl ProviderSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the adapter for a provider.
    pub fn insert(&mut self, provider: Provider, adapter: Arc<dyn TtsProvider>) {
        self.providers.insert(provider, adapter);
    }

    /// Looks up the adapter for a provider.
    pub fn get(&self, provider: Provider) -> Option<Arc<dyn TtsProvider>> {
        self.providers.get(&provider).cloned()
    }
}

/// A segment admitted to the queue with its resolved route.
struct PendingSynthesis {
    queued: QueuedSegment,
    decision: RouteDecision,
}

struct Inner {
    queue: VecDeque<PendingSynthesis>,
    segment_counter: u64,
    is_streaming: bool,
    is_shutdown: bool,
}

struct CurrentSegment {
    segment_id: String,
    cancel: CancellationToken,
}

/// One orchestrator per session. Segments are admitted (entitlements and
/// route resolved, both pure) at enqueue and synthesised strictly in
/// order by a single worker.
pub struct SpeechOrchestrator {
    session: Arc<Session>,
    stream_id: String,
    providers: Arc<ProviderSet>,
    usage: Arc<dyn UsageSink>,
    config: OrchestratorConfig,
    codec: FrameCodec,
    inner: Mutex<Inner>,
    current: Mutex<Option<CurrentSegment>>,
}

impl SpeechOrchestrator {
    /// Creates an orchestrator bound to a session.
    pub fn new(
        session: Arc<Session>,
        providers: Arc<ProviderSet>,
        usage: Arc<dyn UsageSink>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        let stream_id = format!(
            "{}:{}",
            session.session_id(),
            chrono::Utc::now().timestamp_millis()
        );
        let codec = FrameCodec::new(config.frame_magic);
        Arc::new(Self {
            session,
            stream_id,
            providers,
            usage,
            config,
            codec,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                segment_counter: 0,
                is_streaming: false,
                is_shutdown: false,
            }),
            current: Mutex::new(None),
        })
    }

    /// The stream id carried on this session's frames.
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Current queue depth.
    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// True while the worker is draining the queue.
    pub fn is_streaming(&self) -> bool {
        self.inner.lock().is_streaming
    }

    /// Admits one committed segment: entitlement gate and route
    /// resolution run here (pure, no I/O); a failure surfaces
    /// `audio.error` and the segment is not enqueued. A full queue
    /// evicts its oldest entry.
    pub fn enqueue_segment(self: &Arc<Self>, segment: CommittedSegment) {
        let ent = self.session.entitlements();
        let lang = segment.target_lang.clone();

        if let Err(e) = assert_subscription_active(ent) {
            self.admission_error(&lang, e.error_code(), &e.to_string());
            return;
        }
        let request = RouteRequest {
            tier: None,
            voice: &segment.voice_request,
            language: &segment.target_lang,
            mode: RouteMode::Streaming,
        };
        let decision = match resolve(&request, ent) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    session_id = self.session.session_id(),
                    voice = segment.voice_request,
                    "route resolution failed: {e}"
                );
                self.admission_error(&lang, e.error_code(), &e.to_string());
                return;
            }
        };

        let mut inner = self.inner.lock();
        if inner.is_shutdown {
            debug!(
                session_id = self.session.session_id(),
                seq_id = segment.seq_id,
                "dropping segment after shutdown"
            );
            return;
        }
        if inner.queue.len() >= self.config.max_queued {
            if let Some(evicted) = inner.queue.pop_front() {
                warn!(
                    segment_id = evicted.queued.segment_id,
                    "queue full, evicting oldest segment"
                );
            }
        }

        inner.segment_counter += 1;
        let queued = QueuedSegment {
            segment_id: QueuedSegment::segment_id_for(
                self.session.session_id(),
                inner.segment_counter,
            ),
            version: 1,
            enqueued_at: Instant::now(),
            segment,
        };
        inner.queue.push_back(PendingSynthesis { queued, decision });

        if !inner.is_streaming {
            inner.is_streaming = true;
            let this = self.clone();
            tokio::spawn(async move { this.process_queue().await });
        }
    }

    /// Cancels the in-flight segment (best effort), drains the queue and
    /// tells listeners.
    pub fn cancel(&self, reason: &str) {
        let (segment_id, token) = {
            let current = self.current.lock();
            (
                current.as_ref().map(|c| c.segment_id.clone()),
                current.as_ref().map(|c| c.cancel.clone()),
            )
        };
        if let Some(token) = token {
            token.cancel();
        }

        self.session.hub().broadcast_control(
            &ServerMessage::Cancel {
                stream_id: self.stream_id.clone(),
                reason: reason.to_string(),
                segment_id,
            },
            None,
        );

        let dropped = {
            let mut inner = self.inner.lock();
            let dropped = inner.queue.len();
            inner.queue.clear();
            dropped
        };
        info!(
            session_id = self.session.session_id(),
            dropped, "orchestrator cancelled: {reason}"
        );
    }

    /// Shuts the orchestrator down: cancels the current segment and
    /// refuses further enqueues.
    pub fn shutdown(&self) {
        self.inner.lock().is_shutdown = true;
        self.cancel("session_end");
    }

    fn admission_error(&self, lang: &str, error_code: ErrorCode, message: &str) {
        self.session.hub().broadcast_control(
            &ServerMessage::Error {
                stream_id: self.stream_id.clone(),
                error_code,
                message: message.to_string(),
            },
            Some(lang),
        );
    }

    async fn process_queue(self: Arc<Self>) {
        loop {
            let next = {
                let mut inner = self.inner.lock();
                if inner.is_shutdown {
                    inner.is_streaming = false;
                    return;
                }
                match inner.queue.pop_front() {
                    Some(pending) => pending,
                    None => {
                        inner.is_streaming = false;
                        return;
                    }
                }
            };
            self.process_segment(next).await;
        }
    }

    /// Synthesises one segment. Every failure is confined to this
    /// segment; the worker moves on regardless.
    async fn process_segment(&self, pending: PendingSynthesis) {
        let PendingSynthesis { queued, decision } = pending;
        let lang = queued.segment.target_lang.clone();
        let hub = self.session.hub();

        // Delivery membership is pinned at segment start: a language
        // switch affects the next segment, never chunks already
        // streaming.
        let recipients = hub.snapshot(Some(&lang));

        let Some(provider) = self.providers.get(decision.provider) else {
            error!(provider = decision.provider.as_str(), "no adapter registered");
            hub.send_control_to(
                &recipients,
                &self.error_message(ErrorCode::StreamingError, "no adapter for provider"),
            );
            return;
        };

        let routing = RoutingInfo {
            provider: decision.provider.as_str().to_string(),
            tier: decision.tier.as_str().to_string(),
            ttfb_ms: None,
        };
        hub.send_control_to(
            &recipients,
            &ServerMessage::Start {
                stream_id: self.stream_id.clone(),
                segment_id: queued.segment_id.clone(),
                version: queued.version,
                seq_id: queued.segment.seq_id,
                lang: lang.clone(),
                voice_id: decision.voice_name.clone(),
                text_preview: preview(&queued.segment.text, self.config.text_preview_len),
                codec: decision.codec,
                routing: routing.clone(),
            },
        );

        let request = SynthesisRequest {
            text: queued.segment.text.clone(),
            voice_name: decision.voice_name.clone(),
            language_code: decision.language_code.clone(),
            model: decision.model.clone(),
            encoding: encoding_for(decision.codec),
            sample_rate: self.config.sample_rate,
        };

        let mut stream = match provider.synthesize(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(segment_id = queued.segment_id, "synthesis failed to start: {e}");
                hub.send_control_to(
                    &recipients,
                    &self.error_message(ErrorCode::StreamingError, &e.to_string()),
                );
                return;
            }
        };
        *self.current.lock() = Some(CurrentSegment {
            segment_id: queued.segment_id.clone(),
            cancel: stream.cancel_token(),
        });

        let mut chunk_index: u32 = 0;
        let mut ttfb: Option<u64> = None;
        let mut failed = false;

        while let Some(item) = stream.next_chunk().await {
            match item {
                Ok(chunk) => {
                    if ttfb.is_none() {
                        ttfb = stream.time_to_first_byte_ms();
                        hub.send_control_to(
                            &recipients,
                            &ServerMessage::Routing {
                                stream_id: self.stream_id.clone(),
                                segment_id: queued.segment_id.clone(),
                                routing: RoutingInfo {
                                    ttfb_ms: ttfb,
                                    ..routing.clone()
                                },
                            },
                        );
                    }

                    let frame = AudioFrame {
                        meta: FrameMeta {
                            stream_id: self.stream_id.clone(),
                            segment_id: queued.segment_id.clone(),
                            version: queued.version,
                            chunk_index,
                            is_last: false,
                        },
                        payload: chunk,
                    };
                    match self.codec.encode(&frame) {
                        Ok(bytes) => hub.send_audio_to(&recipients, &bytes),
                        Err(e) => error!(segment_id = queued.segment_id, "frame encode: {e}"),
                    }
                    chunk_index += 1;
                }
                Err(e) => {
                    warn!(segment_id = queued.segment_id, "provider error mid-stream: {e}");
                    hub.send_control_to(
                        &recipients,
                        &self.error_message(ErrorCode::StreamingError, &e.to_string()),
                    );
                    failed = true;
                    break;
                }
            }
        }

        let cancelled = self
            .current
            .lock()
            .take()
            .map(|c| c.cancel.is_cancelled())
            .unwrap_or(false);
        if failed || cancelled {
            // No terminal frame, no end, no usage. `audio.cancel` or
            // `audio.error` already told the listeners what happened.
            return;
        }

        let last = AudioFrame::last(
            &self.stream_id,
            &queued.segment_id,
            queued.version,
            chunk_index,
        );
        match self.codec.encode(&last) {
            Ok(bytes) => hub.send_audio_to(&recipients, &bytes),
            Err(e) => error!(segment_id = queued.segment_id, "frame encode: {e}"),
        }
        hub.send_control_to(
            &recipients,
            &ServerMessage::End {
                stream_id: self.stream_id.clone(),
                segment_id: queued.segment_id.clone(),
                version: queued.version,
            },
        );

        let event = UsageEvent {
            key: usage_key(
                self.session.session_id(),
                &queued.segment_id,
                &queued.segment.text,
            ),
            session_id: self.session.session_id().to_string(),
            segment_id: queued.segment_id.clone(),
            provider: decision.provider.as_str().to_string(),
            tier: decision.tier.as_str().to_string(),
            characters: queued.segment.text.chars().count(),
            ttfb_ms: ttfb,
        };
        if let Err(e) = self.usage.record(event).await {
            warn!(segment_id = queued.segment_id, "usage recording failed: {e}");
        }
    }

    fn error_message(&self, error_code: ErrorCode, message: &str) -> ServerMessage {
        ServerMessage::Error {
            stream_id: self.stream_id.clone(),
            error_code,
            message: message.to_string(),
        }
    }
}

/// Maps the listener codec to the encoding requested from providers.
fn encoding_for(codec: Codec) -> AudioEncoding {
    match codec {
        Codec::Mp3 => AudioEncoding::Mp3,
        Codec::OpusWebm => AudioEncoding::WebmOpus,
        Codec::OpusOgg => AudioEncoding::OggOpus,
        Codec::Pcm => AudioEncoding::Linear16,
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Lazily creates one orchestrator per session and tears them down on
/// session end.
pub struct OrchestratorManager {
    providers: Arc<ProviderSet>,
    usage: Arc<dyn UsageSink>,
    config: OrchestratorConfig,
    orchestrators: Mutex<HashMap<String, Arc<SpeechOrchestrator>>>,
}

impl OrchestratorManager {
    /// Creates a manager.
    pub fn new(
        providers: Arc<ProviderSet>,
        usage: Arc<dyn UsageSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            providers,
            usage,
            config,
            orchestrators: Mutex::new(HashMap::new()),
        }
    }

    /// Enqueues a segment, creating the session's orchestrator on first
    /// use.
    pub fn enqueue(&self, session: &Arc<Session>, segment: CommittedSegment) {
        let orchestrator = {
            let mut orchestrators = self.orchestrators.lock();
            orchestrators
                .entry(session.session_id().to_string())
                .or_insert_with(|| {
                    SpeechOrchestrator::new(
                        session.clone(),
                        self.providers.clone(),
                        self.usage.clone(),
                        self.config.clone(),
                    )
                })
                .clone()
        };
        orchestrator.enqueue_segment(segment);
    }

    /// Looks up a session's orchestrator.
    pub fn get(&self, session_id: &str) -> Option<Arc<SpeechOrchestrator>> {
        self.orchestrators.lock().get(session_id).cloned()
    }

    /// Destroys a session's orchestrator, cancelling its work.
    pub fn end_session(&self, session_id: &str) {
        if let Some(orchestrator) = self.orchestrators.lock().remove(session_id) {
            orchestrator.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::sync::mpsc;

    use lingcast_session::{Entitlements, Limits, Subscription, SubscriptionStatus};
    use lingcast_transport::{Listener, Outbound};
    use lingcast_tts::{Result as TtsResult, TtsStream, stream_pair};

    use crate::usage::MemoryUsageSink;

    const ELEVEN_VOICE: &str = "elevenlabs:elevenlabs_flash:-:3qAbeQHx5LFO5BGhoRFu";

    /// Scripted provider: each synthesis call consumes the next entry.
    enum Script {
        /// Stream these chunks, then end cleanly.
        Chunks(Vec<&'static [u8]>),
        /// Stream this many chunks, then fail.
        FailAfter(usize),
        /// Stream whatever arrives on this channel until it closes.
        Channel(mpsc::Receiver<Vec<u8>>),
    }

    struct MockProvider {
        script: parking_lot::Mutex<VecDeque<Script>>,
    }

    impl MockProvider {
        fn scripted(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                script: parking_lot::Mutex::new(script.into()),
            })
        }
    }

    #[async_trait::async_trait]
    impl TtsProvider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn synthesize(&self, _req: &SynthesisRequest) -> TtsResult<TtsStream> {
            let script = self
                .script
                .lock()
                .pop_front()
                .unwrap_or(Script::Chunks(vec![b"aa", b"bb"]));
            let (sender, stream) = stream_pair();

            tokio::spawn(async move {
                match script {
                    Script::Chunks(chunks) => {
                        for chunk in chunks {
                            if sender.send(Bytes::from_static(chunk)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Script::FailAfter(n) => {
                        for _ in 0..n {
                            if sender.send(Bytes::from_static(b"xx")).await.is_err() {
                                return;
                            }
                        }
                        sender
                            .fail(lingcast_tts::Error::Rejected("synthetic failure".into()))
                            .await;
                    }
                    Script::Channel(mut rx) => {
                        let cancel = sender.cancel_token();
                        loop {
                            tokio::select! {
                                _ = cancel.cancelled() => return,
                                chunk = rx.recv() => match chunk {
                                    Some(chunk) => {
                                        if sender.send(Bytes::from(chunk)).await.is_err() {
                                            return;
                                        }
                                    }
                                    None => return,
                                },
                            }
                        }
                    }
                }
            });
            Ok(stream)
        }
    }

    fn entitled(tiers: &[&str]) -> Entitlements {
        Entitlements {
            subscription: Subscription {
                status: SubscriptionStatus::Active,
            },
            limits: Limits {
                max_simultaneous_languages: 5,
                feature_flags: Default::default(),
            },
            routing: tiers
                .iter()
                .map(|t| (t.to_string(), format!("provider/{t}")))
                .collect(),
        }
    }

    fn harness(
        provider: Arc<MockProvider>,
        tiers: &[&str],
    ) -> (Arc<SpeechOrchestrator>, Arc<Session>, Arc<MemoryUsageSink>) {
        let session = Arc::new(Session::new("s1", None, entitled(tiers)));
        let mut providers = ProviderSet::new();
        providers.insert(Provider::Elevenlabs, provider.clone());
        providers.insert(Provider::Google, provider);
        let usage = Arc::new(MemoryUsageSink::new());
        let orchestrator = SpeechOrchestrator::new(
            session.clone(),
            Arc::new(providers),
            usage.clone(),
            OrchestratorConfig::default(),
        );
        (orchestrator, session, usage)
    }

    fn attach(session: &Session, client_id: &str, lang: Option<&str>) -> mpsc::Receiver<Outbound> {
        let (listener, rx) = Listener::new(
            client_id,
            format!("s1:{client_id}"),
            lingcast_transport::Codec::Mp3,
            44100,
            lang.map(str::to_string),
        );
        session.hub().insert(Arc::new(listener));
        rx
    }

    fn segment(seq_id: u64, text: &str, lang: &str) -> CommittedSegment {
        CommittedSegment {
            seq_id,
            text: text.to_string(),
            source_lang: "en".to_string(),
            target_lang: lang.to_string(),
            voice_request: ELEVEN_VOICE.to_string(),
            is_final: true,
        }
    }

    /// What a listener observed, decoded.
    #[derive(Debug)]
    enum Seen {
        Control(ServerMessage),
        Frame(AudioFrame),
    }

    /// Drains a listener until it goes quiet.
    async fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Seen> {
        let codec = FrameCodec::default();
        let mut seen = Vec::new();
        while let Ok(Some(out)) =
            tokio::time::timeout(Duration::from_millis(300), rx.recv()).await
        {
            match out {
                Outbound::Control(msg) => seen.push(Seen::Control(msg)),
                Outbound::Audio(bytes) => seen.push(Seen::Frame(codec.decode(&bytes).unwrap())),
            }
        }
        seen
    }

    fn frames_for<'a>(seen: &'a [Seen], segment_id: &str) -> Vec<&'a AudioFrame> {
        seen.iter()
            .filter_map(|s| match s {
                Seen::Frame(frame) if frame.meta.segment_id == segment_id => Some(frame),
                _ => None,
            })
            .collect()
    }

    /// Asserts the chunk ordering invariant: indices 0..=k with exactly
    /// one terminal frame, which is last.
    fn assert_chunk_invariant(frames: &[&AudioFrame]) {
        assert!(!frames.is_empty());
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.meta.chunk_index, i as u32);
        }
        let last_flags: Vec<bool> = frames.iter().map(|f| f.meta.is_last).collect();
        assert_eq!(last_flags.iter().filter(|&&b| b).count(), 1);
        assert!(last_flags.last().copied().unwrap());
    }

    #[tokio::test]
    async fn test_single_listener_single_segment() {
        let provider = MockProvider::scripted(vec![Script::Chunks(vec![b"aa", b"bb", b"cc"])]);
        let (orchestrator, session, usage) = harness(provider, &["elevenlabs_flash"]);
        let mut rx = attach(&session, "a", Some("es"));

        orchestrator.enqueue_segment(segment(1, "Hello", "es"));
        let seen = drain(&mut rx).await;

        let mut starts = 0;
        let mut ends = 0;
        for s in &seen {
            match s {
                Seen::Control(ServerMessage::Start { lang, .. }) => {
                    assert_eq!(lang, "es");
                    starts += 1;
                }
                Seen::Control(ServerMessage::End { .. }) => ends += 1,
                Seen::Control(ServerMessage::Error { .. }) => panic!("unexpected audio.error"),
                _ => {}
            }
        }
        assert_eq!(starts, 1);
        assert_eq!(ends, 1);

        let frames = frames_for(&seen, "s1:seg:1");
        assert_eq!(frames.len(), 4); // 3 audio chunks + terminal
        assert_chunk_invariant(&frames);
        assert!(frames.last().unwrap().payload.is_empty());

        // Exactly one usage event, with a TTFB measurement.
        assert_eq!(usage.len(), 1);
        let event = usage.get(&usage_key("s1", "s1:seg:1", "Hello")).unwrap();
        assert!(event.ttfb_ms.is_some());
        assert_eq!(event.characters, 5);
    }

    #[tokio::test]
    async fn test_language_scoped_fanout() {
        let provider = MockProvider::scripted(vec![
            Script::Chunks(vec![b"es1", b"es2"]),
            Script::Chunks(vec![b"fr1"]),
        ]);
        let (orchestrator, session, _usage) = harness(provider, &["elevenlabs_flash"]);
        let mut rx_a = attach(&session, "a", Some("es"));
        let mut rx_b = attach(&session, "b", Some("fr"));

        orchestrator.enqueue_segment(segment(1, "Hola", "es"));
        orchestrator.enqueue_segment(segment(2, "Bonjour", "fr"));

        let seen_a = drain(&mut rx_a).await;
        let seen_b = drain(&mut rx_b).await;

        // A observes only the es segment, B only the fr one.
        assert!(!frames_for(&seen_a, "s1:seg:1").is_empty());
        assert!(frames_for(&seen_a, "s1:seg:2").is_empty());
        assert!(frames_for(&seen_b, "s1:seg:1").is_empty());
        assert!(!frames_for(&seen_b, "s1:seg:2").is_empty());

        let ends = |seen: &[Seen]| {
            seen.iter()
                .filter(|s| matches!(s, Seen::Control(ServerMessage::End { .. })))
                .count()
        };
        assert_eq!(ends(&seen_a), 1);
        assert_eq!(ends(&seen_b), 1);
    }

    #[tokio::test]
    async fn test_language_switch_mid_segment() {
        let (feed_tx, feed_rx) = mpsc::channel(16);
        let provider = MockProvider::scripted(vec![
            Script::Channel(feed_rx),
            Script::Chunks(vec![b"second"]),
        ]);
        let (orchestrator, session, _usage) = harness(provider, &["elevenlabs_flash"]);
        let mut rx = attach(&session, "a", Some("es"));

        orchestrator.enqueue_segment(segment(1, "Hola uno", "es"));

        // Three chunks reach the listener while subscribed to es.
        for i in 0..3u8 {
            feed_tx.send(vec![i; 4]).await.unwrap();
        }
        let codec = FrameCodec::default();
        let mut received = 0;
        while received < 4 {
            match tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap()
            {
                Outbound::Audio(bytes) => {
                    let frame = codec.decode(&bytes).unwrap();
                    assert!(!frame.meta.is_last);
                    received += 1;
                }
                Outbound::Control(_) => received += 1, // start + routing
            }
        }

        // The switch lands mid-segment.
        session.hub().update_language("a", Some("fr".to_string()));

        // The first segment keeps flowing to the pinned recipient set.
        feed_tx.send(vec![9; 4]).await.unwrap();
        drop(feed_tx);

        // A subsequent es segment must not be observed at all.
        orchestrator.enqueue_segment(segment(2, "Hola dos", "es"));

        let seen = drain(&mut rx).await;
        let first = frames_for(&seen, "s1:seg:1");
        assert!(!first.is_empty());
        assert!(first.last().unwrap().meta.is_last);
        assert!(frames_for(&seen, "s1:seg:2").is_empty());
        assert!(
            !seen.iter().any(|s| matches!(
                s,
                Seen::Control(ServerMessage::Start { segment_id, .. }) if segment_id == "s1:seg:2"
            ))
        );
    }

    #[tokio::test]
    async fn test_tier_gating_rejects_without_enqueue() {
        let provider = MockProvider::scripted(vec![Script::Chunks(vec![b"ok"])]);
        let (orchestrator, session, usage) = harness(provider, &["elevenlabs_flash"]);
        let mut rx = attach(&session, "a", None);

        let mut gated = segment(1, "Hello", "en");
        gated.voice_request = "en-US-Studio-O".to_string(); // studio tier not entitled

        orchestrator.enqueue_segment(gated);
        assert_eq!(orchestrator.queue_len(), 0);

        // The orchestrator keeps serving other segments unaffected.
        orchestrator.enqueue_segment(segment(2, "Still here", "es"));
        let seen = drain(&mut rx).await;

        let error = seen.iter().find_map(|s| match s {
            Seen::Control(ServerMessage::Error { error_code, .. }) => Some(*error_code),
            _ => None,
        });
        assert_eq!(error, Some(ErrorCode::TierNotAllowed));
        assert!(!frames_for(&seen, "s1:seg:1").is_empty());
        assert_eq!(usage.len(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_recovers_on_next_segment() {
        let provider = MockProvider::scripted(vec![
            Script::FailAfter(2),
            Script::Chunks(vec![b"fine"]),
        ]);
        let (orchestrator, session, usage) = harness(provider, &["elevenlabs_flash"]);
        let mut rx = attach(&session, "a", Some("es"));

        orchestrator.enqueue_segment(segment(1, "Will fail", "es"));
        orchestrator.enqueue_segment(segment(2, "Will work", "es"));
        let seen = drain(&mut rx).await;

        // The failed segment surfaced an error and never terminated.
        let error = seen.iter().find_map(|s| match s {
            Seen::Control(ServerMessage::Error { error_code, .. }) => Some(*error_code),
            _ => None,
        });
        assert_eq!(error, Some(ErrorCode::StreamingError));
        let failed = frames_for(&seen, "s1:seg:1");
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|f| !f.meta.is_last));

        // The next segment completed normally.
        let ok = frames_for(&seen, "s1:seg:2");
        assert_chunk_invariant(&ok);

        // Usage recorded only for the completed segment.
        assert_eq!(usage.len(), 1);
        assert!(usage.get(&usage_key("s1", "s1:seg:2", "Will work")).is_some());
    }

    #[tokio::test]
    async fn test_queue_bounded_with_oldest_eviction() {
        let (_feed_tx, feed_rx) = mpsc::channel::<Vec<u8>>(1);
        let provider = MockProvider::scripted(vec![Script::Channel(feed_rx)]);
        let (orchestrator, session, _usage) = harness(provider, &["elevenlabs_flash"]);
        let _rx = attach(&session, "a", Some("es"));

        // The first segment blocks on the never-fed channel; the rest
        // pile up behind it.
        for i in 0..15 {
            orchestrator.enqueue_segment(segment(i, &format!("seg {i}"), "es"));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(orchestrator.queue_len() <= OrchestratorConfig::default().max_queued);
        orchestrator.shutdown();
    }

    #[tokio::test]
    async fn test_cancel_drains_queue_and_notifies() {
        let (_feed_tx, feed_rx) = mpsc::channel::<Vec<u8>>(1);
        let provider = MockProvider::scripted(vec![
            Script::Channel(feed_rx),
            Script::Chunks(vec![b"after"]),
        ]);
        let (orchestrator, session, _usage) = harness(provider, &["elevenlabs_flash"]);
        let mut rx = attach(&session, "a", Some("es"));

        orchestrator.enqueue_segment(segment(1, "Blocked", "es"));
        orchestrator.enqueue_segment(segment(2, "Queued", "es"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        orchestrator.cancel("listener request");
        assert_eq!(orchestrator.queue_len(), 0);

        let seen = drain(&mut rx).await;
        assert!(seen.iter().any(|s| matches!(
            s,
            Seen::Control(ServerMessage::Cancel { reason, .. }) if reason == "listener request"
        )));
        // The cancelled segment never terminated cleanly.
        assert!(!seen.iter().any(|s| matches!(
            s,
            Seen::Control(ServerMessage::End { .. })
        )));

        // A fresh segment streams again after the cancel.
        orchestrator.enqueue_segment(segment(3, "Fresh", "es"));
        let seen = drain(&mut rx).await;
        assert_chunk_invariant(&frames_for(&seen, "s1:seg:3"));
    }

    #[tokio::test]
    async fn test_manager_lazy_creation_and_end() {
        let provider = MockProvider::scripted(vec![Script::Chunks(vec![b"x"])]);
        let mut providers = ProviderSet::new();
        providers.insert(Provider::Elevenlabs, provider);
        let manager = OrchestratorManager::new(
            Arc::new(providers),
            Arc::new(MemoryUsageSink::new()),
            OrchestratorConfig::default(),
        );

        let session = Arc::new(Session::new("s9", None, entitled(&["elevenlabs_flash"])));
        assert!(manager.get("s9").is_none());

        manager.enqueue(&session, segment(1, "Hello", "es"));
        assert!(manager.get("s9").is_some());

        manager.end_session("s9");
        assert!(manager.get("s9").is_none());
    }
}

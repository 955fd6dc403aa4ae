//! Pool sessions.
//!
//! A pool session is one long-lived wire connection serving one
//! (source, target) language pair. It is an actor: all wire writes and
//! all state mutations happen on its event loop, which is how the
//! remote's one-response-at-a-time constraint is enforced.
//!
//! Correlation of remote-assigned item ids is strictly FIFO: every
//! submitted request is queued locally in submission order and the next
//! `conversation.item.created` binds to the head of that queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::event::{
    EVENT_TYPE_ERROR, EVENT_TYPE_ITEM_CREATE, EVENT_TYPE_ITEM_CREATED,
    EVENT_TYPE_RESPONSE_CANCEL, EVENT_TYPE_RESPONSE_CREATE, EVENT_TYPE_RESPONSE_CREATED,
    EVENT_TYPE_RESPONSE_DONE, EVENT_TYPE_RESPONSE_TEXT_DELTA, EVENT_TYPE_RESPONSE_TEXT_DONE,
    EVENT_TYPE_SESSION_CREATED, EVENT_TYPE_SESSION_UPDATE, EVENT_TYPE_SESSION_UPDATED,
    ServerEvent, generate_event_id,
};
use crate::pool::{PendingTable, RequestId, remove_pending};
use crate::wire::Wire;

/// Instructional prompt constraining each response to the bare
/// translation.
const RESPONSE_INSTRUCTIONS: &str =
    "Return only the translated string, with no quotes and no commentary.";

/// Commands the pool sends to a session actor.
#[derive(Debug)]
pub(crate) enum Command {
    /// Submit one translation item.
    Submit {
        request_id: RequestId,
        text: String,
    },
    /// The caller abandoned a request; cancel its response if active.
    Cancel { request_id: RequestId },
    /// Orderly shutdown.
    Shutdown,
}

/// State shared between a session actor and the pool.
pub(crate) struct SessionShared {
    /// `src:tgt:suffix`, for logging and diagnostics.
    pub connection_key: String,
    /// Requests admitted against this session and not yet settled.
    pub in_flight: AtomicUsize,
    /// Set once the wire is gone.
    pub closed: AtomicBool,
}

/// Pool-facing handle of one session actor.
#[derive(Clone)]
pub(crate) struct PoolSessionHandle {
    pub shared: Arc<SessionShared>,
    pub commands: mpsc::Sender<Command>,
    pub setup: watch::Receiver<bool>,
}

impl PoolSessionHandle {
    /// Idle: setup complete, wire alive, nothing admitted.
    pub fn is_idle(&self) -> bool {
        *self.setup.borrow()
            && !self.shared.closed.load(Ordering::Acquire)
            && self.shared.in_flight.load(Ordering::Acquire) == 0
    }

    /// True when the wire is gone.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// Per-item state tracked while the remote works on it.
struct ItemState {
    request_id: RequestId,
    accumulated: String,
}

/// Spawns a session actor over an established wire connection.
pub(crate) fn spawn(
    wire: Box<dyn Wire>,
    connection_key: String,
    source_lang: String,
    target_lang: String,
    pending: PendingTable,
    heartbeat_interval: Duration,
) -> PoolSessionHandle {
    let shared = Arc::new(SessionShared {
        connection_key,
        in_flight: AtomicUsize::new(0),
        closed: AtomicBool::new(false),
    });
    let (setup_tx, setup_rx) = watch::channel(false);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);

    let actor = SessionActor {
        wire,
        shared: shared.clone(),
        source_lang,
        target_lang,
        pending,
        setup: setup_tx,
        submit_fifo: VecDeque::new(),
        items: HashMap::new(),
        response_queue: VecDeque::new(),
        active_item: None,
        active_request: None,
        active_response: None,
    };
    tokio::spawn(actor.run(cmd_rx, heartbeat_interval));

    PoolSessionHandle {
        shared,
        commands: cmd_tx,
        setup: setup_rx,
    }
}

struct SessionActor {
    wire: Box<dyn Wire>,
    shared: Arc<SessionShared>,
    source_lang: String,
    target_lang: String,
    pending: PendingTable,
    setup: watch::Sender<bool>,

    /// Requests submitted, awaiting their `item.created` in order.
    submit_fifo: VecDeque<RequestId>,
    /// Items the remote knows about, keyed by remote item id.
    items: HashMap<String, ItemState>,
    /// Items created but whose `response.create` has not been sent.
    response_queue: VecDeque<String>,

    active_item: Option<String>,
    active_request: Option<RequestId>,
    active_response: Option<String>,
}

impl SessionActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, heartbeat: Duration) {
        let mut ticker = tokio::time::interval(heartbeat);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.reset();

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Submit { request_id, text }) => {
                        if self.submit(request_id, text).await.is_err() {
                            break;
                        }
                    }
                    Some(Command::Cancel { request_id }) => {
                        if self.cancel(request_id).await.is_err() {
                            break;
                        }
                    }
                    Some(Command::Shutdown) | None => break,
                },
                event = self.wire.recv() => match event {
                    Some(Ok(event)) => {
                        if self.handle_event(event).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!(key = %self.shared.connection_key, "wire error: {e}");
                        break;
                    }
                    None => {
                        debug!(key = %self.shared.connection_key, "wire closed");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if self.wire.ping().await.is_err() {
                        break;
                    }
                }
            }
        }

        self.teardown().await;
    }

    async fn submit(&mut self, request_id: RequestId, text: String) -> Result<()> {
        self.submit_fifo.push_back(request_id);
        self.wire
            .send(json!({
                "event_id": generate_event_id(),
                "type": EVENT_TYPE_ITEM_CREATE,
                "item": {
                    "type": "message",
                    "role": "user",
                    "content": [{"type": "input_text", "text": text}],
                },
            }))
            .await
    }

    async fn cancel(&mut self, request_id: RequestId) -> Result<()> {
        // The pending entry is already gone; all that is left is to stop
        // the remote from generating for nothing. Unstarted items simply
        // drain when their turn comes.
        if self.active_request.as_deref() == Some(request_id.as_str()) {
            return self
                .wire
                .send(json!({
                    "event_id": generate_event_id(),
                    "type": EVENT_TYPE_RESPONSE_CANCEL,
                }))
                .await;
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: ServerEvent) -> Result<()> {
        match event.event_type.as_str() {
            EVENT_TYPE_SESSION_CREATED => {
                self.wire
                    .send(json!({
                        "event_id": generate_event_id(),
                        "type": EVENT_TYPE_SESSION_UPDATE,
                        "session": {
                            "modalities": ["text"],
                            "instructions": format!(
                                "You are a translation engine. Translate every user \
                                 message from {} to {}. Reply with only the translated text.",
                                self.source_lang, self.target_lang
                            ),
                        },
                    }))
                    .await
            }
            EVENT_TYPE_SESSION_UPDATED => {
                let _ = self.setup.send(true);
                Ok(())
            }
            EVENT_TYPE_ITEM_CREATED => {
                let Some(item_id) = event.item_id().map(str::to_string) else {
                    warn!(key = %self.shared.connection_key, "item.created without id");
                    return Ok(());
                };
                let Some(request_id) = self.submit_fifo.pop_front() else {
                    warn!(
                        key = %self.shared.connection_key,
                        item_id, "orphaned item id: no submitted request awaiting binding"
                    );
                    return Ok(());
                };
                self.items.insert(
                    item_id.clone(),
                    ItemState {
                        request_id,
                        accumulated: String::new(),
                    },
                );

                if self.active_response.is_none() && self.active_request.is_none() {
                    self.start_response(item_id).await
                } else {
                    self.response_queue.push_back(item_id);
                    Ok(())
                }
            }
            EVENT_TYPE_RESPONSE_CREATED => {
                if self.active_request.is_none() {
                    warn!(
                        key = %self.shared.connection_key,
                        response_id = event.response_id().unwrap_or(""),
                        "response.created with no request bound"
                    );
                }
                self.active_response = event.response_id().map(str::to_string);
                Ok(())
            }
            EVENT_TYPE_RESPONSE_TEXT_DELTA => {
                let (Some(item_id), Some(delta)) = (self.active_item.clone(), event.delta) else {
                    return Ok(());
                };
                if let Some(item) = self.items.get_mut(&item_id) {
                    item.accumulated.push_str(&delta);

                    // A late delta after resolve/timeout finds no pending
                    // entry and is dropped silently.
                    let sink = {
                        let pending = self.pending.lock();
                        pending
                            .get(&item.request_id)
                            .and_then(|p| p.partial.clone())
                    };
                    if let Some(sink) = sink {
                        sink(&item.accumulated, false);
                    }
                }
                Ok(())
            }
            EVENT_TYPE_RESPONSE_TEXT_DONE => {
                let Some(item_id) = self.active_item.clone() else {
                    return Ok(());
                };
                if let Some(item) = self.items.remove(&item_id) {
                    let text = event
                        .text
                        .unwrap_or_else(|| item.accumulated.clone())
                        .trim()
                        .to_string();
                    self.resolve(&item.request_id, text);
                }
                Ok(())
            }
            EVENT_TYPE_RESPONSE_DONE => {
                self.active_item = None;
                self.active_request = None;
                self.active_response = None;
                self.start_next_queued().await
            }
            EVENT_TYPE_ERROR => {
                let message = event
                    .error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "unspecified remote error".to_string());
                self.handle_remote_error(event.item_id().map(str::to_string), message)
                    .await
            }
            other => {
                debug!(key = %self.shared.connection_key, event_type = other, "ignoring event");
                Ok(())
            }
        }
    }

    async fn start_response(&mut self, item_id: String) -> Result<()> {
        let Some(item) = self.items.get(&item_id) else {
            return Ok(());
        };
        self.active_request = Some(item.request_id.clone());
        self.active_item = Some(item_id);
        self.wire
            .send(json!({
                "event_id": generate_event_id(),
                "type": EVENT_TYPE_RESPONSE_CREATE,
                "response": {
                    "modalities": ["text"],
                    "instructions": RESPONSE_INSTRUCTIONS,
                },
            }))
            .await
    }

    async fn start_next_queued(&mut self) -> Result<()> {
        while let Some(item_id) = self.response_queue.pop_front() {
            if self.items.contains_key(&item_id) {
                return self.start_response(item_id).await;
            }
        }
        Ok(())
    }

    /// Resolves one request with its final text. An empty or echoed
    /// translation resolves with the original and a warning; it is never
    /// an error.
    fn resolve(&self, request_id: &RequestId, text: String) {
        let Some(entry) = remove_pending(&self.pending, request_id) else {
            debug!(
                key = %self.shared.connection_key,
                request_id, "request already settled, draining result"
            );
            return;
        };

        let text = if text.is_empty() || text.eq_ignore_ascii_case(entry.original_text.trim()) {
            warn!(
                key = %self.shared.connection_key,
                request_id, "remote returned empty or echoed text, using original"
            );
            entry.original_text.clone()
        } else {
            text
        };
        let _ = entry.resolve.send(Ok(text));
    }

    fn reject(&self, request_id: &RequestId, err: Error) {
        if let Some(entry) = remove_pending(&self.pending, request_id) {
            let _ = entry.resolve.send(Err(err));
        }
    }

    async fn handle_remote_error(
        &mut self,
        item_id: Option<String>,
        message: String,
    ) -> Result<()> {
        error!(key = %self.shared.connection_key, item = item_id.as_deref().unwrap_or(""), "remote error: {message}");

        // Prefer the request the error names, then the active one, then
        // the oldest still awaiting its item binding.
        let request_id = if let Some(ref item_id) = item_id {
            self.items.remove(item_id).map(|i| i.request_id)
        } else if let Some(active) = self.active_request.take() {
            if let Some(item_id) = self.active_item.take() {
                self.items.remove(&item_id);
            }
            self.active_response = None;
            Some(active)
        } else {
            self.submit_fifo.pop_front()
        };

        match request_id {
            Some(request_id) => {
                if self.active_request.as_deref() == Some(request_id.as_str()) {
                    self.active_request = None;
                    self.active_item = None;
                    self.active_response = None;
                }
                self.reject(&request_id, Error::Remote(message));
            }
            None => {
                warn!(key = %self.shared.connection_key, "remote error with nothing pending");
            }
        }

        if self.active_request.is_none() {
            self.start_next_queued().await?;
        }
        Ok(())
    }

    /// Rejects everything anchored to this session and marks it closed.
    async fn teardown(mut self) {
        self.shared.closed.store(true, Ordering::Release);

        let mut anchored: Vec<RequestId> = Vec::new();
        anchored.extend(self.submit_fifo.drain(..));
        anchored.extend(self.items.drain().map(|(_, item)| item.request_id));
        if let Some(active) = self.active_request.take() {
            anchored.push(active);
        }

        for request_id in anchored {
            self.reject(&request_id, Error::SessionClosed);
        }

        self.wire.close().await;
        debug!(key = %self.shared.connection_key, "session torn down");
    }
}

//! The translation connection pool.
//!
//! Keyed by `src:tgt`. Each key holds up to `max_concurrent` pool
//! sessions; requests acquire an idle session, grow the pool, or wait.
//! The pending-response table is pool-wide and guarded as a critical
//! section; individual resolution happens outside the lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::client::Connect;
use crate::error::{Error, Result};
use crate::session::{self, Command, PoolSessionHandle, SessionShared};

/// Interval between acquisition retries when a language pair is at
/// capacity.
const ACQUIRE_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Unique id of one translation request.
pub type RequestId = String;

/// Receives accumulated partial text as deltas arrive. The second
/// argument is true only for a final delivery.
pub type PartialSink = Arc<dyn Fn(&str, bool) + Send + Sync>;

/// Request class, selecting timeout and cache budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Provisional upstream text; tighter budget.
    Partial,
    /// Final upstream text.
    Final,
}

impl RequestClass {
    fn timeout(&self, config: &PoolConfig) -> Duration {
        match self {
            RequestClass::Partial => config.partial_timeout,
            RequestClass::Final => config.final_timeout,
        }
    }
}

/// Pool configuration, all values overridable.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum sessions per language pair.
    pub max_concurrent: usize,
    /// Timeout for partial-class requests.
    pub partial_timeout: Duration,
    /// Timeout for final-class requests.
    pub final_timeout: Duration,
    /// Budget for connect plus session setup.
    pub connect_timeout: Duration,
    /// Keep-alive interval on the idle side.
    pub heartbeat_interval: Duration,
    /// Partial-class cache capacity.
    pub partial_cache_capacity: usize,
    /// Partial-class cache TTL.
    pub partial_cache_ttl: Duration,
    /// Final-class cache capacity.
    pub final_cache_capacity: usize,
    /// Final-class cache TTL.
    pub final_cache_ttl: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            partial_timeout: Duration::from_secs(15),
            final_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            partial_cache_capacity: 200,
            partial_cache_ttl: Duration::from_secs(120),
            final_cache_capacity: 100,
            final_cache_ttl: Duration::from_secs(600),
        }
    }
}

/// One pending translation request.
pub(crate) struct PendingRequest {
    pub resolve: oneshot::Sender<Result<String>>,
    pub partial: Option<PartialSink>,
    pub original_text: String,
    pub session: Arc<SessionShared>,
}

/// Pool-wide pending-response table.
pub(crate) type PendingTable = Arc<Mutex<HashMap<RequestId, PendingRequest>>>;

/// Removes a pending entry, releasing its admission slot. Whoever gets
/// the entry back owns settling it.
pub(crate) fn remove_pending(table: &PendingTable, request_id: &str) -> Option<PendingRequest> {
    let entry = table.lock().remove(request_id)?;
    entry.session.in_flight.fetch_sub(1, Ordering::AcqRel);
    Some(entry)
}

#[derive(Default)]
struct PairSlot {
    handles: Vec<PoolSessionHandle>,
    /// Connections being established, reserved against `max_concurrent`.
    creating: usize,
}

/// Pool of long-lived translation sessions.
pub struct TranslationPool {
    connector: Arc<dyn Connect>,
    config: PoolConfig,
    sessions: Mutex<HashMap<String, PairSlot>>,
    pending: PendingTable,
    partial_cache: Mutex<TtlCache>,
    final_cache: Mutex<TtlCache>,
}

impl TranslationPool {
    /// Creates a pool over the given connector.
    pub fn new(connector: Arc<dyn Connect>, config: PoolConfig) -> Self {
        let partial_cache = TtlCache::new(config.partial_cache_capacity, config.partial_cache_ttl);
        let final_cache = TtlCache::new(config.final_cache_capacity, config.final_cache_ttl);
        Self {
            connector,
            config,
            sessions: Mutex::new(HashMap::new()),
            pending: Arc::new(Mutex::new(HashMap::new())),
            partial_cache: Mutex::new(partial_cache),
            final_cache: Mutex::new(final_cache),
        }
    }

    /// Translates `text` from `src` to `tgt`.
    ///
    /// When `partial` is supplied, accumulated text is forwarded as
    /// deltas arrive and the cache is bypassed, since the caller wants live
    /// output. The request resolves or rejects exactly once within its
    /// class timeout; dropping the returned future cancels it.
    pub async fn translate(
        &self,
        text: &str,
        src: &str,
        tgt: &str,
        class: RequestClass,
        partial: Option<PartialSink>,
    ) -> Result<String> {
        if partial.is_none()
            && let Some(hit) = self.cache(class).lock().get(src, tgt, text)
        {
            debug!(src, tgt, "translation cache hit");
            return Ok(hit);
        }

        let handle = self.acquire(src, tgt).await?;
        let request_id: RequestId =
            format!("req_{}", &Uuid::new_v4().simple().to_string()[..12]);
        let (tx, mut rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock();
            handle.shared.in_flight.fetch_add(1, Ordering::AcqRel);
            pending.insert(
                request_id.clone(),
                PendingRequest {
                    resolve: tx,
                    partial,
                    original_text: text.to_string(),
                    session: handle.shared.clone(),
                },
            );
        }
        let mut guard = PendingGuard {
            table: self.pending.clone(),
            commands: handle.commands.clone(),
            request_id: request_id.clone(),
            armed: true,
        };

        if handle
            .commands
            .send(Command::Submit {
                request_id: request_id.clone(),
                text: text.to_string(),
            })
            .await
            .is_err()
        {
            guard.disarm();
            remove_pending(&self.pending, &request_id);
            return Err(Error::SessionClosed);
        }

        let budget = class.timeout(&self.config);
        let outcome = match tokio::time::timeout(budget, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::SessionClosed),
            Err(_) => {
                if remove_pending(&self.pending, &request_id).is_some() {
                    // The item drains silently on the session.
                    Err(Error::Timeout(budget))
                } else {
                    // Resolved in the same instant the timer fired.
                    rx.try_recv().unwrap_or(Err(Error::SessionClosed))
                }
            }
        };
        guard.disarm();

        if let Ok(ref translated) = outcome {
            self.cache(class)
                .lock()
                .insert(src, tgt, text, translated.clone());
        }
        outcome
    }

    /// Translates `text` into every target concurrently, returning a
    /// language → text map. A per-target failure yields absence of the
    /// key; partial success is the norm. The source language, when
    /// present among the targets, is included without a remote call.
    pub async fn translate_to_many(
        &self,
        text: &str,
        src: &str,
        targets: &[String],
    ) -> HashMap<String, String> {
        let calls: Vec<_> = targets
            .iter()
            .filter(|tgt| tgt.as_str() != src)
            .map(|tgt| {
                let tgt = tgt.clone();
                async move {
                    let result = self
                        .translate(text, src, &tgt, RequestClass::Final, None)
                        .await;
                    (tgt, result)
                }
            })
            .collect();

        let mut results = HashMap::new();
        for (tgt, result) in join_all(calls).await {
            match result {
                Ok(translated) => {
                    results.insert(tgt, translated);
                }
                Err(e) => warn!(src, tgt, "translation target failed: {e}"),
            }
        }
        if targets.iter().any(|t| t == src) {
            results.insert(src.to_string(), text.to_string());
        }
        results
    }

    /// Number of live sessions for a language pair.
    pub fn session_count(&self, src: &str, tgt: &str) -> usize {
        self.sessions
            .lock()
            .get(&format!("{src}:{tgt}"))
            .map(|slot| slot.handles.iter().filter(|h| !h.is_closed()).count())
            .unwrap_or(0)
    }

    /// Number of unsettled requests across the pool.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn cache(&self, class: RequestClass) -> &Mutex<TtlCache> {
        match class {
            RequestClass::Partial => &self.partial_cache,
            RequestClass::Final => &self.final_cache,
        }
    }

    /// Acquires a session for the pair: first idle one, else grow below
    /// `max_concurrent`, else wait and retry.
    async fn acquire(&self, src: &str, tgt: &str) -> Result<PoolSessionHandle> {
        let key = format!("{src}:{tgt}");
        loop {
            let create = {
                let mut pairs = self.sessions.lock();
                let slot = pairs.entry(key.clone()).or_default();
                slot.handles.retain(|h| !h.is_closed());

                if let Some(handle) = slot.handles.iter().find(|h| h.is_idle()) {
                    return Ok(handle.clone());
                }
                if slot.handles.len() + slot.creating < self.config.max_concurrent {
                    slot.creating += 1;
                    true
                } else {
                    false
                }
            };

            if create {
                let result = self.create_session(&key, src, tgt).await;
                let mut pairs = self.sessions.lock();
                let slot = pairs.entry(key.clone()).or_default();
                slot.creating -= 1;
                match result {
                    Ok(handle) => {
                        slot.handles.push(handle.clone());
                        return Ok(handle);
                    }
                    Err(e) => return Err(e),
                }
            }

            tokio::time::sleep(ACQUIRE_RETRY_INTERVAL).await;
        }
    }

    async fn create_session(&self, key: &str, src: &str, tgt: &str) -> Result<PoolSessionHandle> {
        let wire = tokio::time::timeout(self.config.connect_timeout, self.connector.connect())
            .await
            .map_err(|_| Error::Connection(format!("connect timed out for {key}")))??;

        let suffix = format!(
            "{}_{}",
            chrono::Utc::now().timestamp_millis(),
            &Uuid::new_v4().simple().to_string()[..6]
        );
        let handle = session::spawn(
            wire,
            format!("{key}:{suffix}"),
            src.to_string(),
            tgt.to_string(),
            self.pending.clone(),
            self.config.heartbeat_interval,
        );

        let mut setup = handle.setup.clone();
        match tokio::time::timeout(self.config.connect_timeout, setup.wait_for(|ready| *ready))
            .await
        {
            Ok(Ok(_)) => Ok(handle),
            _ => {
                let _ = handle.commands.try_send(Command::Shutdown);
                Err(Error::Connection(format!("session setup timed out for {key}")))
            }
        }
    }
}

/// Cleans up a request whose caller went away before settlement.
struct PendingGuard {
    table: PendingTable,
    commands: mpsc::Sender<Command>,
    request_id: RequestId,
    armed: bool,
}

impl PendingGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.armed && remove_pending(&self.table, &self.request_id).is_some() {
            let _ = self.commands.try_send(Command::Cancel {
                request_id: self.request_id.clone(),
            });
        }
    }
}

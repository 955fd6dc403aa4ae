//! Per-session listener hub.
//!
//! Holds the listener set for one session and performs language-scoped
//! broadcast. Mutations during broadcast iterate a snapshot; a failed send
//! evicts that listener only and never propagates.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::control::ServerMessage;
use crate::listener::{Listener, Outbound};

/// The listener set for one session.
#[derive(Default)]
pub struct ListenerHub {
    listeners: RwLock<HashMap<String, Arc<Listener>>>,
}

impl ListenerHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a listener, replacing any previous one with the same
    /// client id.
    pub fn insert(&self, listener: Arc<Listener>) {
        self.listeners
            .write()
            .insert(listener.client_id().to_string(), listener);
    }

    /// Removes a listener by client id.
    pub fn remove(&self, client_id: &str) -> Option<Arc<Listener>> {
        self.listeners.write().remove(client_id)
    }

    /// Looks up a listener by client id.
    pub fn get(&self, client_id: &str) -> Option<Arc<Listener>> {
        self.listeners.read().get(client_id).cloned()
    }

    /// Returns the number of connected listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns true when no listeners remain.
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Updates a listener's language subscription. Returns false when the
    /// client id is unknown.
    pub fn update_language(&self, client_id: &str, lang: Option<String>) -> bool {
        match self.get(client_id) {
            Some(listener) => {
                listener.set_lang(lang);
                true
            }
            None => false,
        }
    }

    /// Returns the distinct non-null languages currently subscribed.
    pub fn languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = self
            .listeners
            .read()
            .values()
            .filter_map(|l| l.lang())
            .collect();
        langs.sort();
        langs.dedup();
        langs
    }

    /// Returns the listeners whose subscription matches `lang` (including
    /// null subscriptions).
    pub fn listeners_by_language(&self, lang: &str) -> Vec<Arc<Listener>> {
        self.listeners
            .read()
            .values()
            .filter(|l| l.wants(Some(lang)))
            .cloned()
            .collect()
    }

    /// Snapshots the listeners a frame tagged `lang` would reach right
    /// now. Segment-scoped delivery pins this set at `audio.start` so a
    /// mid-segment language change affects the next segment, not chunks
    /// already streaming.
    pub fn snapshot(&self, lang: Option<&str>) -> Vec<Arc<Listener>> {
        self.listeners
            .read()
            .values()
            .filter(|l| l.wants(lang))
            .cloned()
            .collect()
    }

    /// Sends a control message to a pinned recipient set.
    pub fn send_control_to(&self, targets: &[Arc<Listener>], msg: &ServerMessage) {
        self.send_to(targets, |listener| {
            listener.send(Outbound::Control(msg.clone()))
        });
    }

    /// Sends an encoded audio frame to a pinned recipient set.
    pub fn send_audio_to(&self, targets: &[Arc<Listener>], frame: &Bytes) {
        self.send_to(targets, |listener| {
            listener.send(Outbound::Audio(frame.clone()))
        });
    }

    fn send_to<F>(&self, targets: &[Arc<Listener>], send: F)
    where
        F: Fn(&Listener) -> crate::error::Result<()>,
    {
        let mut dead: Vec<String> = Vec::new();
        for listener in targets {
            // Skip recipients evicted since the snapshot was taken.
            if self.get(listener.client_id()).is_none() {
                continue;
            }
            if send(listener).is_err() {
                dead.push(listener.client_id().to_string());
            }
        }
        if !dead.is_empty() {
            let mut listeners = self.listeners.write();
            for client_id in dead {
                warn!(client_id, "evicting unreachable listener");
                listeners.remove(&client_id);
            }
        }
    }

    /// Broadcasts a control message, optionally scoped to one language.
    pub fn broadcast_control(&self, msg: &ServerMessage, lang: Option<&str>) {
        self.broadcast(lang, |listener| {
            listener.send(Outbound::Control(msg.clone()))
        });
    }

    /// Broadcasts an encoded audio frame, optionally scoped to one
    /// language.
    pub fn broadcast_audio(&self, frame: &Bytes, lang: Option<&str>) {
        self.broadcast(lang, |listener| {
            listener.send(Outbound::Audio(frame.clone()))
        });
    }

    fn broadcast<F>(&self, lang: Option<&str>, send: F)
    where
        F: Fn(&Listener) -> crate::error::Result<()>,
    {
        let snapshot: Vec<Arc<Listener>> = self.listeners.read().values().cloned().collect();

        let mut dead: Vec<String> = Vec::new();
        for listener in &snapshot {
            if !listener.wants(lang) {
                continue;
            }
            if send(listener).is_err() {
                dead.push(listener.client_id().to_string());
            }
        }

        if !dead.is_empty() {
            let mut listeners = self.listeners.write();
            for client_id in dead {
                warn!(client_id, "evicting unreachable listener");
                listeners.remove(&client_id);
            }
        } else {
            debug!(
                listeners = snapshot.len(),
                lang = lang.unwrap_or("*"),
                "broadcast complete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Codec;
    use crate::listener::Listener;
    use tokio::sync::mpsc;

    fn attach(
        hub: &ListenerHub,
        client_id: &str,
        lang: Option<&str>,
    ) -> mpsc::Receiver<Outbound> {
        let (listener, rx) = Listener::new(
            client_id,
            format!("s1:{client_id}"),
            Codec::Mp3,
            44100,
            lang.map(str::to_string),
        );
        hub.insert(Arc::new(listener));
        rx
    }

    fn end_msg() -> ServerMessage {
        ServerMessage::End {
            stream_id: "s1:t".to_string(),
            segment_id: "s1:seg:1".to_string(),
            version: 1,
        }
    }

    #[tokio::test]
    async fn test_language_scoped_broadcast() {
        let hub = ListenerHub::new();
        let mut es = attach(&hub, "a", Some("es"));
        let mut fr = attach(&hub, "b", Some("fr"));
        let mut all = attach(&hub, "c", None);

        hub.broadcast_audio(&Bytes::from_static(b"es-audio"), Some("es"));

        assert!(matches!(es.try_recv(), Ok(Outbound::Audio(_))));
        assert!(fr.try_recv().is_err());
        assert!(matches!(all.try_recv(), Ok(Outbound::Audio(_))));
    }

    #[tokio::test]
    async fn test_untagged_frame_reaches_everyone() {
        let hub = ListenerHub::new();
        let mut es = attach(&hub, "a", Some("es"));
        let mut fr = attach(&hub, "b", Some("fr"));

        hub.broadcast_control(&end_msg(), None);

        assert!(matches!(es.try_recv(), Ok(Outbound::Control(_))));
        assert!(matches!(fr.try_recv(), Ok(Outbound::Control(_))));
    }

    #[tokio::test]
    async fn test_dead_listener_evicted_others_unaffected() {
        let hub = ListenerHub::new();
        let dead_rx = attach(&hub, "dead", Some("es"));
        let mut live = attach(&hub, "live", Some("es"));
        drop(dead_rx);

        hub.broadcast_audio(&Bytes::from_static(b"x"), Some("es"));

        assert_eq!(hub.len(), 1);
        assert!(hub.get("dead").is_none());
        assert!(matches!(live.try_recv(), Ok(Outbound::Audio(_))));
    }

    #[tokio::test]
    async fn test_language_update_observed_by_next_broadcast() {
        let hub = ListenerHub::new();
        let mut rx = attach(&hub, "a", Some("es"));

        hub.broadcast_audio(&Bytes::from_static(b"one"), Some("es"));
        assert!(rx.try_recv().is_ok());

        assert!(hub.update_language("a", Some("fr".to_string())));
        hub.broadcast_audio(&Bytes::from_static(b"two"), Some("es"));
        assert!(rx.try_recv().is_err());

        hub.broadcast_audio(&Bytes::from_static(b"three"), Some("fr"));
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_pinned_recipients_survive_language_switch() {
        let hub = ListenerHub::new();
        let mut rx = attach(&hub, "a", Some("es"));
        let pinned = hub.snapshot(Some("es"));
        assert_eq!(pinned.len(), 1);

        hub.update_language("a", Some("fr".to_string()));
        hub.send_audio_to(&pinned, &Bytes::from_static(b"late-chunk"));
        assert!(rx.try_recv().is_ok());

        // The next snapshot excludes the switched listener.
        assert!(hub.snapshot(Some("es")).is_empty());
    }

    #[tokio::test]
    async fn test_pinned_send_skips_evicted_listener() {
        let hub = ListenerHub::new();
        let _rx = attach(&hub, "a", Some("es"));
        let pinned = hub.snapshot(Some("es"));

        hub.remove("a");
        hub.send_audio_to(&pinned, &Bytes::from_static(b"x"));
        assert_eq!(hub.len(), 0);
    }

    #[tokio::test]
    async fn test_languages_distinct_sorted() {
        let hub = ListenerHub::new();
        let _a = attach(&hub, "a", Some("fr"));
        let _b = attach(&hub, "b", Some("es"));
        let _c = attach(&hub, "c", Some("es"));
        let _d = attach(&hub, "d", None);

        assert_eq!(hub.languages(), vec!["es".to_string(), "fr".to_string()]);
    }
}

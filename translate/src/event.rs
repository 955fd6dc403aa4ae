//! Wire events of the remote realtime translation API.

use serde::{Deserialize, Serialize};

// ============================================================================
// Client event types (sent to the remote)
// ============================================================================

/// Session configuration update, sent once after connect.
pub const EVENT_TYPE_SESSION_UPDATE: &str = "session.update";

/// Creates one input item carrying text to translate.
pub const EVENT_TYPE_ITEM_CREATE: &str = "conversation.item.create";

/// Begins generation for the oldest pending item.
pub const EVENT_TYPE_RESPONSE_CREATE: &str = "response.create";

/// Cancels the in-flight response.
pub const EVENT_TYPE_RESPONSE_CANCEL: &str = "response.cancel";

// ============================================================================
// Server event types (received from the remote)
// ============================================================================

/// Error event.
pub const EVENT_TYPE_ERROR: &str = "error";

/// Session lifecycle.
pub const EVENT_TYPE_SESSION_CREATED: &str = "session.created";
pub const EVENT_TYPE_SESSION_UPDATED: &str = "session.updated";

/// The remote assigned an id to a submitted item.
pub const EVENT_TYPE_ITEM_CREATED: &str = "conversation.item.created";

/// Response lifecycle.
pub const EVENT_TYPE_RESPONSE_CREATED: &str = "response.created";
pub const EVENT_TYPE_RESPONSE_DONE: &str = "response.done";

/// Streaming text output. The output item id is NOT the input item id.
pub const EVENT_TYPE_RESPONSE_TEXT_DELTA: &str = "response.text.delta";
pub const EVENT_TYPE_RESPONSE_TEXT_DONE: &str = "response.text.done";

/// Reference to an item in a server event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemRef {
    /// Remote-assigned item id.
    #[serde(default)]
    pub id: String,
}

/// Reference to a response in a server event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseRef {
    /// Remote-assigned response id.
    #[serde(default)]
    pub id: String,
}

/// Error payload of an `error` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// One event received from the remote. Fields are populated per event
/// type; unknown types are preserved for logging and otherwise ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerEvent {
    /// Event type discriminator.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Server-assigned event id.
    #[serde(default)]
    pub event_id: Option<String>,
    /// Item reference (`conversation.item.created`).
    #[serde(default)]
    pub item: Option<ItemRef>,
    /// Flat item id (`error` events may carry one).
    #[serde(default)]
    pub item_id: Option<String>,
    /// Response reference (`response.created`).
    #[serde(default)]
    pub response: Option<ResponseRef>,
    /// Flat response id.
    #[serde(default)]
    pub response_id: Option<String>,
    /// Text delta (`response.text.delta`).
    #[serde(default)]
    pub delta: Option<String>,
    /// Complete text (`response.text.done`).
    #[serde(default)]
    pub text: Option<String>,
    /// Error payload (`error`).
    #[serde(default)]
    pub error: Option<RemoteError>,
}

impl ServerEvent {
    /// The item id, from whichever field the event carries it in.
    pub fn item_id(&self) -> Option<&str> {
        self.item
            .as_ref()
            .map(|i| i.id.as_str())
            .or(self.item_id.as_deref())
    }

    /// The response id, from whichever field the event carries it in.
    pub fn response_id(&self) -> Option<&str> {
        self.response
            .as_ref()
            .map(|r| r.id.as_str())
            .or(self.response_id.as_deref())
    }
}

/// Generates a client event id.
pub fn generate_event_id() -> String {
    format!("evt_{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}

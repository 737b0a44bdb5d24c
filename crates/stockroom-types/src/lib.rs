//! Shared wire types for the Stockroom live-update feed.
//!
//! Every message on the WebSocket feed, in either direction, has the same
//! envelope:
//!
//! ```json
//! { "type": "product_created", "data": { "id": 9, "name": "X" } }
//! ```
//!
//! Server-emitted messages carry an [`EventKind`]. Client-emitted frames are
//! decoded as [`InboundFrame`], whose tag is kept as a raw string so that an
//! unknown tag is a routing decision for the hub rather than a decode error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while encoding or decoding feed messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// The frame is not valid JSON or does not match the envelope shape.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Kind of a server-confirmed inventory change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "product_created")]
    ProductCreated,
    /// Product update. Older clients emitted `product_upgraded` for the same
    /// change, so that tag is accepted on decode.
    #[serde(rename = "product_updated", alias = "product_upgraded")]
    ProductUpdated,
    #[serde(rename = "product_deleted")]
    ProductDeleted,
    #[serde(rename = "category_created")]
    CategoryCreated,
    #[serde(rename = "category_updated")]
    CategoryUpdated,
    #[serde(rename = "category_deleted")]
    CategoryDeleted,
}

impl EventKind {
    /// Returns the wire tag for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProductCreated => "product_created",
            Self::ProductUpdated => "product_updated",
            Self::ProductDeleted => "product_deleted",
            Self::CategoryCreated => "category_created",
            Self::CategoryUpdated => "category_updated",
            Self::CategoryDeleted => "category_deleted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity reference carried by every feed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    pub id: i64,
    pub name: String,
}

/// A server-confirmed change, ready to be fanned out to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: EventPayload,
}

impl Event {
    pub fn new(kind: EventKind, id: i64, name: impl Into<String>) -> Self {
        Self {
            kind,
            data: EventPayload {
                id,
                name: name.into(),
            },
        }
    }

    /// Serializes the event into its wire form.
    ///
    /// # Errors
    ///
    /// Returns `WireError::Malformed` if serialization fails.
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Frame received from a subscriber.
///
/// The tag is left unparsed; see [`ClientIntent::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventPayload,
}

impl InboundFrame {
    /// Decodes a text frame into the shared envelope.
    ///
    /// # Errors
    ///
    /// Returns `WireError::Malformed` when the text is not a JSON object with
    /// a string `type` and a `data` object holding an integer `id` and a
    /// string `name`.
    pub fn decode(text: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Change intents a subscriber may announce over the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIntent {
    Create,
    Update,
    Delete,
}

impl ClientIntent {
    /// Maps a raw client tag to an intent. Unknown tags yield `None`.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// The server event re-broadcast when this intent is relayed.
    pub fn confirmed_kind(self) -> EventKind {
        match self {
            Self::Create => EventKind::ProductCreated,
            Self::Update => EventKind::ProductUpdated,
            Self::Delete => EventKind::ProductDeleted,
        }
    }
}

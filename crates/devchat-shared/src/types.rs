use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// User identity = backend-assigned uid string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Deterministic id for the private channel between two users: the
    /// lexicographically smaller uid first, joined with `/`. Both sides
    /// derive the same id without coordination.
    pub fn direct(a: &UserId, b: &UserId) -> Self {
        if a < b {
            Self(format!("{}/{}", a.0, b.0))
        } else {
            Self(format!("{}/{}", b.0, a.0))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-assigned, order-preserving key for an appended element.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PushKey(pub String);

impl PushKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PushKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two child-event streams a path can be subscribed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChildAdded,
    ChildRemoved,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Denormalized author snapshot embedded in messages and channel metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRef {
    pub id: UserId,
    pub name: String,
    pub avatar: String,
}

/// Profile record stored under `users/{uid}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub name: String,
    pub avatar: String,
}

/// Derived liveness state, recomputed from presence child events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn is_online(self) -> bool {
        self == Self::Online
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Message payload: exactly one of plain text or an image URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MessageBody {
    Text { content: String },
    Image { image: String },
}

impl MessageBody {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Image { image: url.into() }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }

    /// The text content, if this is a text message.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Text { content } => Some(content),
            Self::Image { .. } => None,
        }
    }
}

/// A single chat message. Immutable once written; identified by the push
/// key it was stored under, owned by the channel path it was written to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Server-assigned timestamp (epoch millis), monotonically
    /// non-decreasing in backend write order.
    pub timestamp: i64,
    pub user: UserRef,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl Message {
    /// Build the outgoing envelope for a new message. The timestamp slot
    /// holds the server-timestamp sentinel; the backend resolves it to its
    /// own clock at write time.
    pub fn envelope(user: &UserRef, body: MessageBody) -> Value {
        let mut value = json!({
            "timestamp": server_timestamp(),
            "user": user,
        });
        if let Value::Object(map) = &mut value {
            match body {
                MessageBody::Text { content } => {
                    map.insert("content".into(), Value::String(content));
                }
                MessageBody::Image { image } => {
                    map.insert("image".into(), Value::String(image));
                }
            }
        }
        value
    }
}

/// Sentinel the backend replaces with its own clock at write time.
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Attribution snapshot recorded when a channel is created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBy {
    pub name: String,
    pub avatar: String,
}

/// A public channel. Created once via "add channel"; never mutated
/// afterwards by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub details: String,
    pub created_by: CreatedBy,
}

impl Channel {
    /// Rebuild a channel from its storage key and stored payload.
    pub fn from_record(id: ChannelId, record: ChannelRecord) -> Self {
        Self {
            id,
            name: record.name,
            details: record.details,
            created_by: record.created_by,
        }
    }
}

/// The stored channel payload, keyed by the channel id: the value written
/// under `channels/{id}` at creation, and the denormalized snapshot
/// written under `users/{uid}/starred/{channelId}` on star (removed on
/// unstar; not kept live-synchronized).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    pub name: String,
    pub details: String,
    pub created_by: CreatedBy,
}

impl ChannelRecord {
    pub fn snapshot_of(channel: &Channel) -> Self {
        Self {
            name: channel.name.clone(),
            details: channel.details.clone(),
            created_by: channel.created_by.clone(),
        }
    }
}

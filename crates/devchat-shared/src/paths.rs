//! Typed handles to locations in the remote JSON tree.
//!
//! A [`RemotePath`] is a list of non-empty segments. `child()` accepts
//! multi-segment strings and splits on `/`, so pairwise private-channel
//! ids (which contain a `/`) nest naturally.

use crate::types::{ChannelId, UserId};

/// A slash-separated path into the remote tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemotePath {
    segments: Vec<String>,
}

impl RemotePath {
    /// The tree root (empty path).
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parse a `a/b/c` style path. Empty segments are dropped.
    pub fn parse(path: &str) -> Self {
        Self::root().child(path)
    }

    /// Append one or more segments (splits the argument on `/`).
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(
            segment
                .as_ref()
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment, i.e. the key of the element this path points at.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Path with the last segment removed. Root has no parent.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }
}

impl std::fmt::Display for RemotePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

// ---------------------------------------------------------------------------
// Well-known collections
// ---------------------------------------------------------------------------

pub fn channels() -> RemotePath {
    RemotePath::parse("channels")
}

pub fn users() -> RemotePath {
    RemotePath::parse("users")
}

pub fn presence() -> RemotePath {
    RemotePath::parse("presence")
}

pub fn user_profile(uid: &UserId) -> RemotePath {
    users().child(uid.as_str())
}

pub fn presence_entry(uid: &UserId) -> RemotePath {
    presence().child(uid.as_str())
}

/// Message log for a channel. Private channels live under a separate root
/// so the pairwise ids never collide with public channel keys.
pub fn channel_messages(channel: &ChannelId, private: bool) -> RemotePath {
    let root = if private {
        RemotePath::parse("private_messages")
    } else {
        RemotePath::parse("messages")
    };
    root.child(channel.as_str())
}

/// Typing markers for a channel, keyed by uid.
pub fn channel_typing(channel: &ChannelId) -> RemotePath {
    RemotePath::parse("typing").child(channel.as_str())
}

pub fn typing_entry(channel: &ChannelId, uid: &UserId) -> RemotePath {
    channel_typing(channel).child(uid.as_str())
}

/// A user's starred-channel snapshots.
pub fn starred(uid: &UserId) -> RemotePath {
    user_profile(uid).child("starred")
}

pub fn starred_entry(uid: &UserId, channel: &ChannelId) -> RemotePath {
    starred(uid).child(channel.as_str())
}

/// Blob storage location for a user's media upload.
pub fn chat_media(uid: &UserId, file_name: &str) -> RemotePath {
    RemotePath::parse("chat_media")
        .child(uid.as_str())
        .child(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_splits_on_slash() {
        let a = UserId::new("u1");
        let b = UserId::new("u2");
        let id = ChannelId::direct(&a, &b);

        let path = channel_messages(&id, true);
        assert_eq!(path.segments(), &["private_messages", "u1", "u2"]);
        assert_eq!(path.to_string(), "private_messages/u1/u2");
    }

    #[test]
    fn test_parent_and_key() {
        let path = typing_entry(&ChannelId::new("general"), &UserId::new("u1"));
        assert_eq!(path.key(), Some("u1"));
        assert_eq!(path.parent().unwrap().to_string(), "typing/general");
        assert!(RemotePath::root().parent().is_none());
    }

    #[test]
    fn test_parse_drops_empty_segments() {
        let path = RemotePath::parse("a//b/");
        assert_eq!(path.segments(), &["a", "b"]);
    }

    #[test]
    fn test_starred_nests_under_profile() {
        let path = starred_entry(&UserId::new("u1"), &ChannelId::new("ch1"));
        assert_eq!(path.to_string(), "users/u1/starred/ch1");
    }
}

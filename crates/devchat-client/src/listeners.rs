//! Listener bookkeeping.
//!
//! Every active remote subscription is tracked as a composite
//! `(subscriber id, path, kind)` key so that duplicate subscriptions are
//! suppressed in O(1) and teardown deregisters exactly the set that was
//! registered, no more, no less.

use std::collections::HashSet;

use devchat_shared::paths::RemotePath;
use devchat_shared::types::EventKind;

/// Identity of one tracked subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerKey {
    /// The channel or user id the subscription belongs to.
    pub id: String,
    pub path: RemotePath,
    pub kind: EventKind,
}

impl ListenerKey {
    pub fn new(id: impl Into<String>, path: RemotePath, kind: EventKind) -> Self {
        Self {
            id: id.into(),
            path,
            kind,
        }
    }
}

/// Tracks the subscriptions one panel holds over its mount lifetime.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    keys: HashSet<ListenerKey>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a subscription. Returns `false` if an identical key is
    /// already live, in which case the caller must not subscribe again.
    pub fn register(&mut self, key: ListenerKey) -> bool {
        self.keys.insert(key)
    }

    pub fn is_registered(&self, key: &ListenerKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Hand every tracked key to teardown exactly once, leaving the
    /// registry empty. Idempotent when already empty.
    pub fn drain(&mut self) -> Vec<ListenerKey> {
        self.keys.drain().collect()
    }
}

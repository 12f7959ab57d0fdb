//! Typing indicators for one channel.
//!
//! A typing entry is `typing/{channel}/{user} -> displayName`: created
//! while the user's draft is non-empty, removed when the draft clears.
//! The disconnect cleanup for our own entry is registered per connection
//! signal, not per keystroke, so an unclean drop removes it even if the
//! process never gets to. The backend consumes the cleanup when it fires,
//! so a reconnect re-registers it.

use serde_json::json;
use tracing::{debug, warn};

use devchat_backend::{BackendEvent, BackendHandle};
use devchat_shared::paths;
use devchat_shared::types::{ChannelId, EventKind, UserRef};

use crate::listeners::{ListenerKey, ListenerRegistry};
use crate::Result;

pub struct TypingIndicator {
    backend: BackendHandle,
    channel: ChannelId,
    user: UserRef,
    /// Other users currently typing in this channel: (uid, display name).
    typists: Vec<(String, String)>,
    cleanup_registered: bool,
    registry: ListenerRegistry,
}

impl TypingIndicator {
    pub fn new(backend: BackendHandle, channel: ChannelId, user: UserRef) -> Self {
        Self {
            backend,
            channel,
            user,
            typists: Vec::new(),
            cleanup_registered: false,
            registry: ListenerRegistry::new(),
        }
    }

    /// Subscribe to both typing streams for the channel.
    pub async fn mount(&mut self) -> Result<()> {
        let path = paths::channel_typing(&self.channel);
        for kind in [EventKind::ChildAdded, EventKind::ChildRemoved] {
            let key = ListenerKey::new(self.channel.as_str(), path.clone(), kind);
            if self.registry.register(key) {
                self.backend.subscribe(path.clone(), kind).await?;
            }
        }
        Ok(())
    }

    /// Apply one remote event.
    pub async fn handle_event(&mut self, event: &BackendEvent) -> Result<()> {
        match event {
            BackendEvent::Connection(true) => self.register_cleanup().await?,
            // The drop consumed our cleanup; the next connect re-registers.
            BackendEvent::Connection(false) => self.cleanup_registered = false,
            BackendEvent::ChildAdded { path, key, value } => {
                if *path == paths::channel_typing(&self.channel)
                    && key != self.user.id.as_str()
                    && !self.typists.iter().any(|(uid, _)| uid == key)
                {
                    match value.as_str() {
                        Some(name) => self.typists.push((key.clone(), name.to_string())),
                        None => warn!(key = %key, "Malformed typing entry"),
                    }
                }
            }
            BackendEvent::ChildRemoved { path, key, .. } => {
                if *path == paths::channel_typing(&self.channel) {
                    self.typists.retain(|(uid, _)| uid != key);
                }
            }
        }
        Ok(())
    }

    async fn register_cleanup(&mut self) -> Result<()> {
        if self.cleanup_registered {
            return Ok(());
        }
        let entry = paths::typing_entry(&self.channel, &self.user.id);
        self.backend.register_disconnect_cleanup(entry).await?;
        self.cleanup_registered = true;
        debug!(channel = %self.channel, "Typing cleanup registered");
        Ok(())
    }

    /// Reflect the draft state remotely: a non-empty draft upserts our
    /// typing entry, an empty one removes it.
    pub async fn set_typing_state(&mut self, draft: &str) -> Result<()> {
        let entry = paths::typing_entry(&self.channel, &self.user.id);
        if draft.is_empty() {
            self.backend.remove(entry).await?;
        } else {
            self.backend.write(entry, json!(self.user.name)).await?;
        }
        Ok(())
    }

    /// Display names of everyone else currently typing.
    pub fn typists(&self) -> Vec<&str> {
        self.typists.iter().map(|(_, name)| name.as_str()).collect()
    }

    /// Deregister exactly the subscriptions this indicator holds.
    pub async fn teardown(&mut self) -> Result<()> {
        for key in self.registry.drain() {
            self.backend.unsubscribe(key.path, key.kind).await?;
        }
        Ok(())
    }
}

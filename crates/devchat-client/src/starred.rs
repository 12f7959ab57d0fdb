//! Starred channels.
//!
//! Starring writes a denormalized snapshot of the channel metadata under
//! `users/{uid}/starred/{channelId}`; unstarring removes it. The sidebar
//! panel mirrors that collection. The star toggle shown with an open
//! channel is seeded by a one-shot read when the channel is selected, so
//! it reflects the stored state rather than panel-local guesses.

use serde_json::json;
use tracing::{info, warn};

use devchat_backend::{BackendEvent, BackendHandle};
use devchat_shared::paths;
use devchat_shared::types::{Channel, ChannelId, ChannelRecord, EventKind, UserId};

use crate::listeners::{ListenerKey, ListenerRegistry};
use crate::Result;

pub struct StarredPanel {
    backend: BackendHandle,
    uid: UserId,
    starred: Vec<Channel>,
    registry: ListenerRegistry,
}

impl StarredPanel {
    pub fn new(backend: BackendHandle, uid: UserId) -> Self {
        Self {
            backend,
            uid,
            starred: Vec::new(),
            registry: ListenerRegistry::new(),
        }
    }

    /// Subscribe to both starred streams for this user.
    pub async fn mount(&mut self) -> Result<()> {
        let path = paths::starred(&self.uid);
        for kind in [EventKind::ChildAdded, EventKind::ChildRemoved] {
            let key = ListenerKey::new(self.uid.as_str(), path.clone(), kind);
            if self.registry.register(key) {
                self.backend.subscribe(path.clone(), kind).await?;
            }
        }
        Ok(())
    }

    /// Apply one remote event.
    pub fn handle_event(&mut self, event: &BackendEvent) {
        match event {
            BackendEvent::ChildAdded { path, key, value } => {
                if *path != paths::starred(&self.uid) {
                    return;
                }
                match serde_json::from_value::<ChannelRecord>(value.clone()) {
                    Ok(record) => self
                        .starred
                        .push(Channel::from_record(ChannelId::new(key.clone()), record)),
                    Err(e) => warn!(key = %key, error = %e, "Malformed starred snapshot"),
                }
            }
            BackendEvent::ChildRemoved { path, key, .. } => {
                if *path == paths::starred(&self.uid) {
                    self.starred.retain(|c| c.id.as_str() != key);
                }
            }
            BackendEvent::Connection(_) => {}
        }
    }

    /// Star a channel: store its metadata snapshot under this user.
    pub async fn star(&self, channel: &Channel) -> Result<()> {
        let snapshot = ChannelRecord::snapshot_of(channel);
        self.backend
            .write(
                paths::starred_entry(&self.uid, &channel.id),
                json!(&snapshot),
            )
            .await?;
        info!(channel = %channel.id, "Channel starred");
        Ok(())
    }

    /// Unstar a channel: drop the stored snapshot.
    pub async fn unstar(&self, channel: &ChannelId) -> Result<()> {
        self.backend
            .remove(paths::starred_entry(&self.uid, channel))
            .await?;
        info!(channel = %channel, "Channel unstarred");
        Ok(())
    }

    /// One-shot read of the stored star state, used to seed the toggle
    /// when a channel is opened.
    pub async fn seed_toggle(&self, channel: &ChannelId) -> Result<bool> {
        let stored = self
            .backend
            .read_once(paths::starred_entry(&self.uid, channel))
            .await?;
        Ok(stored.is_some())
    }

    /// Mirror-local star state, for sidebar rendering.
    pub fn is_starred(&self, channel: &ChannelId) -> bool {
        self.starred.iter().any(|c| &c.id == channel)
    }

    pub fn channels(&self) -> &[Channel] {
        &self.starred
    }

    /// Deregister exactly the subscriptions this panel holds.
    pub async fn teardown(&mut self) -> Result<()> {
        for key in self.registry.drain() {
            self.backend.unsubscribe(key.path, key.kind).await?;
        }
        Ok(())
    }
}

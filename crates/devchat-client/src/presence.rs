//! Direct-messages panel: the user directory with live presence.
//!
//! Mirrors the `users` collection (everyone but the signed-in user) and
//! derives each entry's online/offline status from the `presence` path.
//! Status is recomputed over the whole list on every presence event
//! rather than patched incrementally.
//!
//! The panel also owns this client's own presence marker: on each
//! connection signal it writes `presence/{uid} = true` and registers the
//! disconnect cleanup for that entry. The backend consumes a cleanup when
//! it fires, so after a drop the next `Connection(true)` must re-publish
//! both.

use serde_json::json;
use tracing::{debug, warn};

use devchat_backend::{BackendEvent, BackendHandle};
use devchat_shared::paths;
use devchat_shared::types::{ChannelId, EventKind, PresenceStatus, UserId, UserProfile};

use crate::listeners::{ListenerKey, ListenerRegistry};
use crate::state::{ActiveChannel, ChannelState};
use crate::Result;

/// A directory entry: another user and their derived status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUser {
    pub id: UserId,
    pub name: String,
    pub avatar: String,
    pub status: PresenceStatus,
}

pub struct DirectMessagesPanel {
    backend: BackendHandle,
    current_uid: UserId,
    users: Vec<DirectoryUser>,
    active: Option<UserId>,
    presence_registered: bool,
    registry: ListenerRegistry,
}

impl DirectMessagesPanel {
    pub fn new(backend: BackendHandle, current_uid: UserId) -> Self {
        Self {
            backend,
            current_uid,
            users: Vec::new(),
            active: None,
            presence_registered: false,
            registry: ListenerRegistry::new(),
        }
    }

    /// Subscribe to the user directory and both presence streams.
    pub async fn mount(&mut self) -> Result<()> {
        let subscriptions = [
            (paths::users(), EventKind::ChildAdded),
            (paths::presence(), EventKind::ChildAdded),
            (paths::presence(), EventKind::ChildRemoved),
        ];
        for (path, kind) in subscriptions {
            let key = ListenerKey::new(self.current_uid.as_str(), path.clone(), kind);
            if self.registry.register(key) {
                self.backend.subscribe(path, kind).await?;
            }
        }
        Ok(())
    }

    /// Apply one remote event.
    pub async fn handle_event(&mut self, event: &BackendEvent) -> Result<()> {
        match event {
            BackendEvent::Connection(true) => self.register_presence().await?,
            // The drop consumed our cleanup; the next connect re-registers.
            BackendEvent::Connection(false) => self.presence_registered = false,
            BackendEvent::ChildAdded { path, key, value } => {
                if *path == paths::users() && key != self.current_uid.as_str() {
                    match serde_json::from_value::<UserProfile>(value.clone()) {
                        Ok(profile) => self.users.push(DirectoryUser {
                            id: UserId::new(key.clone()),
                            name: profile.name,
                            avatar: profile.avatar,
                            // Offline until the presence stream says otherwise
                            status: PresenceStatus::Offline,
                        }),
                        Err(e) => warn!(key = %key, error = %e, "Malformed user profile"),
                    }
                } else if *path == paths::presence() && key != self.current_uid.as_str() {
                    self.set_status(key, PresenceStatus::Online);
                }
            }
            BackendEvent::ChildRemoved { path, key, .. } => {
                if *path == paths::presence() && key != self.current_uid.as_str() {
                    self.set_status(key, PresenceStatus::Offline);
                }
            }
        }
        Ok(())
    }

    /// Publish our own presence marker, with its disconnect cleanup.
    /// Runs once per connection; duplicate `Connection(true)` signals
    /// without an intervening drop are ignored.
    async fn register_presence(&mut self) -> Result<()> {
        if self.presence_registered {
            return Ok(());
        }
        let entry = paths::presence_entry(&self.current_uid);
        self.backend.write(entry.clone(), json!(true)).await?;
        self.backend.register_disconnect_cleanup(entry).await?;
        self.presence_registered = true;
        debug!(uid = %self.current_uid, "Presence registered");
        Ok(())
    }

    /// Recompute status over the entire accumulated list.
    fn set_status(&mut self, uid: &str, status: PresenceStatus) {
        for user in &mut self.users {
            if user.id.as_str() == uid {
                user.status = status;
            }
        }
    }

    /// Open the private conversation with another user.
    pub fn open_direct(
        &mut self,
        other: &UserId,
        channel_state: &mut ChannelState,
    ) -> Option<ChannelId> {
        let name = self.users.iter().find(|u| &u.id == other)?.name.clone();
        let id = ChannelId::direct(&self.current_uid, other);
        self.active = Some(other.clone());
        channel_state.set_channel(
            ActiveChannel {
                id: id.clone(),
                name,
            },
            true,
        );
        Some(id)
    }

    pub fn users(&self) -> &[DirectoryUser] {
        &self.users
    }

    pub fn is_online(&self, uid: &UserId) -> bool {
        self.users
            .iter()
            .any(|u| &u.id == uid && u.status.is_online())
    }

    pub fn active(&self) -> Option<&UserId> {
        self.active.as_ref()
    }

    /// Deregister exactly the subscriptions this panel holds.
    pub async fn teardown(&mut self) -> Result<()> {
        for key in self.registry.drain() {
            self.backend.unsubscribe(key.path, key.kind).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devchat_backend::{spawn_backend, BackendConfig};
    use tokio::sync::mpsc;

    async fn drain(
        events: &mut mpsc::Receiver<BackendEvent>,
        panel: &mut DirectMessagesPanel,
    ) {
        while let Ok(event) = events.try_recv() {
            panel.handle_event(&event).await.unwrap();
        }
    }

    async fn add_user(backend: &BackendHandle, uid: &str, name: &str) {
        backend
            .write(
                paths::user_profile(&UserId::new(uid)),
                json!({ "name": name, "avatar": format!("{uid}.png") }),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_directory_excludes_self() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        let mut panel = DirectMessagesPanel::new(backend.clone(), UserId::new("u-alice"));
        panel.mount().await.unwrap();

        add_user(&backend, "u-alice", "Alice").await;
        add_user(&backend, "u-bob", "Bob").await;
        drain(&mut events, &mut panel).await;

        assert_eq!(panel.users().len(), 1);
        assert_eq!(panel.users()[0].name, "Bob");
    }

    #[tokio::test]
    async fn test_presence_connect_disconnect_cycle() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        let mut panel = DirectMessagesPanel::new(backend.clone(), UserId::new("u-alice"));
        panel.mount().await.unwrap();

        add_user(&backend, "u-bob", "Bob").await;
        let bob = UserId::new("u-bob");
        backend
            .write(paths::presence_entry(&bob), json!(true))
            .await
            .unwrap();
        drain(&mut events, &mut panel).await;
        assert!(panel.is_online(&bob));

        backend.remove(paths::presence_entry(&bob)).await.unwrap();
        drain(&mut events, &mut panel).await;
        assert!(!panel.is_online(&bob));
    }

    #[tokio::test]
    async fn test_own_presence_registered_once() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        let alice = UserId::new("u-alice");
        let mut panel = DirectMessagesPanel::new(backend.clone(), alice.clone());
        panel.mount().await.unwrap();

        // Initial Connection(true), then a reconnect cycle.
        drain(&mut events, &mut panel).await;
        backend.reconnect().await.unwrap();
        drain(&mut events, &mut panel).await;

        assert_eq!(
            backend
                .read_once(paths::presence_entry(&alice))
                .await
                .unwrap(),
            Some(json!(true))
        );
    }

    #[tokio::test]
    async fn test_presence_republished_after_reconnect() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        let alice = UserId::new("u-alice");
        let mut panel = DirectMessagesPanel::new(backend.clone(), alice.clone());
        panel.mount().await.unwrap();
        drain(&mut events, &mut panel).await;

        backend.drop_connection().await.unwrap();
        drain(&mut events, &mut panel).await;
        backend.reconnect().await.unwrap();
        drain(&mut events, &mut panel).await;

        assert_eq!(
            backend
                .read_once(paths::presence_entry(&alice))
                .await
                .unwrap(),
            Some(json!(true))
        );

        // The re-registered cleanup fires on the next drop too.
        backend.drop_connection().await.unwrap();
        assert!(backend
            .read_once(paths::presence_entry(&alice))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_own_presence_cleared_on_unclean_drop() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        let alice = UserId::new("u-alice");
        let mut panel = DirectMessagesPanel::new(backend.clone(), alice.clone());
        panel.mount().await.unwrap();
        drain(&mut events, &mut panel).await;

        backend.drop_connection().await.unwrap();

        assert!(backend
            .read_once(paths::presence_entry(&alice))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_open_direct_sets_private_channel() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        let mut panel = DirectMessagesPanel::new(backend.clone(), UserId::new("u-alice"));
        panel.mount().await.unwrap();

        add_user(&backend, "u-bob", "Bob").await;
        drain(&mut events, &mut panel).await;

        let mut state = ChannelState::default();
        let id = panel.open_direct(&UserId::new("u-bob"), &mut state).unwrap();

        assert_eq!(id.as_str(), "u-alice/u-bob");
        assert!(state.is_private);
        assert_eq!(state.current.unwrap().name, "Bob");
    }

    #[tokio::test]
    async fn test_teardown_releases_all_listeners() {
        let (backend, _events) = spawn_backend(BackendConfig::default());
        let mut panel = DirectMessagesPanel::new(backend.clone(), UserId::new("u-alice"));
        panel.mount().await.unwrap();
        panel.mount().await.unwrap();

        panel.teardown().await.unwrap();
        assert_eq!(backend.active_subscription_count().await.unwrap(), 0);
    }
}

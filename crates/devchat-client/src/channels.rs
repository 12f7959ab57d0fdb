//! Channel directory panel.
//!
//! Mirrors the `channels` collection, auto-selects the first channel on
//! initial load, and owns the "add channel" form.

use serde_json::json;
use tracing::{info, warn};

use devchat_backend::{BackendEvent, BackendHandle};
use devchat_shared::paths;
use devchat_shared::types::{Channel, ChannelId, ChannelRecord, CreatedBy, EventKind, UserRef};
use devchat_shared::validation::ChannelForm;

use crate::listeners::{ListenerKey, ListenerRegistry};
use crate::state::{ActiveChannel, ChannelState};
use crate::Result;

pub struct ChannelDirectory {
    backend: BackendHandle,
    channels: Vec<Channel>,
    active: Option<ChannelId>,
    first_load: bool,
    pub form: ChannelForm,
    registry: ListenerRegistry,
}

impl ChannelDirectory {
    pub fn new(backend: BackendHandle) -> Self {
        Self {
            backend,
            channels: Vec::new(),
            active: None,
            first_load: true,
            form: ChannelForm::default(),
            registry: ListenerRegistry::new(),
        }
    }

    /// Subscribe to the channel list. Safe to call twice; the registry
    /// suppresses the duplicate.
    pub async fn mount(&mut self) -> Result<()> {
        let path = paths::channels();
        let key = ListenerKey::new("channels", path.clone(), EventKind::ChildAdded);
        if self.registry.register(key) {
            self.backend.subscribe(path, EventKind::ChildAdded).await?;
        }
        Ok(())
    }

    /// Apply one remote event. On the first channel seen during initial
    /// load, selects it as the current (public) channel.
    pub fn handle_event(&mut self, event: &BackendEvent, channel_state: &mut ChannelState) {
        let BackendEvent::ChildAdded { path, key, value } = event else {
            return;
        };
        if *path != paths::channels() {
            return;
        }

        let record: ChannelRecord = match serde_json::from_value(value.clone()) {
            Ok(record) => record,
            Err(e) => {
                warn!(key = %key, error = %e, "Malformed channel record");
                return;
            }
        };
        self.channels
            .push(Channel::from_record(ChannelId::new(key.clone()), record));
        self.set_first_channel(channel_state);
    }

    fn set_first_channel(&mut self, channel_state: &mut ChannelState) {
        if self.first_load {
            if let Some(first) = self.channels.first() {
                self.active = Some(first.id.clone());
                channel_state.set_channel(
                    ActiveChannel {
                        id: first.id.clone(),
                        name: first.name.clone(),
                    },
                    false,
                );
            }
        }
        self.first_load = false;
    }

    /// Submit the "add channel" form. An incomplete form does not submit
    /// and makes no remote call.
    pub async fn add_channel(&mut self, user: &UserRef) -> Result<Option<ChannelId>> {
        if !self.form.is_valid() {
            return Ok(None);
        }

        let record = ChannelRecord {
            name: self.form.name.clone(),
            details: self.form.details.clone(),
            created_by: CreatedBy {
                name: user.name.clone(),
                avatar: user.avatar.clone(),
            },
        };
        let key = self
            .backend
            .push_and_write(paths::channels(), json!(&record))
            .await?;

        self.form = ChannelForm::default();
        info!(channel = %key, name = %record.name, "Channel added");
        Ok(Some(ChannelId::new(key.0)))
    }

    /// Switch the message view to a public channel.
    pub fn change_channel(&mut self, channel: &Channel, channel_state: &mut ChannelState) {
        self.active = Some(channel.id.clone());
        channel_state.set_channel(
            ActiveChannel {
                id: channel.id.clone(),
                name: channel.name.clone(),
            },
            false,
        );
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn active(&self) -> Option<&ChannelId> {
        self.active.as_ref()
    }

    pub fn find(&self, id: &ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| &c.id == id)
    }

    /// Deregister exactly the subscriptions this panel holds.
    pub async fn teardown(&mut self) -> Result<()> {
        for key in self.registry.drain() {
            self.backend.unsubscribe(key.path, key.kind).await?;
        }
        Ok(())
    }
}

//! Per-channel message feed.
//!
//! One `MessageFeed` exists per mounted channel view. It mirrors the
//! channel's message log in remote emission order and recomputes its
//! derived aggregates (unique-author count, per-author post counts) from
//! the entire accumulated collection on every event; the collections are
//! UI-bound and small, so trivial correctness wins over incremental
//! bookkeeping.

use std::collections::HashMap;

use tracing::{info, warn};

use devchat_backend::{BackendEvent, BackendHandle};
use devchat_shared::paths::{self, RemotePath};
use devchat_shared::types::{ChannelId, EventKind, Message, MessageBody, UserRef};
use devchat_shared::validation::validate_draft;

use crate::listeners::{ListenerKey, ListenerRegistry};
use crate::state::ErrorList;
use crate::Result;

/// Per-author contribution summary, shown in the meta panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPost {
    pub avatar: String,
    pub count: usize,
}

pub struct MessageFeed {
    backend: BackendHandle,
    channel: ChannelId,
    private: bool,
    user: UserRef,
    messages: Vec<Message>,
    loading: bool,
    pub draft: String,
    sending: bool,
    unique_users: usize,
    user_posts: HashMap<String, UserPost>,
    pub errors: ErrorList,
    registry: ListenerRegistry,
}

impl MessageFeed {
    pub fn new(backend: BackendHandle, channel: ChannelId, private: bool, user: UserRef) -> Self {
        Self {
            backend,
            channel,
            private,
            user,
            messages: Vec::new(),
            loading: true,
            draft: String::new(),
            sending: false,
            unique_users: 0,
            user_posts: HashMap::new(),
            errors: ErrorList::default(),
            registry: ListenerRegistry::new(),
        }
    }

    fn messages_path(&self) -> RemotePath {
        paths::channel_messages(&self.channel, self.private)
    }

    /// Subscribe to the channel's message log (backlog, then live).
    pub async fn mount(&mut self) -> Result<()> {
        let path = self.messages_path();
        let key = ListenerKey::new(self.channel.as_str(), path.clone(), EventKind::ChildAdded);
        if self.registry.register(key) {
            self.backend.subscribe(path, EventKind::ChildAdded).await?;
        }
        Ok(())
    }

    /// Apply one remote event: append in emission order and recompute the
    /// aggregates from the whole collection.
    pub fn handle_event(&mut self, event: &BackendEvent) {
        let BackendEvent::ChildAdded { path, key, value } = event else {
            return;
        };
        if *path != self.messages_path() {
            return;
        }

        match serde_json::from_value::<Message>(value.clone()) {
            Ok(message) => {
                self.messages.push(message);
                self.loading = false;
                self.recompute();
            }
            Err(e) => warn!(key = %key, error = %e, "Malformed message"),
        }
    }

    fn recompute(&mut self) {
        self.unique_users = count_unique_users(&self.messages);
        self.user_posts = count_user_posts(&self.messages);
    }

    /// Send the current draft. An empty draft is rejected locally with a
    /// validation error and zero remote writes; the draft is cleared only
    /// after the write is confirmed.
    pub async fn send_message(&mut self) -> Result<()> {
        if let Err(e) = validate_draft(&self.draft) {
            self.errors.push(e.message);
            return Ok(());
        }

        self.sending = true;
        self.errors.clear();
        let envelope = Message::envelope(&self.user, MessageBody::text(self.draft.clone()));

        match self.backend.push_and_write(self.messages_path(), envelope).await {
            Ok(key) => {
                self.sending = false;
                self.draft.clear();
                info!(channel = %self.channel, key = %key, "Message sent");
            }
            Err(e) => {
                // No automatic retry; the user resubmits.
                self.sending = false;
                self.errors.push(e.to_string());
            }
        }
        Ok(())
    }

    /// Post an uploaded image as a message.
    pub async fn send_image(&mut self, url: String) -> Result<()> {
        let envelope = Message::envelope(&self.user, MessageBody::image(url));
        match self.backend.push_and_write(self.messages_path(), envelope).await {
            Ok(key) => info!(channel = %self.channel, key = %key, "Image sent"),
            Err(e) => self.errors.push(e.to_string()),
        }
        Ok(())
    }

    /// Case-insensitive search over the accumulated collection, matching
    /// message text and author names.
    pub fn search(&self, term: &str) -> Vec<&Message> {
        let needle = term.to_lowercase();
        self.messages
            .iter()
            .filter(|m| {
                m.body
                    .content()
                    .map(|c| c.to_lowercase().contains(&needle))
                    .unwrap_or(false)
                    || m.user.name.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub fn unique_users(&self) -> usize {
        self.unique_users
    }

    /// The "N users" header label.
    pub fn unique_users_label(&self) -> String {
        let plural = if self.unique_users == 1 { "" } else { "s" };
        format!("{} user{}", self.unique_users, plural)
    }

    pub fn user_posts(&self) -> &HashMap<String, UserPost> {
        &self.user_posts
    }

    /// Deregister exactly the subscriptions this feed holds.
    pub async fn teardown(&mut self) -> Result<()> {
        for key in self.registry.drain() {
            self.backend.unsubscribe(key.path, key.kind).await?;
        }
        Ok(())
    }
}

fn count_unique_users(messages: &[Message]) -> usize {
    let mut seen: Vec<&str> = messages.iter().map(|m| m.user.id.as_str()).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

fn count_user_posts(messages: &[Message]) -> HashMap<String, UserPost> {
    let mut posts: HashMap<String, UserPost> = HashMap::new();
    for message in messages {
        posts
            .entry(message.user.name.clone())
            .and_modify(|p| p.count += 1)
            .or_insert_with(|| UserPost {
                avatar: message.user.avatar.clone(),
                count: 1,
            });
    }
    posts
}

//! Session and view state shared across panels.
//!
//! Plain structs with reducer-style transition methods: every remote or
//! user event funnels through one of these methods on the single client
//! thread, and the view re-renders from the resulting fields.

use devchat_shared::types::{ChannelId, UserRef};

/// The signed-in user.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub current_user: Option<UserRef>,
    /// True until the first auth resolution (sign-in or sign-out).
    pub is_loading: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            current_user: None,
            is_loading: true,
        }
    }

    pub fn set_user(&mut self, user: UserRef) {
        self.current_user = Some(user);
        self.is_loading = false;
    }

    pub fn clear_user(&mut self) {
        self.current_user = None;
        self.is_loading = false;
    }
}

/// The channel the message view is pointed at. Private channels carry the
/// pairwise id and the other user's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveChannel {
    pub id: ChannelId,
    pub name: String,
}

/// Which conversation is selected, and in which mode.
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    pub current: Option<ActiveChannel>,
    pub is_private: bool,
}

impl ChannelState {
    pub fn set_channel(&mut self, channel: ActiveChannel, private: bool) {
        self.current = Some(channel);
        self.is_private = private;
    }
}

/// Accumulated human-readable failure messages, cleared on the next
/// attempt of the operation that produced them.
#[derive(Debug, Clone, Default)]
pub struct ErrorList {
    messages: Vec<String>,
}

impl ErrorList {
    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Field matching: the UI highlights a field when any error message
    /// mentions it.
    pub fn mentions(&self, field: &str) -> bool {
        self.messages.iter().any(|m| m.contains(field))
    }
}

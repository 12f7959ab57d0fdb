//! The assembled client: one backend connection, one event stream, and
//! every panel wired to both.
//!
//! `ChatApp` owns the event receiver and dispatches each event to every
//! mounted panel in turn on the caller's task. Channel selection swaps
//! the message feed and typing indicator as a pair: the outgoing pair is
//! torn down before the incoming pair mounts, so listener counts stay
//! exact across any number of switches.

use tokio::sync::mpsc;
use tracing::{debug, info};

use devchat_backend::{spawn_backend, BackendConfig, BackendEvent, BackendHandle};
use devchat_shared::types::{ChannelId, UserId, UserRef};
use devchat_shared::validation::{LoginForm, RegistrationForm};

use crate::auth;
use crate::channels::ChannelDirectory;
use crate::messages::MessageFeed;
use crate::presence::DirectMessagesPanel;
use crate::starred::StarredPanel;
use crate::state::{ChannelState, Session};
use crate::typing::TypingIndicator;
use crate::uploads::MediaUpload;
use crate::Result;

pub struct ChatApp {
    backend: BackendHandle,
    events: mpsc::Receiver<BackendEvent>,
    pub session: Session,
    pub channel_state: ChannelState,
    pub channels: ChannelDirectory,
    direct_messages: Option<DirectMessagesPanel>,
    starred: Option<StarredPanel>,
    feed: Option<MessageFeed>,
    typing: Option<TypingIndicator>,
    media: Option<MediaUpload>,
    /// Star state of the currently open channel, seeded on selection.
    starred_toggle: bool,
}

impl ChatApp {
    /// Connect to a fresh backend and start with an empty session.
    pub fn connect(config: BackendConfig) -> Self {
        let (backend, events) = spawn_backend(config);
        let channels = ChannelDirectory::new(backend.clone());
        Self {
            backend,
            events,
            session: Session::new(),
            channel_state: ChannelState::default(),
            channels,
            direct_messages: None,
            starred: None,
            feed: None,
            typing: None,
            media: None,
            starred_toggle: false,
        }
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    /// Register a new user, then mount the session-scoped panels.
    pub async fn register(&mut self, form: &RegistrationForm) -> Result<UserRef> {
        let user = auth::register_user(&self.backend, form).await?;
        self.start_session(user.clone()).await?;
        Ok(user)
    }

    /// Sign in an existing user: validate the form locally, then load the
    /// profile the auth service's uid points at and mount the panels.
    pub async fn sign_in(&mut self, form: &LoginForm, uid: &UserId) -> Result<UserRef> {
        let user = auth::sign_in(&self.backend, form, uid).await?;
        self.start_session(user.clone()).await?;
        Ok(user)
    }

    async fn start_session(&mut self, user: UserRef) -> Result<()> {
        self.session.set_user(user.clone());

        self.channels.mount().await?;

        let mut dm = DirectMessagesPanel::new(self.backend.clone(), user.id.clone());
        dm.mount().await?;
        self.direct_messages = Some(dm);

        let mut starred = StarredPanel::new(self.backend.clone(), user.id.clone());
        starred.mount().await?;
        self.starred = Some(starred);

        self.media = Some(MediaUpload::new(self.backend.clone(), user.id.clone()));

        info!(uid = %user.id, "Session started");
        Ok(())
    }

    fn current_user(&self) -> Option<UserRef> {
        self.session.current_user.clone()
    }

    // -----------------------------------------------------------------------
    // Event pump
    // -----------------------------------------------------------------------

    /// Drain and dispatch every pending backend event, then reconcile the
    /// feed with the selected channel. Call after any batch of operations.
    pub async fn pump(&mut self) -> Result<()> {
        while let Ok(event) = self.events.try_recv() {
            self.dispatch(&event).await?;
        }
        self.sync_feed().await
    }

    async fn dispatch(&mut self, event: &BackendEvent) -> Result<()> {
        self.channels.handle_event(event, &mut self.channel_state);
        if let Some(dm) = self.direct_messages.as_mut() {
            dm.handle_event(event).await?;
        }
        if let Some(starred) = self.starred.as_mut() {
            starred.handle_event(event);
        }
        if let Some(feed) = self.feed.as_mut() {
            feed.handle_event(event);
        }
        if let Some(typing) = self.typing.as_mut() {
            typing.handle_event(event).await?;
        }
        Ok(())
    }

    /// Mount the feed/typing pair for the selected channel, tearing down
    /// the previous pair first.
    async fn sync_feed(&mut self) -> Result<()> {
        let Some(active) = self.channel_state.current.clone() else {
            return Ok(());
        };
        if self.feed.as_ref().map(MessageFeed::channel) == Some(&active.id) {
            return Ok(());
        }
        let Some(user) = self.current_user() else {
            return Ok(());
        };

        if let Some(mut feed) = self.feed.take() {
            feed.teardown().await?;
        }
        if let Some(mut typing) = self.typing.take() {
            typing.set_typing_state("").await?;
            typing.teardown().await?;
        }

        let private = self.channel_state.is_private;
        let mut feed = MessageFeed::new(
            self.backend.clone(),
            active.id.clone(),
            private,
            user.clone(),
        );
        feed.mount().await?;
        self.feed = Some(feed);

        let mut typing = TypingIndicator::new(self.backend.clone(), active.id.clone(), user);
        typing.mount().await?;
        self.typing = Some(typing);

        if let Some(starred) = self.starred.as_ref() {
            self.starred_toggle = starred.seed_toggle(&active.id).await?;
        }

        debug!(channel = %active.id, private, "Channel view mounted");
        self.pump_once().await
    }

    /// A second drain for the backlog the fresh subscriptions replayed.
    async fn pump_once(&mut self) -> Result<()> {
        while let Ok(event) = self.events.try_recv() {
            self.dispatch(&event).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // User operations
    // -----------------------------------------------------------------------

    /// Switch to a public channel from the directory.
    pub async fn select_channel(&mut self, id: &ChannelId) -> Result<()> {
        if let Some(channel) = self.channels.find(id).cloned() {
            self.channels.change_channel(&channel, &mut self.channel_state);
        }
        self.sync_feed().await
    }

    /// Open the private conversation with another user.
    pub async fn open_direct(&mut self, other: &UserId) -> Result<()> {
        if let Some(dm) = self.direct_messages.as_mut() {
            dm.open_direct(other, &mut self.channel_state);
        }
        self.sync_feed().await
    }

    /// Update the message draft and mirror the typing state remotely.
    pub async fn set_draft(&mut self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        if let Some(typing) = self.typing.as_mut() {
            typing.set_typing_state(&text).await?;
        }
        if let Some(feed) = self.feed.as_mut() {
            feed.draft = text;
        }
        Ok(())
    }

    /// Submit the draft: send it, and on success clear the typing entry.
    pub async fn submit(&mut self) -> Result<()> {
        let Some(feed) = self.feed.as_mut() else {
            return Ok(());
        };
        feed.send_message().await?;
        if feed.draft.is_empty() {
            if let Some(typing) = self.typing.as_mut() {
                typing.set_typing_state("").await?;
            }
        }
        Ok(())
    }

    /// Toggle the star on the open channel.
    pub async fn toggle_star(&mut self) -> Result<()> {
        let (Some(active), Some(starred)) =
            (self.channel_state.current.clone(), self.starred.as_ref())
        else {
            return Ok(());
        };
        if self.starred_toggle {
            starred.unstar(&active.id).await?;
        } else if let Some(channel) = self.channels.find(&active.id) {
            starred.star(channel).await?;
        }
        self.starred_toggle = !self.starred_toggle;
        Ok(())
    }

    /// Post an uploaded file's URL as an image message.
    pub async fn send_image(&mut self, url: String) -> Result<()> {
        if let Some(feed) = self.feed.as_mut() {
            feed.send_image(url).await?;
        }
        Ok(())
    }

    pub fn feed(&self) -> Option<&MessageFeed> {
        self.feed.as_ref()
    }

    pub fn typing(&self) -> Option<&TypingIndicator> {
        self.typing.as_ref()
    }

    pub fn direct_messages(&self) -> Option<&DirectMessagesPanel> {
        self.direct_messages.as_ref()
    }

    pub fn starred(&self) -> Option<&StarredPanel> {
        self.starred.as_ref()
    }

    pub fn media(&mut self) -> Option<&mut MediaUpload> {
        self.media.as_mut()
    }

    pub fn is_starred(&self) -> bool {
        self.starred_toggle
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Tear down every mounted panel. Afterwards the backend holds zero
    /// subscriptions for this client.
    pub async fn teardown(&mut self) -> Result<()> {
        if let Some(mut typing) = self.typing.take() {
            typing.set_typing_state("").await?;
            typing.teardown().await?;
        }
        if let Some(mut feed) = self.feed.take() {
            feed.teardown().await?;
        }
        if let Some(mut dm) = self.direct_messages.take() {
            dm.teardown().await?;
        }
        if let Some(mut starred) = self.starred.take() {
            starred.teardown().await?;
        }
        if let Some(mut media) = self.media.take() {
            media.teardown();
        }
        self.channels.teardown().await?;
        info!("Client torn down");
        Ok(())
    }
}

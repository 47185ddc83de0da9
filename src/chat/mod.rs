//! Polling-based conversation engine: optimistic local mutations reconciled
//! against periodically fetched server snapshots.

mod log;
mod poller;
mod reactions;
mod send;
mod state;
mod store;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    api::{ChatApi, HttpChatApi},
    model::{Conversation, Identity, LinkedRecord, Message, Profile, ReplyRef, UserId},
    AppResult, ChatConfig,
};

pub use log::{MessageLog, Reconciled};
pub use poller::{PollState, Poller};
pub use state::{ChatState, PendingSend, Selection};
pub use store::ConversationStore;

const EVENT_CAPACITY: usize = 64;

/// Change notifications for whatever renders the engine's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    ConversationsChanged,
    MessagesChanged { conversation: UserId },
    LoadFailed { conversation: Option<UserId>, error: String },
    SendFailed { conversation: UserId, error: String },
}

struct Shared {
    api: Arc<dyn ChatApi>,
    identity: Identity,
    config: ChatConfig,
    state: Mutex<ChatState>,
    poller: Mutex<Poller>,
    events: broadcast::Sender<ChatEvent>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn poller(&self) -> MutexGuard<'_, Poller> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    /// Fetches the snapshot for `selection` and reconciles it if the
    /// selection is still current when the response lands.
    async fn fetch_log(&self, selection: &Selection) -> AppResult<()> {
        let result = self.api
            .fetch_messages(&self.identity.user, &selection.counterparty)
            .await;

        let outcome = {
            let mut state = self.state();
            let outcome = result.map(|snapshot| state.apply_snapshot(selection, snapshot));
            if outcome.is_ok() {
                state.finish_loading(selection);
            }
            outcome
        }?;

        if outcome == Some(Reconciled::Updated) {
            self.emit(ChatEvent::MessagesChanged { conversation: selection.counterparty.clone() });
        }
        Ok(())
    }

    async fn poll_tick(&self, selection: &Selection) {
        if let Err(err) = self.fetch_log(selection).await {
            debug!(conversation = %selection.counterparty, error = %err, "poll tick failed");
        }
    }
}

/// Messaging engine for one signed-in identity.
///
/// All state lives behind short synchronous critical sections; no lock is
/// held across a network call, so user actions and poll ticks interleave
/// freely and the last reconcile to land wins.
pub struct Messenger {
    shared: Arc<Shared>,
}

impl Messenger {
    pub fn new(api: Arc<dyn ChatApi>, identity: Identity, config: ChatConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = ChatState::new(identity.user.clone());
        info!(user = %identity.user, poll_interval = ?config.poll_interval, "messenger created");

        Self {
            shared: Arc::new(Shared {
                api,
                identity,
                config,
                state: Mutex::new(state),
                poller: Mutex::new(Poller::new()),
                events,
            }),
        }
    }

    /// Builds a messenger talking to the HTTP API at `config.api_base_url`.
    pub fn connect(identity: Identity, config: ChatConfig) -> AppResult<Self> {
        let api = HttpChatApi::new(&config)?;
        Ok(Self::new(Arc::new(api), identity, config))
    }

    pub fn identity(&self) -> &Identity {
        &self.shared.identity
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.shared.events.subscribe()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.shared.state().store().items().to_vec()
    }

    pub fn total_unread(&self) -> u32 {
        self.shared.state().store().total_unread()
    }

    pub fn active_conversation(&self) -> Option<UserId> {
        self.shared.state().active().map(|active| active.counterparty.clone())
    }

    pub fn active_messages(&self) -> Vec<Message> {
        self.shared
            .state()
            .active_log()
            .map(|log| log.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn messages(&self, counterparty: &UserId) -> Vec<Message> {
        self.shared
            .state()
            .log(counterparty)
            .map(|log| log.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn reply_target(&self) -> Option<ReplyRef> {
        self.shared.state().reply_target().cloned()
    }

    pub fn staged_attachment(&self) -> Option<String> {
        self.shared.state().staged_attachment().map(str::to_owned)
    }

    pub fn is_loading(&self) -> bool {
        self.shared.state().is_loading()
    }

    pub fn poll_state(&self) -> PollState {
        self.shared.poller().state()
    }

    /// Fetches the conversation list. On failure the previous list is kept.
    pub async fn refresh_conversations(&self) -> AppResult<()> {
        match self.shared.api.list_conversations(&self.shared.identity.user).await {
            Ok(conversations) => {
                self.shared.state().replace_conversations(conversations);
                self.shared.emit(ChatEvent::ConversationsChanged);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "loading conversations failed");
                self.shared.emit(ChatEvent::LoadFailed { conversation: None, error: err.to_string() });
                Err(err)
            }
        }
    }

    /// Opens a conversation: unread drops to zero, the poll task is re-armed
    /// for it and its full log is fetched. A failed fetch leaves the log as is.
    pub async fn select_conversation(&self, counterparty: &UserId) -> AppResult<()> {
        let selection = self.shared.state().select(counterparty.clone());
        self.shared.emit(ChatEvent::ConversationsChanged);
        self.shared.emit(ChatEvent::MessagesChanged { conversation: counterparty.clone() });

        self.arm_poller(&selection);
        self.load(&selection).await
    }

    /// Opens a conversation with someone the user has never written to.
    pub async fn start_conversation(&self, profile: Profile) -> AppResult<()> {
        let counterparty = profile.id.clone();
        if self.shared.state().start_conversation(profile) {
            self.shared.emit(ChatEvent::ConversationsChanged);
        }
        self.select_conversation(&counterparty).await
    }

    /// Retry action after a failed load of the open conversation.
    pub async fn reload_active(&self) -> AppResult<()> {
        let selection = self.shared.state().active().cloned();
        match selection {
            Some(selection) => self.load(&selection).await,
            None => Ok(()),
        }
    }

    pub fn close_conversation(&self) {
        self.shared.poller().disarm();
        self.shared.state().close();
    }

    /// Stops polling. Requests already in flight finish but their results
    /// are dropped.
    pub fn shutdown(&self) {
        info!(user = %self.shared.identity.user, "messenger shutting down");
        self.close_conversation();
    }

    pub fn stage_attachment(&self, url: impl Into<String>) -> AppResult<()> {
        Ok(self.shared.state().stage_attachment(url.into())?)
    }

    pub fn clear_attachment(&self) {
        self.shared.state().clear_attachment();
    }

    pub fn link_record(&self, record: LinkedRecord) -> AppResult<()> {
        Ok(self.shared.state().link_record(record)?)
    }

    async fn load(&self, selection: &Selection) -> AppResult<()> {
        let result = self.shared.fetch_log(selection).await;
        if let Err(err) = &result {
            warn!(conversation = %selection.counterparty, error = %err, "loading messages failed");
            self.shared.state().finish_loading(selection);
            self.shared.emit(ChatEvent::LoadFailed {
                conversation: Some(selection.counterparty.clone()),
                error: err.to_string(),
            });
        }
        result
    }

    fn arm_poller(&self, selection: &Selection) {
        let shared = Arc::clone(&self.shared);
        let selection = selection.clone();
        let conversation = selection.counterparty.clone();
        let every = self.shared.config.poll_interval;

        self.shared.poller().arm(conversation, every, move || {
            let shared = Arc::clone(&shared);
            let selection = selection.clone();
            async move { shared.poll_tick(&selection).await }
        });
    }
}

impl Drop for Messenger {
    fn drop(&mut self) {
        self.shared.poller().disarm();
    }
}

use std::collections::{HashMap, HashSet};

use time::OffsetDateTime;
use tracing::debug;

use crate::{
    model::{
        snippet, ConversationKey, Conversation, LinkedRecord, Message, MessageData, MessageId,
        MessageKey, Profile, ReplyRef, SendRequest, ServerMessage, TempId, UserId,
    },
    Validation,
};

use super::{log::{MessageLog, Reconciled}, store::ConversationStore};

const OWN_AUTHOR_LABEL: &str = "You";

/// One opening of a conversation. Results fetched for an older selection
/// are dropped even if the same conversation was opened again since.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub counterparty: UserId,
    epoch: u64,
}

/// Draft state that belongs to the open conversation only.
#[derive(Debug, Clone, Default)]
struct Compose {
    reply_to: Option<ReplyRef>,
    attachment_url: Option<String>,
    linked_record: Option<LinkedRecord>,
}

/// A send that passed validation and is waiting for the server.
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub counterparty: UserId,
    pub temp_id: TempId,
    pub request: SendRequest,
}

/// Every piece of client state the messaging engine mutates. All
/// transitions are synchronous; the async side only decides when to call them.
#[derive(Debug)]
pub struct ChatState {
    me: UserId,
    store: ConversationStore,
    logs: HashMap<UserId, MessageLog>,
    active: Option<Selection>,
    next_epoch: u64,
    compose: Compose,
    sending: HashSet<UserId>,
    loading: bool,
}

impl ChatState {
    pub fn new(me: UserId) -> Self {
        Self {
            me,
            store: ConversationStore::new(),
            logs: HashMap::new(),
            active: None,
            next_epoch: 0,
            compose: Compose::default(),
            sending: HashSet::new(),
            loading: false,
        }
    }

    pub fn me(&self) -> &UserId {
        &self.me
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn active(&self) -> Option<&Selection> {
        self.active.as_ref()
    }

    pub fn log(&self, counterparty: &UserId) -> Option<&MessageLog> {
        self.logs.get(counterparty)
    }

    pub fn active_log(&self) -> Option<&MessageLog> {
        self.active.as_ref().and_then(|active| self.logs.get(&active.counterparty))
    }

    pub fn reply_target(&self) -> Option<&ReplyRef> {
        self.compose.reply_to.as_ref()
    }

    pub fn staged_attachment(&self) -> Option<&str> {
        self.compose.attachment_url.as_deref()
    }

    pub fn linked_record(&self) -> Option<&LinkedRecord> {
        self.compose.linked_record.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_sending(&self, counterparty: &UserId) -> bool {
        self.sending.contains(counterparty)
    }

    pub fn is_current(&self, selection: &Selection) -> bool {
        self.active.as_ref() == Some(selection)
    }

    pub fn replace_conversations(&mut self, conversations: Vec<Conversation>) {
        let open = self.active.as_ref().map(|active| &active.counterparty);
        self.store.replace(conversations, open);
        debug!(count = self.store.items().len(), "conversation list replaced");
    }

    pub fn start_conversation(&mut self, profile: Profile) -> bool {
        self.store.ensure(profile)
    }

    /// Opens `counterparty`: its unread count drops to zero at once and any
    /// draft state of the previous conversation is discarded.
    pub fn select(&mut self, counterparty: UserId) -> Selection {
        self.next_epoch += 1;
        let selection = Selection { counterparty: counterparty.clone(), epoch: self.next_epoch };

        let cleared = self.store.mark_read(&counterparty);
        self.compose = Compose::default();
        self.logs.entry(counterparty).or_default();
        self.active = Some(selection.clone());
        self.loading = true;

        debug!(conversation = %selection.counterparty, cleared, "conversation selected");
        selection
    }

    pub fn close(&mut self) {
        self.active = None;
        self.compose = Compose::default();
        self.loading = false;
    }

    /// Folds a fetched snapshot into the log it was fetched for. Returns
    /// `None` when the selection is no longer current and the snapshot was dropped.
    pub fn apply_snapshot(&mut self, selection: &Selection, snapshot: Vec<ServerMessage>) -> Option<Reconciled> {
        if !self.is_current(selection) {
            debug!(conversation = %selection.counterparty, "dropping stale snapshot");
            return None;
        }

        let log = self.logs.entry(selection.counterparty.clone()).or_default();
        let outcome = log.reconcile(snapshot);
        debug!(conversation = %selection.counterparty, ?outcome, entries = log.len(), "snapshot reconciled");
        Some(outcome)
    }

    pub fn finish_loading(&mut self, selection: &Selection) {
        if self.is_current(selection) {
            self.loading = false;
        }
    }

    /// Validates a send and appends its provisional entry. Draft state
    /// (reply target, attachment, linked record) is consumed here.
    pub fn begin_send(&mut self, body: &str, now: OffsetDateTime) -> Result<PendingSend, Validation> {
        let content = body.trim();
        if content.is_empty() {
            return Err(Validation::EmptyBody);
        }
        let Some(active) = &self.active else {
            return Err(Validation::NoActiveConversation);
        };
        let counterparty = active.counterparty.clone();
        if self.sending.contains(&counterparty) {
            return Err(Validation::SendInFlight);
        }

        let Compose { reply_to, attachment_url, linked_record } = std::mem::take(&mut self.compose);
        let request = SendRequest {
            sender_id: self.me.clone(),
            receiver_id: counterparty.clone(),
            content: content.to_owned(),
            reply_to_id: reply_to.as_ref().map(|reply| reply.id.clone()),
            attachment_url: attachment_url.clone(),
            linked_record_ref: linked_record.clone(),
        };
        let data = MessageData {
            conversation_id: ConversationKey::between(&self.me, &counterparty),
            sender_id: self.me.clone(),
            receiver_id: counterparty.clone(),
            content: request.content.clone(),
            created_at: now,
            read: false,
            reply_to,
            reactions: Vec::new(),
            attachment_url,
            linked_record_ref: linked_record,
        };

        let temp_id = self.logs.entry(counterparty.clone()).or_default().append_optimistic(data);
        self.sending.insert(counterparty.clone());
        debug!(conversation = %counterparty, %temp_id, "optimistic message appended");

        Ok(PendingSend { counterparty, temp_id, request })
    }

    /// Swaps the provisional entry for the acknowledged message and bumps
    /// the conversation to the top of the list.
    pub fn confirm_send(&mut self, pending: &PendingSend, message: ServerMessage, now: OffsetDateTime) {
        self.sending.remove(&pending.counterparty);

        let preview = message.data.preview(&self.me, now);
        let linked_record = message.data.linked_record_ref.clone();
        if let Some(log) = self.logs.get_mut(&pending.counterparty) {
            log.confirm(pending.temp_id, message);
        }
        self.store.record_outgoing(&pending.counterparty, preview, linked_record);
    }

    /// Releases the send guard after a failure. The provisional entry stays.
    pub fn abandon_send(&mut self, pending: &PendingSend) {
        self.sending.remove(&pending.counterparty);
    }

    fn target(&self, key: &MessageKey) -> Result<&ServerMessage, Validation> {
        let log = self.active_log().ok_or(Validation::NoActiveConversation)?;
        match key {
            MessageKey::Confirmed(id) => log.find(id).ok_or(Validation::UnknownMessage),
            MessageKey::Provisional(temp_id) => {
                if log.provisional().any(|m| &m.temp_id == temp_id) {
                    Err(Validation::ProvisionalTarget)
                } else {
                    Err(Validation::UnknownMessage)
                }
            }
        }
    }

    pub fn set_reply_target(&mut self, key: &MessageKey) -> Result<ReplyRef, Validation> {
        let message = self.target(key)?;
        let author = if message.data.sender_id == self.me {
            OWN_AUTHOR_LABEL.to_owned()
        } else {
            self.store
                .display_name(&message.data.sender_id)
                .map(str::to_owned)
                .unwrap_or_else(|| message.data.sender_id.to_string())
        };
        let reply = ReplyRef {
            id: message.id.clone(),
            snippet: snippet(&message.data.content),
            author,
        };

        self.compose.reply_to = Some(reply.clone());
        Ok(reply)
    }

    pub fn clear_reply_target(&mut self) -> Option<ReplyRef> {
        self.compose.reply_to.take()
    }

    pub fn stage_attachment(&mut self, url: String) -> Result<(), Validation> {
        if self.active.is_none() {
            return Err(Validation::NoActiveConversation);
        }
        self.compose.attachment_url = Some(url);
        Ok(())
    }

    pub fn clear_attachment(&mut self) -> Option<String> {
        self.compose.attachment_url.take()
    }

    pub fn link_record(&mut self, record: LinkedRecord) -> Result<(), Validation> {
        if self.active.is_none() {
            return Err(Validation::NoActiveConversation);
        }
        self.compose.linked_record = Some(record);
        Ok(())
    }

    /// Appends `emoji` locally and returns the conversation and message the
    /// server update has to target.
    pub fn begin_reaction(&mut self, key: &MessageKey, emoji: &str) -> Result<(UserId, MessageId), Validation> {
        if emoji.trim().is_empty() {
            return Err(Validation::EmptyEmoji);
        }
        let id = self.target(key)?.id.clone();
        let Some(active) = &self.active else {
            return Err(Validation::NoActiveConversation);
        };
        let counterparty = active.counterparty.clone();

        if let Some(log) = self.logs.get_mut(&counterparty) {
            log.push_reaction(&id, emoji);
        }
        Ok((counterparty, id))
    }

    pub fn apply_reactions(&mut self, counterparty: &UserId, id: &MessageId, reactions: Vec<String>) -> bool {
        self.logs
            .get_mut(counterparty)
            .is_some_and(|log| log.set_reactions(id, reactions))
    }

    /// Hides a message from the open conversation without telling the server.
    pub fn remove_message(&mut self, key: &MessageKey) -> Option<Message> {
        let counterparty = self.active.as_ref()?.counterparty.clone();
        self.logs.get_mut(&counterparty)?.remove(key)
    }
}

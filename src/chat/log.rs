use time::OffsetDateTime;

use crate::model::{Message, MessageData, MessageId, MessageKey, ProvisionalMessage, ServerMessage, TempId};

/// What a call to [`MessageLog::reconcile`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The snapshot matched the confirmed entries; nothing was touched.
    Unchanged,
    Updated,
}

/// Ordered messages of one conversation: confirmed entries first, then the
/// provisional ones still waiting for their acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    entries: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &ServerMessage> {
        self.entries.iter().filter_map(Message::as_confirmed)
    }

    pub fn provisional(&self) -> impl Iterator<Item = &ProvisionalMessage> {
        self.entries.iter().filter_map(|entry| match entry {
            Message::Provisional(m) => Some(m),
            Message::Confirmed(_) => None,
        })
    }

    pub fn find(&self, id: &MessageId) -> Option<&ServerMessage> {
        self.confirmed().find(|m| &m.id == id)
    }

    fn find_mut(&mut self, id: &MessageId) -> Option<&mut ServerMessage> {
        self.entries.iter_mut().find_map(|entry| match entry {
            Message::Confirmed(m) if &m.id == id => Some(m),
            _ => None,
        })
    }

    /// Appends a provisional entry at the tail. Its timestamp is clamped so
    /// the log never goes backwards in time.
    pub fn append_optimistic(&mut self, mut data: MessageData) -> TempId {
        if let Some(last) = self.entries.last() {
            data.created_at = data.created_at.max(last.data().created_at);
        }

        let temp_id = TempId::new();
        self.entries.push(Message::Provisional(ProvisionalMessage { temp_id, data }));
        temp_id
    }

    /// Replaces the log's confirmed entries with `snapshot`, keeping every
    /// provisional entry after them in its current order. Provisional
    /// timestamps are raised to the newest confirmed one so the log stays
    /// ordered by `created_at`.
    pub fn reconcile(&mut self, snapshot: Vec<ServerMessage>) -> Reconciled {
        if self.confirmed().eq(snapshot.iter()) {
            return Reconciled::Unchanged;
        }

        let floor = snapshot.last().map(|m| m.data.created_at);
        let pending = self.entries.drain(..).filter(Message::is_provisional);
        let mut entries: Vec<Message> = snapshot
            .into_iter()
            .map(Message::Confirmed)
            .chain(pending)
            .collect();

        if let Some(floor) = floor {
            for entry in &mut entries {
                if let Message::Provisional(pending) = entry {
                    pending.data.created_at = pending.data.created_at.max(floor);
                }
            }
        }
        self.entries = entries;
        Reconciled::Updated
    }

    /// Swaps the provisional entry `temp_id` for its acknowledged message.
    ///
    /// If a poll already delivered the message the provisional copy is just
    /// dropped. Returns `false` when the provisional entry is gone (removed
    /// from view) and nothing was changed.
    pub fn confirm(&mut self, temp_id: TempId, message: ServerMessage) -> bool {
        let Some(index) = self.position(&MessageKey::Provisional(temp_id)) else {
            return false;
        };

        if self.find(&message.id).is_some() {
            self.entries.remove(index);
        } else {
            self.entries[index] = Message::Confirmed(message);
        }
        true
    }

    /// View-only removal. Confirmed entries come back with the next snapshot.
    pub fn remove(&mut self, key: &MessageKey) -> Option<Message> {
        let index = self.position(key)?;
        Some(self.entries.remove(index))
    }

    pub fn push_reaction(&mut self, id: &MessageId, emoji: &str) -> bool {
        match self.find_mut(id) {
            Some(message) => {
                message.data.reactions.push(emoji.to_owned());
                true
            }
            None => false,
        }
    }

    pub fn set_reactions(&mut self, id: &MessageId, reactions: Vec<String>) -> bool {
        match self.find_mut(id) {
            Some(message) => {
                message.data.reactions = reactions;
                true
            }
            None => false,
        }
    }

    pub fn last_created_at(&self) -> Option<OffsetDateTime> {
        self.entries.last().map(|entry| entry.data().created_at)
    }

    fn position(&self, key: &MessageKey) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.key() == key)
    }
}

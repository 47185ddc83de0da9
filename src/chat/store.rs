use std::cmp::Ordering;

use crate::model::{Conversation, LinkedRecord, MessagePreview, Profile, UserId};

/// Conversations of the signed-in user, most recent activity first.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    items: Vec<Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Conversation] {
        &self.items
    }

    pub fn get(&self, counterparty: &UserId) -> Option<&Conversation> {
        self.items.iter().find(|c| &c.counterparty_id == counterparty)
    }

    fn get_mut(&mut self, counterparty: &UserId) -> Option<&mut Conversation> {
        self.items.iter_mut().find(|c| &c.counterparty_id == counterparty)
    }

    /// Installs a freshly fetched list. The open conversation is being read
    /// right now, so whatever the server still counts as unread there is dropped.
    pub fn replace(&mut self, conversations: Vec<Conversation>, open: Option<&UserId>) {
        let placeholders: Vec<Conversation> = self
            .items
            .drain(..)
            .filter(|c| c.last_message_preview.is_none())
            .filter(|c| !conversations.iter().any(|n| n.counterparty_id == c.counterparty_id))
            .collect();

        self.items = conversations;
        self.items.extend(placeholders);
        if let Some(open) = open {
            self.mark_read(open);
        }
        self.sort();
    }

    /// Zeroes the unread count and returns what it was.
    pub fn mark_read(&mut self, counterparty: &UserId) -> u32 {
        match self.get_mut(counterparty) {
            Some(conversation) => std::mem::take(&mut conversation.unread_count),
            None => 0,
        }
    }

    /// Adds an empty conversation for a first contact. Returns `false` if one exists.
    pub fn ensure(&mut self, profile: Profile) -> bool {
        if self.get(&profile.id).is_some() {
            return false;
        }

        self.items.push(Conversation::empty(profile));
        self.sort();
        true
    }

    /// Moves the conversation to the top after a local send. Unread counts
    /// are left alone: they only ever come from the server.
    pub fn record_outgoing(
        &mut self,
        counterparty: &UserId,
        preview: MessagePreview,
        linked_record: Option<LinkedRecord>,
    ) {
        if self.get(counterparty).is_none() {
            self.items.push(Conversation::empty(Profile::unknown(counterparty.clone())));
        }

        if let Some(conversation) = self.get_mut(counterparty) {
            conversation.last_message_preview = Some(preview);
            if linked_record.is_some() {
                conversation.linked_record_ref = linked_record;
            }
        }
        self.sort();
    }

    pub fn total_unread(&self) -> u32 {
        self.items.iter().map(|c| c.unread_count).sum()
    }

    pub fn display_name(&self, counterparty: &UserId) -> Option<&str> {
        self.get(counterparty).map(|c| c.counterparty_profile.name.as_str())
    }

    // Conversations that have never exchanged a message stay on top.
    fn sort(&mut self) {
        self.items.sort_by(|a, b| {
            match (&a.last_message_preview, &b.last_message_preview) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => b.timestamp.cmp(&a.timestamp),
            }
        });
    }
}

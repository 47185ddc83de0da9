use tracing::{debug, warn};

use crate::{
    model::{Message, MessageKey, ReplyRef},
    AppResult,
};

use super::{ChatEvent, Messenger};

impl Messenger {
    /// Adds `emoji` to a confirmed message of the open conversation. The
    /// local list is replaced by the server's once it answers; failures are
    /// only logged and the optimistic emoji stays.
    pub async fn add_reaction(&self, key: &MessageKey, emoji: &str) -> AppResult<()> {
        let (conversation, id) = self.shared.state().begin_reaction(key, emoji)?;
        self.shared.emit(ChatEvent::MessagesChanged { conversation: conversation.clone() });

        match self.shared.api.add_reaction(&id, emoji).await {
            Ok(reactions) => {
                let count = reactions.len();
                if self.shared.state().apply_reactions(&conversation, &id, reactions) {
                    debug!(%conversation, message = %id, count, "reactions replaced by server list");
                    self.shared.emit(ChatEvent::MessagesChanged { conversation });
                }
                Ok(())
            }
            Err(err) => {
                warn!(%conversation, message = %id, error = %err, "reaction update failed");
                Err(err)
            }
        }
    }

    pub fn set_reply_target(&self, key: &MessageKey) -> AppResult<ReplyRef> {
        Ok(self.shared.state().set_reply_target(key)?)
    }

    pub fn clear_reply_target(&self) -> Option<ReplyRef> {
        self.shared.state().clear_reply_target()
    }

    /// Hides a message locally. Nothing is sent to the server, so the next
    /// snapshot brings a confirmed message back.
    pub fn remove_message(&self, key: &MessageKey) -> Option<Message> {
        let removed = self.shared.state().remove_message(key);
        if removed.is_some() {
            if let Some(conversation) = self.active_conversation() {
                self.shared.emit(ChatEvent::MessagesChanged { conversation });
            }
        }
        removed
    }
}

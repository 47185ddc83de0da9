use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::{
    model::{MessageId, ServerMessage},
    AppResult,
};

use super::{ChatEvent, Messenger, PendingSend, Shared};

/// Holds a conversation's send guard for the duration of one request.
/// Dropping it without [`InFlight::confirm`] releases the guard, so a send
/// future cancelled mid-request does not lock the conversation.
struct InFlight<'a> {
    shared: &'a Shared,
    pending: Option<PendingSend>,
}

impl<'a> InFlight<'a> {
    fn new(shared: &'a Shared, pending: PendingSend) -> Self {
        Self { shared, pending: Some(pending) }
    }

    fn confirm(mut self, message: ServerMessage) {
        if let Some(pending) = self.pending.take() {
            self.shared.state().confirm_send(&pending, message, OffsetDateTime::now_utc());
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.shared.state().abandon_send(&pending);
            debug!(conversation = %pending.counterparty, temp_id = %pending.temp_id, "send guard released");
        }
    }
}

impl Messenger {
    /// Sends `body` to the open conversation.
    ///
    /// A provisional entry is appended before the request goes out and is
    /// swapped for the server's message on success. Blank bodies, a missing
    /// conversation and a send already outstanding for the same conversation
    /// are refused without touching the network. On failure the provisional
    /// entry is left where it is.
    pub async fn send(&self, body: &str) -> AppResult<MessageId> {
        let pending = self.shared.state().begin_send(body, OffsetDateTime::now_utc())?;
        let conversation = pending.counterparty.clone();
        let temp_id = pending.temp_id;
        let request = pending.request.clone();
        let in_flight = InFlight::new(&self.shared, pending);
        self.shared.emit(ChatEvent::MessagesChanged { conversation: conversation.clone() });

        match self.shared.api.send_message(&request).await {
            Ok(message) => {
                let id = message.id.clone();
                in_flight.confirm(message);
                debug!(%conversation, %id, %temp_id, "send confirmed");

                self.shared.emit(ChatEvent::MessagesChanged { conversation });
                self.shared.emit(ChatEvent::ConversationsChanged);
                Ok(id)
            }
            Err(err) => {
                drop(in_flight);
                warn!(%conversation, error = %err, "send failed");

                self.shared.emit(ChatEvent::SendFailed { conversation, error: err.to_string() });
                Err(err)
            }
        }
    }
}

//! Scripted in-memory stand-in for the messaging API.
//!
//! Fetches and sends can be held at a gate so a test can act while a
//! request is still in flight.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use marketchat::{
    model::{
        Conversation, ConversationKey, Message, MessageData, MessageId, MessagePreview, Profile,
        Role, SendRequest, ServerMessage, UserId,
    },
    AppError, AppResult, ChatApi, ChatConfig,
};
use time::OffsetDateTime;
use tokio::sync::Semaphore;

#[derive(Default)]
struct Script {
    conversations: Vec<Conversation>,
    snapshots: HashMap<UserId, Vec<ServerMessage>>,
    reactions: HashMap<MessageId, Vec<String>>,
    reaction_reply: Option<Vec<String>>,
    fail_list: bool,
    fail_fetches: bool,
    fail_sends: bool,
    fail_reactions: bool,
    fetch_calls: Vec<UserId>,
    send_calls: Vec<SendRequest>,
    reaction_calls: usize,
    next_id: u64,
}

#[derive(Default)]
pub struct FakeApi {
    script: Mutex<Script>,
    fetch_gates: Mutex<HashMap<UserId, Arc<Semaphore>>>,
    send_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn set_conversations(&self, conversations: Vec<Conversation>) {
        self.script().conversations = conversations;
    }

    pub fn set_snapshot(&self, other: &str, messages: Vec<ServerMessage>) {
        self.script().snapshots.insert(UserId::new(other), messages);
    }

    pub fn set_reaction_reply(&self, reactions: Vec<&str>) {
        self.script().reaction_reply = Some(reactions.into_iter().map(str::to_owned).collect());
    }

    pub fn fail_list(&self, fail: bool) {
        self.script().fail_list = fail;
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.script().fail_fetches = fail;
    }

    pub fn fail_sends(&self, fail: bool) {
        self.script().fail_sends = fail;
    }

    pub fn fail_reactions(&self, fail: bool) {
        self.script().fail_reactions = fail;
    }

    /// Holds every later fetch for `other` until permits are added.
    pub fn gate_fetches(&self, other: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.fetch_gates.lock().unwrap().insert(UserId::new(other), Arc::clone(&gate));
        gate
    }

    pub fn gate_sends(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.send_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn fetch_calls(&self, other: &str) -> usize {
        let other = UserId::new(other);
        self.script().fetch_calls.iter().filter(|id| **id == other).count()
    }

    pub fn send_calls(&self) -> Vec<SendRequest> {
        self.script().send_calls.clone()
    }

    pub fn reaction_calls(&self) -> usize {
        self.script().reaction_calls
    }

    pub async fn wait_for_fetches(&self, other: &str, count: usize) {
        for _ in 0..10_000 {
            if self.fetch_calls(other) >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("fetch for {other} never reached {count} calls");
    }

    pub async fn wait_for_sends(&self, count: usize) {
        for _ in 0..10_000 {
            if self.send_calls().len() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("send never reached {count} calls");
    }
}

async fn pass(gate: Option<Arc<Semaphore>>) {
    if let Some(gate) = gate {
        gate.acquire().await.unwrap().forget();
    }
}

fn outage() -> AppError {
    AppError::Network(anyhow::anyhow!("connection reset by peer"))
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn list_conversations(&self, _user: &UserId) -> AppResult<Vec<Conversation>> {
        let script = self.script();
        if script.fail_list {
            return Err(outage());
        }
        Ok(script.conversations.clone())
    }

    async fn fetch_messages(&self, _user: &UserId, other: &UserId) -> AppResult<Vec<ServerMessage>> {
        self.script().fetch_calls.push(other.clone());
        let gate = self.fetch_gates.lock().unwrap().get(other).cloned();
        pass(gate).await;

        let script = self.script();
        if script.fail_fetches {
            return Err(outage());
        }
        Ok(script.snapshots.get(other).cloned().unwrap_or_default())
    }

    async fn send_message(&self, request: &SendRequest) -> AppResult<ServerMessage> {
        self.script().send_calls.push(request.clone());
        let gate = self.send_gate.lock().unwrap().clone();
        pass(gate).await;

        let mut script = self.script();
        if script.fail_sends {
            return Err(AppError::Rejected("database unavailable".to_owned()));
        }

        script.next_id += 1;
        let message = ServerMessage {
            id: MessageId::new(format!("srv-{}", script.next_id)),
            data: MessageData {
                conversation_id: ConversationKey::between(&request.sender_id, &request.receiver_id),
                sender_id: request.sender_id.clone(),
                receiver_id: request.receiver_id.clone(),
                content: request.content.clone(),
                created_at: OffsetDateTime::now_utc(),
                read: false,
                reply_to: None,
                reactions: Vec::new(),
                attachment_url: request.attachment_url.clone(),
                linked_record_ref: request.linked_record_ref.clone(),
            },
        };
        script
            .snapshots
            .entry(request.receiver_id.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn add_reaction(&self, message_id: &MessageId, emoji: &str) -> AppResult<Vec<String>> {
        let mut script = self.script();
        script.reaction_calls += 1;
        if script.fail_reactions {
            return Err(outage());
        }
        if let Some(reply) = script.reaction_reply.clone() {
            return Ok(reply);
        }

        let list = script.reactions.entry(message_id.clone()).or_default();
        list.push(emoji.to_owned());
        Ok(list.clone())
    }
}

pub fn config(poll_interval: Duration) -> ChatConfig {
    ChatConfig {
        api_base_url: "http://messaging.invalid".to_owned(),
        poll_interval,
        request_timeout: Duration::from_secs(5),
    }
}

pub fn message(id: &str, from: &str, to: &str, content: &str, created_at: OffsetDateTime) -> ServerMessage {
    let from = UserId::new(from);
    let to = UserId::new(to);
    ServerMessage {
        id: MessageId::new(id),
        data: MessageData {
            conversation_id: ConversationKey::between(&from, &to),
            sender_id: from,
            receiver_id: to,
            content: content.to_owned(),
            created_at,
            read: true,
            reply_to: None,
            reactions: Vec::new(),
            attachment_url: None,
            linked_record_ref: None,
        },
    }
}

pub fn conversation(counterparty: &str, name: &str, unread: u32, last_at: OffsetDateTime) -> Conversation {
    Conversation {
        counterparty_id: UserId::new(counterparty),
        counterparty_profile: Profile {
            id: UserId::new(counterparty),
            name: name.to_owned(),
            role: Role::Vendor,
            avatar_url: None,
        },
        last_message_preview: Some(MessagePreview {
            content: "…".to_owned(),
            has_attachment: false,
            timestamp: last_at,
            is_from_self: false,
        }),
        unread_count: unread,
        linked_record_ref: None,
    }
}

pub fn contents(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(Message::content).collect()
}

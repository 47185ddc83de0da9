use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

const SNIPPET_CHARS: usize = 100;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Opaque id of a marketplace user (buyer, vendor, company or admin).
    UserId
);
string_id!(
    /// Server-issued message id.
    MessageId
);
string_id!(
    /// Order-independent key for the pair of users in a one-to-one conversation.
    ConversationKey
);

impl ConversationKey {
    pub fn between(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{lo}:{hi}"))
    }
}

/// Client-side id of a message that has not been acknowledged yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempId(Uuid);

impl TempId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TempId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "temp-{}", self.0.simple())
    }
}

/// The signed-in actor every engine operation is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: UserId,
}

impl Identity {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: UserId::new(user) }
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Buyer,
    Vendor,
    Company,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        use Role::*;
        match self {
            Buyer => "buyer",
            Vendor => "vendor",
            Company => "company",
            Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Role::*;
        Ok(match s {
            "buyer" => Buyer,
            "vendor" => Vendor,
            "company" => Company,
            "admin" => Admin,
            other => return Err(format!("unknown role {other}")),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Profile {
    pub fn unknown(id: UserId) -> Self {
        Self {
            id,
            name: "Unknown user".to_owned(),
            role: Role::default(),
            avatar_url: None,
        }
    }
}

/// A marketplace record a conversation is about (product, job, ticket, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedRecord {
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePreview {
    pub content: String,
    pub has_attachment: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub is_from_self: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub counterparty_id: UserId,
    pub counterparty_profile: Profile,
    #[serde(default)]
    pub last_message_preview: Option<MessagePreview>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_record_ref: Option<LinkedRecord>,
}

impl Conversation {
    /// A conversation with no exchanged messages yet.
    pub fn empty(profile: Profile) -> Self {
        Self {
            counterparty_id: profile.id.clone(),
            counterparty_profile: profile,
            last_message_preview: None,
            unread_count: 0,
            linked_record_ref: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub id: MessageId,
    pub snippet: String,
    pub author: String,
}

/// Everything a message carries apart from its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    pub conversation_id: ConversationKey,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyRef>,
    #[serde(default)]
    pub reactions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_record_ref: Option<LinkedRecord>,
}

impl MessageData {
    pub fn preview(&self, me: &UserId, timestamp: OffsetDateTime) -> MessagePreview {
        MessagePreview {
            content: self.content.clone(),
            has_attachment: self.attachment_url.is_some(),
            timestamp,
            is_from_self: &self.sender_id == me,
        }
    }
}

/// A message as the server stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub id: MessageId,
    #[serde(flatten)]
    pub data: MessageData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalMessage {
    pub temp_id: TempId,
    pub data: MessageData,
}

/// An entry of a conversation's message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Provisional(ProvisionalMessage),
    Confirmed(ServerMessage),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Provisional(TempId),
    Confirmed(MessageId),
}

impl Message {
    pub fn key(&self) -> MessageKey {
        match self {
            Message::Provisional(m) => MessageKey::Provisional(m.temp_id),
            Message::Confirmed(m) => MessageKey::Confirmed(m.id.clone()),
        }
    }

    pub fn data(&self) -> &MessageData {
        match self {
            Message::Provisional(m) => &m.data,
            Message::Confirmed(m) => &m.data,
        }
    }

    pub fn data_mut(&mut self) -> &mut MessageData {
        match self {
            Message::Provisional(m) => &mut m.data,
            Message::Confirmed(m) => &mut m.data,
        }
    }

    pub fn content(&self) -> &str {
        &self.data().content
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Message::Provisional(_))
    }

    pub fn as_confirmed(&self) -> Option<&ServerMessage> {
        match self {
            Message::Confirmed(m) => Some(m),
            Message::Provisional(_) => None,
        }
    }

    pub fn id(&self) -> Option<&MessageId> {
        self.as_confirmed().map(|m| &m.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_record_ref: Option<LinkedRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRequest {
    pub message_id: MessageId,
    pub emoji: String,
}

/// Short quote of a message used in reply references.
pub fn snippet(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(SNIPPET_CHARS).collect();
    if chars.next().is_some() {
        head + "…"
    } else {
        head
    }
}

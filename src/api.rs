//! Client side of the marketplace messaging HTTP contract.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::{
    model::{Conversation, MessageId, ReactionRequest, SendRequest, ServerMessage, UserId},
    AppError, AppResult, ChatConfig, GetField,
};

/// The persistence API the messaging engine talks to.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_conversations(&self, user: &UserId) -> AppResult<Vec<Conversation>>;

    /// Full ordered snapshot of the conversation between `user` and `other`.
    async fn fetch_messages(&self, user: &UserId, other: &UserId) -> AppResult<Vec<ServerMessage>>;

    async fn send_message(&self, request: &SendRequest) -> AppResult<ServerMessage>;

    /// Returns the authoritative reaction list of the message after the update.
    async fn add_reaction(&self, message_id: &MessageId, emoji: &str) -> AppResult<Vec<String>>;
}

#[derive(Clone)]
pub struct HttpChatApi {
    client: Client,
    base_url: String,
}

impl HttpChatApi {
    pub fn new(config: &ChatConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_conversations(&self, user: &UserId) -> AppResult<Vec<Conversation>> {
        let response = self.client
            .get(self.url("/conversations"))
            .query(&[("userId", user.as_str()), ("conversationList", "true")])
            .send()
            .await?;

        payload(response, "conversations").await
    }

    async fn fetch_messages(&self, user: &UserId, other: &UserId) -> AppResult<Vec<ServerMessage>> {
        let response = self.client
            .get(self.url("/messages"))
            .query(&[("userId", user.as_str()), ("otherUserId", other.as_str())])
            .send()
            .await?;

        payload(response, "messages").await
    }

    async fn send_message(&self, request: &SendRequest) -> AppResult<ServerMessage> {
        let response = self.client
            .post(self.url("/messages"))
            .json(request)
            .send()
            .await?;

        payload(response, "data").await
    }

    async fn add_reaction(&self, message_id: &MessageId, emoji: &str) -> AppResult<Vec<String>> {
        let request = ReactionRequest {
            message_id: message_id.clone(),
            emoji: emoji.to_owned(),
        };
        let response = self.client
            .patch(self.url("/messages"))
            .json(&request)
            .send()
            .await?;

        payload(response, "reactions").await
    }
}

/// Unwraps a `{success, <field>}` envelope.
async fn payload<T: DeserializeOwned>(response: Response, field: &str) -> AppResult<T> {
    let status = response.status();
    let mut body: Value = match response.json().await {
        Ok(body) => body,
        Err(_) if !status.is_success() => {
            return Err(AppError::Rejected(format!("server responded {status}")));
        }
        Err(err) if err.is_decode() => return Err(AppError::Protocol(err.to_string())),
        Err(err) => return Err(err.into()),
    };

    if !matches!(body.get_bool_field("success"), Ok(true)) {
        let reason = body
            .get_str_field("error")
            .unwrap_or_else(|_| format!("server responded {status} without success"));
        debug!(%status, %reason, "request rejected");
        return Err(AppError::Rejected(reason));
    }

    Ok(serde_json::from_value(body.take_field(field)?)?)
}

use axum::{debug_handler, extract::{Query, State}, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    db,
    model::{ConversationKey, MessageId, ReactionRequest, SendRequest, UserId},
    AppError, AppResult,
};

const MAX_EMOJI_BYTES: usize = 32;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessagesQuery {
    user_id: String,
    other_user_id: String,
}

/// Snapshot of one conversation. Reading it marks the counterparty's
/// messages to `userId` as read.
#[debug_handler]
pub(crate) async fn list_messages(
    State(db_pool): State<SqlitePool>,
    Query(MessagesQuery { user_id, other_user_id }): Query<MessagesQuery>,
) -> AppResult<Json<Value>> {
    let me = UserId::new(user_id);
    let other = UserId::new(other_user_id);

    let marked = db::mark_read(&db_pool, &me, &other).await?;
    if marked > 0 {
        debug!(user = %me, other = %other, marked, "messages marked read");
    }
    let messages = db::conversation_messages(&db_pool, &me, &other).await?;

    Ok(Json(json!({ "success": true, "messages": messages })))
}

#[debug_handler]
pub(crate) async fn send_message(
    State(db_pool): State<SqlitePool>,
    Json(request): Json<SendRequest>,
) -> AppResult<Json<Value>> {
    if request.sender_id.as_str().is_empty() || request.receiver_id.as_str().is_empty() {
        return Err(AppError::BadRequest("senderId and receiverId are required".to_owned()));
    }
    if request.sender_id == request.receiver_id {
        return Err(AppError::BadRequest("cannot message yourself".to_owned()));
    }
    if request.content.trim().is_empty() {
        return Err(AppError::BadRequest("content is empty".to_owned()));
    }

    if let Some(reply_to_id) = &request.reply_to_id {
        let conversation = ConversationKey::between(&request.sender_id, &request.receiver_id);
        let reply_to = db::load_message(&db_pool, reply_to_id).await?;
        if reply_to.is_none_or(|m| m.data.conversation_id != conversation) {
            return Err(AppError::BadRequest(format!("{reply_to_id} is not part of this conversation")));
        }
    }

    let id = MessageId::new(Uuid::now_v7().to_string());
    db::insert_message(&db_pool, &id, &request, OffsetDateTime::now_utc()).await?;
    info!(message = %id, sender = %request.sender_id, receiver = %request.receiver_id, "message stored");

    let message = db::load_message(&db_pool, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(id.to_string()))?;

    Ok(Json(json!({ "success": true, "data": message })))
}

#[debug_handler]
pub(crate) async fn add_reaction(
    State(db_pool): State<SqlitePool>,
    Json(ReactionRequest { message_id, emoji }): Json<ReactionRequest>,
) -> AppResult<Json<Value>> {
    let emoji = emoji.trim();
    if emoji.is_empty() || emoji.len() > MAX_EMOJI_BYTES {
        return Err(AppError::BadRequest("invalid emoji".to_owned()));
    }
    if db::load_message(&db_pool, &message_id).await?.is_none() {
        return Err(AppError::NotFound(format!("message {message_id}")));
    }

    let reactions = db::add_reaction(&db_pool, &message_id, emoji).await?;
    debug!(message = %message_id, count = reactions.len(), "reaction added");

    Ok(Json(json!({ "success": true, "reactions": reactions })))
}

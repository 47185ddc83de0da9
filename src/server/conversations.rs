use std::{cmp::Reverse, collections::HashMap};

use axum::{debug_handler, extract::{Query, State}, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::{
    db,
    model::{Conversation, LinkedRecord, MessagePreview, UserId},
    AppError, AppResult,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConversationsQuery {
    user_id: String,
    conversation_list: Option<String>,
}

#[derive(Default)]
struct Summary {
    preview: Option<MessagePreview>,
    unread: u32,
    linked_record: Option<LinkedRecord>,
}

// sender_id, receiver_id, content, created_at, is_read, attachment_url, linked_kind, linked_id
type SummaryRow = (String, String, String, i64, i64, Option<String>, Option<String>, Option<String>);

#[debug_handler]
pub(crate) async fn list_conversations(
    State(db_pool): State<SqlitePool>,
    Query(ConversationsQuery { user_id, conversation_list }): Query<ConversationsQuery>,
) -> AppResult<Json<Value>> {
    if conversation_list.as_deref() != Some("true") {
        return Err(AppError::BadRequest("conversationList=true is required".to_owned()));
    }

    let rows: Vec<SummaryRow> = sqlx::query_as(
        "SELECT sender_id,receiver_id,content,created_at,is_read,attachment_url,linked_kind,linked_id
         FROM messages WHERE sender_id=? OR receiver_id=? ORDER BY created_at, rowid",
    )
    .bind(&user_id)
    .bind(&user_id)
    .fetch_all(&db_pool)
    .await?;

    let mut summaries: HashMap<String, Summary> = HashMap::new();
    for (sender_id, receiver_id, content, created_at, is_read, attachment_url, linked_kind, linked_id) in rows {
        let is_from_self = sender_id == user_id;
        let counterparty = if is_from_self { receiver_id } else { sender_id };
        let summary = summaries.entry(counterparty).or_default();

        summary.preview = Some(MessagePreview {
            content,
            has_attachment: attachment_url.is_some(),
            timestamp: db::from_millis(created_at)?,
            is_from_self,
        });
        if !is_from_self && is_read == 0 {
            summary.unread += 1;
        }
        if let Some(record) = db::linked_record(linked_kind, linked_id) {
            summary.linked_record = Some(record);
        }
    }

    let mut conversations = Vec::with_capacity(summaries.len());
    for (counterparty, summary) in summaries {
        let counterparty_id = UserId::new(counterparty);
        let counterparty_profile = db::load_profile(&db_pool, &counterparty_id).await?;
        conversations.push(Conversation {
            counterparty_id,
            counterparty_profile,
            last_message_preview: summary.preview,
            unread_count: summary.unread,
            linked_record_ref: summary.linked_record,
        });
    }
    conversations.sort_by_key(|c| Reverse(c.last_message_preview.as_ref().map(|p| p.timestamp)));

    Ok(Json(json!({ "success": true, "conversations": conversations })))
}

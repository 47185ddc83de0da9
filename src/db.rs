use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{
    model::{
        snippet, ConversationKey, LinkedRecord, MessageData, MessageId, Profile, ReplyRef, Role,
        SendRequest, ServerMessage, UserId,
    },
    AppResult,
};

const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS profiles (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        role TEXT NOT NULL,
        avatar_url TEXT
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        sender_id TEXT NOT NULL,
        receiver_id TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        is_read INTEGER NOT NULL DEFAULT 0,
        reply_to_id TEXT,
        attachment_url TEXT,
        linked_kind TEXT,
        linked_id TEXT
    )",
    "CREATE INDEX IF NOT EXISTS messages_by_pair ON messages (sender_id, receiver_id, created_at)",
    "CREATE TABLE IF NOT EXISTS reactions (
        message_id TEXT NOT NULL,
        emoji TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS reactions_by_message ON reactions (message_id)",
];

const MESSAGE_COLUMNS: &str =
    "id,sender_id,receiver_id,content,created_at,is_read,reply_to_id,attachment_url,linked_kind,linked_id";

// id, sender_id, receiver_id, content, created_at, is_read, reply_to_id, attachment_url, linked_kind, linked_id
type MessageRow = (
    String, String, String, String, i64, i64,
    Option<String>, Option<String>, Option<String>, Option<String>,
);

pub async fn migrate(db_pool: &SqlitePool) -> AppResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(db_pool).await?;
    }
    Ok(())
}

pub fn to_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_millis(millis: i64) -> AppResult<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)?)
}

pub fn linked_record(kind: Option<String>, id: Option<String>) -> Option<LinkedRecord> {
    match (kind, id) {
        (Some(kind), Some(id)) => Some(LinkedRecord { kind, id }),
        _ => None,
    }
}

pub async fn load_profile(db_pool: &SqlitePool, id: &UserId) -> AppResult<Profile> {
    let row: Option<(String, String, Option<String>)> =
        sqlx::query_as("SELECT name,role,avatar_url FROM profiles WHERE id=?")
            .bind(id.as_str())
            .fetch_optional(db_pool)
            .await?;

    Ok(match row {
        Some((name, role, avatar_url)) => Profile {
            id: id.clone(),
            name,
            role: role.parse::<Role>().unwrap_or_default(),
            avatar_url,
        },
        None => Profile::unknown(id.clone()),
    })
}

pub async fn upsert_profile(db_pool: &SqlitePool, profile: &Profile) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO profiles (id,name,role,avatar_url) VALUES (?,?,?,?)
         ON CONFLICT(id) DO UPDATE SET name=excluded.name, role=excluded.role, avatar_url=excluded.avatar_url",
    )
    .bind(profile.id.as_str())
    .bind(&profile.name)
    .bind(profile.role.as_str())
    .bind(profile.avatar_url.as_deref())
    .execute(db_pool)
    .await?;
    Ok(())
}

pub async fn insert_message(
    db_pool: &SqlitePool,
    id: &MessageId,
    request: &SendRequest,
    created_at: OffsetDateTime,
) -> AppResult<()> {
    let (linked_kind, linked_id) = match &request.linked_record_ref {
        Some(record) => (Some(record.kind.as_str()), Some(record.id.as_str())),
        None => (None, None),
    };

    sqlx::query(
        "INSERT INTO messages (id,sender_id,receiver_id,content,created_at,reply_to_id,attachment_url,linked_kind,linked_id)
         VALUES (?,?,?,?,?,?,?,?,?)",
    )
    .bind(id.as_str())
    .bind(request.sender_id.as_str())
    .bind(request.receiver_id.as_str())
    .bind(request.content.trim())
    .bind(to_millis(created_at))
    .bind(request.reply_to_id.as_ref().map(MessageId::as_str))
    .bind(request.attachment_url.as_deref())
    .bind(linked_kind)
    .bind(linked_id)
    .execute(db_pool)
    .await?;
    Ok(())
}

/// Marks everything `sender` wrote to `reader` as read.
pub async fn mark_read(db_pool: &SqlitePool, reader: &UserId, sender: &UserId) -> AppResult<u64> {
    let result = sqlx::query("UPDATE messages SET is_read=1 WHERE receiver_id=? AND sender_id=? AND is_read=0")
        .bind(reader.as_str())
        .bind(sender.as_str())
        .execute(db_pool)
        .await?;
    Ok(result.rows_affected())
}

/// Full conversation between `a` and `b`, oldest first.
pub async fn conversation_messages(db_pool: &SqlitePool, a: &UserId, b: &UserId) -> AppResult<Vec<ServerMessage>> {
    let rows: Vec<MessageRow> = sqlx::query_as(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE (sender_id=? AND receiver_id=?) OR (sender_id=? AND receiver_id=?)
         ORDER BY created_at, rowid"
    ))
    .bind(a.as_str())
    .bind(b.as_str())
    .bind(b.as_str())
    .bind(a.as_str())
    .fetch_all(db_pool)
    .await?;

    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        messages.push(message_from_row(db_pool, row).await?);
    }
    Ok(messages)
}

pub async fn load_message(db_pool: &SqlitePool, id: &MessageId) -> AppResult<Option<ServerMessage>> {
    let row: Option<MessageRow> = sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id=?"))
        .bind(id.as_str())
        .fetch_optional(db_pool)
        .await?;

    match row {
        Some(row) => Ok(Some(message_from_row(db_pool, row).await?)),
        None => Ok(None),
    }
}

pub async fn reactions(db_pool: &SqlitePool, id: &MessageId) -> AppResult<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT emoji FROM reactions WHERE message_id=? ORDER BY rowid")
        .bind(id.as_str())
        .fetch_all(db_pool)
        .await?;
    Ok(rows.into_iter().map(|(emoji,)| emoji).collect())
}

pub async fn add_reaction(db_pool: &SqlitePool, id: &MessageId, emoji: &str) -> AppResult<Vec<String>> {
    sqlx::query("INSERT INTO reactions (message_id,emoji) VALUES (?,?)")
        .bind(id.as_str())
        .bind(emoji)
        .execute(db_pool)
        .await?;
    reactions(db_pool, id).await
}

async fn reply_ref(db_pool: &SqlitePool, id: MessageId) -> AppResult<Option<ReplyRef>> {
    let row: Option<(String, String)> = sqlx::query_as("SELECT content,sender_id FROM messages WHERE id=?")
        .bind(id.as_str())
        .fetch_optional(db_pool)
        .await?;
    let Some((content, sender_id)) = row else {
        return Ok(None);
    };

    let author = load_profile(db_pool, &UserId::new(sender_id)).await?.name;
    Ok(Some(ReplyRef { id, snippet: snippet(&content), author }))
}

async fn message_from_row(db_pool: &SqlitePool, row: MessageRow) -> AppResult<ServerMessage> {
    let (id, sender_id, receiver_id, content, created_at, is_read, reply_to_id, attachment_url, linked_kind, linked_id) = row;
    let id = MessageId::new(id);
    let sender_id = UserId::new(sender_id);
    let receiver_id = UserId::new(receiver_id);

    let reply_to = match reply_to_id {
        Some(reply_to_id) => reply_ref(db_pool, MessageId::new(reply_to_id)).await?,
        None => None,
    };
    let reactions = reactions(db_pool, &id).await?;

    Ok(ServerMessage {
        id,
        data: MessageData {
            conversation_id: ConversationKey::between(&sender_id, &receiver_id),
            sender_id,
            receiver_id,
            content,
            created_at: from_millis(created_at)?,
            read: is_read != 0,
            reply_to,
            reactions,
            attachment_url,
            linked_record_ref: linked_record(linked_kind, linked_id),
        },
    })
}

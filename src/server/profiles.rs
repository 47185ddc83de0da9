use axum::{debug_handler, extract::State, Json};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::info;

use crate::{db, model::Profile, AppError, AppResult};

#[debug_handler]
pub(crate) async fn upsert_profile(
    State(db_pool): State<SqlitePool>,
    Json(profile): Json<Profile>,
) -> AppResult<Json<Value>> {
    if profile.id.as_str().trim().is_empty() || profile.name.trim().is_empty() {
        return Err(AppError::BadRequest("profile needs an id and a name".to_owned()));
    }

    db::upsert_profile(&db_pool, &profile).await?;
    info!(user = %profile.id, role = %profile.role, "profile saved");

    Ok(Json(json!({ "success": true, "data": profile })))
}

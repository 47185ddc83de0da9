//! The marketplace messaging HTTP API backed by SQLite.

mod conversations;
mod messages;
mod profiles;

use axum::{extract::FromRef, routing::{get, post}, Router};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversations", get(conversations::list_conversations))
        .route(
            "/messages",
            get(messages::list_messages)
                .post(messages::send_message)
                .patch(messages::add_reaction),
        )
        .route("/profiles", post(profiles::upsert_profile))
}

/// The full application with state and CORS applied, ready to serve.
pub fn app(db_pool: SqlitePool) -> Router {
    router()
        .with_state(AppState { db_pool })
        .layer(CorsLayer::permissive())
}

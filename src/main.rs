use std::str::FromStr;

use marketchat::{db, logging, server, AppResult, ServerConfig};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

#[tokio::main]
async fn main() -> AppResult<()> {
    logging::init_tracing();
    let config = ServerConfig::from_env()?;

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(connect_options)
        .await?;
    db::migrate(&db_pool).await?;

    let app = server::app(db_pool);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "messaging api listening");
    axum::serve(listener, app).await?;

    Ok(())
}

use std::sync::Arc;

use kinder_api::credential::{CredentialStore, MemoryCredentialStore, PgCredentialStore};
use kinder_api::notify::LogNotifier;
use kinder_api::routes::app;
use kinder_api::state::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, PORT, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = kinder_api::config::config();
    tracing::info!("Starting Kinder API in {:?} mode", config.environment);

    let credentials: Arc<dyn CredentialStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .unwrap_or_else(|e| panic!("failed to connect to database: {}", e));
            Arc::new(PgCredentialStore::new(pool))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory credential store");
            Arc::new(MemoryCredentialStore::new())
        }
    };

    let state = AppState::new(config, credentials, Arc::new(LogNotifier));

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("Kinder API listening on http://{}", bind_addr);

    axum::serve(listener, app(state)).await.expect("server");
}

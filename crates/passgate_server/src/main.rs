//! passgate_server: HTTP + WebSocket server for the gated group.
//!
//! Configuration is read from the environment (see [`passgate_server::config`]),
//! with a `.env` file honoured when present.

use std::sync::Arc;

use anyhow::Context;
use passgate_core::clock::{Clock, SystemClock};
use passgate_core::memory::InMemoryPassStore;
use passgate_core::ports::{PassStore, SessionStore};
use passgate_core::types::{NewIdentity, Role};
use passgate_postgres::{run_migrations, PgPassStore};
use passgate_server::config::ServerConfig;
use passgate_server::router::build_router;
use passgate_server::state::AppState;
use passgate_server::sweeper::ExpirationSweeper;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,passgate_server=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env().context("invalid configuration")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (store, sessions): (Arc<dyn PassStore>, Arc<dyn SessionStore>) =
        match config.database_url.as_deref() {
            Some(database_url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(database_url)
                    .await
                    .context("failed to connect to database")?;
                tracing::info!("Connected to database");
                run_migrations(&pool).await?;
                let store = Arc::new(PgPassStore::new(pool));
                (store.clone() as Arc<dyn PassStore>, store as Arc<dyn SessionStore>)
            }
            None => {
                tracing::warn!("running with the in-memory store; state is lost on restart");
                let store = Arc::new(InMemoryPassStore::new());
                (store.clone() as Arc<dyn PassStore>, store as Arc<dyn SessionStore>)
            }
        };

    if let Some(name) = config.bootstrap_master.as_deref() {
        bootstrap_master(store.as_ref(), clock.as_ref(), name).await?;
    }

    let sweeper = ExpirationSweeper::new(
        store.clone(),
        sessions.clone(),
        clock.clone(),
        config.sweep_interval,
    );
    tokio::spawn(async move {
        sweeper.run().await;
    });

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(store, sessions, clock, config);
    let app = build_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;
    tracing::info!("passgate_server listening on {bind_addr}");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

/// Create the first master administrator when the roster is empty.
async fn bootstrap_master(store: &dyn PassStore, clock: &dyn Clock, name: &str) -> anyhow::Result<()> {
    if !store.list_identities().await?.is_empty() {
        return Ok(());
    }
    let created = store
        .create_identity(
            &NewIdentity {
                display_name: name.trim().to_string(),
                role: Role::Privileged,
                is_master: true,
                email: None,
                phone: None,
            },
            clock.now(),
        )
        .await?;
    tracing::info!(identity = %created.id, "bootstrapped master administrator");
    Ok(())
}

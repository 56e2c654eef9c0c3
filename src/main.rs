use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use izuran_server::auth::ensure_admin;
use izuran_server::config::{Config, StorageBackend};
use izuran_server::routes::create_routes;
use izuran_server::services::LogNotifier;
use izuran_server::state::AppState;
use izuran_server::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "izuran_server=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match config.storage {
        StorageBackend::Postgres => {
            let store =
                PgStore::connect(&config.database_url, config.database_max_connections).await?;
            tracing::info!("Successfully connected to database");

            store.run_migrations().await?;
            tracing::info!("Migrations run successfully");
            Arc::new(store)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    if let Some(seed) = &config.bootstrap_admin {
        if ensure_admin(store.as_ref(), &seed.email, &seed.password).await? {
            tracing::info!(email = %seed.email, "Bootstrap admin account created");
        }
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = AppState::new(config, store, Arc::new(LogNotifier))?;
    let app = create_routes(state);

    tracing::info!("Server running at http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

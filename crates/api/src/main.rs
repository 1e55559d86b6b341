//! Order service entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::runtime::Workers;
use api::{Observers, Store};
use store::{InMemoryRecordStore, PostgresRecordStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn open_store(config: &Config) -> Result<(Store, &'static str), store::StoreError> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresRecordStore::connect(url).await?;
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL storage");
            let store: Store = Arc::new(store);
            Ok((store, "postgres"))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            let store: Store = Arc::new(InMemoryRecordStore::new());
            Ok((store, "memory"))
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(&config);

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    api::routes::metrics::describe();

    let (store, storage) = open_store(&config).await.expect("failed to open store");
    let state = api::build_state(store, storage, &config, Observers::metrics())
        .expect("failed to build application state");

    let workers = Workers::spawn(&state).await;
    let resent = state
        .orchestrator
        .recover()
        .await
        .expect("saga recovery failed");
    tracing::info!(resent, "resumed in-flight sagas");

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting order service");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    workers.shutdown();
    tracing::info!("server shut down gracefully");
}

//! API server entry point.

use std::sync::Arc;

use api::config::{Config, DataSource, LogFormat};
use api::{AppState, create_app, seed_products};
use checkout::{LogNotifier, Notifier};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::{FileStore, InMemoryStore, PostgresStore, Store};
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
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .init();
}

/// Seeds the catalog if configured, then serves until shutdown.
async fn serve<S: Store>(store: S, config: &Config, metrics_handle: PrometheusHandle) {
    if let Some(path) = &config.seed_products {
        seed_products(&store, path)
            .await
            .expect("failed to seed products");
    }

    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let state = Arc::new(AppState::new(store, notifier, config.data_source.as_str()));
    let app = create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, data_source = %config.data_source, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration
    let config = Config::from_env().expect("invalid configuration");

    // 2. Initialize tracing
    init_tracing(&config);

    // 3. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 4. Open the configured backend and serve
    match config.data_source {
        DataSource::Memory => serve(InMemoryStore::new(), &config, metrics_handle).await,
        DataSource::Fs => {
            let store = FileStore::open(&config.data_dir)
                .await
                .expect("failed to open data directory");
            serve(store, &config, metrics_handle).await;
        }
        DataSource::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL checked by Config");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to database");
            let store = PostgresStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            serve(store, &config, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}

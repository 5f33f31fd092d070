//! Closet Server - Main entry point

use anyhow::Result;
use closet_common::logging::{init_logging, LogConfig};
use sqlx::postgres::PgPoolOptions;
use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

use closet_server::{
    adapters::{extract::TextractExtraction, imagegen::GeminiImageGen, vision::OpenAiVision},
    api::{create_router, AppState},
    config::Config,
    db::PgClosetStore,
    dispatch::{LocalDispatcher, Stage, StageRuntime},
    storage::{config::StorageConfig, Storage},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::from_env()
        .unwrap_or_default()
        .with_filter("closet_server=debug,tower_http=debug,sqlx=info");

    init_logging(&log_config)?;

    info!("Starting Closet Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_secs))
        .connect(&config.database.url)
        .await?;

    info!("Database connection pool established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    let storage_config = StorageConfig::from_env()?;
    let storage = Storage::new(storage_config).await?;

    let extraction = TextractExtraction::from_env().await;

    let vision = OpenAiVision::new(
        &config.adapters.openai_api_url,
        &config.adapters.openai_api_key,
        &config.adapters.openai_model,
    );
    let imagegen = GeminiImageGen::new(
        &config.adapters.gemini_api_url,
        &config.adapters.gemini_api_key,
    );

    let runtime = Arc::new(StageRuntime {
        store: PgClosetStore::new(db_pool),
        storage,
        vision,
        imagegen,
        extraction,
        poll_interval: Duration::from_secs(config.adapters.extraction_poll_interval_secs),
    });

    let mut consumer_endpoints = HashMap::new();
    if let Some(endpoint) = config.adapters.summary_endpoint.clone() {
        consumer_endpoints.insert(Stage::Summary, endpoint);
    }
    if let Some(endpoint) = config.adapters.imagery_endpoint.clone() {
        consumer_endpoints.insert(Stage::Imagery, endpoint);
    }
    if let Some(endpoint) = config.adapters.music_endpoint.clone() {
        consumer_endpoints.insert(Stage::Music, endpoint);
    }

    let dispatcher = LocalDispatcher::new(Arc::clone(&runtime), consumer_endpoints);

    let state = AppState {
        runtime,
        dispatcher,
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}

//! Content service binary.
//!
//! Runs the HTTP server and the RabbitMQ consumer pool side by side until
//! SIGINT/SIGTERM, then drains both.

use std::fmt::Display;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use content_service::consumer::cv_token_handler;
use content_service::web::{router, AppState};
use content_service::{
    Broker, Config, ContentCatalog, CvTokenProcess, DownloadCvProcess, RedisStore, TokenStore,
};

const CONNECT_ATTEMPTS: u32 = 15;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("content_service_starting");

    let config = Config::load()?;
    info!(
        http_port = config.server.http_port,
        consumers = config.rabbitmq.consumers.default_count,
        queues = config.rabbitmq.topology.queues.len(),
        cv_languages = config.cv.files.len(),
        "config_loaded"
    );

    let store = connect_with_retry("redis", || async {
        let store = RedisStore::connect(&config.redis.url).await?;
        store.ping().await?;
        Ok::<_, content_service::StoreError>(store)
    })
    .await?;
    let store = Arc::new(store);

    let mut broker = connect_with_retry("rabbitmq", || Broker::connect(&config.rabbitmq.url)).await?;
    broker
        .declare_topology(&config.rabbitmq.topology)
        .await
        .context("Failed to declare RabbitMQ topology")?;

    let content = ContentCatalog::load(&config.content)?;
    let downloads = DownloadCvProcess::new(Arc::clone(&store), &config.cv);
    let cv_token = Arc::new(CvTokenProcess::new(Arc::clone(&store), &config.cv));

    broker.register_consumer(
        config.rabbitmq.cv_token_queue()?,
        config.rabbitmq.consumers.default_count,
        cv_token_handler(cv_token),
    );
    let broker = Arc::new(broker);

    let app = router(AppState::new(content, downloads));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    };

    broker.serve_alongside(server).await?;

    info!("content_service_shutdown_complete");

    Ok(())
}

/// Retry `connect` until it succeeds or the attempts run out.
async fn connect_with_retry<T, E, F, Fut>(dependency: &str, mut connect: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match connect().await {
            Ok(value) => {
                info!(dependency = dependency, attempt = attempt, "dependency_connected");
                return Ok(value);
            }
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                warn!(
                    dependency = dependency,
                    attempt = attempt,
                    max_attempts = CONNECT_ATTEMPTS,
                    error = %e,
                    "dependency_connect_retry"
                );
                attempt += 1;
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Err(e) => {
                return Err(anyhow!(
                    "could not connect to {} after {} attempts: {}",
                    dependency,
                    CONNECT_ATTEMPTS,
                    e
                ));
            }
        }
    }
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "sigint_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}

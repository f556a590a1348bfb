//! Poll Telegram for messages and keep each user's reading list in Postgres.
use std::process::ExitCode;
use std::sync::Arc;

use envconfig::Envconfig;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use link_common::liveness::Liveness;
use link_common::metrics::{serve, setup_metrics_router};
use link_common::store::PgLinkStore;
use link_common::telegram::TelegramClient;
use link_worker::config::{Config, Env};
use link_worker::consumer::Consumer;
use link_worker::fetcher::TelegramFetcher;
use link_worker::processor::TelegramProcessor;

async fn shutdown_signal() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("shutting down gracefully...");
}

/// Local runs get readable output, deployed tiers get JSON. `RUST_LOG` overrides the level.
fn init_tracing(env: Env) {
    let (log_layer, default_level) = match env {
        Env::Local => (fmt::layer().pretty().boxed(), "debug"),
        Env::Dev => (fmt::layer().json().boxed(), "debug"),
        Env::Prod => (fmt::layer().json().boxed(), "info"),
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(log_layer)
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::init_from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.env);

    let client = match TelegramClient::new(
        &config.telegram_api_url,
        config.bot_token.as_str(),
        config.request_timeout.0,
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("failed to create telegram client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let store = match PgLinkStore::new(&config.database_url, &config.pool.pool_config()).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("failed to connect to link store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.run_migrations {
        if let Err(e) = store.migrate().await {
            error!("failed to migrate link store: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let shutdown = CancellationToken::new();
    let liveness = Liveness::new("consumer", config.liveness_deadline.0);

    let router = match setup_metrics_router(liveness.clone()) {
        Ok(router) => router,
        Err(e) => {
            error!("failed to set up metrics: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let bind = config.bind();
    let server_shutdown = shutdown.clone().cancelled_owned();
    let server = tokio::task::spawn(async move {
        if let Err(e) = serve(router, &bind, server_shutdown).await {
            error!("failed to serve metrics: {}", e);
        }
    });

    let signal_token = shutdown.clone();
    tokio::task::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let consumer = Consumer::new(
        TelegramFetcher::new(client.clone()),
        TelegramProcessor::new(client, store.clone(), config.processing_timeout.0),
        config.batch_size,
        config.idle_interval.0,
        config.retry_policy.retry_policy(),
        liveness,
    );

    info!("link worker started");
    let result = consumer.run(shutdown.clone()).await;

    shutdown.cancel();
    if let Err(e) = server.await {
        error!("metrics server task failed: {}", e);
    }
    store.close().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("link worker stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};

use catalog_bot::channels::{Messenger, WhatsAppClient};
use catalog_bot::config::BotConfig;
use catalog_bot::extractor::{InstagramExtractor, ProfileExtractor};
use catalog_bot::pipeline::{IngestionPipeline, ProductRules};
use catalog_bot::store::{Database, LibSqlBackend};
use catalog_bot::webhook::{AppState, Dispatcher, router};
use catalog_bot::worker::UserLocks;

/// How long shutdown waits for queued messages and ingestions.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = BotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export WHATSAPP_TOKEN=... WHATSAPP_PHONE_NUMBER_ID=... VERIFY_TOKEN=...");
        std::process::exit(1);
    });
    init_tracing(config.json_logs);

    eprintln!("🛍️  Catalog Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://0.0.0.0:{}{}", config.port, config.webhook_path);
    eprintln!("   Health:  http://0.0.0.0:{}/health", config.port);

    // ── Store ─────────────────────────────────────────────────────────────
    let store: Arc<dyn Database> = Arc::new(
        LibSqlBackend::open(&config.store)
            .await
            .context("failed to open store")?,
    );
    tracing::info!(uri = %config.store.uri, "Store ready");

    // ── Collaborators ─────────────────────────────────────────────────────
    let messenger: Arc<dyn Messenger> = Arc::new(WhatsAppClient::new(&config.messaging));
    let extractor: Arc<dyn ProfileExtractor> = Arc::new(
        InstagramExtractor::new(&config.user_agent).context("failed to build HTTP client")?,
    );
    let rules = ProductRules::new().context("invalid product rules")?;

    // ── Pipeline + dispatcher ─────────────────────────────────────────────
    let locks = Arc::new(UserLocks::new());
    let pipeline = Arc::new(IngestionPipeline::new(
        Arc::clone(&store),
        Arc::clone(&messenger),
        extractor,
        Arc::clone(&locks),
        rules,
        config.reset_on_ingestion_failure,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&store),
        messenger,
        pipeline,
        locks,
        &config.workers,
    ));

    let state = AppState {
        dispatcher: Arc::clone(&dispatcher),
        store,
        verify_token: Arc::new(SecretString::from(
            config.verify_token.expose_secret().to_string(),
        )),
    };
    let app = router(state, &config.webhook_path);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, path = %config.webhook_path, "Webhook server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    dispatcher.drain(DRAIN_TIMEOUT).await;
    tracing::info!("Catalog Bot stopped");
    Ok(())
}

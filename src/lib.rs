use anyhow::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod integrity;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod routes;
pub mod sanitize;
pub mod store;
pub mod token;
pub mod utils;

use clock::{Clock, SystemClock};
use config::Config;
use context::AppContext;
use integrity::IntegrityChecker;
use pipeline::SubmissionPipeline;
use store::{InMemoryMessageStore, MessageStore, PostgresMessageStore};
use token::{
    InMemoryUsedTokens, RedisUsedTokens, TokenIssuer, TokenValidator, UsedTokenPruneTask,
    UsedTokenStore,
};

pub fn init_tracing(rust_log: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn message_store(config: &Config) -> Result<Arc<dyn MessageStore>> {
    match &config.db.url {
        Some(url) => {
            let pool = store::create_pool(url, config.db.max_connections).await?;
            tracing::info!("Connected to database");

            let store = PostgresMessageStore::new(pool);
            tracing::info!("Applying database migrations...");
            store.migrate().await?;
            tracing::info!("Database migrations applied successfully.");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, messages are kept in memory only");
            Ok(Arc::new(InMemoryMessageStore::new()))
        }
    }
}

async fn used_token_store(config: &Config) -> Result<Arc<dyn UsedTokenStore>> {
    match &config.used_tokens.redis_url {
        Some(url) => {
            let used = tokio::time::timeout(
                std::time::Duration::from_secs(10),
                RedisUsedTokens::connect(url, config.used_tokens.key_prefix.clone()),
            )
            .await
            .map_err(|_| anyhow::anyhow!("Redis connection timed out after 10 seconds"))??;
            tracing::info!("Connected to Redis");
            Ok(Arc::new(used))
        }
        None => {
            tracing::warn!(
                "REDIS_URL not set, used tokens are tracked in memory (single instance only)"
            );
            Ok(Arc::new(InMemoryUsedTokens::new()))
        }
    }
}

/// Wires the protocol components from already-built backends.
pub fn assemble_context(
    config: Config,
    clock: Arc<dyn Clock>,
    store: Arc<dyn MessageStore>,
    used_tokens: Arc<dyn UsedTokenStore>,
) -> Result<AppContext> {
    let notifier = notify::notifier_from_config(&config.notify)?;

    let issuer = Arc::new(TokenIssuer::new(
        &config.jwt_secret,
        config.jwt_issuer.clone(),
        config.token_ttl(),
        clock.clone(),
    )?);
    let validator = Arc::new(TokenValidator::new(
        &config.jwt_secret,
        config.jwt_issuer.clone(),
        config.token_ttl(),
        clock,
        used_tokens.clone(),
    )?);

    tracing::info!(
        algorithm = %config.checksum_algorithm,
        ttl_secs = config.token_ttl_secs,
        "Submission protocol configured"
    );

    let pipeline = Arc::new(SubmissionPipeline::new(
        validator,
        IntegrityChecker::new(config.checksum_algorithm),
        used_tokens.clone(),
        store.clone(),
        notifier,
        config.max_message_chars,
        config.logging.hash_salt.clone(),
    ));

    Ok(AppContext::new(
        Arc::new(config),
        issuer,
        pipeline,
        store,
        used_tokens,
    ))
}

/// Connects the configured backends and builds the application context.
pub async fn build_context(config: Config, clock: Arc<dyn Clock>) -> Result<AppContext> {
    let store = message_store(&config).await?;
    let used_tokens = used_token_store(&config).await?;
    assemble_context(config, clock, store, used_tokens)
}

/// Starts the used-token prune task in the background.
pub fn spawn_prune_task(app_context: &AppContext, clock: Arc<dyn Clock>) {
    let interval = std::time::Duration::from_secs(
        app_context.config.used_tokens.prune_interval_secs.max(1),
    );
    let task = UsedTokenPruneTask::new(app_context.used_tokens.clone(), clock, interval);
    tokio::spawn(task.run());
}

/// Serves the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app_context: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = routes::create_router(Arc::new(app_context));

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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

    tracing::info!("Shutdown signal received, draining connections");
}

pub async fn run() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.rust_log);

    let listen_address = config.listen_address();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let app_context = build_context(config, clock.clone()).await?;
    spawn_prune_task(&app_context, clock);

    let listener = TcpListener::bind(&listen_address).await?;
    tracing::info!("Murmur server listening on {}", listen_address);

    serve(listener, app_context, shutdown_signal()).await?;
    tracing::info!("Server shut down.");
    Ok(())
}

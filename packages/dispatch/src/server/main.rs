// dispatch-server: HTTP API, SSE streams and the offer-deadline sweeper

use anyhow::{Context, Result};
use dispatch_core::domains::helpers::seed_demo_helpers;
use dispatch_core::kernel::scheduled_tasks::start_scheduler;
use dispatch_core::kernel::{
    BaseDispatchStore, MemoryStore, PostgresStore, RetryPolicy, RetryingStore, ServerDeps,
};
use dispatch_core::{server::build_app, Config};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "info,dispatch_core=debug,sqlx=warn,tower_http=info";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Postgres when `DATABASE_URL` is set (migrations applied), otherwise the
/// in-memory store. Either way wrapped in transient-failure retries.
async fn open_store(config: &Config) -> Result<Arc<dyn BaseDispatchStore>> {
    let inner: Arc<dyn BaseDispatchStore> = match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("Failed to connect to database")?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Postgres store ready (migrations applied)");
            Arc::new(PostgresStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; bookings and helpers live in memory only");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(Arc::new(RetryingStore::new(inner, RetryPolicy::default())))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        port = config.port,
        acceptance_timeout_secs = config.acceptance_timeout_secs,
        redispatch = %config.redispatch_policy,
        sweep_interval_ms = config.sweep_interval.as_millis() as u64,
        "Starting dispatch server"
    );

    let deps = ServerDeps::new(open_store(&config).await?, config.dispatch_settings());

    if config.seed_demo_helpers {
        seed_demo_helpers(&deps.registry)
            .await
            .context("Failed to seed demo helpers")?;
    }

    // Offer deadlines are enforced here, not by clients
    let _scheduler = start_scheduler(
        deps.dispatcher.clone(),
        deps.stream_hub.clone(),
        config.sweep_interval,
    )
    .await
    .context("Failed to start scheduled tasks")?;

    let app = build_app(deps, &config.allowed_origins);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

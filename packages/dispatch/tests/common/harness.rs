//! Test harnesses.
//!
//! [`TestHarness`] runs the engine on the in-memory store and is cheap enough
//! to build per test. [`PostgresHarness`] shares one Postgres container across
//! the whole run; containers and migrations are initialized on first use.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dispatch_core::common::{BookingId, HelperId, StoreError};
use dispatch_core::domains::bookings::{Booking, BookingFilter};
use dispatch_core::domains::dispatch::{DispatchSettings, Dispatcher};
use dispatch_core::domains::helpers::{
    Helper, HelperFilter, HelperProfilePatch, HelperRegistry, NewHelper,
};
use dispatch_core::kernel::store::Transaction;
use dispatch_core::kernel::{BaseDispatchStore, MemoryStore, PostgresStore, ServerDeps, StreamHub};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

fn init_tracing() {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine wired to a fresh [`MemoryStore`].
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub deps: ServerDeps,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new(DispatchSettings::default())
    }

    async fn teardown(self) {}
}

impl TestHarness {
    pub fn new(settings: DispatchSettings) -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let deps = ServerDeps::new(store.clone(), settings);
        Self { store, deps }
    }

    /// Engine whose helper snapshots can be switched to fail, over the same
    /// in-memory data as `store`.
    pub fn with_outage(settings: DispatchSettings) -> (Self, Arc<HelperListingOutage>) {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let outage = Arc::new(HelperListingOutage {
            inner: store.clone(),
            down: AtomicBool::new(false),
        });
        let deps = ServerDeps::new(outage.clone(), settings);
        (Self { store, deps }, outage)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.deps.dispatcher
    }

    pub fn registry(&self) -> &HelperRegistry {
        &self.deps.registry
    }

    pub fn hub(&self) -> &StreamHub {
        &self.deps.stream_hub
    }

    pub async fn register(&self, helper: NewHelper) -> Helper {
        self.registry()
            .register(helper)
            .await
            .expect("register helper")
    }

    pub async fn helper(&self, helper: &Helper) -> Helper {
        self.registry().get(helper.id).await.expect("get helper")
    }
}

/// Store whose `list_helpers` returns `Unavailable` while `down` is set.
pub struct HelperListingOutage {
    inner: Arc<MemoryStore>,
    down: AtomicBool,
}

impl HelperListingOutage {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl BaseDispatchStore for HelperListingOutage {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn insert_helper(&self, helper: Helper) -> Result<(), StoreError> {
        self.inner.insert_helper(helper).await
    }

    async fn get_helper(&self, id: HelperId) -> Result<Option<Helper>, StoreError> {
        self.inner.get_helper(id).await
    }

    async fn list_helpers(&self, filter: &HelperFilter) -> Result<Vec<Helper>, StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("helper listing down".into()));
        }
        self.inner.list_helpers(filter).await
    }

    async fn update_helper_profile(
        &self,
        id: HelperId,
        patch: HelperProfilePatch,
    ) -> Result<Helper, StoreError> {
        self.inner.update_helper_profile(id, patch).await
    }

    async fn create_booking(&self, booking: Booking) -> Result<BookingId, StoreError> {
        self.inner.create_booking(booking).await
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        self.inner.get_booking(id).await
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError> {
        self.inner.list_bookings(filter).await
    }

    async fn commit(&self, txn: Transaction) -> Result<Vec<Booking>, StoreError> {
        self.inner.commit(txn).await
    }
}

/// One Postgres 16 container per test binary, migrated on first use.
struct PostgresContainer {
    url: String,
    _container: ContainerAsync<Postgres>,
}

static POSTGRES: OnceCell<PostgresContainer> = OnceCell::const_new();

async fn start_postgres() -> Result<PostgresContainer> {
    init_tracing();

    let container = Postgres::default()
        .with_tag("16")
        .start()
        .await
        .context("Failed to start Postgres container")?;
    let url = format!(
        "postgresql://postgres:postgres@{}:{}/postgres",
        container.get_host().await?,
        container.get_host_port_ipv4(5432).await?
    );

    let pool = PgPool::connect(&url)
        .await
        .context("Failed to connect for migrations")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    pool.close().await;

    Ok(PostgresContainer {
        url,
        _container: container,
    })
}

async fn postgres_url() -> &'static str {
    let container = POSTGRES
        .get_or_init(|| async { start_postgres().await.expect("Postgres test container") })
        .await;
    &container.url
}

/// Engine wired to a [`PostgresStore`] on the shared container.
///
/// Tests share one database, so they create their own helpers and bookings
/// and only assert on those.
pub struct PostgresHarness {
    pub db_pool: PgPool,
    pub store: Arc<PostgresStore>,
    pub deps: ServerDeps,
}

impl AsyncTestContext for PostgresHarness {
    async fn setup() -> Self {
        Self::new(DispatchSettings::default())
            .await
            .expect("Failed to create Postgres harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}

impl PostgresHarness {
    pub async fn new(settings: DispatchSettings) -> Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(postgres_url().await)
            .await
            .context("Failed to connect to test database")?;
        let store = Arc::new(PostgresStore::new(db_pool.clone()));
        let deps = ServerDeps::new(store.clone(), settings);
        Ok(Self {
            db_pool,
            store,
            deps,
        })
    }
}

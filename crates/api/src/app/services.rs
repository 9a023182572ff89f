use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use stocklock_infra::{
    InMemoryLedgerStore, InventoryCoordinator, LedgerStore, PostgresLedgerStore, RetryPolicy,
    Settings,
};
use stocklock_inventory::SeedCatalog;

/// Store handle shared by every request.
pub type SharedStore = Arc<dyn LedgerStore>;

/// Everything the handlers need, built once at startup.
pub struct AppServices {
    pub coordinator: InventoryCoordinator<SharedStore>,
    /// Catalog restored by `POST /api/products/reset`.
    pub seed: SeedCatalog,
    /// Fired on shutdown; in-flight placements give up with `503`.
    pub shutdown: CancellationToken,
}

impl AppServices {
    pub fn new(store: SharedStore, retry: RetryPolicy, seed: SeedCatalog) -> Self {
        Self {
            coordinator: InventoryCoordinator::with_retry_policy(store, retry),
            seed,
            shutdown: CancellationToken::new(),
        }
    }

    /// In-memory wiring, as used by local runs and tests.
    pub fn in_memory(retry: RetryPolicy, seed: SeedCatalog) -> Self {
        Self::new(Arc::new(InMemoryLedgerStore::new()), retry, seed)
    }
}

/// Select the store from `settings` (Postgres when `DATABASE_URL` is set),
/// run migrations, and optionally seed the catalog.
pub async fn build_services(settings: &Settings) -> Result<AppServices> {
    let store: SharedStore = match settings.database_url.as_deref() {
        Some(url) => {
            let pg = PostgresLedgerStore::connect(url, settings.max_connections)
                .await
                .context("failed to connect to postgres")?;
            pg.migrate().await.context("failed to run migrations")?;
            info!(max_connections = settings.max_connections, "using postgres ledger store");
            Arc::new(pg)
        }
        None => {
            info!("DATABASE_URL not set; using in-memory ledger store");
            Arc::new(InMemoryLedgerStore::new())
        }
    };

    let services = AppServices::new(store, settings.retry, settings.seed.clone());

    if settings.seed_on_start {
        services
            .coordinator
            .reset_inventory(&services.seed)
            .await
            .context("failed to seed inventory")?;
    }

    Ok(services)
}

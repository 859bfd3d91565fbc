//! Service wiring: one store, one cache layer, the directory, the ledger and
//! the batch pipeline built from a [`LedgerConfig`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use crate::batch::BatchUpsertPipeline;
use crate::cache::{CacheLayer, InMemoryCache};
use crate::config::LedgerConfig;
use crate::db;
use crate::directory::{CatalogDirectory, HubDirectory, SkuDirectory};
use crate::ledger::InventoryLedger;
use crate::store::{CatalogStore, InMemoryStore, InventoryStore, PgStore};

#[derive(Debug, Clone)]
pub struct LedgerServices {
    pub directory: CatalogDirectory,
    pub ledger: InventoryLedger,
    pub batch: BatchUpsertPipeline,
}

impl LedgerServices {
    /// Assemble services over any store implementing both store traits.
    pub fn assemble<S>(store: Arc<S>, cache: CacheLayer, config: LedgerConfig) -> Self
    where
        S: CatalogStore + InventoryStore + 'static,
    {
        let cache = cache.with_settle_delay(settle_delay(&config));
        let config = Arc::new(config);
        let catalog: Arc<dyn CatalogStore> = store.clone();
        let inventory: Arc<dyn InventoryStore> = store;

        let hubs = HubDirectory::new(catalog.clone(), cache.clone(), config.entity_ttl, config.op_timeout);
        let skus = SkuDirectory::new(catalog, cache.clone(), config.entity_ttl, config.op_timeout);
        let directory = CatalogDirectory::new(hubs, skus);
        let ledger = InventoryLedger::new(inventory, directory.clone(), cache, config);
        let batch = BatchUpsertPipeline::new(ledger.clone());

        Self {
            directory,
            ledger,
            batch,
        }
    }

    /// Process-local services. The returned store handle registers sellers
    /// and simulates outages.
    pub fn in_memory(config: LedgerConfig) -> (Self, InMemoryStore) {
        let store = InMemoryStore::new();
        let cache = CacheLayer::new(Arc::new(InMemoryCache::new()), config.cache_timeout);
        let services = Self::assemble(Arc::new(store.clone()), cache, config);
        (services, store)
    }

    /// Postgres-backed services. Redis is used when configured and compiled
    /// in; an unreachable Redis disables caching rather than failing startup.
    pub async fn connect(config: LedgerConfig) -> anyhow::Result<Self> {
        let pool = db::connect(&config).await.context("connect inventory store")?;
        let cache = cache_layer(&config).await;
        info!(cache_enabled = cache.is_enabled(), "ledger services ready");
        Ok(Self::assemble(Arc::new(PgStore::new(pool)), cache, config))
    }

    pub fn hubs(&self) -> &HubDirectory {
        self.directory.hubs()
    }

    pub fn skus(&self) -> &SkuDirectory {
        self.directory.skus()
    }
}

/// Long enough for a store read that began before a write to have stored its
/// result in the cache.
fn settle_delay(config: &LedgerConfig) -> Duration {
    config.op_timeout.saturating_add(config.cache_timeout.saturating_mul(2))
}

#[cfg(feature = "redis")]
async fn cache_layer(config: &LedgerConfig) -> CacheLayer {
    let Some(url) = config.redis_url.as_deref() else {
        return CacheLayer::new(Arc::new(InMemoryCache::new()), config.cache_timeout);
    };
    match crate::cache::RedisCache::connect(url).await {
        Ok(redis) => CacheLayer::new(Arc::new(redis), config.cache_timeout),
        Err(e) => {
            warn!(error = %e, "redis unavailable; caching disabled");
            CacheLayer::disabled()
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn cache_layer(config: &LedgerConfig) -> CacheLayer {
    if config.redis_url.is_some() {
        warn!("HUBSTOCK_REDIS_URL set but built without the `redis` feature; using in-process cache");
    }
    CacheLayer::new(Arc::new(InMemoryCache::new()), config.cache_timeout)
}

//! Catalog Directory: hub and SKU lifecycle plus cache-first code resolution.
//!
//! Writes go to the store first; the cache is populated or evicted only after
//! the store accepted the write.

mod hubs;
mod skus;

use std::marker::PhantomData;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use hubstock_catalog::{Hub, Sku};
use hubstock_core::{CatalogEntity, EntityKind, LedgerError, LedgerResult, TenantId};

use crate::cache::{keys, CacheLayer};
use crate::store::StoreError;

pub use hubs::HubDirectory;
pub use skus::SkuDirectory;

/// Cache key schema of a catalog entity.
pub(crate) trait EntityKeys:
    CatalogEntity + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn id_key(id: Self::Id) -> String;
    fn code_key(tenant_id: TenantId, code: &str) -> String;
}

impl EntityKeys for Hub {
    fn id_key(id: Self::Id) -> String {
        keys::hub_by_id(id)
    }

    fn code_key(tenant_id: TenantId, code: &str) -> String {
        keys::hub_by_code(tenant_id, code)
    }
}

impl EntityKeys for Sku {
    fn id_key(id: Self::Id) -> String {
        keys::sku_by_id(id)
    }

    fn code_key(tenant_id: TenantId, code: &str) -> String {
        keys::sku_by_code(tenant_id, code)
    }
}

/// By-id and by-code cache entries for one entity type.
///
/// Id keys carry no tenant, so every hit is checked against the caller's
/// tenant. Soft-deleted rows are cached by id only.
#[derive(Debug, Clone)]
pub(crate) struct EntityCache<E> {
    cache: CacheLayer,
    ttl: Duration,
    _entity: PhantomData<fn() -> E>,
}

impl<E: EntityKeys> EntityCache<E> {
    pub(crate) fn new(cache: CacheLayer, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            _entity: PhantomData,
        }
    }

    pub(crate) fn layer(&self) -> &CacheLayer {
        &self.cache
    }

    pub(crate) async fn by_id(&self, tenant_id: TenantId, id: E::Id) -> Option<E> {
        self.cache
            .get::<E>(&E::id_key(id))
            .await
            .filter(|e| e.tenant_id() == tenant_id)
    }

    pub(crate) async fn by_code(&self, tenant_id: TenantId, code: &str) -> Option<E> {
        self.cache
            .get::<E>(&E::code_key(tenant_id, code))
            .await
            .filter(|e| e.tenant_id() == tenant_id && !e.is_deleted() && e.code() == code)
    }

    pub(crate) async fn remember(&self, entity: &E) {
        self.cache.set(&E::id_key(entity.id()), entity, self.ttl).await;
        if !entity.is_deleted() {
            self.cache
                .set(&E::code_key(entity.tenant_id(), entity.code()), entity, self.ttl)
                .await;
        }
    }

    /// Evict both keys of `entity` as it was stored.
    pub(crate) async fn forget(&self, entity: &E) {
        self.cache
            .delete(&[
                E::id_key(entity.id()),
                E::code_key(entity.tenant_id(), entity.code()),
            ])
            .await;
    }
}

/// Map a store error from a catalog write, naming the code on uniqueness
/// violations.
pub(crate) fn write_error(err: StoreError, entity: EntityKind, code: &str) -> LedgerError {
    match err {
        StoreError::UniqueViolation(_) => LedgerError::duplicate_code(entity, code),
        other => other.into(),
    }
}

/// Code-to-id resolution for inventory operations.
///
/// Unknown or deleted codes surface as `InvalidReference`, not `NotFound`.
#[derive(Debug, Clone)]
pub struct CatalogDirectory {
    hubs: HubDirectory,
    skus: SkuDirectory,
}

impl CatalogDirectory {
    pub fn new(hubs: HubDirectory, skus: SkuDirectory) -> Self {
        Self { hubs, skus }
    }

    pub fn hubs(&self) -> &HubDirectory {
        &self.hubs
    }

    pub fn skus(&self) -> &SkuDirectory {
        &self.skus
    }

    pub async fn resolve_hub(&self, tenant_id: TenantId, code: &str) -> LedgerResult<Hub> {
        self.hubs
            .get_by_code(tenant_id, code)
            .await
            .map_err(|e| e.into_reference(EntityKind::Hub, code))
    }

    pub async fn resolve_sku(&self, tenant_id: TenantId, code: &str) -> LedgerResult<Sku> {
        self.skus
            .get_by_code(tenant_id, code)
            .await
            .map_err(|e| e.into_reference(EntityKind::Sku, code))
    }

    /// Resolve both codes of an inventory key, hub first.
    pub async fn resolve(&self, tenant_id: TenantId, hub_code: &str, sku_code: &str) -> LedgerResult<(Hub, Sku)> {
        let hub = self.resolve_hub(tenant_id, hub_code).await?;
        let sku = self.resolve_sku(tenant_id, sku_code).await?;
        Ok((hub, sku))
    }
}

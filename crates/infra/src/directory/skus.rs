use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument};

use hubstock_catalog::{NewSku, Sku, SkuChanges, SkuFilter};
use hubstock_core::{EntityKind, LedgerError, LedgerResult, Page, SellerId, SkuId, TenantId};

use super::{write_error, EntityCache};
use crate::cache::{keys, CacheLayer};
use crate::store::{within, CatalogStore};

/// SKU lifecycle and cached lookups. Every SKU must belong to an existing
/// seller of the same tenant.
#[derive(Clone)]
pub struct SkuDirectory {
    store: Arc<dyn CatalogStore>,
    cache: EntityCache<Sku>,
    op_timeout: Duration,
}

impl std::fmt::Debug for SkuDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkuDirectory")
            .field("cache", &self.cache)
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl SkuDirectory {
    pub fn new(store: Arc<dyn CatalogStore>, cache: CacheLayer, entity_ttl: Duration, op_timeout: Duration) -> Self {
        Self {
            store,
            cache: EntityCache::new(cache, entity_ttl),
            op_timeout,
        }
    }

    async fn require_seller(&self, tenant_id: TenantId, seller_id: SellerId) -> LedgerResult<()> {
        let exists = within(
            self.op_timeout,
            "seller_exists",
            self.store.seller_exists(tenant_id, seller_id),
        )
        .await?;
        if !exists {
            return Err(LedgerError::invalid_reference(EntityKind::Seller, seller_id.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, code = %input.code), err)]
    pub async fn create(&self, tenant_id: TenantId, input: NewSku) -> LedgerResult<Sku> {
        let sku = Sku::create(tenant_id, SkuId::new(), input, Utc::now())?;
        self.require_seller(tenant_id, sku.seller_id).await?;
        within(self.op_timeout, "insert_sku", self.store.insert_sku(&sku))
            .await
            .map_err(|e| write_error(e, EntityKind::Sku, &sku.code))?;

        self.cache.remember(&sku).await;
        info!(sku_id = %sku.id, "sku created");
        Ok(sku)
    }

    /// Also returns soft-deleted SKUs.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, sku_id = %id), err)]
    pub async fn get_by_id(&self, tenant_id: TenantId, id: SkuId) -> LedgerResult<Sku> {
        if let Some(sku) = self.cache.by_id(tenant_id, id).await {
            return Ok(sku);
        }
        let sku = within(self.op_timeout, "sku_by_id", self.store.sku_by_id(tenant_id, id))
            .await?
            .ok_or_else(|| LedgerError::not_found(EntityKind::Sku, id.to_string()))?;
        self.cache.remember(&sku).await;
        Ok(sku)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn get_by_code(&self, tenant_id: TenantId, code: &str) -> LedgerResult<Sku> {
        if let Some(sku) = self.cache.by_code(tenant_id, code).await {
            return Ok(sku);
        }
        let sku = within(self.op_timeout, "sku_by_code", self.store.sku_by_code(tenant_id, code))
            .await?
            .ok_or_else(|| LedgerError::not_found(EntityKind::Sku, code))?;
        self.cache.remember(&sku).await;
        Ok(sku)
    }

    /// Live SKUs ordered by code, optionally narrowed by seller and active flag.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id), err)]
    pub async fn list(&self, tenant_id: TenantId, filter: SkuFilter) -> LedgerResult<Page<Sku>> {
        let (skus, total) = within(self.op_timeout, "list_skus", self.store.list_skus(tenant_id, &filter)).await?;
        Ok(Page::new(skus, total, filter.page))
    }

    #[instrument(skip(self, changes), fields(tenant_id = %tenant_id, sku_id = %id), err)]
    pub async fn update(&self, tenant_id: TenantId, id: SkuId, changes: SkuChanges) -> LedgerResult<Sku> {
        let current = within(self.op_timeout, "sku_by_id", self.store.sku_by_id(tenant_id, id))
            .await?
            .filter(|sku| sku.deleted_at.is_none())
            .ok_or_else(|| LedgerError::not_found(EntityKind::Sku, id.to_string()))?;

        let next = current.with_changes(changes, Utc::now())?;
        if next.seller_id != current.seller_id {
            self.require_seller(tenant_id, next.seller_id).await?;
        }
        let updated = within(self.op_timeout, "update_sku", self.store.update_sku(&next))
            .await
            .map_err(|e| write_error(e, EntityKind::Sku, &next.code))?;
        if !updated {
            return Err(LedgerError::not_found(EntityKind::Sku, id.to_string()));
        }

        self.cache.forget(&current).await;
        self.cache.remember(&next).await;
        self.evict_inventory(tenant_id).await;
        info!(code = %next.code, "sku updated");
        Ok(next)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, sku_id = %id), err)]
    pub async fn delete(&self, tenant_id: TenantId, id: SkuId) -> LedgerResult<()> {
        let removed = within(
            self.op_timeout,
            "soft_delete_sku",
            self.store.soft_delete_sku(tenant_id, id, Utc::now()),
        )
        .await?
        .ok_or_else(|| LedgerError::not_found(EntityKind::Sku, id.to_string()))?;

        self.cache.forget(&removed).await;
        self.evict_inventory(tenant_id).await;
        info!(code = %removed.code, "sku deleted");
        Ok(())
    }

    /// Point-query keys put the SKU code last, so no narrower prefix exists.
    async fn evict_inventory(&self, tenant_id: TenantId) {
        self.cache
            .layer()
            .invalidate_prefix(&keys::inventory_prefix(tenant_id))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::store::InMemoryStore;
    use hubstock_core::{ErrorKind, PageRequest};

    async fn directory() -> (TenantId, SellerId, SkuDirectory) {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let seller = SellerId::new();
        store.register_seller(tenant, seller).await;
        let cache = CacheLayer::new(Arc::new(InMemoryCache::new()), Duration::from_millis(100));
        let skus = SkuDirectory::new(Arc::new(store), cache, Duration::from_secs(3600), Duration::from_secs(5));
        (tenant, seller, skus)
    }

    #[tokio::test]
    async fn unknown_seller_is_an_invalid_reference() {
        let (tenant, _, skus) = directory().await;
        let err = skus
            .create(tenant, NewSku::new(SellerId::new(), "S1", "Widget"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidReference);
    }

    #[tokio::test]
    async fn reassigning_to_unknown_seller_is_rejected() {
        let (tenant, seller, skus) = directory().await;
        let sku = skus.create(tenant, NewSku::new(seller, "S1", "Widget")).await.unwrap();
        let changes = SkuChanges {
            seller_id: Some(SellerId::new()),
            ..SkuChanges::default()
        };
        let err = skus.update(tenant, sku.id, changes).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidReference);
    }

    #[tokio::test]
    async fn duplicate_code_and_missing_target() {
        let (tenant, seller, skus) = directory().await;
        skus.create(tenant, NewSku::new(seller, "S1", "Widget")).await.unwrap();
        let err = skus.create(tenant, NewSku::new(seller, "S1", "Gadget")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateCode);

        let err = skus.update(tenant, SkuId::new(), SkuChanges::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(skus.delete(tenant, SkuId::new()).await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn listing_filters_by_seller_and_active_flag() {
        let (tenant, seller, skus) = directory().await;
        skus.create(tenant, NewSku::new(seller, "S1", "Widget")).await.unwrap();
        let mut inactive = NewSku::new(seller, "S2", "Old widget");
        inactive.is_active = false;
        skus.create(tenant, inactive).await.unwrap();

        let active_only = SkuFilter {
            seller_id: Some(seller),
            is_active: Some(true),
            page: PageRequest::default(),
        };
        let page = skus.list(tenant, active_only).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].code, "S1");

        let other_seller = SkuFilter {
            seller_id: Some(SellerId::new()),
            ..SkuFilter::default()
        };
        assert_eq!(skus.list(tenant, other_seller).await.unwrap().total, 0);
    }
}

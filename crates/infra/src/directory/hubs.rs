use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument};

use hubstock_catalog::{Hub, HubChanges, NewHub};
use hubstock_core::{EntityKind, HubId, LedgerError, LedgerResult, Page, PageRequest, TenantId};

use super::{write_error, EntityCache};
use crate::cache::{keys, CacheLayer};
use crate::store::{within, CatalogStore};

/// Hub lifecycle and cached lookups.
#[derive(Clone)]
pub struct HubDirectory {
    store: Arc<dyn CatalogStore>,
    cache: EntityCache<Hub>,
    op_timeout: Duration,
}

impl std::fmt::Debug for HubDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubDirectory")
            .field("cache", &self.cache)
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl HubDirectory {
    pub fn new(store: Arc<dyn CatalogStore>, cache: CacheLayer, entity_ttl: Duration, op_timeout: Duration) -> Self {
        Self {
            store,
            cache: EntityCache::new(cache, entity_ttl),
            op_timeout,
        }
    }

    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, code = %input.code), err)]
    pub async fn create(&self, tenant_id: TenantId, input: NewHub) -> LedgerResult<Hub> {
        let hub = Hub::create(tenant_id, HubId::new(), input, Utc::now())?;
        within(self.op_timeout, "insert_hub", self.store.insert_hub(&hub))
            .await
            .map_err(|e| write_error(e, EntityKind::Hub, &hub.code))?;

        self.cache.remember(&hub).await;
        info!(hub_id = %hub.id, "hub created");
        Ok(hub)
    }

    /// Also returns soft-deleted hubs.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, hub_id = %id), err)]
    pub async fn get_by_id(&self, tenant_id: TenantId, id: HubId) -> LedgerResult<Hub> {
        if let Some(hub) = self.cache.by_id(tenant_id, id).await {
            return Ok(hub);
        }
        let hub = within(self.op_timeout, "hub_by_id", self.store.hub_by_id(tenant_id, id))
            .await?
            .ok_or_else(|| LedgerError::not_found(EntityKind::Hub, id.to_string()))?;
        self.cache.remember(&hub).await;
        Ok(hub)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn get_by_code(&self, tenant_id: TenantId, code: &str) -> LedgerResult<Hub> {
        if let Some(hub) = self.cache.by_code(tenant_id, code).await {
            return Ok(hub);
        }
        let hub = within(self.op_timeout, "hub_by_code", self.store.hub_by_code(tenant_id, code))
            .await?
            .ok_or_else(|| LedgerError::not_found(EntityKind::Hub, code))?;
        self.cache.remember(&hub).await;
        Ok(hub)
    }

    /// Live hubs ordered by code.
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn list(&self, tenant_id: TenantId, page: PageRequest) -> LedgerResult<Page<Hub>> {
        let (hubs, total) = within(self.op_timeout, "list_hubs", self.store.list_hubs(tenant_id, page)).await?;
        Ok(Page::new(hubs, total, page))
    }

    #[instrument(skip(self, changes), fields(tenant_id = %tenant_id, hub_id = %id), err)]
    pub async fn update(&self, tenant_id: TenantId, id: HubId, changes: HubChanges) -> LedgerResult<Hub> {
        let current = within(self.op_timeout, "hub_by_id", self.store.hub_by_id(tenant_id, id))
            .await?
            .filter(|hub| hub.deleted_at.is_none())
            .ok_or_else(|| LedgerError::not_found(EntityKind::Hub, id.to_string()))?;

        let next = current.with_changes(changes, Utc::now())?;
        let updated = within(self.op_timeout, "update_hub", self.store.update_hub(&next))
            .await
            .map_err(|e| write_error(e, EntityKind::Hub, &next.code))?;
        if !updated {
            return Err(LedgerError::not_found(EntityKind::Hub, id.to_string()));
        }

        self.cache.forget(&current).await;
        self.cache.remember(&next).await;
        self.evict_inventory(tenant_id, &current.code).await;
        info!(code = %next.code, "hub updated");
        Ok(next)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, hub_id = %id), err)]
    pub async fn delete(&self, tenant_id: TenantId, id: HubId) -> LedgerResult<()> {
        let removed = within(
            self.op_timeout,
            "soft_delete_hub",
            self.store.soft_delete_hub(tenant_id, id, Utc::now()),
        )
        .await?
        .ok_or_else(|| LedgerError::not_found(EntityKind::Hub, id.to_string()))?;

        self.cache.forget(&removed).await;
        self.evict_inventory(tenant_id, &removed.code).await;
        info!(code = %removed.code, "hub deleted");
        Ok(())
    }

    /// Point queries are keyed by hub code and listings embed hub attributes.
    async fn evict_inventory(&self, tenant_id: TenantId, hub_code: &str) {
        let layer = self.cache.layer();
        layer
            .invalidate_prefix(&keys::inventory_hub_items_prefix(tenant_id, hub_code))
            .await;
        layer.invalidate_prefix(&keys::inventory_listing_prefix(tenant_id)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::store::InMemoryStore;
    use hubstock_core::ErrorKind;

    fn directory() -> (InMemoryStore, Arc<InMemoryCache>, HubDirectory) {
        let store = InMemoryStore::new();
        let backend = Arc::new(InMemoryCache::new());
        let cache = CacheLayer::new(backend.clone(), Duration::from_millis(100));
        let hubs = HubDirectory::new(
            Arc::new(store.clone()),
            cache,
            Duration::from_secs(3600),
            Duration::from_secs(5),
        );
        (store, backend, hubs)
    }

    #[tokio::test]
    async fn duplicate_live_code_is_rejected() {
        let (_, _, hubs) = directory();
        let tenant = TenantId::new();
        hubs.create(tenant, NewHub::new("H1", "North")).await.unwrap();
        let err = hubs.create(tenant, NewHub::new("H1", "South")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateCode);
    }

    #[tokio::test]
    async fn rename_onto_existing_code_is_rejected() {
        let (_, _, hubs) = directory();
        let tenant = TenantId::new();
        hubs.create(tenant, NewHub::new("H1", "North")).await.unwrap();
        let south = hubs.create(tenant, NewHub::new("H2", "South")).await.unwrap();

        let changes = HubChanges {
            code: Some("H1".to_string()),
            ..HubChanges::default()
        };
        let err = hubs.update(tenant, south.id, changes).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateCode);
        assert_eq!(hubs.get_by_code(tenant, "H2").await.unwrap().id, south.id);
    }

    #[tokio::test]
    async fn rename_moves_the_code_binding() {
        let (_, _, hubs) = directory();
        let tenant = TenantId::new();
        let hub = hubs.create(tenant, NewHub::new("H1", "North")).await.unwrap();
        hubs.get_by_code(tenant, "H1").await.unwrap();

        let changes = HubChanges {
            code: Some("H9".to_string()),
            ..HubChanges::default()
        };
        hubs.update(tenant, hub.id, changes).await.unwrap();

        assert_eq!(hubs.get_by_code(tenant, "H1").await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(hubs.get_by_code(tenant, "H9").await.unwrap().id, hub.id);
    }

    #[tokio::test]
    async fn soft_deleted_hub_is_gone_by_code_but_kept_by_id() {
        let (_, _, hubs) = directory();
        let tenant = TenantId::new();
        let hub = hubs.create(tenant, NewHub::new("H1", "North")).await.unwrap();
        hubs.get_by_code(tenant, "H1").await.unwrap();

        hubs.delete(tenant, hub.id).await.unwrap();

        assert_eq!(hubs.get_by_code(tenant, "H1").await.unwrap_err().kind(), ErrorKind::NotFound);
        assert!(hubs.get_by_id(tenant, hub.id).await.unwrap().deleted_at.is_some());
        assert_eq!(hubs.delete(tenant, hub.id).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            hubs.update(tenant, hub.id, HubChanges::default()).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn lookups_are_tenant_scoped_even_when_cached() {
        let (_, _, hubs) = directory();
        let tenant = TenantId::new();
        let hub = hubs.create(tenant, NewHub::new("H1", "North")).await.unwrap();

        let other = TenantId::new();
        assert_eq!(hubs.get_by_id(other, hub.id).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(hubs.get_by_code(other, "H1").await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn cache_hit_skips_the_store() {
        let (store, _, hubs) = directory();
        let tenant = TenantId::new();
        let hub = hubs.create(tenant, NewHub::new("H1", "North")).await.unwrap();

        store.set_unavailable(true);
        assert_eq!(hubs.get_by_code(tenant, "H1").await.unwrap().id, hub.id);
        assert_eq!(
            hubs.get_by_code(tenant, "H2").await.unwrap_err().kind(),
            ErrorKind::StoreUnavailable
        );
    }

    #[tokio::test]
    async fn cache_outage_falls_through_to_the_store() {
        let (_, backend, hubs) = directory();
        let tenant = TenantId::new();
        backend.set_unavailable(true);
        let hub = hubs.create(tenant, NewHub::new("H1", "North")).await.unwrap();
        assert_eq!(hubs.get_by_code(tenant, "H1").await.unwrap().id, hub.id);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn listing_pages_live_hubs_by_code() {
        let (_, _, hubs) = directory();
        let tenant = TenantId::new();
        for code in ["H3", "H1", "H2"] {
            hubs.create(tenant, NewHub::new(code, code)).await.unwrap();
        }
        let page = hubs.list(tenant, PageRequest::new(1, 2)).await.unwrap();
        assert_eq!(page.total, 3);
        let codes: Vec<_> = page.items.iter().map(|h| h.code.as_str()).collect();
        assert_eq!(codes, ["H1", "H2"]);
        assert!(page.has_more());
    }
}

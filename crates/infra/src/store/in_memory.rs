use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use hubstock_catalog::{Hub, Sku, SkuFilter};
use hubstock_core::{
    CatalogEntity, HubId, InventoryRecordId, PageRequest, SellerId, SkuId, TenantId,
};
use hubstock_inventory::{Counters, HubRef, InventoryEntry, InventoryRecord, SkuRef, Transition};

use super::{CatalogStore, InventoryQuery, InventoryStore, LockedRow, ResolvedUpdate, StoreError};

type InventoryKey = (TenantId, HubId, SkuId);

#[derive(Debug, Default)]
struct Tables {
    hubs: HashMap<HubId, Hub>,
    skus: HashMap<SkuId, Sku>,
    sellers: HashSet<(TenantId, SellerId)>,
    inventory: HashMap<InventoryKey, InventoryRecord>,
}

impl Tables {
    fn live_code_taken<E: CatalogEntity>(
        rows: impl Iterator<Item = E>,
        tenant_id: TenantId,
        code: &str,
        except: Option<E::Id>,
    ) -> bool {
        rows.filter(|e| e.tenant_id() == tenant_id && !e.is_deleted() && e.code() == code)
            .any(|e| Some(e.id()) != except)
    }

    fn matches(&self, tenant_id: TenantId, record: &InventoryRecord, query: &InventoryQuery) -> bool {
        if record.tenant_id != tenant_id {
            return false;
        }
        if query.hub_id.is_some_and(|hub_id| record.hub_id != hub_id) {
            return false;
        }
        if let Some(sku_ids) = &query.sku_ids {
            if !sku_ids.contains(&record.sku_id) {
                return false;
            }
        }
        if let Some(seller_id) = query.seller_id {
            return self
                .skus
                .get(&record.sku_id)
                .is_some_and(|sku| sku.seller_id == seller_id);
        }
        true
    }

    fn entry(&self, record: &InventoryRecord) -> Result<InventoryEntry, StoreError> {
        let hub = self
            .hubs
            .get(&record.hub_id)
            .ok_or_else(|| StoreError::Corrupt(format!("inventory row references unknown hub {}", record.hub_id)))?;
        let sku = self
            .skus
            .get(&record.sku_id)
            .ok_or_else(|| StoreError::Corrupt(format!("inventory row references unknown sku {}", record.sku_id)))?;
        Ok(InventoryEntry {
            record_id: record.id,
            hub: Some(HubRef {
                id: hub.id,
                code: hub.code.clone(),
                name: hub.name.clone(),
            }),
            sku: SkuRef {
                id: sku.id,
                seller_id: sku.seller_id,
                code: sku.code.clone(),
                name: sku.name.clone(),
            },
            counters: record.counters,
        })
    }

    fn matching_entries(&self, tenant_id: TenantId, query: &InventoryQuery) -> Result<Vec<InventoryEntry>, StoreError> {
        let mut entries = self
            .inventory
            .values()
            .filter(|record| self.matches(tenant_id, record, query))
            .map(|record| self.entry(record))
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by(|a, b| {
            let hub_a = a.hub.as_ref().map(|h| h.code.as_str());
            let hub_b = b.hub.as_ref().map(|h| h.code.as_str());
            hub_a.cmp(&hub_b).then_with(|| a.sku.code.cmp(&b.sku.code))
        });
        Ok(entries)
    }
}

fn paginate<T: Clone>(rows: &[T], page: PageRequest) -> Vec<T> {
    rows.iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .cloned()
        .collect()
}

/// In-memory store for tests/dev.
///
/// One mutex guards all tables, so every statement is trivially serialized.
/// A row lock holds the whole table until committed or dropped.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sellers live outside this system; tests and dev setups register the
    /// ones SKUs may reference.
    pub async fn register_seller(&self, tenant_id: TenantId, seller_id: SellerId) {
        self.tables.lock().await.sellers.insert((tenant_id, seller_id));
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    async fn tables(&self) -> Result<tokio::sync::MutexGuard<'_, Tables>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store marked unavailable".to_string()));
        }
        Ok(self.tables.lock().await)
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_hub(&self, hub: &Hub) -> Result<(), StoreError> {
        let mut tables = self.tables().await?;
        if Tables::live_code_taken(tables.hubs.values().cloned(), hub.tenant_id, &hub.code, None) {
            return Err(StoreError::UniqueViolation(format!("hub code '{}'", hub.code)));
        }
        tables.hubs.insert(hub.id, hub.clone());
        Ok(())
    }

    async fn hub_by_id(&self, tenant_id: TenantId, id: HubId) -> Result<Option<Hub>, StoreError> {
        let tables = self.tables().await?;
        Ok(tables.hubs.get(&id).filter(|h| h.tenant_id == tenant_id).cloned())
    }

    async fn hub_by_code(&self, tenant_id: TenantId, code: &str) -> Result<Option<Hub>, StoreError> {
        let tables = self.tables().await?;
        Ok(tables
            .hubs
            .values()
            .find(|h| h.tenant_id == tenant_id && h.deleted_at.is_none() && h.code == code)
            .cloned())
    }

    async fn list_hubs(&self, tenant_id: TenantId, page: PageRequest) -> Result<(Vec<Hub>, u64), StoreError> {
        let tables = self.tables().await?;
        let mut hubs: Vec<Hub> = tables
            .hubs
            .values()
            .filter(|h| h.tenant_id == tenant_id && h.deleted_at.is_none())
            .cloned()
            .collect();
        hubs.sort_by(|a, b| a.code.cmp(&b.code));
        Ok((paginate(&hubs, page), hubs.len() as u64))
    }

    async fn update_hub(&self, hub: &Hub) -> Result<bool, StoreError> {
        let mut tables = self.tables().await?;
        let live = tables
            .hubs
            .get(&hub.id)
            .is_some_and(|h| h.tenant_id == hub.tenant_id && h.deleted_at.is_none());
        if !live {
            return Ok(false);
        }
        if Tables::live_code_taken(tables.hubs.values().cloned(), hub.tenant_id, &hub.code, Some(hub.id)) {
            return Err(StoreError::UniqueViolation(format!("hub code '{}'", hub.code)));
        }
        tables.hubs.insert(hub.id, hub.clone());
        Ok(true)
    }

    async fn soft_delete_hub(
        &self,
        tenant_id: TenantId,
        id: HubId,
        at: DateTime<Utc>,
    ) -> Result<Option<Hub>, StoreError> {
        let mut tables = self.tables().await?;
        match tables.hubs.get_mut(&id) {
            Some(hub) if hub.tenant_id == tenant_id && hub.deleted_at.is_none() => {
                let before = hub.clone();
                hub.deleted_at = Some(at);
                hub.updated_at = at;
                Ok(Some(before))
            }
            _ => Ok(None),
        }
    }

    async fn insert_sku(&self, sku: &Sku) -> Result<(), StoreError> {
        let mut tables = self.tables().await?;
        if Tables::live_code_taken(tables.skus.values().cloned(), sku.tenant_id, &sku.code, None) {
            return Err(StoreError::UniqueViolation(format!("sku code '{}'", sku.code)));
        }
        tables.skus.insert(sku.id, sku.clone());
        Ok(())
    }

    async fn sku_by_id(&self, tenant_id: TenantId, id: SkuId) -> Result<Option<Sku>, StoreError> {
        let tables = self.tables().await?;
        Ok(tables.skus.get(&id).filter(|s| s.tenant_id == tenant_id).cloned())
    }

    async fn sku_by_code(&self, tenant_id: TenantId, code: &str) -> Result<Option<Sku>, StoreError> {
        let tables = self.tables().await?;
        Ok(tables
            .skus
            .values()
            .find(|s| s.tenant_id == tenant_id && s.deleted_at.is_none() && s.code == code)
            .cloned())
    }

    async fn list_skus(&self, tenant_id: TenantId, filter: &SkuFilter) -> Result<(Vec<Sku>, u64), StoreError> {
        let tables = self.tables().await?;
        let mut skus: Vec<Sku> = tables
            .skus
            .values()
            .filter(|s| s.tenant_id == tenant_id && s.deleted_at.is_none())
            .filter(|s| filter.seller_id.is_none_or(|seller| s.seller_id == seller))
            .filter(|s| filter.is_active.is_none_or(|active| s.is_active == active))
            .cloned()
            .collect();
        skus.sort_by(|a, b| a.code.cmp(&b.code));
        Ok((paginate(&skus, filter.page), skus.len() as u64))
    }

    async fn update_sku(&self, sku: &Sku) -> Result<bool, StoreError> {
        let mut tables = self.tables().await?;
        let live = tables
            .skus
            .get(&sku.id)
            .is_some_and(|s| s.tenant_id == sku.tenant_id && s.deleted_at.is_none());
        if !live {
            return Ok(false);
        }
        if Tables::live_code_taken(tables.skus.values().cloned(), sku.tenant_id, &sku.code, Some(sku.id)) {
            return Err(StoreError::UniqueViolation(format!("sku code '{}'", sku.code)));
        }
        tables.skus.insert(sku.id, sku.clone());
        Ok(true)
    }

    async fn soft_delete_sku(
        &self,
        tenant_id: TenantId,
        id: SkuId,
        at: DateTime<Utc>,
    ) -> Result<Option<Sku>, StoreError> {
        let mut tables = self.tables().await?;
        match tables.skus.get_mut(&id) {
            Some(sku) if sku.tenant_id == tenant_id && sku.deleted_at.is_none() => {
                let before = sku.clone();
                sku.deleted_at = Some(at);
                sku.updated_at = at;
                Ok(Some(before))
            }
            _ => Ok(None),
        }
    }

    async fn seller_exists(&self, tenant_id: TenantId, seller_id: SellerId) -> Result<bool, StoreError> {
        let tables = self.tables().await?;
        Ok(tables.sellers.contains(&(tenant_id, seller_id)))
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn upsert_quantities(&self, tenant_id: TenantId, updates: &[ResolvedUpdate]) -> Result<(), StoreError> {
        let mut tables = self.tables().await?;
        let now = Utc::now();

        // Stage every row first so a rejected entry leaves the table untouched.
        let mut staged: HashMap<InventoryKey, InventoryRecord> = HashMap::new();
        for (index, update) in updates.iter().enumerate() {
            let key = (tenant_id, update.hub_id, update.sku_id);
            let current = staged
                .get(&key)
                .or_else(|| tables.inventory.get(&key))
                .cloned();
            let next = match current {
                Some(mut record) => {
                    if update.quantity < record.counters.committed() {
                        return Err(StoreError::BelowCommitted {
                            index,
                            quantity: update.quantity,
                            committed: record.counters.committed(),
                        });
                    }
                    record.counters.quantity = update.quantity;
                    record.updated_at = Some(now);
                    record
                }
                None => InventoryRecord {
                    id: Some(InventoryRecordId::new()),
                    tenant_id,
                    hub_id: update.hub_id,
                    sku_id: update.sku_id,
                    counters: Counters {
                        quantity: update.quantity,
                        ..Counters::ZERO
                    },
                    updated_at: Some(now),
                },
            };
            staged.insert(key, next);
        }

        tables.inventory.extend(staged);
        Ok(())
    }

    async fn find(
        &self,
        tenant_id: TenantId,
        hub_id: HubId,
        sku_id: SkuId,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        let tables = self.tables().await?;
        Ok(tables.inventory.get(&(tenant_id, hub_id, sku_id)).cloned())
    }

    async fn apply_guarded(
        &self,
        tenant_id: TenantId,
        hub_id: HubId,
        sku_id: SkuId,
        transition: Transition,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        let mut tables = self.tables().await?;
        let Some(record) = tables.inventory.get_mut(&(tenant_id, hub_id, sku_id)) else {
            return Ok(None);
        };
        match transition.apply(&record.counters) {
            Ok(next) => {
                record.counters = next;
                record.updated_at = Some(Utc::now());
                Ok(Some(record.clone()))
            }
            Err(_) => Ok(None),
        }
    }

    async fn lock(
        &self,
        tenant_id: TenantId,
        hub_id: HubId,
        sku_id: SkuId,
    ) -> Result<Box<dyn LockedRow>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store marked unavailable".to_string()));
        }
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let key = (tenant_id, hub_id, sku_id);
        let current = guard.inventory.get(&key).cloned();
        Ok(Box::new(InMemoryLockedRow {
            guard,
            key,
            current,
            dirty: false,
        }))
    }

    async fn count(&self, tenant_id: TenantId, query: &InventoryQuery) -> Result<u64, StoreError> {
        let tables = self.tables().await?;
        Ok(tables
            .inventory
            .values()
            .filter(|record| tables.matches(tenant_id, record, query))
            .count() as u64)
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        query: &InventoryQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<InventoryEntry>, StoreError> {
        let tables = self.tables().await?;
        Ok(tables
            .matching_entries(tenant_id, query)?
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn stocked_sku_ids(&self, tenant_id: TenantId, query: &InventoryQuery) -> Result<HashSet<SkuId>, StoreError> {
        let tables = self.tables().await?;
        Ok(tables
            .inventory
            .values()
            .filter(|record| tables.matches(tenant_id, record, query))
            .map(|record| record.sku_id)
            .collect())
    }
}

/// Writes go to a private copy and are published on commit; dropping the
/// handle discards them and releases the table.
struct InMemoryLockedRow {
    guard: OwnedMutexGuard<Tables>,
    key: InventoryKey,
    current: Option<InventoryRecord>,
    dirty: bool,
}

#[async_trait]
impl LockedRow for InMemoryLockedRow {
    fn current(&self) -> Option<&InventoryRecord> {
        self.current.as_ref()
    }

    async fn write(&mut self, counters: Counters) -> Result<InventoryRecord, StoreError> {
        let Some(record) = self.current.as_mut() else {
            return Err(StoreError::Missing(format!("{}/{}", self.key.1, self.key.2)));
        };
        if !counters.holds_invariants() {
            return Err(StoreError::CheckViolation(format!("{counters:?}")));
        }
        record.counters = counters;
        record.updated_at = Some(Utc::now());
        self.dirty = true;
        Ok(record.clone())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if self.dirty {
            if let Some(record) = self.current.take() {
                self.guard.inventory.insert(self.key, record);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubstock_catalog::{NewHub, NewSku};

    async fn seeded() -> (InMemoryStore, TenantId, Hub, Sku) {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let seller = SellerId::new();
        store.register_seller(tenant, seller).await;
        let now = Utc::now();
        let hub = Hub::create(tenant, HubId::new(), NewHub::new("H1", "Hub one"), now).unwrap();
        let sku = Sku::create(tenant, SkuId::new(), NewSku::new(seller, "S1", "Sku one"), now).unwrap();
        store.insert_hub(&hub).await.unwrap();
        store.insert_sku(&sku).await.unwrap();
        (store, tenant, hub, sku)
    }

    #[tokio::test]
    async fn live_codes_are_unique_per_tenant() {
        let (store, tenant, hub, _) = seeded().await;
        let dup = Hub::create(tenant, HubId::new(), NewHub::new("H1", "Other"), Utc::now()).unwrap();
        assert!(matches!(store.insert_hub(&dup).await, Err(StoreError::UniqueViolation(_))));

        // Another tenant may reuse the code.
        let other = Hub::create(TenantId::new(), HubId::new(), NewHub::new("H1", "Other"), Utc::now()).unwrap();
        store.insert_hub(&other).await.unwrap();

        // After soft delete the code is free again, but the row stays readable by id.
        store.soft_delete_hub(tenant, hub.id, Utc::now()).await.unwrap();
        store.insert_hub(&dup).await.unwrap();
        assert!(store.hub_by_id(tenant, hub.id).await.unwrap().unwrap().deleted_at.is_some());
        assert_eq!(store.hub_by_code(tenant, "H1").await.unwrap().unwrap().id, dup.id);
    }

    #[tokio::test]
    async fn upsert_rejecting_one_entry_applies_none() {
        let (store, tenant, hub, sku) = seeded().await;
        let update = ResolvedUpdate {
            hub_id: hub.id,
            sku_id: sku.id,
            quantity: 10,
        };
        store.upsert_quantities(tenant, &[update]).await.unwrap();
        store
            .apply_guarded(tenant, hub.id, sku.id, Transition::AdjustAvailable(10))
            .await
            .unwrap()
            .unwrap();

        let other_sku = Sku::create(tenant, SkuId::new(), NewSku::new(sku.seller_id, "S2", "Sku two"), Utc::now()).unwrap();
        store.insert_sku(&other_sku).await.unwrap();

        let batch = [
            ResolvedUpdate {
                hub_id: hub.id,
                sku_id: other_sku.id,
                quantity: 5,
            },
            ResolvedUpdate { quantity: 3, ..update },
        ];
        let err = store.upsert_quantities(tenant, &batch).await.unwrap_err();
        assert!(matches!(err, StoreError::BelowCommitted { index: 1, .. }));
        assert!(store.find(tenant, hub.id, other_sku.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn guarded_update_reports_zero_rows_on_failed_precondition() {
        let (store, tenant, hub, sku) = seeded().await;
        assert!(store
            .apply_guarded(tenant, hub.id, sku.id, Transition::Reserve(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn dropped_lock_discards_writes() {
        let (store, tenant, hub, sku) = seeded().await;
        store
            .upsert_quantities(
                tenant,
                &[ResolvedUpdate {
                    hub_id: hub.id,
                    sku_id: sku.id,
                    quantity: 10,
                }],
            )
            .await
            .unwrap();

        let mut row = store.lock(tenant, hub.id, sku.id).await.unwrap();
        let next = Counters {
            available: 10,
            ..row.current().unwrap().counters
        };
        row.write(next).await.unwrap();
        drop(row);
        assert_eq!(store.find(tenant, hub.id, sku.id).await.unwrap().unwrap().available(), 0);

        let mut row = store.lock(tenant, hub.id, sku.id).await.unwrap();
        row.write(next).await.unwrap();
        row.commit().await.unwrap();
        assert_eq!(store.find(tenant, hub.id, sku.id).await.unwrap().unwrap().available(), 10);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let (store, tenant, hub, _) = seeded().await;
        store.set_unavailable(true);
        assert!(matches!(
            store.hub_by_id(tenant, hub.id).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}

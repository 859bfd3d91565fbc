//! Inventory Ledger.
//!
//! Owns every counter mutation. Callers address stock by
//! `(tenant, hub code, sku code)`; codes are resolved through the
//! [`CatalogDirectory`] and counters live in the [`InventoryStore`].
//!
//! Transitions run as single guarded statements. A zero-rows result is
//! classified by re-reading the row:
//! - the row is missing, or the precondition fails on the fresh read: the
//!   matching `Insufficient*` / validation error
//! - the precondition now holds (a concurrent writer moved the row between
//!   statement and re-read): retry, up to `max_conflict_retries`, then
//!   `ConcurrentModification`

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use hubstock_catalog::{Hub, Sku};
use hubstock_core::{EntityKind, HubId, LedgerError, LedgerResult, Page, PageRequest, SkuId, TenantId};
use hubstock_inventory::{
    validate_batch, Counters, HubRef, InventoryEntry, InventoryFilter, InventoryPage, InventoryRecord,
    InventoryUpdate, SkuRef, Transition,
};

use crate::cache::{keys, CacheLayer};
use crate::config::LedgerConfig;
use crate::directory::CatalogDirectory;
use crate::store::{within, InventoryQuery, InventoryStore, LockedRow, ResolvedUpdate};

#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn InventoryStore>,
    directory: CatalogDirectory,
    cache: CacheLayer,
    config: Arc<LedgerConfig>,
}

impl std::fmt::Debug for InventoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryLedger")
            .field("directory", &self.directory)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

fn hub_ref(hub: &Hub) -> HubRef {
    HubRef {
        id: hub.id,
        code: hub.code.clone(),
        name: hub.name.clone(),
    }
}

fn sku_ref(sku: &Sku) -> SkuRef {
    SkuRef {
        id: sku.id,
        seller_id: sku.seller_id,
        code: sku.code.clone(),
        name: sku.name.clone(),
    }
}

fn pair_label(hub_code: &str, sku_code: &str) -> String {
    format!("{hub_code}/{sku_code}")
}

impl InventoryLedger {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        directory: CatalogDirectory,
        cache: CacheLayer,
        config: Arc<LedgerConfig>,
    ) -> Self {
        Self {
            store,
            directory,
            cache,
            config,
        }
    }

    pub fn directory(&self) -> &CatalogDirectory {
        &self.directory
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Drop the point-query entries of `pairs` and every listing page of the
    /// tenant.
    async fn invalidate(&self, tenant_id: TenantId, pairs: impl IntoIterator<Item = (&str, &str)>) {
        let item_keys: Vec<String> = pairs
            .into_iter()
            .map(|(hub_code, sku_code)| keys::inventory_item(tenant_id, hub_code, sku_code))
            .collect();
        self.cache.delete(&item_keys).await;
        self.cache
            .invalidate_prefix(&keys::inventory_listing_prefix(tenant_id))
            .await;
    }

    /// Set the on-hand quantity of every listed pair in one all-or-nothing
    /// transaction. New pairs start with zero flow counters; existing pairs
    /// keep theirs, and a quantity below `available + reserved` is rejected.
    #[instrument(skip(self, updates), fields(tenant_id = %tenant_id, update_count = updates.len()), err)]
    pub async fn upsert_inventory(&self, tenant_id: TenantId, updates: &[InventoryUpdate]) -> LedgerResult<()> {
        validate_batch(updates)?;

        let mut hub_ids: HashMap<&str, HubId> = HashMap::new();
        let mut sku_ids: HashMap<&str, SkuId> = HashMap::new();
        let mut resolved = Vec::with_capacity(updates.len());
        for update in updates {
            let hub_id = match hub_ids.get(update.hub_code.as_str()) {
                Some(id) => *id,
                None => {
                    let hub = self.directory.resolve_hub(tenant_id, &update.hub_code).await?;
                    hub_ids.insert(&update.hub_code, hub.id);
                    hub.id
                }
            };
            let sku_id = match sku_ids.get(update.sku_code.as_str()) {
                Some(id) => *id,
                None => {
                    let sku = self.directory.resolve_sku(tenant_id, &update.sku_code).await?;
                    sku_ids.insert(&update.sku_code, sku.id);
                    sku.id
                }
            };
            resolved.push(ResolvedUpdate {
                hub_id,
                sku_id,
                quantity: update.quantity,
            });
        }

        within(
            self.config.op_timeout,
            "upsert_inventory",
            self.store.upsert_quantities(tenant_id, &resolved),
        )
        .await?;

        self.invalidate(
            tenant_id,
            updates
                .iter()
                .map(|u| (u.hub_code.as_str(), u.sku_code.as_str())),
        )
        .await;
        info!(pairs = resolved.len(), "inventory upserted");
        Ok(())
    }

    /// Stock of one pair. A never-stocked pair reads as all-zero counters,
    /// not as an error.
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn get_inventory_item(
        &self,
        tenant_id: TenantId,
        hub_code: &str,
        sku_code: &str,
    ) -> LedgerResult<InventoryRecord> {
        let key = keys::inventory_item(tenant_id, hub_code, sku_code);
        if let Some(record) = self.cache.get::<InventoryRecord>(&key).await {
            return Ok(record);
        }

        let (hub, sku) = self.directory.resolve(tenant_id, hub_code, sku_code).await?;
        let found = within(
            self.config.op_timeout,
            "find_inventory",
            self.store.find(tenant_id, hub.id, sku.id),
        )
        .await?;

        match found {
            Some(record) => {
                self.cache.set(&key, &record, self.config.item_ttl).await;
                Ok(record)
            }
            None => Ok(InventoryRecord::synthesized(tenant_id, hub.id, sku.id)),
        }
    }

    /// Filtered, paginated listing with hub/SKU attributes denormalized.
    ///
    /// With `sku_codes`, every requested SKU that exists but has no matching
    /// row is padded in as a zero entry after the real rows, and codes that
    /// match no SKU are reported in `unresolved_sku_codes`. `total` counts
    /// both real and padded entries.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id, page = filter.page.page), err)]
    pub async fn get_inventory(&self, tenant_id: TenantId, filter: &InventoryFilter) -> LedgerResult<InventoryPage> {
        let page = PageRequest::new(filter.page.page, filter.page.page_size);
        let cache_key = filter
            .is_unfiltered()
            .then(|| keys::inventory_listing(tenant_id, page));
        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get::<InventoryPage>(key).await {
                return Ok(cached);
            }
        }

        let hub = match &filter.hub_code {
            Some(code) => Some(self.directory.resolve_hub(tenant_id, code).await?),
            None => None,
        };

        let mut query = InventoryQuery {
            hub_id: hub.as_ref().map(|h| h.id),
            seller_id: filter.seller_id,
            sku_ids: None,
        };

        let mut requested: Vec<Sku> = Vec::new();
        let mut unresolved_sku_codes = Vec::new();
        if !filter.sku_codes.is_empty() {
            for code in filter.distinct_sku_codes() {
                match self.directory.skus().get_by_code(tenant_id, &code).await {
                    Ok(sku) => requested.push(sku),
                    Err(LedgerError::NotFound { .. }) => unresolved_sku_codes.push(code),
                    Err(other) => return Err(other),
                }
            }
            if !unresolved_sku_codes.is_empty() {
                debug!(unresolved = ?unresolved_sku_codes, "requested SKU codes not in catalog");
            }
            if requested.is_empty() {
                return Ok(InventoryPage {
                    page: Page::new(Vec::new(), 0, page),
                    unresolved_sku_codes,
                });
            }
            query.sku_ids = Some(requested.iter().map(|s| s.id).collect());
        }

        let timeout = self.config.op_timeout;
        let real_total = within(timeout, "count_inventory", self.store.count(tenant_id, &query)).await?;

        let padding: Vec<InventoryEntry> = if requested.is_empty() {
            Vec::new()
        } else {
            let stocked = within(
                timeout,
                "stocked_sku_ids",
                self.store.stocked_sku_ids(tenant_id, &query),
            )
            .await?;
            let mut missing: Vec<&Sku> = requested
                .iter()
                .filter(|sku| !stocked.contains(&sku.id))
                .filter(|sku| filter.seller_id.is_none_or(|seller| sku.seller_id == seller))
                .collect();
            missing.sort_by(|a, b| a.code.cmp(&b.code));
            missing
                .into_iter()
                .map(|sku| InventoryEntry::synthesized(hub.as_ref().map(hub_ref), sku_ref(sku)))
                .collect()
        };

        let total = real_total + padding.len() as u64;
        let offset = page.offset();
        let limit = page.limit();

        let mut entries = Vec::new();
        if offset < real_total {
            let take = limit.min(real_total - offset);
            entries = within(
                timeout,
                "list_inventory",
                self.store.list(tenant_id, &query, offset, take),
            )
            .await?;
        }
        let remaining = limit.saturating_sub(entries.len() as u64) as usize;
        let pad_start = offset.saturating_sub(real_total) as usize;
        entries.extend(padding.into_iter().skip(pad_start).take(remaining));

        let result = InventoryPage {
            page: Page::new(entries, total, page),
            unresolved_sku_codes,
        };
        if let Some(key) = &cache_key {
            self.cache.set(key, &result, self.config.listing_ttl).await;
        }
        Ok(result)
    }

    /// `available -= q; reserved += q`, requires `available >= q`.
    pub async fn reserve(&self, tenant_id: TenantId, hub_code: &str, sku_code: &str, quantity: i64) -> LedgerResult<InventoryRecord> {
        self.transition(tenant_id, hub_code, sku_code, Transition::Reserve(quantity)).await
    }

    /// `reserved -= q; available += q`, requires `reserved >= q`.
    pub async fn release(&self, tenant_id: TenantId, hub_code: &str, sku_code: &str, quantity: i64) -> LedgerResult<InventoryRecord> {
        self.transition(tenant_id, hub_code, sku_code, Transition::Release(quantity)).await
    }

    /// `reserved -= q; quantity -= q`, requires `reserved >= q`. Available is
    /// untouched; it was already taken at reservation time.
    pub async fn fulfill(&self, tenant_id: TenantId, hub_code: &str, sku_code: &str, quantity: i64) -> LedgerResult<InventoryRecord> {
        self.transition(tenant_id, hub_code, sku_code, Transition::Fulfill(quantity)).await
    }

    /// Signed change to `available`, bounded by `0` and `quantity - reserved`.
    pub async fn adjust_available(&self, tenant_id: TenantId, hub_code: &str, sku_code: &str, delta: i64) -> LedgerResult<InventoryRecord> {
        self.transition(tenant_id, hub_code, sku_code, Transition::AdjustAvailable(delta)).await
    }

    /// Signed change to `in_transit`, which may not go negative.
    pub async fn adjust_in_transit(&self, tenant_id: TenantId, hub_code: &str, sku_code: &str, delta: i64) -> LedgerResult<InventoryRecord> {
        self.transition(tenant_id, hub_code, sku_code, Transition::AdjustInTransit(delta)).await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, transition = %transition), err)]
    async fn transition(
        &self,
        tenant_id: TenantId,
        hub_code: &str,
        sku_code: &str,
        transition: Transition,
    ) -> LedgerResult<InventoryRecord> {
        transition.validate()?;
        let (hub, sku) = self.directory.resolve(tenant_id, hub_code, sku_code).await?;
        let timeout = self.config.op_timeout;

        for attempt in 0..=self.config.max_conflict_retries {
            let applied = within(
                timeout,
                transition.name(),
                self.store.apply_guarded(tenant_id, hub.id, sku.id, transition),
            )
            .await?;
            if let Some(record) = applied {
                self.invalidate(tenant_id, [(hub_code, sku_code)]).await;
                return Ok(record);
            }

            let current = within(timeout, "find_inventory", self.store.find(tenant_id, hub.id, sku.id)).await?;
            let counters = match &current {
                Some(record) => record.counters,
                None => Counters::ZERO,
            };
            // Err here is the caller-facing precondition failure.
            transition.apply(&counters)?;
            if current.is_none() {
                return Err(LedgerError::not_found(EntityKind::Inventory, pair_label(hub_code, sku_code)));
            }
            warn!(attempt, "guarded update lost a race; retrying");
        }

        Err(LedgerError::concurrent(format!(
            "{transition} on {} did not apply after {} attempts",
            pair_label(hub_code, sku_code),
            self.config.max_conflict_retries + 1
        )))
    }

    /// Read one pair under an exclusive row lock for a read-then-write
    /// sequence. The lock is held until [`InventoryLock::commit`]; dropping
    /// the handle rolls back every write made through it.
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn get_inventory_with_lock(
        &self,
        tenant_id: TenantId,
        hub_code: &str,
        sku_code: &str,
    ) -> LedgerResult<InventoryLock> {
        let (hub, sku) = self.directory.resolve(tenant_id, hub_code, sku_code).await?;
        let row = within(
            self.config.op_timeout,
            "lock_inventory",
            self.store.lock(tenant_id, hub.id, sku.id),
        )
        .await?;
        Ok(InventoryLock {
            row,
            ledger: self.clone(),
            tenant_id,
            hub_code: hub_code.to_string(),
            sku_code: sku_code.to_string(),
            synthesized: InventoryRecord::synthesized(tenant_id, hub.id, sku.id),
            dirty: false,
        })
    }
}

/// A row held under an exclusive lock.
pub struct InventoryLock {
    row: Box<dyn LockedRow>,
    ledger: InventoryLedger,
    tenant_id: TenantId,
    hub_code: String,
    sku_code: String,
    synthesized: InventoryRecord,
    dirty: bool,
}

impl std::fmt::Debug for InventoryLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryLock")
            .field("tenant_id", &self.tenant_id)
            .field("hub_code", &self.hub_code)
            .field("sku_code", &self.sku_code)
            .field("record", self.record())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl InventoryLock {
    /// The locked row; all-zero when the pair has never been stocked.
    pub fn record(&self) -> &InventoryRecord {
        self.row.current().unwrap_or(&self.synthesized)
    }

    pub fn is_stocked(&self) -> bool {
        self.row.current().is_some()
    }

    /// Apply a transition inside the lock. Visible to others only after
    /// [`InventoryLock::commit`].
    pub async fn apply(&mut self, transition: Transition) -> LedgerResult<InventoryRecord> {
        let Some(current) = self.row.current() else {
            return Err(LedgerError::not_found(
                EntityKind::Inventory,
                pair_label(&self.hub_code, &self.sku_code),
            ));
        };
        let next = transition.apply(&current.counters)?;
        self.write(next).await
    }

    /// Set the on-hand quantity inside the lock, keeping flow counters.
    pub async fn set_quantity(&mut self, quantity: i64) -> LedgerResult<InventoryRecord> {
        let Some(current) = self.row.current() else {
            return Err(LedgerError::not_found(
                EntityKind::Inventory,
                pair_label(&self.hub_code, &self.sku_code),
            ));
        };
        let next = current.counters.with_quantity(quantity)?;
        self.write(next).await
    }

    async fn write(&mut self, counters: Counters) -> LedgerResult<InventoryRecord> {
        counters.check_invariants()?;
        let timeout = self.ledger.config.op_timeout;
        let record = within(timeout, "write_locked_inventory", self.row.write(counters)).await?;
        self.dirty = true;
        Ok(record)
    }

    /// Make writes durable and release the lock.
    pub async fn commit(self) -> LedgerResult<()> {
        let InventoryLock {
            row,
            ledger,
            tenant_id,
            hub_code,
            sku_code,
            dirty,
            ..
        } = self;
        within(ledger.config.op_timeout, "commit_locked_inventory", row.commit()).await?;
        if dirty {
            ledger
                .invalidate(tenant_id, [(hub_code.as_str(), sku_code.as_str())])
                .await;
        }
        Ok(())
    }
}

//! Durable store boundary.
//!
//! The store is the single source of truth. Two traits split ownership:
//! [`CatalogStore`] for hub/SKU rows and [`InventoryStore`] for counters.
//! Implementations: [`InMemoryStore`] (tests/dev) and [`PgStore`] (Postgres).

pub mod in_memory;
pub mod postgres;

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use hubstock_catalog::{Hub, Sku, SkuFilter};
use hubstock_core::{EntityKind, HubId, LedgerError, PageRequest, SellerId, SkuId, TenantId};
use hubstock_inventory::{Counters, InventoryEntry, InventoryRecord, Transition};

pub use in_memory::InMemoryStore;
pub use postgres::PgStore;

/// Store operation error.
///
/// These are **infrastructure errors**. They are converted into
/// [`LedgerError`] at the service boundary.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write (e.g. a concurrent insert won).
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A CHECK constraint rejected the write.
    #[error("check constraint violated: {0}")]
    CheckViolation(String),

    /// Serialization failure, deadlock, or a referenced row vanished
    /// mid-statement. Safe to retry.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// An upsert entry would set quantity below `available + reserved`.
    #[error("update at index {index} sets quantity {quantity} below committed stock {committed}")]
    BelowCommitted {
        index: usize,
        quantity: i64,
        committed: i64,
    },

    /// A counter computation left the storable integer range.
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// The row a locked write targets does not exist.
    #[error("row missing: {0}")]
    Missing(String),

    /// IO, pool, timeout, or driver failure.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(msg)
            | StoreError::CheckViolation(msg)
            | StoreError::Conflict(msg) => LedgerError::concurrent(msg),
            StoreError::BelowCommitted { .. } | StoreError::OutOfRange(_) => LedgerError::validation(err.to_string()),
            StoreError::Missing(key) => LedgerError::not_found(EntityKind::Inventory, key),
            StoreError::Unavailable(msg) | StoreError::Corrupt(msg) => LedgerError::unavailable(msg),
        }
    }
}

/// Run a store call under a deadline. Expiry drops (cancels) the call and
/// reports the store as unavailable.
pub(crate) async fn within<T, F>(limit: Duration, operation: &'static str, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable(format!(
            "{operation}: deadline of {limit:?} exceeded"
        ))),
    }
}

/// Upsert entry with codes already resolved to ids.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ResolvedUpdate {
    pub hub_id: HubId,
    pub sku_id: SkuId,
    pub quantity: i64,
}

/// Id-level listing filter. `sku_ids: Some(vec![])` matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryQuery {
    pub hub_id: Option<HubId>,
    pub seller_id: Option<SellerId>,
    pub sku_ids: Option<Vec<SkuId>>,
}

/// Hub and SKU rows, tenant-scoped.
///
/// By-code lookups only see live rows; by-id lookups also return
/// soft-deleted rows.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_hub(&self, hub: &Hub) -> Result<(), StoreError>;
    async fn hub_by_id(&self, tenant_id: TenantId, id: HubId) -> Result<Option<Hub>, StoreError>;
    async fn hub_by_code(&self, tenant_id: TenantId, code: &str) -> Result<Option<Hub>, StoreError>;
    async fn list_hubs(&self, tenant_id: TenantId, page: PageRequest) -> Result<(Vec<Hub>, u64), StoreError>;
    /// Overwrite a live hub. Returns `false` when no live row matched.
    async fn update_hub(&self, hub: &Hub) -> Result<bool, StoreError>;
    /// Soft-delete a live hub, returning the row as it was before deletion.
    async fn soft_delete_hub(
        &self,
        tenant_id: TenantId,
        id: HubId,
        at: DateTime<Utc>,
    ) -> Result<Option<Hub>, StoreError>;

    async fn insert_sku(&self, sku: &Sku) -> Result<(), StoreError>;
    async fn sku_by_id(&self, tenant_id: TenantId, id: SkuId) -> Result<Option<Sku>, StoreError>;
    async fn sku_by_code(&self, tenant_id: TenantId, code: &str) -> Result<Option<Sku>, StoreError>;
    async fn list_skus(&self, tenant_id: TenantId, filter: &SkuFilter) -> Result<(Vec<Sku>, u64), StoreError>;
    async fn update_sku(&self, sku: &Sku) -> Result<bool, StoreError>;
    async fn soft_delete_sku(
        &self,
        tenant_id: TenantId,
        id: SkuId,
        at: DateTime<Utc>,
    ) -> Result<Option<Sku>, StoreError>;

    async fn seller_exists(&self, tenant_id: TenantId, seller_id: SellerId) -> Result<bool, StoreError>;
}

/// Inventory counters, tenant-scoped.
///
/// Counter mutations are relative, guarded statements: concurrent writers to
/// the same row are serialized by the store, never by the caller.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Set quantities for all entries in one transaction (all or nothing).
    ///
    /// Existing rows keep their flow counters; missing rows are inserted with
    /// zero flow counters.
    async fn upsert_quantities(&self, tenant_id: TenantId, updates: &[ResolvedUpdate]) -> Result<(), StoreError>;

    async fn find(
        &self,
        tenant_id: TenantId,
        hub_id: HubId,
        sku_id: SkuId,
    ) -> Result<Option<InventoryRecord>, StoreError>;

    /// Apply `transition` as a single conditional update.
    ///
    /// `Ok(None)` means zero rows were affected: either the row is missing or
    /// the precondition did not hold at write time. The caller tells these
    /// apart by re-reading.
    async fn apply_guarded(
        &self,
        tenant_id: TenantId,
        hub_id: HubId,
        sku_id: SkuId,
        transition: Transition,
    ) -> Result<Option<InventoryRecord>, StoreError>;

    /// Read a row under an exclusive lock held until the returned handle is
    /// committed or dropped (drop rolls back).
    async fn lock(
        &self,
        tenant_id: TenantId,
        hub_id: HubId,
        sku_id: SkuId,
    ) -> Result<Box<dyn LockedRow>, StoreError>;

    async fn count(&self, tenant_id: TenantId, query: &InventoryQuery) -> Result<u64, StoreError>;

    /// Rows matching `query` with hub/SKU attributes joined in, ordered by
    /// hub code then SKU code.
    async fn list(
        &self,
        tenant_id: TenantId,
        query: &InventoryQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<InventoryEntry>, StoreError>;

    /// SKU ids that have at least one row matching `query`.
    async fn stocked_sku_ids(&self, tenant_id: TenantId, query: &InventoryQuery) -> Result<HashSet<SkuId>, StoreError>;
}

/// A row read under an exclusive lock.
#[async_trait]
pub trait LockedRow: Send {
    /// The locked row, or `None` when the pair has never been stocked.
    fn current(&self) -> Option<&InventoryRecord>;

    /// Overwrite the locked row's counters inside the lock.
    async fn write(&mut self, counters: Counters) -> Result<InventoryRecord, StoreError>;

    /// Make writes durable and release the lock.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubstock_core::ErrorKind;

    #[test]
    fn store_errors_map_to_stable_kinds() {
        assert_eq!(
            LedgerError::from(StoreError::Unavailable("pool closed".into())).kind(),
            ErrorKind::StoreUnavailable
        );
        assert_eq!(
            LedgerError::from(StoreError::CheckViolation("available >= 0".into())).kind(),
            ErrorKind::ConcurrentModification
        );
        let below = LedgerError::from(StoreError::BelowCommitted {
            index: 3,
            quantity: 5,
            committed: 9,
        });
        assert_eq!(below.kind(), ErrorKind::Validation);
        assert!(below.to_string().contains("index 3"));
        assert_eq!(
            LedgerError::from(StoreError::OutOfRange("bigint out of range".into())).kind(),
            ErrorKind::Validation
        );
    }

    #[tokio::test]
    async fn deadline_expiry_is_unavailability() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, StoreError>(())
        };
        let err = within(Duration::from_millis(10), "slow_op", slow).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(ref msg) if msg.contains("slow_op")));
    }
}

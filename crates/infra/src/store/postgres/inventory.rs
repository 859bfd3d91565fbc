use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use hubstock_core::{HubId, SkuId, TenantId};
use hubstock_inventory::{Counters, InventoryEntry, InventoryRecord, Transition};

use super::{entry_from_row, map_sqlx_error, record_from_row, PgStore, INVENTORY_COLUMNS};
use crate::store::{InventoryQuery, InventoryStore, LockedRow, ResolvedUpdate, StoreError};

const LISTING_FROM: &str = "FROM inventories i \
     JOIN hubs h ON h.id = i.hub_id \
     JOIN skus s ON s.id = i.sku_id \
     WHERE i.tenant_id = $1 \
       AND ($2::uuid IS NULL OR i.hub_id = $2) \
       AND ($3::uuid IS NULL OR s.seller_id = $3) \
       AND ($4::uuid[] IS NULL OR i.sku_id = ANY($4))";

/// `SET` clause and `WHERE` guard for one transition; `$4` is the amount.
fn guarded_clauses(transition: Transition) -> (&'static str, &'static str) {
    match transition {
        Transition::Reserve(_) => (
            "available = available - $4, reserved = reserved + $4",
            "available >= $4",
        ),
        Transition::Release(_) => (
            "reserved = reserved - $4, available = available + $4",
            "reserved >= $4",
        ),
        Transition::Fulfill(_) => (
            "reserved = reserved - $4, quantity = quantity - $4",
            "reserved >= $4",
        ),
        Transition::AdjustAvailable(_) => (
            "available = available + $4",
            "available + $4 >= 0 AND available + reserved + $4 <= quantity",
        ),
        Transition::AdjustInTransit(_) => ("in_transit = in_transit + $4", "in_transit + $4 >= 0"),
    }
}

struct QueryBinds {
    hub: Option<Uuid>,
    seller: Option<Uuid>,
    skus: Option<Vec<Uuid>>,
}

impl From<&InventoryQuery> for QueryBinds {
    fn from(query: &InventoryQuery) -> Self {
        Self {
            hub: query.hub_id.map(|id| *id.as_uuid()),
            seller: query.seller_id.map(|id| *id.as_uuid()),
            skus: query
                .sku_ids
                .as_ref()
                .map(|ids| ids.iter().map(|id| *id.as_uuid()).collect()),
        }
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    #[instrument(skip(self, updates), fields(tenant_id = %tenant_id, update_count = updates.len()), err)]
    async fn upsert_quantities(&self, tenant_id: TenantId, updates: &[ResolvedUpdate]) -> Result<(), StoreError> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for (index, update) in updates.iter().enumerate() {
            // The conflict branch only fires when the new quantity still covers
            // committed stock; otherwise no row comes back.
            let row = sqlx::query(
                r#"
                INSERT INTO inventories (
                    id, tenant_id, hub_id, sku_id,
                    quantity, available, reserved, in_transit,
                    created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, 0, 0, 0, NOW(), NOW())
                ON CONFLICT (tenant_id, hub_id, sku_id)
                DO UPDATE SET
                    quantity = EXCLUDED.quantity,
                    updated_at = NOW()
                WHERE inventories.available + inventories.reserved <= EXCLUDED.quantity
                RETURNING id
                "#,
            )
            .bind(Uuid::now_v7())
            .bind(tenant_id.as_uuid())
            .bind(update.hub_id.as_uuid())
            .bind(update.sku_id.as_uuid())
            .bind(update.quantity)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_inventory", e))?;

            if row.is_none() {
                let committed: i64 = sqlx::query(
                    "SELECT available + reserved AS committed FROM inventories \
                     WHERE tenant_id = $1 AND hub_id = $2 AND sku_id = $3",
                )
                .bind(tenant_id.as_uuid())
                .bind(update.hub_id.as_uuid())
                .bind(update.sku_id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("read_committed", e))?
                .try_get("committed")
                .map_err(|e| map_sqlx_error("read_committed", e))?;

                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::BelowCommitted {
                    index,
                    quantity: update.quantity,
                    committed,
                });
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, hub_id = %hub_id, sku_id = %sku_id), err)]
    async fn find(
        &self,
        tenant_id: TenantId,
        hub_id: HubId,
        sku_id: SkuId,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventories \
             WHERE tenant_id = $1 AND hub_id = $2 AND sku_id = $3"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(hub_id.as_uuid())
            .bind(sku_id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("find_inventory", e))?;
        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, hub_id = %hub_id, sku_id = %sku_id, transition = %transition),
        err
    )]
    async fn apply_guarded(
        &self,
        tenant_id: TenantId,
        hub_id: HubId,
        sku_id: SkuId,
        transition: Transition,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        let (set, guard) = guarded_clauses(transition);
        let sql = format!(
            "UPDATE inventories SET {set}, updated_at = NOW() \
             WHERE tenant_id = $1 AND hub_id = $2 AND sku_id = $3 AND {guard} \
             RETURNING {INVENTORY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(hub_id.as_uuid())
            .bind(sku_id.as_uuid())
            .bind(transition.amount())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error(transition.name(), e))?;
        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, hub_id = %hub_id, sku_id = %sku_id), err)]
    async fn lock(
        &self,
        tenant_id: TenantId,
        hub_id: HubId,
        sku_id: SkuId,
    ) -> Result<Box<dyn LockedRow>, StoreError> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventories \
             WHERE tenant_id = $1 AND hub_id = $2 AND sku_id = $3 \
             FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(hub_id.as_uuid())
            .bind(sku_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_inventory", e))?;
        let current = row.as_ref().map(record_from_row).transpose()?;

        Ok(Box::new(PgLockedRow { tx, current }))
    }

    #[instrument(skip(self, query), fields(tenant_id = %tenant_id), err)]
    async fn count(&self, tenant_id: TenantId, query: &InventoryQuery) -> Result<u64, StoreError> {
        let binds = QueryBinds::from(query);
        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS total {LISTING_FROM}"))
            .bind(tenant_id.as_uuid())
            .bind(binds.hub)
            .bind(binds.seller)
            .bind(binds.skus)
            .fetch_one(self.pool())
            .await
            .map_err(|e| map_sqlx_error("count_inventory", e))?
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_inventory", e))?;
        Ok(total.max(0) as u64)
    }

    #[instrument(skip(self, query), fields(tenant_id = %tenant_id), err)]
    async fn list(
        &self,
        tenant_id: TenantId,
        query: &InventoryQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<InventoryEntry>, StoreError> {
        let binds = QueryBinds::from(query);
        let sql = format!(
            "SELECT i.id, i.hub_id, i.sku_id, i.quantity, i.available, i.reserved, i.in_transit, \
                    h.code AS hub_code, h.name AS hub_name, \
                    s.code AS sku_code, s.name AS sku_name, s.seller_id AS sku_seller_id \
             {LISTING_FROM} \
             ORDER BY h.code ASC, s.code ASC \
             LIMIT $5 OFFSET $6"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(binds.hub)
            .bind(binds.seller)
            .bind(binds.skus)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("list_inventory", e))?;
        rows.iter().map(entry_from_row).collect()
    }

    #[instrument(skip(self, query), fields(tenant_id = %tenant_id), err)]
    async fn stocked_sku_ids(&self, tenant_id: TenantId, query: &InventoryQuery) -> Result<HashSet<SkuId>, StoreError> {
        let binds = QueryBinds::from(query);
        let rows = sqlx::query(&format!("SELECT DISTINCT i.sku_id {LISTING_FROM}"))
            .bind(tenant_id.as_uuid())
            .bind(binds.hub)
            .bind(binds.seller)
            .bind(binds.skus)
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("stocked_sku_ids", e))?;
        rows.iter()
            .map(|row| {
                row.try_get::<Uuid, _>("sku_id")
                    .map(SkuId::from_uuid)
                    .map_err(|e| map_sqlx_error("stocked_sku_ids", e))
            })
            .collect()
    }
}

/// Row held with `SELECT .. FOR UPDATE` inside an open transaction.
/// Dropping without [`LockedRow::commit`] rolls the transaction back.
struct PgLockedRow {
    tx: Transaction<'static, Postgres>,
    current: Option<InventoryRecord>,
}

#[async_trait]
impl LockedRow for PgLockedRow {
    fn current(&self) -> Option<&InventoryRecord> {
        self.current.as_ref()
    }

    async fn write(&mut self, counters: Counters) -> Result<InventoryRecord, StoreError> {
        let Some(current) = self.current.as_ref() else {
            return Err(StoreError::Missing("locked inventory row does not exist".to_string()));
        };
        let sql = format!(
            "UPDATE inventories SET quantity = $4, available = $5, reserved = $6, in_transit = $7, \
                    updated_at = NOW() \
             WHERE tenant_id = $1 AND hub_id = $2 AND sku_id = $3 \
             RETURNING {INVENTORY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(current.tenant_id.as_uuid())
            .bind(current.hub_id.as_uuid())
            .bind(current.sku_id.as_uuid())
            .bind(counters.quantity)
            .bind(counters.available)
            .bind(counters.reserved)
            .bind(counters.in_transit)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("write_locked_inventory", e))?;
        let updated = record_from_row(&row)?;
        self.current = Some(updated.clone());
        Ok(updated)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_guard_references_the_amount() {
        for transition in [
            Transition::Reserve(1),
            Transition::Release(1),
            Transition::Fulfill(1),
            Transition::AdjustAvailable(-1),
            Transition::AdjustInTransit(1),
        ] {
            let (set, guard) = guarded_clauses(transition);
            assert!(set.contains("$4"), "{transition}");
            assert!(guard.contains("$4"), "{transition}");
        }
    }

    #[test]
    fn listing_filters_are_tenant_scoped() {
        assert!(LISTING_FROM.contains("i.tenant_id = $1"));
    }
}

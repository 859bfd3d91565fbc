use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::instrument;

use hubstock_catalog::{Hub, Sku, SkuFilter};
use hubstock_core::{HubId, PageRequest, SellerId, SkuId, TenantId};

use super::{hub_from_row, map_sqlx_error, sku_from_row, PgStore, HUB_COLUMNS, SKU_COLUMNS};
use crate::store::{CatalogStore, StoreError};

#[async_trait]
impl CatalogStore for PgStore {
    #[instrument(skip(self, hub), fields(tenant_id = %hub.tenant_id, code = %hub.code), err)]
    async fn insert_hub(&self, hub: &Hub) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO hubs (
                id, tenant_id, code, name, description, is_active,
                address, city, state, country, postal_code,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(hub.id.as_uuid())
        .bind(hub.tenant_id.as_uuid())
        .bind(&hub.code)
        .bind(&hub.name)
        .bind(&hub.description)
        .bind(hub.is_active)
        .bind(&hub.address.address)
        .bind(&hub.address.city)
        .bind(&hub.address.state)
        .bind(&hub.address.country)
        .bind(&hub.address.postal_code)
        .bind(hub.created_at)
        .bind(hub.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| map_sqlx_error("insert_hub", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, hub_id = %id), err)]
    async fn hub_by_id(&self, tenant_id: TenantId, id: HubId) -> Result<Option<Hub>, StoreError> {
        let sql = format!("SELECT {HUB_COLUMNS} FROM hubs WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("hub_by_id", e))?;
        row.as_ref().map(hub_from_row).transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn hub_by_code(&self, tenant_id: TenantId, code: &str) -> Result<Option<Hub>, StoreError> {
        let sql = format!(
            "SELECT {HUB_COLUMNS} FROM hubs WHERE tenant_id = $1 AND code = $2 AND deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(code)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("hub_by_code", e))?;
        row.as_ref().map(hub_from_row).transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, page = page.page), err)]
    async fn list_hubs(&self, tenant_id: TenantId, page: PageRequest) -> Result<(Vec<Hub>, u64), StoreError> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM hubs WHERE tenant_id = $1 AND deleted_at IS NULL")
            .bind(tenant_id.as_uuid())
            .fetch_one(self.pool())
            .await
            .map_err(|e| map_sqlx_error("count_hubs", e))?
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_hubs", e))?;

        let sql = format!(
            "SELECT {HUB_COLUMNS} FROM hubs WHERE tenant_id = $1 AND deleted_at IS NULL \
             ORDER BY code ASC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("list_hubs", e))?;
        let hubs = rows.iter().map(hub_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok((hubs, total.max(0) as u64))
    }

    #[instrument(skip(self, hub), fields(tenant_id = %hub.tenant_id, hub_id = %hub.id), err)]
    async fn update_hub(&self, hub: &Hub) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE hubs SET
                code = $3, name = $4, description = $5, is_active = $6,
                address = $7, city = $8, state = $9, country = $10, postal_code = $11,
                updated_at = $12
            WHERE tenant_id = $1 AND id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(hub.tenant_id.as_uuid())
        .bind(hub.id.as_uuid())
        .bind(&hub.code)
        .bind(&hub.name)
        .bind(&hub.description)
        .bind(hub.is_active)
        .bind(&hub.address.address)
        .bind(&hub.address.city)
        .bind(&hub.address.state)
        .bind(&hub.address.country)
        .bind(&hub.address.postal_code)
        .bind(hub.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| map_sqlx_error("update_hub", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, hub_id = %id), err)]
    async fn soft_delete_hub(
        &self,
        tenant_id: TenantId,
        id: HubId,
        at: DateTime<Utc>,
    ) -> Result<Option<Hub>, StoreError> {
        // RETURNING sees the new row; the pre-delete view only differs in the
        // two timestamp columns, which are restored from the old values.
        let sql = format!(
            "UPDATE hubs h SET deleted_at = $3, updated_at = $3 \
             FROM (SELECT id, updated_at AS old_updated_at FROM hubs \
                   WHERE tenant_id = $1 AND id = $2 AND deleted_at IS NULL FOR UPDATE) old \
             WHERE h.id = old.id \
             RETURNING {}, old.old_updated_at",
            qualified("h", HUB_COLUMNS)
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .bind(at)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("soft_delete_hub", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut before = hub_from_row(&row)?;
        before.deleted_at = None;
        before.updated_at = row
            .try_get("old_updated_at")
            .map_err(|e| map_sqlx_error("soft_delete_hub", e))?;
        Ok(Some(before))
    }

    #[instrument(skip(self, sku), fields(tenant_id = %sku.tenant_id, code = %sku.code), err)]
    async fn insert_sku(&self, sku: &Sku) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO skus (
                id, tenant_id, seller_id, code, name, description, is_active, barcode,
                weight, weight_unit, length, width, height, dimension_unit,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(sku.id.as_uuid())
        .bind(sku.tenant_id.as_uuid())
        .bind(sku.seller_id.as_uuid())
        .bind(&sku.code)
        .bind(&sku.name)
        .bind(&sku.description)
        .bind(sku.is_active)
        .bind(&sku.barcode)
        .bind(sku.dimensions.weight)
        .bind(&sku.dimensions.weight_unit)
        .bind(sku.dimensions.length)
        .bind(sku.dimensions.width)
        .bind(sku.dimensions.height)
        .bind(&sku.dimensions.dimension_unit)
        .bind(sku.created_at)
        .bind(sku.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| map_sqlx_error("insert_sku", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, sku_id = %id), err)]
    async fn sku_by_id(&self, tenant_id: TenantId, id: SkuId) -> Result<Option<Sku>, StoreError> {
        let sql = format!("SELECT {SKU_COLUMNS} FROM skus WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("sku_by_id", e))?;
        row.as_ref().map(sku_from_row).transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn sku_by_code(&self, tenant_id: TenantId, code: &str) -> Result<Option<Sku>, StoreError> {
        let sql = format!(
            "SELECT {SKU_COLUMNS} FROM skus WHERE tenant_id = $1 AND code = $2 AND deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(code)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("sku_by_code", e))?;
        row.as_ref().map(sku_from_row).transpose()
    }

    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id, page = filter.page.page), err)]
    async fn list_skus(&self, tenant_id: TenantId, filter: &SkuFilter) -> Result<(Vec<Sku>, u64), StoreError> {
        const FILTER: &str = "tenant_id = $1 AND deleted_at IS NULL \
             AND ($2::uuid IS NULL OR seller_id = $2) \
             AND ($3::boolean IS NULL OR is_active = $3)";

        let seller = filter.seller_id.map(|s| *s.as_uuid());
        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS total FROM skus WHERE {FILTER}"))
            .bind(tenant_id.as_uuid())
            .bind(seller)
            .bind(filter.is_active)
            .fetch_one(self.pool())
            .await
            .map_err(|e| map_sqlx_error("count_skus", e))?
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_skus", e))?;

        let sql = format!("SELECT {SKU_COLUMNS} FROM skus WHERE {FILTER} ORDER BY code ASC LIMIT $4 OFFSET $5");
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(seller)
            .bind(filter.is_active)
            .bind(filter.page.limit() as i64)
            .bind(filter.page.offset() as i64)
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("list_skus", e))?;
        let skus = rows.iter().map(sku_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok((skus, total.max(0) as u64))
    }

    #[instrument(skip(self, sku), fields(tenant_id = %sku.tenant_id, sku_id = %sku.id), err)]
    async fn update_sku(&self, sku: &Sku) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE skus SET
                seller_id = $3, code = $4, name = $5, description = $6, is_active = $7,
                barcode = $8, weight = $9, weight_unit = $10, length = $11, width = $12,
                height = $13, dimension_unit = $14, updated_at = $15
            WHERE tenant_id = $1 AND id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(sku.tenant_id.as_uuid())
        .bind(sku.id.as_uuid())
        .bind(sku.seller_id.as_uuid())
        .bind(&sku.code)
        .bind(&sku.name)
        .bind(&sku.description)
        .bind(sku.is_active)
        .bind(&sku.barcode)
        .bind(sku.dimensions.weight)
        .bind(&sku.dimensions.weight_unit)
        .bind(sku.dimensions.length)
        .bind(sku.dimensions.width)
        .bind(sku.dimensions.height)
        .bind(&sku.dimensions.dimension_unit)
        .bind(sku.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| map_sqlx_error("update_sku", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, sku_id = %id), err)]
    async fn soft_delete_sku(
        &self,
        tenant_id: TenantId,
        id: SkuId,
        at: DateTime<Utc>,
    ) -> Result<Option<Sku>, StoreError> {
        let sql = format!(
            "UPDATE skus s SET deleted_at = $3, updated_at = $3 \
             FROM (SELECT id, updated_at AS old_updated_at FROM skus \
                   WHERE tenant_id = $1 AND id = $2 AND deleted_at IS NULL FOR UPDATE) old \
             WHERE s.id = old.id \
             RETURNING {}, old.old_updated_at",
            qualified("s", SKU_COLUMNS)
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .bind(at)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("soft_delete_sku", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut before = sku_from_row(&row)?;
        before.deleted_at = None;
        before.updated_at = row
            .try_get("old_updated_at")
            .map_err(|e| map_sqlx_error("soft_delete_sku", e))?;
        Ok(Some(before))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, seller_id = %seller_id), err)]
    async fn seller_exists(&self, tenant_id: TenantId, seller_id: SellerId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM sellers WHERE tenant_id = $1 AND id = $2) AS present")
            .bind(tenant_id.as_uuid())
            .bind(seller_id.as_uuid())
            .fetch_one(self.pool())
            .await
            .map_err(|e| map_sqlx_error("seller_exists", e))?;
        row.try_get("present").map_err(|e| map_sqlx_error("seller_exists", e))
    }
}

/// Prefix every column in a comma-separated list with `alias.`.
fn qualified(alias: &str, columns: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_prefixes_every_column() {
        assert_eq!(qualified("h", "id, code,name"), "h.id, h.code, h.name");
    }
}

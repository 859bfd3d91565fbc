//! Postgres-backed store.
//!
//! Every query includes `tenant_id` in the WHERE clause. The schema lives in
//! [`crate::db::SCHEMA`].
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` |
//! | Database (check violation) | `23514` | `CheckViolation` |
//! | Database (foreign key violation) | `23503` | `Conflict` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Conflict` |
//! | Database (other) | Any other | `Unavailable` |
//! | RowNotFound | N/A | `Missing` |
//! | Decode / ColumnDecode | N/A | `Corrupt` |
//! | PoolClosed, PoolTimedOut, Io, other | N/A | `Unavailable` |

mod catalog;
mod inventory;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use hubstock_catalog::{Dimensions, Hub, HubAddress, Sku};
use hubstock_core::{HubId, InventoryRecordId, SellerId, SkuId, TenantId};
use hubstock_inventory::{Counters, HubRef, InventoryEntry, InventoryRecord, SkuRef};

use super::StoreError;

/// Postgres implementation of both [`super::CatalogStore`] and
/// [`super::InventoryStore`].
///
/// `Send + Sync`; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation(msg),
                Some("23514") => StoreError::CheckViolation(msg),
                Some("23503") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                Some("22003") => StoreError::OutOfRange(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::Missing(format!("row not found in {}", operation)),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("failed to decode row in {}: {}", operation, err))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn decode_error(what: &str, err: sqlx::Error) -> StoreError {
    StoreError::Corrupt(format!("failed to deserialize {} row: {}", what, err))
}

// SQLx row decoding

const HUB_COLUMNS: &str = "id, tenant_id, code, name, description, is_active, \
     address, city, state, country, postal_code, created_at, updated_at, deleted_at";

const SKU_COLUMNS: &str = "id, tenant_id, seller_id, code, name, description, is_active, barcode, \
     weight, weight_unit, length, width, height, dimension_unit, created_at, updated_at, deleted_at";

const INVENTORY_COLUMNS: &str =
    "id, tenant_id, hub_id, sku_id, quantity, available, reserved, in_transit, updated_at";

fn hub_from_row(row: &PgRow) -> Result<Hub, StoreError> {
    let decode = || -> Result<Hub, sqlx::Error> {
        Ok(Hub {
            id: HubId::from_uuid(row.try_get("id")?),
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_active: row.try_get("is_active")?,
            address: HubAddress {
                address: row.try_get("address")?,
                city: row.try_get("city")?,
                state: row.try_get("state")?,
                country: row.try_get("country")?,
                postal_code: row.try_get("postal_code")?,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get::<Option<DateTime<Utc>>, _>("deleted_at")?,
        })
    };
    decode().map_err(|e| decode_error("hub", e))
}

fn sku_from_row(row: &PgRow) -> Result<Sku, StoreError> {
    let decode = || -> Result<Sku, sqlx::Error> {
        Ok(Sku {
            id: SkuId::from_uuid(row.try_get("id")?),
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
            seller_id: SellerId::from_uuid(row.try_get("seller_id")?),
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_active: row.try_get("is_active")?,
            barcode: row.try_get("barcode")?,
            dimensions: Dimensions {
                weight: row.try_get("weight")?,
                weight_unit: row.try_get("weight_unit")?,
                length: row.try_get("length")?,
                width: row.try_get("width")?,
                height: row.try_get("height")?,
                dimension_unit: row.try_get("dimension_unit")?,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get::<Option<DateTime<Utc>>, _>("deleted_at")?,
        })
    };
    decode().map_err(|e| decode_error("sku", e))
}

fn counters_from_row(row: &PgRow) -> Result<Counters, sqlx::Error> {
    Ok(Counters {
        quantity: row.try_get("quantity")?,
        available: row.try_get("available")?,
        reserved: row.try_get("reserved")?,
        in_transit: row.try_get("in_transit")?,
    })
}

fn record_from_row(row: &PgRow) -> Result<InventoryRecord, StoreError> {
    let decode = || -> Result<InventoryRecord, sqlx::Error> {
        Ok(InventoryRecord {
            id: Some(InventoryRecordId::from_uuid(row.try_get("id")?)),
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
            hub_id: HubId::from_uuid(row.try_get("hub_id")?),
            sku_id: SkuId::from_uuid(row.try_get("sku_id")?),
            counters: counters_from_row(row)?,
            updated_at: row.try_get::<Option<DateTime<Utc>>, _>("updated_at")?,
        })
    };
    decode().map_err(|e| decode_error("inventory", e))
}

/// Listing rows carry joined hub/SKU columns under `hub_*` / `sku_*` aliases.
fn entry_from_row(row: &PgRow) -> Result<InventoryEntry, StoreError> {
    let decode = || -> Result<InventoryEntry, sqlx::Error> {
        Ok(InventoryEntry {
            record_id: Some(InventoryRecordId::from_uuid(row.try_get("id")?)),
            hub: Some(HubRef {
                id: HubId::from_uuid(row.try_get("hub_id")?),
                code: row.try_get("hub_code")?,
                name: row.try_get("hub_name")?,
            }),
            sku: SkuRef {
                id: SkuId::from_uuid(row.try_get("sku_id")?),
                seller_id: SellerId::from_uuid(row.try_get("sku_seller_id")?),
                code: row.try_get("sku_code")?,
                name: row.try_get("sku_name")?,
            },
            counters: counters_from_row(row)?,
        })
    };
    decode().map_err(|e| decode_error("inventory listing", e))
}

//! `hubstock-core`: shared building blocks for the inventory ledger.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod page;

pub use entity::CatalogEntity;
pub use error::{EntityKind, ErrorKind, LedgerError, LedgerResult};
pub use id::{HubId, InventoryRecordId, SellerId, SkuId, TenantId};
pub use page::{Page, PageRequest};

//! Catalog domain: hubs and SKUs.
//!
//! Pure data and validation (no IO). Code uniqueness and seller existence
//! are enforced by the directory in `hubstock-infra`, which owns storage.

pub mod hub;
pub mod sku;
pub mod validation;

pub use hub::{Hub, HubAddress, HubChanges, NewHub};
pub use sku::{Dimensions, NewSku, Sku, SkuChanges, SkuFilter};

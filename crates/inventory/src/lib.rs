//! Inventory ledger domain: counters, transitions, upsert batches, listings.
//!
//! Deterministic domain logic only (no IO, no HTTP, no storage).

pub mod query;
pub mod record;
pub mod transition;
pub mod update;

pub use query::{HubRef, InventoryEntry, InventoryFilter, InventoryPage, SkuRef};
pub use record::{Counters, InventoryRecord};
pub use transition::Transition;
pub use update::{chunk_ranges, validate_batch, InventoryUpdate};

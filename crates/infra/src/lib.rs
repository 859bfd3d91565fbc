//! Infrastructure layer: stores, cache, config, and the ledger services built
//! on them.

pub mod batch;
pub mod cache;
pub mod config;
pub mod db;
pub mod directory;
pub mod ledger;
pub mod services;
pub mod store;


pub use batch::{BatchReport, BatchUpsertPipeline};
pub use config::{ConfigError, LedgerConfig};
pub use directory::{CatalogDirectory, HubDirectory, SkuDirectory};
pub use ledger::{InventoryLedger, InventoryLock};
pub use services::LedgerServices;

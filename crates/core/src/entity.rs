//! Catalog entity trait: tenant-scoped identity plus a human-readable code.

use crate::error::EntityKind;
use crate::id::TenantId;

/// An entity that is addressable both by its stable id and by a
/// `(tenant, code)` pair.
///
/// Hubs and SKUs implement this so the directory and its cache can treat
/// them uniformly.
pub trait CatalogEntity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    const KIND: EntityKind;

    fn id(&self) -> Self::Id;

    fn tenant_id(&self) -> TenantId;

    /// Case-sensitive code, unique per tenant among live rows.
    fn code(&self) -> &str;

    /// Soft-deleted rows stay readable by id but not by code.
    fn is_deleted(&self) -> bool;
}

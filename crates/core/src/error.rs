//! Ledger error model.

use thiserror::Error;

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Catalog entity an error refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Hub,
    Sku,
    Seller,
    Inventory,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Hub => "hub",
            EntityKind::Sku => "sku",
            EntityKind::Seller => "seller",
            EntityKind::Inventory => "inventory",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat classification of [`LedgerError`].
///
/// Callers (HTTP layer, order pipeline) branch on this, never on message text.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    DuplicateCode,
    InvalidReference,
    Validation,
    InsufficientAvailable,
    InsufficientReserved,
    ConcurrentModification,
    StoreUnavailable,
}

/// Ledger-level error.
///
/// Everything the ledger surfaces to collaborators is one of these. Cache
/// failures never show up here; they are absorbed by the cache layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A hub, SKU, seller or inventory row was required but absent.
    #[error("{entity} not found: {key}")]
    NotFound { entity: EntityKind, key: String },

    /// `(tenant, code)` uniqueness violated on create or rename.
    #[error("{entity} with code '{code}' already exists")]
    DuplicateCode { entity: EntityKind, code: String },

    /// A hub or SKU code did not resolve during an inventory operation.
    #[error("invalid {entity} code '{code}'")]
    InvalidReference { entity: EntityKind, code: String },

    /// Malformed or out-of-range input.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient available quantity (available: {available}, requested: {requested})")]
    InsufficientAvailable { available: i64, requested: i64 },

    #[error("insufficient reserved quantity (reserved: {reserved}, requested: {requested})")]
    InsufficientReserved { reserved: i64, requested: i64 },

    /// A guarded update lost a race; the caller should retry.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Durable store IO failure (including deadline expiry).
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A batch chunk failed; earlier chunks stay committed.
    #[error("batch chunk {start}-{end} failed ({committed} entries committed before it): {source}")]
    ChunkFailed {
        start: usize,
        end: usize,
        committed: usize,
        #[source]
        source: Box<LedgerError>,
    },
}

impl LedgerError {
    pub fn not_found(entity: EntityKind, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn duplicate_code(entity: EntityKind, code: impl Into<String>) -> Self {
        Self::DuplicateCode {
            entity,
            code: code.into(),
        }
    }

    pub fn invalid_reference(entity: EntityKind, code: impl Into<String>) -> Self {
        Self::InvalidReference {
            entity,
            code: code.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn concurrent(msg: impl Into<String>) -> Self {
        Self::ConcurrentModification(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::DuplicateCode { .. } => ErrorKind::DuplicateCode,
            LedgerError::InvalidReference { .. } => ErrorKind::InvalidReference,
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::InsufficientAvailable { .. } => ErrorKind::InsufficientAvailable,
            LedgerError::InsufficientReserved { .. } => ErrorKind::InsufficientReserved,
            LedgerError::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
            LedgerError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            LedgerError::ChunkFailed { source, .. } => source.kind(),
        }
    }

    /// Turn a directory `NotFound` into `InvalidReference` for the given code.
    ///
    /// Used when a code is resolved on behalf of an inventory operation.
    pub fn into_reference(self, entity: EntityKind, code: &str) -> Self {
        match self {
            LedgerError::NotFound { .. } => Self::invalid_reference(entity, code),
            other => other,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConcurrentModification | ErrorKind::StoreUnavailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_failure_reports_the_wrapped_kind() {
        let err = LedgerError::ChunkFailed {
            start: 100,
            end: 200,
            committed: 100,
            source: Box::new(LedgerError::invalid_reference(EntityKind::Sku, "S9")),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidReference);
        assert!(err.to_string().contains("100-200"));
    }

    #[test]
    fn not_found_becomes_invalid_reference() {
        let err = LedgerError::not_found(EntityKind::Hub, "H1").into_reference(EntityKind::Hub, "H1");
        assert_eq!(err, LedgerError::invalid_reference(EntityKind::Hub, "H1"));

        let io = LedgerError::unavailable("down").into_reference(EntityKind::Hub, "H1");
        assert_eq!(io.kind(), ErrorKind::StoreUnavailable);
    }

    #[test]
    fn insufficient_stock_is_distinct_from_not_found() {
        let err = LedgerError::InsufficientAvailable {
            available: 2,
            requested: 5,
        };
        assert_ne!(err.kind(), ErrorKind::NotFound);
        assert!(!err.is_retryable());
        assert!(LedgerError::concurrent("lost race").is_retryable());
    }
}

use core::ops::Range;

use serde::{Deserialize, Serialize};

use hubstock_core::{LedgerError, LedgerResult};

/// Externally-facing upsert instruction: set the on-hand quantity of a
/// (hub code, sku code) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryUpdate {
    pub hub_code: String,
    pub sku_code: String,
    pub quantity: i64,
}

impl InventoryUpdate {
    pub fn new(hub_code: impl Into<String>, sku_code: impl Into<String>, quantity: i64) -> Self {
        Self {
            hub_code: hub_code.into(),
            sku_code: sku_code.into(),
            quantity,
        }
    }

    fn validate_at(&self, index: usize) -> LedgerResult<()> {
        if self.hub_code.trim().is_empty() {
            return Err(LedgerError::validation(format!(
                "hub code is required for update at index {index}"
            )));
        }
        if self.sku_code.trim().is_empty() {
            return Err(LedgerError::validation(format!(
                "SKU code is required for update at index {index}"
            )));
        }
        if self.quantity < 0 {
            return Err(LedgerError::validation(format!(
                "quantity cannot be negative for update at index {index}"
            )));
        }
        Ok(())
    }
}

/// Fail fast on the first malformed entry, naming its index.
pub fn validate_batch(updates: &[InventoryUpdate]) -> LedgerResult<()> {
    if updates.is_empty() {
        return Err(LedgerError::validation("no inventory updates provided"));
    }
    updates
        .iter()
        .enumerate()
        .try_for_each(|(index, update)| update.validate_at(index))
}

/// Half-open index ranges of at most `chunk_size` covering `0..len`.
pub fn chunk_ranges(len: usize, chunk_size: usize) -> impl Iterator<Item = Range<usize>> {
    let chunk_size = chunk_size.max(1);
    (0..len)
        .step_by(chunk_size)
        .map(move |start| start..(start + chunk_size).min(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubstock_core::ErrorKind;
    use proptest::prelude::*;

    #[test]
    fn empty_batch_is_rejected() {
        let err = validate_batch(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn error_names_the_offending_index() {
        let updates = vec![
            InventoryUpdate::new("H1", "S1", 5),
            InventoryUpdate::new("H1", "S2", 5),
            InventoryUpdate::new("H1", " ", 5),
        ];
        let err = validate_batch(&updates).unwrap_err();
        assert!(err.to_string().contains("index 2"), "{err}");

        let negative = vec![InventoryUpdate::new("H1", "S1", -1)];
        assert!(validate_batch(&negative).unwrap_err().to_string().contains("index 0"));
    }

    #[test]
    fn zero_quantity_is_allowed() {
        assert!(validate_batch(&[InventoryUpdate::new("H1", "S1", 0)]).is_ok());
    }

    #[test]
    fn chunks_of_one_hundred() {
        let ranges: Vec<_> = chunk_ranges(250, 100).collect();
        assert_eq!(ranges, vec![0..100, 100..200, 200..250]);
    }

    proptest! {
        /// Property: chunks are contiguous, bounded, and cover every index once.
        #[test]
        fn chunks_cover_every_index(len in 0usize..1000, size in 1usize..150) {
            let mut expected = 0;
            for range in chunk_ranges(len, size) {
                prop_assert_eq!(range.start, expected);
                prop_assert!(range.len() <= size);
                prop_assert!(!range.is_empty());
                expected = range.end;
            }
            prop_assert_eq!(expected, len);
        }
    }
}

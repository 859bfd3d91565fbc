use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hubstock_core::{HubId, InventoryRecordId, LedgerError, LedgerResult, SkuId, TenantId};

/// The four stock counters of one (hub, sku) pair.
///
/// Invariants after every committed mutation:
/// - `available`, `reserved`, `in_transit` are all `>= 0`
/// - `available + reserved <= quantity` (in-transit is incoming, not on hand)
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Counters {
    pub quantity: i64,
    pub available: i64,
    pub reserved: i64,
    pub in_transit: i64,
}

impl Counters {
    pub const ZERO: Counters = Counters {
        quantity: 0,
        available: 0,
        reserved: 0,
        in_transit: 0,
    };

    /// Stock already promised or sellable: `available + reserved`.
    pub fn committed(&self) -> i64 {
        self.available + self.reserved
    }

    pub fn holds_invariants(&self) -> bool {
        self.available >= 0 && self.reserved >= 0 && self.in_transit >= 0 && self.committed() <= self.quantity
    }

    pub fn check_invariants(&self) -> LedgerResult<()> {
        if self.holds_invariants() {
            Ok(())
        } else {
            Err(LedgerError::validation(format!(
                "counter invariants violated: {self:?}"
            )))
        }
    }

    /// Set the on-hand quantity, keeping the flow counters.
    ///
    /// Fails when the new quantity would no longer cover `available + reserved`.
    pub fn with_quantity(&self, quantity: i64) -> LedgerResult<Counters> {
        if quantity < 0 {
            return Err(LedgerError::validation("quantity cannot be negative"));
        }
        if quantity < self.committed() {
            return Err(LedgerError::validation(format!(
                "quantity {quantity} is below committed stock {} (available + reserved)",
                self.committed()
            )));
        }
        Ok(Counters { quantity, ..*self })
    }
}

/// Point-in-time stock for a (tenant, hub, sku).
///
/// A pair with no stored row is equivalent to all-zero counters; such records
/// are synthesized with `id: None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: Option<InventoryRecordId>,
    pub tenant_id: TenantId,
    pub hub_id: HubId,
    pub sku_id: SkuId,
    #[serde(flatten)]
    pub counters: Counters,
    pub updated_at: Option<DateTime<Utc>>,
}

impl InventoryRecord {
    /// Zero-valued stand-in for a pair that has never been stocked.
    pub fn synthesized(tenant_id: TenantId, hub_id: HubId, sku_id: SkuId) -> Self {
        Self {
            id: None,
            tenant_id,
            hub_id,
            sku_id,
            counters: Counters::ZERO,
            updated_at: None,
        }
    }

    pub fn is_synthesized(&self) -> bool {
        self.id.is_none()
    }

    pub fn quantity(&self) -> i64 {
        self.counters.quantity
    }

    pub fn available(&self) -> i64 {
        self.counters.available
    }

    pub fn reserved(&self) -> i64 {
        self.counters.reserved
    }

    pub fn in_transit(&self) -> i64 {
        self.counters.in_transit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_record_is_all_zero() {
        let rec = InventoryRecord::synthesized(TenantId::new(), HubId::new(), SkuId::new());
        assert!(rec.is_synthesized());
        assert_eq!(rec.counters, Counters::ZERO);
    }

    #[test]
    fn quantity_cannot_drop_below_committed() {
        let counters = Counters {
            quantity: 100,
            available: 40,
            reserved: 30,
            in_transit: 0,
        };
        assert!(counters.with_quantity(70).is_ok());
        assert!(counters.with_quantity(69).is_err());
        assert!(counters.with_quantity(-1).is_err());
    }
}

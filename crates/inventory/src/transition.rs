//! Counter state transitions.
//!
//! Each transition is a relative delta guarded by a precondition. Stores
//! execute them as one conditional statement; this module is the reference
//! semantics (used by the in-memory store, by locked read-modify-write, and by
//! the ledger to classify a zero-rows-affected result).

use serde::{Deserialize, Serialize};

use hubstock_core::{LedgerError, LedgerResult};

use crate::record::Counters;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum Transition {
    /// `available -= q; reserved += q`, requires `available >= q`.
    Reserve(i64),
    /// `reserved -= q; available += q`, requires `reserved >= q`.
    Release(i64),
    /// `reserved -= q; quantity -= q`, requires `reserved >= q`.
    Fulfill(i64),
    /// `available += delta`, keeping `available >= 0` and
    /// `available + reserved <= quantity`.
    AdjustAvailable(i64),
    /// `in_transit += delta`, keeping `in_transit >= 0`.
    AdjustInTransit(i64),
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Reserve(_) => "reserve",
            Transition::Release(_) => "release",
            Transition::Fulfill(_) => "fulfill",
            Transition::AdjustAvailable(_) => "adjust_available",
            Transition::AdjustInTransit(_) => "adjust_in_transit",
        }
    }

    pub fn amount(&self) -> i64 {
        match *self {
            Transition::Reserve(q)
            | Transition::Release(q)
            | Transition::Fulfill(q)
            | Transition::AdjustAvailable(q)
            | Transition::AdjustInTransit(q) => q,
        }
    }

    /// Input check, independent of current stock.
    pub fn validate(&self) -> LedgerResult<()> {
        match *self {
            Transition::Reserve(q) | Transition::Release(q) | Transition::Fulfill(q) if q <= 0 => {
                Err(LedgerError::validation("quantity must be greater than zero"))
            }
            Transition::AdjustAvailable(0) | Transition::AdjustInTransit(0) => {
                Err(LedgerError::validation("delta cannot be zero"))
            }
            _ => Ok(()),
        }
    }

    /// Apply to `current`, or report which precondition failed.
    pub fn apply(&self, current: &Counters) -> LedgerResult<Counters> {
        self.validate()?;
        let mut next = *current;
        match *self {
            Transition::Reserve(q) => {
                if current.available < q {
                    return Err(LedgerError::InsufficientAvailable {
                        available: current.available,
                        requested: q,
                    });
                }
                next.available -= q;
                next.reserved += q;
            }
            Transition::Release(q) => {
                if current.reserved < q {
                    return Err(LedgerError::InsufficientReserved {
                        reserved: current.reserved,
                        requested: q,
                    });
                }
                next.reserved -= q;
                next.available += q;
            }
            Transition::Fulfill(q) => {
                if current.reserved < q {
                    return Err(LedgerError::InsufficientReserved {
                        reserved: current.reserved,
                        requested: q,
                    });
                }
                next.reserved -= q;
                next.quantity -= q;
            }
            Transition::AdjustAvailable(delta) => {
                let available = checked(current.available, delta, "available")?;
                if available < 0 {
                    return Err(LedgerError::InsufficientAvailable {
                        available: current.available,
                        requested: delta.saturating_neg(),
                    });
                }
                if checked(current.committed(), delta, "available")? > current.quantity {
                    return Err(LedgerError::validation(format!(
                        "available {} + {delta} would exceed uncommitted quantity (quantity: {}, reserved: {})",
                        current.available, current.quantity, current.reserved
                    )));
                }
                next.available = available;
            }
            Transition::AdjustInTransit(delta) => {
                let in_transit = checked(current.in_transit, delta, "in_transit")?;
                if in_transit < 0 {
                    return Err(LedgerError::validation(format!(
                        "in-transit cannot go negative (in_transit: {}, delta: {delta})",
                        current.in_transit
                    )));
                }
                next.in_transit = in_transit;
            }
        }
        Ok(next)
    }
}

fn checked(value: i64, delta: i64, counter: &str) -> LedgerResult<i64> {
    value
        .checked_add(delta)
        .ok_or_else(|| LedgerError::validation(format!("{counter} {value} + {delta} is out of range")))
}

impl core::fmt::Display for Transition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}({})", self.name(), self.amount())
    }
}

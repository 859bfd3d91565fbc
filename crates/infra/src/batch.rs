//! Batch Upsert Pipeline.
//!
//! Validates a whole submission up front, then drives
//! [`InventoryLedger::upsert_inventory`] one fixed-size chunk at a time. Each
//! chunk is its own transaction; the first failing chunk stops the run and
//! earlier chunks stay committed.

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use hubstock_core::{LedgerError, LedgerResult, TenantId};
use hubstock_inventory::{chunk_ranges, validate_batch, InventoryUpdate};

use crate::ledger::InventoryLedger;

/// Outcome of a fully applied submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub submitted: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone)]
pub struct BatchUpsertPipeline {
    ledger: InventoryLedger,
    chunk_size: usize,
}

impl BatchUpsertPipeline {
    /// Chunk size comes from the ledger's configuration.
    pub fn new(ledger: InventoryLedger) -> Self {
        let chunk_size = ledger.config().batch_chunk_size;
        Self::with_chunk_size(ledger, chunk_size)
    }

    pub fn with_chunk_size(ledger: InventoryLedger, chunk_size: usize) -> Self {
        Self {
            ledger,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Apply `updates` chunk by chunk.
    ///
    /// Malformed entries fail the whole submission before anything is
    /// written. A chunk failure is returned as [`LedgerError::ChunkFailed`]
    /// carrying the chunk's index range and the number of entries already
    /// committed by earlier chunks.
    #[instrument(skip(self, updates), fields(tenant_id = %tenant_id, submitted = updates.len()), err)]
    pub async fn submit(&self, tenant_id: TenantId, updates: &[InventoryUpdate]) -> LedgerResult<BatchReport> {
        validate_batch(updates)?;

        let mut committed = 0;
        let mut chunks = 0;
        for range in chunk_ranges(updates.len(), self.chunk_size) {
            let (start, end) = (range.start, range.end);
            if let Err(source) = self.ledger.upsert_inventory(tenant_id, &updates[range]).await {
                error!(start, end, committed, error = %source, "batch chunk failed; aborting submission");
                return Err(LedgerError::ChunkFailed {
                    start,
                    end,
                    committed,
                    source: Box::new(source),
                });
            }
            committed = end;
            chunks += 1;
        }

        info!(chunks, "batch applied");
        Ok(BatchReport {
            submitted: updates.len(),
            chunks,
        })
    }
}

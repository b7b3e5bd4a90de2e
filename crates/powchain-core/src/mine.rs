use crate::{
    constants::NONCES_PER_BATCH, hash_prefix, now_millis, pow::count_leading_zero_nibbles,
    seal_digest, Block, Transaction,
};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Result of a nonce search that was allowed to run to completion or stopped early.
#[derive(Clone, Debug, PartialEq)]
pub enum MineOutcome {
    Sealed(Block),
    Cancelled,
}

impl MineOutcome {
    pub fn into_block(self) -> Option<Block> {
        match self {
            MineOutcome::Sealed(block) => Some(block),
            MineOutcome::Cancelled => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Miner {
    batch_size: u64,
}

impl Default for Miner {
    fn default() -> Self {
        Self {
            batch_size: NONCES_PER_BATCH,
        }
    }
}

impl Miner {
    pub fn new(batch_size: u64) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Seal a block extending `previous` with `transactions`.
    ///
    /// Nonces are scanned in batches; each batch is searched in parallel and
    /// yields its smallest satisfying nonce, so the result is reproducible for a
    /// fixed timestamp. `cancel` is polled between batches.
    pub fn mine(
        &self,
        previous: &Block,
        transactions: Vec<Transaction>,
        difficulty: u32,
        cancel: &AtomicBool,
    ) -> MineOutcome {
        let index = previous.index + 1;
        let mut timestamp = now_millis().max(previous.timestamp);
        let mut prefix = hash_prefix(index, timestamp, &transactions, &previous.hash);
        let mut start = 0u64;
        let mut attempts = 0u64;

        loop {
            if cancel.load(Ordering::Relaxed) {
                debug!(index, attempts, "nonce search cancelled");
                return MineOutcome::Cancelled;
            }

            let end = start.saturating_add(self.batch_size);
            let found = (start..end).into_par_iter().find_first(|nonce| {
                count_leading_zero_nibbles(&seal_digest(&prefix, *nonce)) >= difficulty
            });

            if let Some(nonce) = found {
                attempts += nonce - start + 1;
                let hash = hex::encode(seal_digest(&prefix, nonce));
                info!(index, nonce, attempts, difficulty, %hash, "mined block");
                return MineOutcome::Sealed(Block {
                    index,
                    timestamp,
                    transactions,
                    previous_hash: previous.hash.clone(),
                    nonce,
                    difficulty,
                    hash,
                });
            }

            attempts += end - start;
            if end == u64::MAX {
                // Nonce space exhausted: move the timestamp and start over.
                timestamp = now_millis().max(timestamp + 1);
                prefix = hash_prefix(index, timestamp, &transactions, &previous.hash);
                start = 0;
            } else {
                start = end;
            }
        }
    }
}

//! Pending transactions waiting for the next block.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::debug;

use crate::{LedgerError, Transaction};

/// FIFO pool of accepted transactions. All mutation happens under one lock, so a
/// drain racing with `add` sees every transaction exactly once.
#[derive(Debug, Default)]
pub struct Mempool {
    pending: Mutex<VecDeque<Transaction>>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append `tx`, returning the pool size afterwards.
    pub fn add(&self, tx: Transaction) -> Result<usize, LedgerError> {
        if tx.from.trim().is_empty() {
            return Err(LedgerError::invalid_tx("sender address is empty"));
        }
        if tx.to.trim().is_empty() {
            return Err(LedgerError::invalid_tx("recipient address is empty"));
        }
        if !tx.amount.is_finite() {
            return Err(LedgerError::invalid_tx("amount must be a finite number"));
        }
        if tx.amount <= 0.0 {
            return Err(LedgerError::invalid_tx("amount must be greater than zero"));
        }

        let mut pending = self.pending.lock();
        debug!(from = %tx.from, to = %tx.to, amount = tx.amount, "transaction accepted");
        pending.push_back(tx);
        Ok(pending.len())
    }

    /// Take every pending transaction, leaving the pool empty.
    pub fn drain(&self) -> Vec<Transaction> {
        self.pending.lock().drain(..).collect()
    }

    pub fn snapshot(&self) -> Vec<Transaction> {
        self.pending.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Drain into a guard that hands the batch back unless it is committed.
    pub fn reserve(&self) -> Reservation<'_> {
        Reservation {
            pool: self,
            batch: Some(self.drain()),
        }
    }

    /// Put `batch` back ahead of anything submitted since it was drained.
    fn requeue_front(&self, batch: Vec<Transaction>) {
        if batch.is_empty() {
            return;
        }
        let mut pending = self.pending.lock();
        for tx in batch.into_iter().rev() {
            pending.push_front(tx);
        }
    }
}

/// A drained batch that returns to the pool on drop unless [`Reservation::commit`] ran.
#[derive(Debug)]
pub struct Reservation<'a> {
    pool: &'a Mempool,
    batch: Option<Vec<Transaction>>,
}

impl Reservation<'_> {
    pub fn transactions(&self) -> &[Transaction] {
        self.batch.as_deref().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions().is_empty()
    }

    /// The batch is now part of the ledger; forget it.
    pub fn commit(mut self) {
        self.batch = None;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if let Some(batch) = self.batch.take() {
            debug!(count = batch.len(), "returning uncommitted transactions to the mempool");
            self.pool.requeue_front(batch);
        }
    }
}

//! The context object clients talk to: one ledger, one mempool, one miner.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    validate_chain, Block, ChainStore, DifficultyController, Ledger, LedgerError, Mempool,
    MineOutcome, Miner, Transaction, ValidationReport,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Mine blocks with no transactions instead of failing with `EmptyMempool`.
    pub allow_empty_blocks: bool,
}

/// The chain plus the difficulty the next block will be mined at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainView {
    pub chain: Vec<Block>,
    pub length: usize,
    pub difficulty: u32,
}

pub struct Engine<S: ChainStore> {
    ledger: Ledger<S>,
    mempool: Mempool,
    miner: Miner,
    mining: Mutex<()>,
    config: EngineConfig,
}

impl<S: ChainStore> Engine<S> {
    pub fn open(
        store: Arc<S>,
        difficulty: DifficultyController,
        miner: Miner,
        config: EngineConfig,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            ledger: Ledger::open(store, difficulty)?,
            mempool: Mempool::new(),
            miner,
            mining: Mutex::new(()),
            config,
        })
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub fn submit(&self, tx: Transaction) -> Result<usize, LedgerError> {
        self.mempool.add(tx)
    }

    pub fn mempool(&self) -> Vec<Transaction> {
        self.mempool.snapshot()
    }

    pub fn chain(&self) -> Result<ChainView, LedgerError> {
        let chain = self.ledger.blocks()?;
        let difficulty = self.ledger.difficulty_for_next()?;
        Ok(ChainView {
            length: chain.len(),
            chain,
            difficulty,
        })
    }

    /// Validate a copied snapshot of the live ledger.
    pub fn validate_live(&self) -> Result<ValidationReport, LedgerError> {
        Ok(validate_chain(&self.ledger.blocks()?))
    }

    /// Mine the pending transactions onto the tip.
    ///
    /// The mempool lock is held only for the drain. The drained batch goes back
    /// to the pool if the search is cancelled or the append fails; it is
    /// dropped from the pool only once the block is in the ledger.
    pub fn mine(&self, cancel: &AtomicBool) -> Result<MineOutcome, LedgerError> {
        let _mining = self.mining.lock();

        let tip = self.ledger.tip()?;
        let difficulty = self.ledger.difficulty_for_next()?;
        let reservation = self.mempool.reserve();
        if reservation.is_empty() && !self.config.allow_empty_blocks {
            return Err(LedgerError::EmptyMempool);
        }

        let outcome = self
            .miner
            .mine(&tip, reservation.transactions().to_vec(), difficulty, cancel);
        let block = match outcome {
            MineOutcome::Sealed(block) => block,
            MineOutcome::Cancelled => {
                warn!(index = tip.index + 1, "mining cancelled; transactions returned to mempool");
                return Ok(MineOutcome::Cancelled);
            }
        };

        self.ledger.append(block.clone())?;
        reservation.commit();
        info!(index = block.index, pending = self.mempool.len(), "block committed");
        Ok(MineOutcome::Sealed(block))
    }

    pub fn close(&self) -> Result<(), LedgerError> {
        self.ledger.close()
    }
}

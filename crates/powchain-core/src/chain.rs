use std::sync::Arc;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::{genesis_block, Block, DifficultyController, LedgerError};

/// Trait the storage backends implement for the ledger to operate.
/// This lives in `powchain-core` to avoid a circular dependency.
pub trait ChainStore: Send + Sync {
    fn put_block(&self, block: &Block) -> Result<()>;
    fn get_block(&self, index: u64) -> Result<Option<Block>>;
    /// Index of the tip block; 0 for both an empty store and a genesis-only one.
    fn tip_height(&self) -> Result<u64>;
    /// Every block, genesis first.
    fn blocks(&self) -> Result<Vec<Block>>;
    fn close(&self) -> Result<()>;
}

/// Process-lifetime store used when no data directory is configured.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    blocks: RwLock<Vec<Block>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainStore for InMemoryStore {
    fn put_block(&self, block: &Block) -> Result<()> {
        let mut blocks = self.blocks.write();
        let index = block.index as usize;
        if index < blocks.len() {
            blocks[index] = block.clone();
        } else if index == blocks.len() {
            blocks.push(block.clone());
        } else {
            anyhow::bail!("gap in store: height {} but got index {index}", blocks.len());
        }
        Ok(())
    }

    fn get_block(&self, index: u64) -> Result<Option<Block>> {
        Ok(self.blocks.read().get(index as usize).cloned())
    }

    fn tip_height(&self) -> Result<u64> {
        Ok(self.blocks.read().len().saturating_sub(1) as u64)
    }

    fn blocks(&self) -> Result<Vec<Block>> {
        Ok(self.blocks.read().clone())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Append-only chain from genesis to tip, delegating persistence to a `ChainStore`.
pub struct Ledger<S: ChainStore> {
    store: Arc<S>,
    difficulty: DifficultyController,
    commit: Mutex<()>,
}

impl<S: ChainStore> Ledger<S> {
    /// Open the ledger over `store`, writing the genesis block if the store is empty.
    pub fn open(store: Arc<S>, difficulty: DifficultyController) -> Result<Self, LedgerError> {
        let ledger = Self {
            store,
            difficulty,
            commit: Mutex::new(()),
        };
        ledger.ensure_genesis()?;
        Ok(ledger)
    }

    /// Ensure the hard-coded genesis block exists. Idempotent.
    fn ensure_genesis(&self) -> Result<(), LedgerError> {
        let genesis = genesis_block();
        match self.store.get_block(0)? {
            None => {
                self.store.put_block(&genesis)?;
                info!(hash = %genesis.hash, "wrote genesis block");
                Ok(())
            }
            Some(existing) if existing == genesis => Ok(()),
            Some(_) => Err(LedgerError::ForeignGenesis),
        }
    }

    pub fn tip(&self) -> Result<Block, LedgerError> {
        let height = self.store.tip_height()?;
        self.store
            .get_block(height)?
            .ok_or_else(|| anyhow::anyhow!("tip block {height} missing from store").into())
    }

    pub fn len(&self) -> Result<u64, LedgerError> {
        Ok(self.store.tip_height()? + 1)
    }

    /// A copied view of the chain; later appends do not affect it.
    pub fn blocks(&self) -> Result<Vec<Block>, LedgerError> {
        Ok(self.store.blocks()?)
    }

    pub fn difficulty_for_next(&self) -> Result<u32, LedgerError> {
        Ok(self.difficulty.difficulty_for_next(&self.blocks()?))
    }

    /// The only mutator: `block` must extend the current tip.
    pub fn append(&self, block: Block) -> Result<(), LedgerError> {
        let _commit = self.commit.lock();
        let tip = self.tip()?;
        if block.index != tip.index + 1 || block.previous_hash != tip.hash {
            warn!(
                tip = tip.index,
                got = block.index,
                "rejected block that does not extend the tip"
            );
            return Err(LedgerError::ChainLinkage {
                expected_index: tip.index + 1,
                got_index: block.index,
                expected_previous: tip.hash,
                got_previous: block.previous_hash,
            });
        }
        self.store.put_block(&block)?;
        info!(index = block.index, hash = %block.hash, txs = block.transactions.len(), "appended block");
        Ok(())
    }

    pub fn close(&self) -> Result<(), LedgerError> {
        Ok(self.store.close()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Miner, Transaction};
    use std::sync::atomic::AtomicBool;

    fn ledger() -> Ledger<InMemoryStore> {
        let difficulty = DifficultyController::fixed(1).unwrap();
        Ledger::open(Arc::new(InMemoryStore::new()), difficulty).unwrap()
    }

    fn mine_on(tip: &Block) -> Block {
        Miner::default()
            .mine(tip, vec![Transaction::new("a", "b", 1.0)], 1, &AtomicBool::new(false))
            .into_block()
            .unwrap()
    }

    #[test]
    fn open_writes_genesis_once() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = Ledger::open(store.clone(), DifficultyController::default()).unwrap();
        assert_eq!(ledger.len().unwrap(), 1);
        assert_eq!(ledger.tip().unwrap(), genesis_block());
        let again = Ledger::open(store, DifficultyController::default()).unwrap();
        assert_eq!(again.len().unwrap(), 1);
    }

    #[test]
    fn open_rejects_foreign_genesis() {
        let store = Arc::new(InMemoryStore::new());
        let mut fake = genesis_block();
        fake.timestamp += 1;
        fake.hash = fake.compute_hash();
        store.put_block(&fake).unwrap();
        assert!(matches!(
            Ledger::open(store, DifficultyController::default()),
            Err(LedgerError::ForeignGenesis)
        ));
    }

    #[test]
    fn append_extends_tip() {
        let ledger = ledger();
        let block = mine_on(&ledger.tip().unwrap());
        ledger.append(block.clone()).unwrap();
        assert_eq!(ledger.tip().unwrap(), block);
        assert_eq!(ledger.len().unwrap(), 2);
    }

    #[test]
    fn append_rejects_stale_tip() {
        let ledger = ledger();
        let genesis = ledger.tip().unwrap();
        let first = mine_on(&genesis);
        let racing = mine_on(&genesis);
        ledger.append(first).unwrap();
        assert!(matches!(
            ledger.append(racing),
            Err(LedgerError::ChainLinkage { expected_index: 2, got_index: 1, .. })
        ));
        assert_eq!(ledger.len().unwrap(), 2);
    }

    #[test]
    fn append_rejects_wrong_previous_hash() {
        let ledger = ledger();
        let mut block = mine_on(&ledger.tip().unwrap());
        block.previous_hash = "f".repeat(64);
        assert!(matches!(
            ledger.append(block),
            Err(LedgerError::ChainLinkage { .. })
        ));
    }

    #[test]
    fn blocks_is_a_snapshot() {
        let ledger = ledger();
        let snapshot = ledger.blocks().unwrap();
        ledger.append(mine_on(&ledger.tip().unwrap())).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(ledger.blocks().unwrap().len(), 2);
    }

    #[test]
    fn in_memory_store_rejects_gaps() {
        let store = InMemoryStore::new();
        let mut block = genesis_block();
        block.index = 3;
        assert!(store.put_block(&block).is_err());
    }
}

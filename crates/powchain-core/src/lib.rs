pub mod chain;
pub mod constants;
pub mod difficulty;
pub mod engine;
pub mod error;
pub mod mempool;
pub mod mine;
pub mod validate;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub use chain::{ChainStore, InMemoryStore, Ledger};
pub use difficulty::{DifficultyController, DifficultyPolicy, RetargetParams};
pub use engine::{ChainView, Engine, EngineConfig};
pub use error::LedgerError;
pub use mempool::{Mempool, Reservation};
pub use mine::{MineOutcome, Miner};
pub use validate::{validate_chain, InvalidReason, ValidationReport};

pub type Hash = [u8; 32];

/// A transfer intent between two opaque addresses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transaction {
    pub from: String,
    pub to: String,
    /// Any positive finite number; checked by `Mempool::add`.
    pub amount: f64,
}

impl Transaction {
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: f64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount,
        }
    }

    /// Length-prefixed, fixed field order encoding used for merkle leaves.
    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + self.from.len() + 8 + self.to.len() + 8);
        put_str(&mut bytes, &self.from);
        put_str(&mut bytes, &self.to);
        bytes.extend_from_slice(&self.amount.to_bits().to_le_bytes());
        bytes
    }

    pub fn hash(&self) -> Hash {
        Sha256::digest(self.hash_bytes()).into()
    }
}

/// A hash-sealed block. `hash` covers every field except `difficulty` and itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Block {
    pub index: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub nonce: u64,
    pub difficulty: u32,
    pub hash: String,
}

impl Block {
    /// Recompute the canonical hash from the block's current contents.
    pub fn compute_hash(&self) -> String {
        compute_hash(
            self.index,
            self.timestamp,
            &self.transactions,
            &self.previous_hash,
            self.nonce,
        )
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

fn put_str(bytes: &mut Vec<u8>, s: &str) {
    bytes.extend_from_slice(&(s.len() as u64).to_le_bytes());
    bytes.extend_from_slice(s.as_bytes());
}

/// Hasher state primed with every hashed field except the trailing nonce.
pub fn hash_prefix(
    index: u64,
    timestamp: u64,
    transactions: &[Transaction],
    previous_hash: &str,
) -> Sha256 {
    let mut bytes = Vec::with_capacity(8 + 8 + 8 + 32 + 8 + previous_hash.len());
    bytes.extend_from_slice(&index.to_le_bytes());
    bytes.extend_from_slice(&timestamp.to_le_bytes());
    bytes.extend_from_slice(&(transactions.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&merkle_root(transactions));
    put_str(&mut bytes, previous_hash);

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
}

/// Finish a primed hasher with `nonce`.
pub fn seal_digest(prefix: &Sha256, nonce: u64) -> Hash {
    let mut hasher = prefix.clone();
    hasher.update(nonce.to_le_bytes());
    hasher.finalize().into()
}

/// The canonical block hash shared by the miner and the validator.
pub fn compute_hash(
    index: u64,
    timestamp: u64,
    transactions: &[Transaction],
    previous_hash: &str,
    nonce: u64,
) -> String {
    let prefix = hash_prefix(index, timestamp, transactions, previous_hash);
    hex::encode(seal_digest(&prefix, nonce))
}

pub fn merkle_root(txs: &[Transaction]) -> Hash {
    if txs.is_empty() {
        return [0u8; 32];
    }
    let mut level: Vec<Hash> = txs.iter().map(Transaction::hash).collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let (a, b) = if pair.len() == 2 {
                (pair[0], pair[1])
            } else {
                (pair[0], pair[0])
            };
            let mut hasher = Sha256::new();
            hasher.update(a);
            hasher.update(b);
            next.push(hasher.finalize().into());
        }
        level = next;
    }
    level[0]
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub mod pow {
    use super::Hash;

    /// Leading zero hex characters of a raw digest.
    pub fn count_leading_zero_nibbles(hash: &Hash) -> u32 {
        let mut total = 0u32;
        for b in hash {
            if *b == 0 {
                total += 2;
            } else {
                if *b < 0x10 {
                    total += 1;
                }
                break;
            }
        }
        total
    }

    /// The proof-of-work predicate over a hex digest as stored on a block.
    pub fn meets_difficulty(hash_hex: &str, difficulty: u32) -> bool {
        let zeros = hash_hex.bytes().take_while(|b| *b == b'0').count();
        zeros >= difficulty as usize
    }
}

/// The hard-coded genesis block. Every field is fixed, so its hash is constant.
pub fn genesis_block() -> Block {
    use constants::{GENESIS_PREVIOUS_HASH, GENESIS_TIMESTAMP};

    let hash = compute_hash(0, GENESIS_TIMESTAMP, &[], GENESIS_PREVIOUS_HASH, 0);
    Block {
        index: 0,
        timestamp: GENESIS_TIMESTAMP,
        transactions: vec![],
        previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
        nonce: 0,
        difficulty: 0,
        hash,
    }
}

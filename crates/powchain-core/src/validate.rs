//! Integrity check for arbitrary, possibly hand-edited, chain snapshots.
//!
//! The walk goes strictly left to right and stops at the first failing block,
//! so everything before `first_invalid_index` is known to be intact. Blocks
//! after it are not diagnosed. A broken chain is a verdict, never an error.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{constants::GENESIS_PREVIOUS_HASH, pow::meets_difficulty, Block};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// Stored hash differs from the recomputed one: content edited without re-mining.
    HashMismatch,
    /// Stored hash lacks the leading zeros its difficulty demands.
    InsufficientWork,
    GenesisPreviousHash,
    /// `previous_hash` does not match the predecessor's stored hash.
    BrokenLink,
    /// `index` does not match the block's position.
    IndexMismatch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub first_invalid_index: Option<u64>,
    pub reason: Option<InvalidReason>,
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            first_invalid_index: None,
            reason: None,
        }
    }

    pub fn invalid_at(index: u64, reason: InvalidReason) -> Self {
        Self {
            is_valid: false,
            first_invalid_index: Some(index),
            reason: Some(reason),
        }
    }
}

/// Validate `chain` in position order. An empty chain is vacuously valid.
pub fn validate_chain(chain: &[Block]) -> ValidationReport {
    for (position, block) in chain.iter().enumerate() {
        let previous = position.checked_sub(1).map(|p| &chain[p]);
        if let Some(reason) = check_block(position as u64, block, previous) {
            debug!(position, ?reason, "chain invalid");
            return ValidationReport::invalid_at(position as u64, reason);
        }
    }
    ValidationReport::valid()
}

fn check_block(position: u64, block: &Block, previous: Option<&Block>) -> Option<InvalidReason> {
    if block.compute_hash() != block.hash {
        return Some(InvalidReason::HashMismatch);
    }
    // Genesis is never mined: only its sentinel link is checked.
    let Some(prev) = previous else {
        return (block.previous_hash != GENESIS_PREVIOUS_HASH)
            .then_some(InvalidReason::GenesisPreviousHash);
    };
    if !meets_difficulty(&block.hash, block.difficulty) {
        return Some(InvalidReason::InsufficientWork);
    }
    if block.previous_hash != prev.hash {
        return Some(InvalidReason::BrokenLink);
    }
    if block.index != position {
        return Some(InvalidReason::IndexMismatch);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{genesis_block, Miner, Transaction};
    use std::sync::atomic::AtomicBool;

    fn mined_chain(len: usize) -> Vec<Block> {
        let miner = Miner::default();
        let mut chain = vec![genesis_block()];
        for i in 1..len {
            let txs = vec![Transaction::new(format!("u{i}"), "bob", i as f64 + 0.5)];
            let block = miner
                .mine(&chain[i - 1], txs, 1, &AtomicBool::new(false))
                .into_block()
                .unwrap();
            chain.push(block);
        }
        chain
    }

    #[test]
    fn empty_chain_is_valid() {
        assert_eq!(validate_chain(&[]), ValidationReport::valid());
    }

    #[test]
    fn genesis_only_is_valid() {
        assert_eq!(validate_chain(&[genesis_block()]), ValidationReport::valid());
    }

    #[test]
    fn mined_chain_is_valid() {
        assert_eq!(validate_chain(&mined_chain(4)), ValidationReport::valid());
    }

    #[test]
    fn edited_genesis_is_caught_at_zero() {
        let mut chain = mined_chain(3);
        chain[0].timestamp += 1;
        let report = validate_chain(&chain);
        assert_eq!(report.first_invalid_index, Some(0));
        assert_eq!(report.reason, Some(InvalidReason::HashMismatch));
    }

    #[test]
    fn genesis_with_wrong_sentinel() {
        let mut genesis = genesis_block();
        genesis.previous_hash = "1".into();
        genesis.hash = genesis.compute_hash();
        let report = validate_chain(&[genesis]);
        assert_eq!(
            report,
            ValidationReport::invalid_at(0, InvalidReason::GenesisPreviousHash)
        );
    }

    #[test]
    fn edited_genesis_difficulty_stays_valid() {
        let mut chain = mined_chain(3);
        chain[0].difficulty = 3;
        assert_eq!(validate_chain(&chain), ValidationReport::valid());

        let mut genesis = genesis_block();
        genesis.difficulty = 64;
        assert_eq!(validate_chain(&[genesis]), ValidationReport::valid());
    }

    #[test]
    fn insufficient_work_detected() {
        let mut chain = mined_chain(2);
        // Self-consistent hash but far more work claimed than was done.
        chain[1].difficulty = 64;
        let report = validate_chain(&chain);
        assert_eq!(
            report,
            ValidationReport::invalid_at(1, InvalidReason::InsufficientWork)
        );
    }

    #[test]
    fn stops_at_first_break() {
        let mut chain = mined_chain(4);
        chain[2].transactions[0].amount += 1.0;
        chain[3].nonce += 1;
        let report = validate_chain(&chain);
        assert_eq!(report.first_invalid_index, Some(2));
    }

    #[test]
    fn reordered_blocks_are_caught() {
        let mut chain = mined_chain(4);
        chain.swap(1, 2);
        let report = validate_chain(&chain);
        assert_eq!(report.first_invalid_index, Some(1));
        assert_eq!(report.reason, Some(InvalidReason::BrokenLink));
    }

    #[test]
    fn dropped_block_breaks_link() {
        let mut chain = mined_chain(4);
        chain.remove(1);
        assert_eq!(
            validate_chain(&chain),
            ValidationReport::invalid_at(1, InvalidReason::BrokenLink)
        );
    }

    #[test]
    fn report_serializes_camel_case() {
        let json = serde_json::to_value(ValidationReport::invalid_at(
            2,
            InvalidReason::BrokenLink,
        ))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"isValid": false, "firstInvalidIndex": 2, "reason": "broken_link"})
        );
        let json = serde_json::to_value(ValidationReport::valid()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"isValid": true, "firstInvalidIndex": null, "reason": null})
        );
    }
}

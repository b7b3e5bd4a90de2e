//! Proof-of-work target for the next block.
//!
//! The target is a pure function of the chain history up to the tip. It is
//! stored on every mined block, so validation never needs to consult the
//! controller again.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_INITIAL_DIFFICULTY, DEFAULT_MAX_DIFFICULTY, DEFAULT_MIN_DIFFICULTY,
    DEFAULT_RETARGET_INTERVAL, DEFAULT_TARGET_BLOCK_TIME_MS, MAX_SATISFIABLE_DIFFICULTY,
};
use crate::{Block, LedgerError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetargetParams {
    /// Difficulty of the first mined block.
    pub initial: u32,
    pub min: u32,
    pub max: u32,
    /// Retarget whenever the next index is a multiple of this.
    pub interval: u64,
    pub target_block_time_ms: u64,
}

impl Default for RetargetParams {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL_DIFFICULTY,
            min: DEFAULT_MIN_DIFFICULTY,
            max: DEFAULT_MAX_DIFFICULTY,
            interval: DEFAULT_RETARGET_INTERVAL,
            target_block_time_ms: DEFAULT_TARGET_BLOCK_TIME_MS,
        }
    }
}

impl RetargetParams {
    pub fn check(&self) -> Result<(), LedgerError> {
        let reason = if self.interval == 0 {
            "retarget interval must be at least 1".to_string()
        } else if self.min > self.max {
            format!("min difficulty {} exceeds max {}", self.min, self.max)
        } else if self.max > MAX_SATISFIABLE_DIFFICULTY {
            format!("max difficulty {} exceeds {MAX_SATISFIABLE_DIFFICULTY}", self.max)
        } else if !(self.min..=self.max).contains(&self.initial) {
            format!(
                "initial difficulty {} is outside {}..={}",
                self.initial, self.min, self.max
            )
        } else {
            return Ok(());
        };
        Err(LedgerError::InvalidDifficulty(reason))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum DifficultyPolicy {
    Fixed { difficulty: u32 },
    Retarget(RetargetParams),
}

impl Default for DifficultyPolicy {
    fn default() -> Self {
        Self::Retarget(RetargetParams::default())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DifficultyController {
    policy: DifficultyPolicy,
}

impl DifficultyController {
    /// Fails unless every difficulty the policy can produce is satisfiable and
    /// the retarget window is non-empty.
    pub fn new(policy: DifficultyPolicy) -> Result<Self, LedgerError> {
        match policy {
            DifficultyPolicy::Fixed { difficulty } if difficulty > MAX_SATISFIABLE_DIFFICULTY => {
                return Err(LedgerError::InvalidDifficulty(format!(
                    "difficulty {difficulty} can never be satisfied (max {MAX_SATISFIABLE_DIFFICULTY})"
                )));
            }
            DifficultyPolicy::Fixed { .. } => {}
            DifficultyPolicy::Retarget(params) => params.check()?,
        }
        Ok(Self { policy })
    }

    pub fn fixed(difficulty: u32) -> Result<Self, LedgerError> {
        Self::new(DifficultyPolicy::Fixed { difficulty })
    }

    pub fn policy(&self) -> DifficultyPolicy {
        self.policy
    }

    /// Difficulty for the block that would extend `history`.
    pub fn difficulty_for_next(&self, history: &[Block]) -> u32 {
        match self.policy {
            DifficultyPolicy::Fixed { difficulty } => difficulty,
            DifficultyPolicy::Retarget(params) => retarget(&params, history),
        }
    }
}

fn retarget(params: &RetargetParams, history: &[Block]) -> u32 {
    let Some(tip) = history.last() else {
        return params.initial;
    };
    if tip.is_genesis() {
        return params.initial;
    }

    let current = tip.difficulty.clamp(params.min, params.max);
    let next_index = tip.index + 1;
    if next_index % params.interval != 0 || history.len() as u64 <= params.interval {
        return current;
    }

    // Window start is the block `interval` positions behind the tip.
    let start = &history[history.len() - 1 - params.interval as usize];
    let elapsed = tip.timestamp.saturating_sub(start.timestamp);
    let expected = params.interval.saturating_mul(params.target_block_time_ms);

    let next = if elapsed < expected / 2 {
        current.saturating_add(1)
    } else if elapsed > expected.saturating_mul(2) {
        current.saturating_sub(1)
    } else {
        current
    };
    next.clamp(params.min, params.max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis_block;

    fn chain_with_spacing(len: usize, spacing_ms: u64, difficulty: u32) -> Vec<Block> {
        let mut chain = vec![genesis_block()];
        for i in 1..len {
            let prev = &chain[i - 1];
            chain.push(Block {
                index: i as u64,
                timestamp: prev.timestamp + spacing_ms,
                transactions: vec![],
                previous_hash: prev.hash.clone(),
                nonce: 0,
                difficulty,
                hash: format!("{i:064x}"),
            });
        }
        chain
    }

    #[test]
    fn fixed_policy_ignores_history() {
        let ctl = DifficultyController::fixed(3).unwrap();
        assert_eq!(ctl.difficulty_for_next(&[]), 3);
        assert_eq!(ctl.difficulty_for_next(&chain_with_spacing(9, 1, 5)), 3);
    }

    #[test]
    fn first_block_uses_initial() {
        let ctl = DifficultyController::default();
        assert_eq!(
            ctl.difficulty_for_next(&[genesis_block()]),
            DEFAULT_INITIAL_DIFFICULTY
        );
        assert_eq!(ctl.difficulty_for_next(&[]), DEFAULT_INITIAL_DIFFICULTY);
    }

    #[test]
    fn carries_tip_difficulty_between_retargets() {
        let ctl = DifficultyController::default();
        // next index 3 is not a multiple of 5
        let chain = chain_with_spacing(3, 1, 5);
        assert_eq!(ctl.difficulty_for_next(&chain), 5);
    }

    #[test]
    fn fast_blocks_raise_difficulty() {
        let ctl = DifficultyController::default();
        // tip index 9, next index 10
        let chain = chain_with_spacing(10, 10, 4);
        assert_eq!(ctl.difficulty_for_next(&chain), 5);
    }

    #[test]
    fn slow_blocks_lower_difficulty() {
        let ctl = DifficultyController::default();
        let chain = chain_with_spacing(10, 60_000, 4);
        assert_eq!(ctl.difficulty_for_next(&chain), 3);
    }

    #[test]
    fn on_target_blocks_keep_difficulty() {
        let ctl = DifficultyController::default();
        let chain = chain_with_spacing(10, DEFAULT_TARGET_BLOCK_TIME_MS, 4);
        assert_eq!(ctl.difficulty_for_next(&chain), 4);
    }

    #[test]
    fn retarget_is_clamped() {
        let ctl = DifficultyController::default();
        let fast = chain_with_spacing(10, 1, DEFAULT_MAX_DIFFICULTY);
        assert_eq!(ctl.difficulty_for_next(&fast), DEFAULT_MAX_DIFFICULTY);
        let slow = chain_with_spacing(10, 600_000, DEFAULT_MIN_DIFFICULTY);
        assert_eq!(ctl.difficulty_for_next(&slow), DEFAULT_MIN_DIFFICULTY);
    }

    #[test]
    fn deterministic_for_same_history() {
        let ctl = DifficultyController::default();
        let chain = chain_with_spacing(15, 123, 4);
        assert_eq!(
            ctl.difficulty_for_next(&chain),
            ctl.difficulty_for_next(&chain.clone())
        );
    }

    #[test]
    fn params_check_rejects_bad_ranges() {
        let mut params = RetargetParams::default();
        assert!(params.check().is_ok());
        params.interval = 0;
        assert!(params.check().is_err());
        params = RetargetParams { min: 5, max: 2, ..Default::default() };
        assert!(params.check().is_err());
        params = RetargetParams { max: 65, ..Default::default() };
        assert!(params.check().is_err());
        params = RetargetParams { initial: 9, ..Default::default() };
        assert!(params.check().is_err());
    }

    #[test]
    fn zero_interval_is_rejected_at_construction() {
        let policy = DifficultyPolicy::Retarget(RetargetParams {
            interval: 0,
            ..Default::default()
        });
        assert!(matches!(
            DifficultyController::new(policy),
            Err(LedgerError::InvalidDifficulty(_))
        ));
    }

    #[test]
    fn unsatisfiable_fixed_difficulty_is_rejected() {
        assert!(matches!(
            DifficultyController::fixed(MAX_SATISFIABLE_DIFFICULTY + 1),
            Err(LedgerError::InvalidDifficulty(_))
        ));
        let ctl = DifficultyController::fixed(MAX_SATISFIABLE_DIFFICULTY).unwrap();
        assert_eq!(ctl.difficulty_for_next(&[]), MAX_SATISFIABLE_DIFFICULTY);
    }

    #[test]
    fn checked_retarget_params_never_panic() {
        let params = RetargetParams {
            interval: 1,
            ..Default::default()
        };
        let ctl = DifficultyController::new(DifficultyPolicy::Retarget(params)).unwrap();
        for len in 1..8 {
            let next = ctl.difficulty_for_next(&chain_with_spacing(len, 5, 3));
            assert!((params.min..=params.max).contains(&next));
        }
    }
}

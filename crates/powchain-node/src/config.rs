use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use powchain_core::{
    constants::{
        DEFAULT_INITIAL_DIFFICULTY, DEFAULT_MAX_DIFFICULTY, DEFAULT_MIN_DIFFICULTY,
        DEFAULT_RETARGET_INTERVAL, DEFAULT_TARGET_BLOCK_TIME_MS, NONCES_PER_BATCH,
    },
    DifficultyController, DifficultyPolicy, EngineConfig, Miner, RetargetParams,
};

#[derive(Parser, Debug, Clone)]
#[command(name = "powchain-node", about = "Proof-of-work ledger node")]
pub struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub listen: String,

    /// Data directory for sled; the ledger lives in memory when omitted
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Mine every block at this difficulty instead of retargeting
    #[arg(long)]
    pub difficulty: Option<u32>,

    /// Difficulty of the first mined block
    #[arg(long, default_value_t = DEFAULT_INITIAL_DIFFICULTY)]
    pub initial_difficulty: u32,

    #[arg(long, default_value_t = DEFAULT_MIN_DIFFICULTY)]
    pub min_difficulty: u32,

    #[arg(long, default_value_t = DEFAULT_MAX_DIFFICULTY)]
    pub max_difficulty: u32,

    /// Retarget every N blocks
    #[arg(long, default_value_t = DEFAULT_RETARGET_INTERVAL)]
    pub retarget_interval: u64,

    #[arg(long, default_value_t = DEFAULT_TARGET_BLOCK_TIME_MS)]
    pub target_block_time_ms: u64,

    /// Allow mining a block when the mempool is empty
    #[arg(long)]
    pub allow_empty_blocks: bool,

    /// Cancel a nonce search that runs longer than this
    #[arg(long, default_value_t = 120)]
    pub mine_timeout_secs: u64,

    /// Nonces per parallel search batch
    #[arg(long, default_value_t = NONCES_PER_BATCH)]
    pub batch_size: u64,
}

impl Args {
    pub fn difficulty_controller(&self) -> Result<DifficultyController> {
        if let Some(difficulty) = self.difficulty {
            return Ok(DifficultyController::fixed(difficulty)?);
        }
        let params = RetargetParams {
            initial: self.initial_difficulty,
            min: self.min_difficulty,
            max: self.max_difficulty,
            interval: self.retarget_interval,
            target_block_time_ms: self.target_block_time_ms,
        };
        Ok(DifficultyController::new(DifficultyPolicy::Retarget(params))?)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            allow_empty_blocks: self.allow_empty_blocks,
        }
    }

    pub fn miner(&self) -> Miner {
        Miner::new(self.batch_size)
    }

    pub fn mine_timeout(&self) -> Duration {
        Duration::from_secs(self.mine_timeout_secs)
    }
}

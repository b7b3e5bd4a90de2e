pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;

/// `previous_hash` carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";
/// Fixed genesis timestamp (ms since epoch) so every process derives the same genesis hash.
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000_000;

/// Nonces scanned per parallel batch before the cancel flag is checked again.
pub const NONCES_PER_BATCH: u64 = 1 << 16;

pub const DEFAULT_INITIAL_DIFFICULTY: u32 = 4;
pub const DEFAULT_MIN_DIFFICULTY: u32 = 1;
pub const DEFAULT_MAX_DIFFICULTY: u32 = 6;
pub const DEFAULT_RETARGET_INTERVAL: u64 = 5;
pub const DEFAULT_TARGET_BLOCK_TIME_MS: u64 = 2_000;

/// A hex digest has this many characters, so no difficulty above it is satisfiable.
pub const MAX_SATISFIABLE_DIFFICULTY: u32 = HASH_HEX_SIZE as u32;

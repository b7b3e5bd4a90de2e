use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("mempool is empty; nothing to mine")]
    EmptyMempool,

    #[error(
        "block does not extend the tip: expected index {expected_index} on {expected_previous}, \
         got index {got_index} on {got_previous}"
    )]
    ChainLinkage {
        expected_index: u64,
        got_index: u64,
        expected_previous: String,
        got_previous: String,
    },

    #[error("invalid difficulty settings: {0}")]
    InvalidDifficulty(String),

    #[error("store holds a genesis block that does not match the hard-coded genesis")]
    ForeignGenesis,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn invalid_tx(reason: impl Into<String>) -> Self {
        Self::InvalidTransaction(reason.into())
    }
}

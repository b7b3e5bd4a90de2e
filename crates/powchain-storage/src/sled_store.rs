use anyhow::{Context, Result};
use powchain_core::{Block, ChainStore};
use sled::transaction::{ConflictableTransactionResult, TransactionError};
use sled::{Db, IVec, Transactional, Tree};
use std::path::Path;
use tracing::info;

const TREE_BLOCKS: &str = "blocks";
const KEY_TIP_HEIGHT: &[u8] = b"tip_height";

#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let db = sled::open(path.as_ref())
      .with_context(|| format!("opening sled at {}", path.as_ref().display()))?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    info!(blocks = blocks.len(), "sled store opened");
    Ok(Self { db, blocks })
  }

  /// Drop every block and the tip marker.
  pub fn clear(&self) -> Result<()> {
    self.blocks.clear()?;
    self.db.remove(KEY_TIP_HEIGHT)?;
    self.db.flush()?;
    Ok(())
  }

  fn decode(index: u64, bytes: &IVec) -> Result<Block> {
    bincode::deserialize(bytes).with_context(|| format!("decoding block {index}"))
  }
}

fn decode_height(bytes: &[u8]) -> Option<u64> {
  bytes.try_into().ok().map(u64::from_be_bytes)
}

impl ChainStore for SledStore {
  fn put_block(&self, block: &Block) -> Result<()> {
    let key = block.index.to_be_bytes();
    let bytes = bincode::serialize(block)?;

    // The block and the tip marker land in one transaction across both trees.
    (&self.blocks, &*self.db)
      .transaction(|(blocks, meta)| -> ConflictableTransactionResult<(), ()> {
        blocks.insert(&key[..], bytes.as_slice())?;
        let height = meta
          .get(KEY_TIP_HEIGHT)?
          .as_deref()
          .and_then(decode_height)
          .unwrap_or(0);
        if block.index >= height {
          meta.insert(KEY_TIP_HEIGHT, &key[..])?;
        }
        Ok(())
      })
      .map_err(|err: TransactionError<()>| match err {
        TransactionError::Storage(err) => {
          anyhow::Error::new(err).context(format!("writing block {}", block.index))
        }
        TransactionError::Abort(()) => anyhow::anyhow!("writing block {} aborted", block.index),
      })?;

    self.db.flush()?;
    Ok(())
  }

  fn get_block(&self, index: u64) -> Result<Option<Block>> {
    self
      .blocks
      .get(index.to_be_bytes())?
      .map(|ivec| Self::decode(index, &ivec))
      .transpose()
  }

  fn tip_height(&self) -> Result<u64> {
    let Some(v) = self.db.get(KEY_TIP_HEIGHT)? else {
      return Ok(0);
    };
    decode_height(&v).context("tip height is not 8 bytes")
  }

  fn blocks(&self) -> Result<Vec<Block>> {
    // Big-endian keys iterate in index order.
    self
      .blocks
      .iter()
      .map(|entry| {
        let (key, value) = entry?;
        let index = u64::from_be_bytes(key[..].try_into().context("bad block key")?);
        Self::decode(index, &value)
      })
      .collect()
  }

  fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}

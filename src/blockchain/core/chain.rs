use crate::crypto::content_hash;
use crate::error::{LedgerError, Result};
use serde_json::{json, Value};
use tracing::{debug, error};

use super::validation::{validate_chain, ChainValidity};

/// `previous_hash` carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Payload stored in the genesis block of every ledger.
pub fn genesis_data() -> Value {
    json!({ "type": "genesis", "message": "Genesis Block" })
}

/// Current UTC time in Unix milliseconds.
pub fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub index: u64,
    pub previous_hash: String,
    pub timestamp: u64,
    pub data: Value,
    pub hash: String,
}

impl Block {
    fn new(index: u64, previous_hash: String, timestamp: u64, data: Value) -> Self {
        let hash = content_hash(index, &previous_hash, timestamp, &data);
        Block {
            index,
            previous_hash,
            timestamp,
            data,
            hash,
        }
    }

    /// Recompute the content hash from the block's current field values.
    pub fn compute_hash(&self) -> String {
        content_hash(self.index, &self.previous_hash, self.timestamp, &self.data)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 1 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }
}

/// Append-only, hash-linked sequence of blocks. Positions are 1-based and the
/// chain always holds at least the genesis block.
///
/// Blocks are only reachable through shared references, so nothing outside
/// this type can rewrite history. Callers sharing a ledger between threads
/// must serialize appends (see `api::Node`, which keeps it behind a `RwLock`).
#[derive(Debug, Clone)]
pub struct Ledger {
    blocks: Vec<Block>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Create a ledger holding only the genesis block.
    pub fn new() -> Self {
        let genesis = Block::new(
            1,
            GENESIS_PREVIOUS_HASH.to_string(),
            now_millis(),
            genesis_data(),
        );
        debug!(hash = %genesis.hash, "ledger.genesis");
        Ledger {
            blocks: vec![genesis],
        }
    }

    /// Rebuild a ledger from previously exported blocks. The chain must
    /// validate in full; a tampered or truncated-at-genesis chain is rejected.
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self> {
        if let ChainValidity::InvalidAt { index, fault } = validate_chain(&blocks) {
            error!(index, %fault, "ledger.load.integrity_violation");
            return Err(LedgerError::IntegrityViolation { index, fault });
        }
        Ok(Ledger { blocks })
    }

    /// Append `data` as a new block and return it.
    pub fn append(&mut self, data: Value) -> &Block {
        let block = self.next_block(data);
        self.push(block)
    }

    /// Build the next block and hand it to `commit` before publishing it. If
    /// `commit` fails the chain is left untouched and the error is returned.
    pub fn append_with<F>(&mut self, data: Value, commit: F) -> Result<&Block>
    where
        F: FnOnce(&Block) -> Result<()>,
    {
        let block = self.next_block(data);
        commit(&block)?;
        Ok(self.push(block))
    }

    fn next_block(&self, data: Value) -> Block {
        let last = self.last();
        // Two appends inside one clock tick share a timestamp; never go backwards.
        let timestamp = now_millis().max(last.timestamp);
        Block::new(last.index + 1, last.hash.clone(), timestamp, data)
    }

    fn push(&mut self, block: Block) -> &Block {
        debug!(index = block.index, hash = %block.hash, "ledger.append");
        self.blocks.push(block);
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn last(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    /// Block at 1-based `index`.
    pub fn get(&self, index: u64) -> Option<&Block> {
        let position = usize::try_from(index).ok()?.checked_sub(1)?;
        self.blocks.get(position)
    }

    pub fn validate(&self) -> ChainValidity {
        validate_chain(&self.blocks)
    }

    /// Like [`Ledger::validate`], but reports a broken chain as
    /// [`LedgerError::IntegrityViolation`].
    pub fn ensure_valid(&self) -> Result<()> {
        let validity = self.validate();
        if let ChainValidity::InvalidAt { index, fault } = validity {
            error!(index, %fault, "ledger.integrity_violation");
        }
        validity.into_result()
    }

    /// Owned copy of the full chain, in order.
    pub fn export(&self) -> Vec<Block> {
        self.blocks.clone()
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.blocks)?)
    }

    pub fn import_json(json: &str) -> Result<Self> {
        let blocks: Vec<Block> = serde_json::from_str(json)?;
        Self::from_blocks(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IntegrityFault;

    #[test]
    fn test_genesis_block() {
        let ledger = Ledger::new();
        assert_eq!(ledger.len(), 1);
        let genesis = ledger.genesis();
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.data["type"], "genesis");
        assert_eq!(genesis.data["message"], "Genesis Block");
        assert_eq!(genesis.hash, genesis.compute_hash());
        assert!(genesis.is_genesis());
    }

    #[test]
    fn test_append_links_to_previous() {
        let mut ledger = Ledger::new();
        let prior_hash = ledger.last().hash.clone();
        let prior_timestamp = ledger.last().timestamp;

        let block = ledger.append(json!({"k": "v"})).clone();
        assert_eq!(ledger.len(), 2);
        assert_eq!(block.index, 2);
        assert_eq!(block.previous_hash, prior_hash);
        assert!(block.timestamp >= prior_timestamp);
        assert_eq!(ledger.last(), &block);
    }

    #[test]
    fn test_get_is_one_based() {
        let mut ledger = Ledger::new();
        ledger.append(json!({"n": 2}));
        assert!(ledger.get(0).is_none());
        assert_eq!(ledger.get(1).map(|b| b.index), Some(1));
        assert_eq!(ledger.get(2).map(|b| b.data["n"].clone()), Some(json!(2)));
        assert!(ledger.get(3).is_none());
    }

    #[test]
    fn test_append_with_failed_commit_leaves_chain_unchanged() {
        let mut ledger = Ledger::new();
        let result = ledger.append_with(json!({"k": 1}), |_| {
            Err(LedgerError::DatabaseError("disk full".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(ledger.len(), 1);

        let committed = ledger.append_with(json!({"k": 2}), |_| Ok(())).unwrap().index;
        assert_eq!(committed, 2);
    }

    #[test]
    fn test_json_export_import() {
        let mut ledger = Ledger::new();
        ledger.append(json!({"recordType": "identity", "externalId": "ID1", "score": 0.1}));
        let json = ledger.export_json().unwrap();
        let restored = Ledger::import_json(&json).unwrap();
        assert_eq!(restored.blocks(), ledger.blocks());
    }

    #[test]
    fn test_from_blocks_rejects_tampering() {
        let mut ledger = Ledger::new();
        ledger.append(json!({"a": 1}));
        ledger.append(json!({"b": 2}));

        let mut blocks = ledger.export();
        blocks[1].data = json!({"a": 100});
        let err = Ledger::from_blocks(blocks).unwrap_err();
        assert_eq!(
            err,
            LedgerError::IntegrityViolation {
                index: 2,
                fault: IntegrityFault::HashMismatch
            }
        );
    }

    #[test]
    fn test_from_blocks_rejects_empty() {
        let err = Ledger::from_blocks(Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::IntegrityViolation {
                fault: IntegrityFault::Empty,
                ..
            }
        ));
    }
}

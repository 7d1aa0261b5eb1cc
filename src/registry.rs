//! Identity records on top of the ledger
//!
//! The registry owns a [`Ledger`] and the [`Persistence`] backend its blocks
//! are written to. Identity payloads are appended as ordinary blocks tagged
//! with `recordType = "identity"`, so other payload kinds can share the chain.
//!
//! Registration never checks for an existing `externalId`: a repeated
//! identifier is kept as a later event in the history. [`IdentityRegistry::verify_identity`]
//! returns the first match in chain order, [`IdentityRegistry::identity_history`]
//! returns all of them.

use crate::blockchain::{validate_chain, Block, ChainValidity, Ledger};
use crate::error::{IntegrityFault, LedgerError, Result};
use crate::persistence::{InMemoryPersistence, Persistence};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

/// `recordType` tag carried by identity payloads.
pub const IDENTITY_RECORD_TYPE: &str = "identity";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub record_type: String,
    pub local_id: String,
    pub name: String,
    pub external_id: String,
    /// Stored exactly as supplied; never parsed.
    pub public_key: String,
}

impl IdentityRecord {
    /// Build a record with a fresh `localId`. `name` and `external_id` must
    /// contain something other than whitespace; values are stored untrimmed.
    pub fn new(name: &str, external_id: &str, public_key: &str) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(LedgerError::Validation("name must not be empty".to_string()));
        }
        if external_id.trim().is_empty() {
            return Err(LedgerError::Validation(
                "externalId must not be empty".to_string(),
            ));
        }

        Ok(IdentityRecord {
            record_type: IDENTITY_RECORD_TYPE.to_string(),
            local_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            external_id: external_id.to_string(),
            public_key: public_key.to_string(),
        })
    }

    pub fn to_payload(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Read a block payload as an identity record, or `None` if it is not
    /// tagged `recordType = "identity"`.
    ///
    /// Payloads appended directly to the ledger may be partial. Missing
    /// fields read as empty strings and non-string values keep their JSON
    /// text, so a tagged payload is never skipped.
    pub fn from_payload(data: &Value) -> Option<Self> {
        if !is_identity_payload(data) {
            return None;
        }
        let field = |key: &str| match data.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        Some(IdentityRecord {
            record_type: IDENTITY_RECORD_TYPE.to_string(),
            local_id: field("localId"),
            name: field("name"),
            external_id: field("externalId"),
            public_key: field("publicKey"),
        })
    }
}

fn is_identity_payload(data: &Value) -> bool {
    data.get("recordType").and_then(Value::as_str) == Some(IDENTITY_RECORD_TYPE)
}

/// Match on the raw payload: `externalId` must be a string equal to
/// `external_id`.
fn registers_external_id(data: &Value, external_id: &str) -> bool {
    is_identity_payload(data) && data.get("externalId").and_then(Value::as_str) == Some(external_id)
}

/// An identity record together with the block that holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredIdentity {
    pub block_index: u64,
    pub block_hash: String,
    pub record: IdentityRecord,
}

impl RegisteredIdentity {
    fn from_block(block: &Block) -> Option<Self> {
        IdentityRecord::from_payload(&block.data).map(|record| RegisteredIdentity {
            block_index: block.index,
            block_hash: block.hash.clone(),
            record,
        })
    }
}

pub struct IdentityRegistry {
    ledger: Ledger,
    persistence: Box<dyn Persistence>,
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityRegistry {
    /// Fresh ledger backed by in-memory persistence.
    pub fn new() -> Self {
        let ledger = Ledger::new();
        let persistence = InMemoryPersistence::with_blocks(ledger.export());
        IdentityRegistry {
            ledger,
            persistence: Box::new(persistence),
        }
    }

    /// Load the chain stored in `persistence`, or start (and store) a new one
    /// if it holds no blocks. A stored chain that fails validation is refused.
    pub fn open(persistence: Box<dyn Persistence>) -> Result<Self> {
        let stored = persistence.load_blocks()?;
        let ledger = if stored.is_empty() {
            let ledger = Ledger::new();
            persistence.save_block(ledger.genesis())?;
            info!("Created new ledger with genesis {}", ledger.genesis().hash);
            ledger
        } else {
            let ledger = Ledger::from_blocks(stored)?;
            info!("Loaded ledger with {} blocks", ledger.len());
            ledger
        };

        Ok(IdentityRegistry {
            ledger,
            persistence,
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Append an arbitrary payload. The block is stored before it becomes
    /// visible in the chain.
    pub fn append(&mut self, data: Value) -> Result<Block> {
        let persistence = &self.persistence;
        let block = self
            .ledger
            .append_with(data, |block| persistence.save_block(block))?;
        Ok(block.clone())
    }

    pub fn register_identity(
        &mut self,
        name: &str,
        external_id: &str,
        public_key: &str,
    ) -> Result<RegisteredIdentity> {
        let record = IdentityRecord::new(name, external_id, public_key)?;
        let block = self.append(record.to_payload()?)?;
        info!(
            local_id = %record.local_id,
            block_index = block.index,
            "registry.identity_registered"
        );

        Ok(RegisteredIdentity {
            block_index: block.index,
            block_hash: block.hash,
            record,
        })
    }

    /// First identity record (in chain order) whose `externalId` equals
    /// `external_id` exactly.
    pub fn verify_identity(&self, external_id: &str) -> Option<IdentityRecord> {
        self.find_identity(external_id).map(|found| found.record)
    }

    /// Like [`IdentityRegistry::verify_identity`], keeping the block position.
    /// The scan stops at the first matching block, whatever else its
    /// payload holds.
    pub fn find_identity(&self, external_id: &str) -> Option<RegisteredIdentity> {
        self.ledger
            .blocks()
            .iter()
            .find(|block| registers_external_id(&block.data, external_id))
            .and_then(RegisteredIdentity::from_block)
    }

    /// Every registration of `external_id`, oldest first.
    pub fn identity_history(&self, external_id: &str) -> Vec<RegisteredIdentity> {
        self.ledger
            .blocks()
            .iter()
            .filter(|block| registers_external_id(&block.data, external_id))
            .filter_map(RegisteredIdentity::from_block)
            .collect()
    }

    pub fn identities(&self) -> impl Iterator<Item = RegisteredIdentity> + '_ {
        self.ledger.blocks().iter().filter_map(RegisteredIdentity::from_block)
    }

    /// Validate the in-memory chain, then the stored copy, then check the two
    /// agree block for block.
    pub fn audit(&self) -> Result<ChainValidity> {
        let validity = self.ledger.validate();
        if !validity.is_valid() {
            return Ok(validity);
        }

        let stored = self.persistence.load_blocks()?;
        let stored_validity = validate_chain(&stored);
        if !stored_validity.is_valid() {
            warn!("Stored chain failed validation: {:?}", stored_validity);
            return Ok(stored_validity);
        }

        for (position, block) in (1u64..).zip(self.ledger.blocks()) {
            if stored.get(position as usize - 1) != Some(block) {
                return Ok(ChainValidity::InvalidAt {
                    index: position,
                    fault: IntegrityFault::StoreDivergence,
                });
            }
        }
        if stored.len() > self.ledger.len() {
            return Ok(ChainValidity::InvalidAt {
                index: self.ledger.len() as u64 + 1,
                fault: IntegrityFault::StoreDivergence,
            });
        }

        Ok(ChainValidity::Valid)
    }
}

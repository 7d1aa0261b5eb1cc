use crate::error::{IntegrityFault, LedgerError};

use super::chain::{Block, GENESIS_PREVIOUS_HASH};

/// Outcome of walking a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChainValidity {
    Valid,
    /// `index` is the 1-based position of the first block that failed.
    InvalidAt { index: u64, fault: IntegrityFault },
}

impl ChainValidity {
    pub fn is_valid(&self) -> bool {
        matches!(self, ChainValidity::Valid)
    }

    pub fn into_result(self) -> Result<(), LedgerError> {
        match self {
            ChainValidity::Valid => Ok(()),
            ChainValidity::InvalidAt { index, fault } => {
                Err(LedgerError::IntegrityViolation { index, fault })
            }
        }
    }
}

/// Walk `blocks` from genesis to tip and report the first block that breaks
/// the chain. Per block, in order: stored hash, link to the predecessor,
/// index/position agreement, timestamp ordering.
pub fn validate_chain(blocks: &[Block]) -> ChainValidity {
    if blocks.is_empty() {
        return ChainValidity::InvalidAt {
            index: 1,
            fault: IntegrityFault::Empty,
        };
    }

    let mut previous: Option<&Block> = None;
    for (position, block) in (1u64..).zip(blocks) {
        let fault = if block.compute_hash() != block.hash {
            Some(IntegrityFault::HashMismatch)
        } else if block.previous_hash != previous.map_or(GENESIS_PREVIOUS_HASH, |p| p.hash.as_str()) {
            Some(IntegrityFault::BrokenLink)
        } else if block.index != position {
            Some(IntegrityFault::IndexMismatch)
        } else if previous.is_some_and(|p| block.timestamp < p.timestamp) {
            Some(IntegrityFault::TimestampRegression)
        } else {
            None
        };

        if let Some(fault) = fault {
            return ChainValidity::InvalidAt {
                index: position,
                fault,
            };
        }
        previous = Some(block);
    }

    ChainValidity::Valid
}

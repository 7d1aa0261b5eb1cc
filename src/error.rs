//! Error types for the identity ledger

use std::fmt;

/// The specific check that failed when a chain does not validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityFault {
    /// Stored hash differs from the recomputed content hash.
    HashMismatch,
    /// `previous_hash` does not match the preceding block (or the genesis sentinel).
    BrokenLink,
    /// Stored index differs from the block's position in the chain.
    IndexMismatch,
    /// Timestamp is earlier than the preceding block's.
    TimestampRegression,
    /// The chain has no genesis block.
    Empty,
    /// The persisted copy of a block differs from the in-memory chain.
    StoreDivergence,
}

impl fmt::Display for IntegrityFault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IntegrityFault::HashMismatch => write!(f, "stored hash does not match recomputed hash"),
            IntegrityFault::BrokenLink => write!(f, "previous_hash does not link to the preceding block"),
            IntegrityFault::IndexMismatch => write!(f, "block index does not match its chain position"),
            IntegrityFault::TimestampRegression => write!(f, "timestamp is earlier than the preceding block"),
            IntegrityFault::Empty => write!(f, "chain has no genesis block"),
            IntegrityFault::StoreDivergence => write!(f, "persisted block differs from the in-memory chain"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    Validation(String),
    IntegrityViolation { index: u64, fault: IntegrityFault },
    DatabaseError(String),
    SerializationError(String),
    IoError(String),
    ConfigError(String),
    CryptoError(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LedgerError::Validation(msg) => write!(f, "Validation error: {}", msg),
            LedgerError::IntegrityViolation { index, fault } => {
                write!(f, "Integrity violation at block {}: {}", index, fault)
            }
            LedgerError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            LedgerError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            LedgerError::IoError(msg) => write!(f, "IO error: {}", msg),
            LedgerError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            LedgerError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::SerializationError(err.to_string())
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::DatabaseError(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;

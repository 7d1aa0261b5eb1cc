//! Database persistence layer for the identity ledger

use crate::blockchain::Block;
use crate::error::LedgerError;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Abstraction for persistence backends. Blocks are written once, in chain
/// order, and never updated.
pub trait Persistence: Send + Sync {
    fn save_block(&self, block: &Block) -> Result<(), LedgerError>;
    /// All stored blocks, ordered by index.
    fn load_blocks(&self) -> Result<Vec<Block>, LedgerError>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the SQLite database at `path`. `":memory:"` opens a
    /// private in-memory database.
    pub fn open(path: &str) -> Result<Self, LedgerError> {
        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        LedgerError::DatabaseError(format!(
                            "Failed to create data dir {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| LedgerError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                idx INTEGER PRIMARY KEY,
                previous_hash TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                data TEXT NOT NULL,
                hash TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| LedgerError::DatabaseError(format!("Failed to create blocks table: {}", e)))?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    pub fn save_block(&self, block: &Block) -> Result<(), LedgerError> {
        let data_json = serde_json::to_string(&block.data).map_err(|e| {
            LedgerError::DatabaseError(format!("Failed to serialize block data: {}", e))
        })?;
        let timestamp = i64::try_from(block.timestamp).map_err(|_| {
            LedgerError::DatabaseError(format!("Timestamp {} out of range", block.timestamp))
        })?;

        let conn = self
            .conn
            .lock()
            .map_err(|_| LedgerError::DatabaseError("Mutex poisoned".to_string()))?;
        // Plain INSERT: an existing index is never overwritten.
        conn.execute(
            "INSERT INTO blocks (idx, previous_hash, timestamp, data, hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                block.index as i64,
                block.previous_hash,
                timestamp,
                data_json,
                block.hash,
            ],
        )
        .map_err(|e| {
            LedgerError::DatabaseError(format!("Failed to save block {}: {}", block.index, e))
        })?;

        Ok(())
    }

    pub fn load_blocks(&self) -> Result<Vec<Block>, LedgerError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| LedgerError::DatabaseError("Mutex poisoned".to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT idx, previous_hash, timestamp, data, hash
                 FROM blocks ORDER BY idx ASC",
            )
            .map_err(|e| LedgerError::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let index: i64 = row.get(0)?;
                let previous_hash: String = row.get(1)?;
                let timestamp: i64 = row.get(2)?;
                let data_json: String = row.get(3)?;
                let hash: String = row.get(4)?;
                Ok((index, previous_hash, timestamp, data_json, hash))
            })
            .map_err(|e| LedgerError::DatabaseError(format!("Failed to query blocks: {}", e)))?;

        let mut blocks = Vec::new();
        for row_result in rows {
            let (index, previous_hash, timestamp, data_json, hash) = row_result
                .map_err(|e| LedgerError::DatabaseError(format!("Failed to read row: {}", e)))?;

            let data = serde_json::from_str(&data_json).map_err(|e| {
                LedgerError::DatabaseError(format!(
                    "Failed to deserialize data of block {}: {}",
                    index, e
                ))
            })?;

            blocks.push(Block {
                index: index as u64,
                previous_hash,
                timestamp: timestamp as u64,
                data,
                hash,
            });
        }

        Ok(blocks)
    }

    pub fn block_count(&self) -> Result<u64, LedgerError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| LedgerError::DatabaseError("Mutex poisoned".to_string()))?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))
            .map_err(|e| LedgerError::DatabaseError(format!("Failed to count blocks: {}", e)))?;
        Ok(count as u64)
    }
}

impl Persistence for Database {
    fn save_block(&self, block: &Block) -> Result<(), LedgerError> {
        Database::save_block(self, block)
    }

    fn load_blocks(&self) -> Result<Vec<Block>, LedgerError> {
        Database::load_blocks(self)
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    pub blocks: Arc<Mutex<Vec<Block>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        Self {
            blocks: Arc::new(Mutex::new(blocks)),
        }
    }
}

impl Persistence for InMemoryPersistence {
    fn save_block(&self, block: &Block) -> Result<(), LedgerError> {
        let mut blocks = self
            .blocks
            .lock()
            .map_err(|_| LedgerError::DatabaseError("Mutex poisoned".to_string()))?;
        if blocks.iter().any(|b| b.index == block.index) {
            return Err(LedgerError::DatabaseError(format!(
                "Block {} already stored",
                block.index
            )));
        }
        blocks.push(block.clone());
        Ok(())
    }

    fn load_blocks(&self) -> Result<Vec<Block>, LedgerError> {
        let blocks = self
            .blocks
            .lock()
            .map_err(|_| LedgerError::DatabaseError("Mutex poisoned".to_string()))?;
        let mut blocks = blocks.clone();
        blocks.sort_by_key(|b| b.index);
        Ok(blocks)
    }
}

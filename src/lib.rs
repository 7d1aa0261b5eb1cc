//! Identity Ledger - an append-only, tamper-evident ledger for identity records
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, the hash-linked chain and chain validation
//! - [`registry`] - Identity records appended to and looked up in the chain
//!
//! ## Cryptography
//! - [`crypto`] - Canonical JSON, SHA-256 content hashes and secp256k1 key material
//!
//! ## State Management
//! - [`persistence`] - Block storage backends (SQLite, in-memory)
//!
//! ## Integration
//! - [`api`] - REST API (axum)
//! - [`node`] - Node orchestrator: loading, periodic audits, serving the API
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`cli`] - CLI utilities

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod registry;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;
pub mod node;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod cli;
pub mod config;
pub mod error;

pub use blockchain::{Block, ChainValidity, Ledger};
pub use error::{IntegrityFault, LedgerError, Result};
pub use registry::{IdentityRecord, IdentityRegistry, RegisteredIdentity};

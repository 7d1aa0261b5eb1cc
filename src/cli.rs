//! Shared helpers for the command-line binaries

use crate::config::{load_config, load_config_from, Config};
use crate::error::LedgerError;
use crate::persistence::Database;
use crate::registry::IdentityRegistry;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` wins over `default_level`.
/// Calling it twice is harmless.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load configuration from `path`, or `config.toml` when `None`.
pub fn load_config_at(path: Option<&Path>) -> Result<Config, LedgerError> {
    match path {
        Some(p) => load_config_from(p),
        None => load_config(),
    }
}

/// Open the registry stored in the configured SQLite database.
pub fn open_registry(config: &Config) -> Result<IdentityRegistry, LedgerError> {
    let db = Database::open(&config.database.path)?;
    IdentityRegistry::open(Box::new(db))
}

/// Shorten a 64-char hash for table display.
pub fn short_hash(hash: &str) -> String {
    if hash.len() > 16 {
        format!("{}...{}", &hash[..8], &hash[hash.len() - 8..])
    } else {
        hash.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("0"), "0");
        let hash = "a".repeat(56) + "bbbbbbbb";
        assert_eq!(short_hash(&hash), "aaaaaaaa...bbbbbbbb");
    }

    #[test]
    fn test_open_registry_reopens_same_chain() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("nested/ledger.db").to_string_lossy().into_owned();

        let genesis_hash = {
            let mut registry = open_registry(&config).unwrap();
            registry.register_identity("Alice", "ID12345", "k").unwrap();
            registry.ledger().genesis().hash.clone()
        };

        let registry = open_registry(&config).unwrap();
        assert_eq!(registry.ledger().len(), 2);
        assert_eq!(registry.ledger().genesis().hash, genesis_hash);
        assert!(registry.verify_identity("ID12345").is_some());
    }
}

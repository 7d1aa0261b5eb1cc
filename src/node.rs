use crate::blockchain::ChainValidity;
use crate::config::Config;
use crate::error::LedgerError;
use crate::persistence::{Database, InMemoryPersistence, Persistence};
use crate::registry::IdentityRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Booting,
    Ready,
    /// An integrity audit failed. Reads keep working; appends are refused.
    Degraded,
}

/// Long-running process that owns the registry, audits it periodically and
/// serves the HTTP API.
pub struct LedgerNode {
    pub config: Config,
    pub registry: Arc<RwLock<IdentityRegistry>>,
    pub state: Arc<RwLock<NodeState>>,
}

impl LedgerNode {
    /// Open persistence and load the chain. A stored chain that fails
    /// validation aborts startup.
    pub fn init(config: Config) -> Result<Self, LedgerError> {
        info!("Starting identity ledger node (database = {})", config.database.path);

        let persistence: Box<dyn Persistence> = match Database::open(&config.database.path) {
            Ok(db) => Box::new(db),
            Err(e) => {
                warn!(
                    "Failed to open DB at {}: {}. Falling back to in-memory persistence.",
                    config.database.path, e
                );
                Box::new(InMemoryPersistence::new())
            }
        };

        let registry = IdentityRegistry::open(persistence).map_err(|e| {
            error!("Refusing to start: {}", e);
            e
        })?;

        Ok(Self::with_registry(config, registry))
    }

    pub fn with_registry(config: Config, registry: IdentityRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(RwLock::new(registry)),
            state: Arc::new(RwLock::new(NodeState::Booting)),
        }
    }

    /// Run one audit and update the node state. Returns the audit outcome.
    pub async fn audit_once(&self) -> Result<ChainValidity, LedgerError> {
        // Read guard held until the state is updated.
        let registry = self.registry.read().await;
        let validity = registry.audit()?;
        let mut state = self.state.write().await;
        match validity {
            ChainValidity::Valid => {
                if *state == NodeState::Booting {
                    *state = NodeState::Ready;
                }
            }
            ChainValidity::InvalidAt { index, fault } => {
                error!(index, %fault, "node.audit.integrity_violation");
                *state = NodeState::Degraded;
            }
        }
        Ok(validity)
    }

    pub async fn start(self: Arc<Self>) -> Result<(), LedgerError> {
        let addr = self.config.api.socket_addr()?;

        self.audit_once().await?;
        info!(
            "Node ready: chain length = {}",
            self.registry.read().await.ledger().len()
        );

        let interval_secs = self.config.ledger.audit_interval_secs;
        if interval_secs > 0 {
            let node = self.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(e) = node.audit_once().await {
                        warn!("Integrity audit could not run: {}", e);
                    }
                }
            });
        }

        Self::start_api(self, addr).await
    }

    #[cfg(feature = "api")]
    async fn start_api(node: Arc<Self>, addr: std::net::SocketAddr) -> Result<(), LedgerError> {
        let api_node = crate::api::Node::new_shared(node.registry.clone(), Some(node.state.clone()));
        crate::api::run_api_server(Arc::new(api_node), addr).await
    }

    #[cfg(not(feature = "api"))]
    async fn start_api(_node: Arc<Self>, _addr: std::net::SocketAddr) -> Result<(), LedgerError> {
        Err(LedgerError::ConfigError(
            "API feature not enabled in this build".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IntegrityFault;

    #[tokio::test]
    async fn test_audit_moves_booting_to_ready() {
        let node = LedgerNode::with_registry(Config::default(), IdentityRegistry::new());
        assert_eq!(*node.state.read().await, NodeState::Booting);

        let validity = node.audit_once().await.unwrap();
        assert!(validity.is_valid());
        assert_eq!(*node.state.read().await, NodeState::Ready);
    }

    #[tokio::test]
    async fn test_audit_failure_degrades_node() {
        let store = InMemoryPersistence::new();
        let mut registry = IdentityRegistry::open(Box::new(store.clone())).unwrap();
        registry.register_identity("Alice", "ID12345", "k").unwrap();
        let node = LedgerNode::with_registry(Config::default(), registry);

        store.blocks.lock().unwrap()[1].data["name"] = serde_json::json!("Mallory");

        let validity = node.audit_once().await.unwrap();
        assert_eq!(
            validity,
            ChainValidity::InvalidAt {
                index: 2,
                fault: IntegrityFault::HashMismatch
            }
        );
        assert_eq!(*node.state.read().await, NodeState::Degraded);
    }
}

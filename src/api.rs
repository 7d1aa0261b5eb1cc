//! REST API server for the identity ledger
//!
//! Exposes registration, verification and audit endpoints over a shared
//! [`IdentityRegistry`]. The registry sits behind a `tokio::sync::RwLock`:
//! every write handler holds the write guard for the whole append, and reads
//! share the read guard, so two appends can never link to the same tip.

use axum::{
    extract::{Path, Query, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::blockchain::{Block, ChainValidity};
use crate::crypto::KeyPair;
use crate::error::LedgerError;
use crate::node::NodeState;
use crate::registry::{IdentityRegistry, RegisteredIdentity};

/// Largest page `GET /api/ledger/blocks` will return.
const MAX_PAGE_SIZE: u64 = 100;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct Node {
    pub registry: Arc<RwLock<IdentityRegistry>>,
    // Optional orchestrator state for health checks and write gating
    pub state: Option<Arc<RwLock<NodeState>>>,
    api_stats: Arc<RwLock<ApiStats>>,
}

/// API statistics and monitoring
#[derive(Debug, Default)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    identities_registered: u64,
    records_appended: u64,
    verifications: u64,
    start_time: Option<Instant>,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

impl Node {
    pub fn new(registry: IdentityRegistry) -> Self {
        Self::new_shared(Arc::new(RwLock::new(registry)), None)
    }

    /// Build an API node over a registry owned by the `LedgerNode`
    /// orchestrator, so both observe the same chain and node state.
    pub fn new_shared(
        registry: Arc<RwLock<IdentityRegistry>>,
        state: Option<Arc<RwLock<NodeState>>>,
    ) -> Self {
        Self {
            registry,
            state,
            api_stats: Arc::new(RwLock::new(ApiStats::new())),
        }
    }

    pub async fn get_stats(&self) -> ApiStatsResponse {
        let stats = self.api_stats.read().await;
        let uptime = stats.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0);

        ApiStatsResponse {
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests,
            failed_requests: stats.failed_requests,
            identities_registered: stats.identities_registered,
            records_appended: stats.records_appended,
            verifications: stats.verifications,
            uptime_seconds: uptime,
            chain_length: self.registry.read().await.ledger().len() as u64,
        }
    }

    async fn node_state(&self) -> Option<NodeState> {
        match &self.state {
            Some(s) => Some(s.read().await.clone()),
            None => None,
        }
    }

    /// Refuse appends once the orchestrator has flagged the chain. Callers
    /// hold the registry write guard while checking, so an audit cannot
    /// degrade the node between the check and the append.
    async fn ensure_writable(&self) -> Result<(), ApiError> {
        match self.node_state().await {
            Some(NodeState::Degraded) => Err(ApiError::Unavailable(
                "Ledger failed an integrity audit; appends are disabled".to_string(),
            )),
            _ => Ok(()),
        }
    }

    async fn mark_degraded(&self) {
        if let Some(s) = &self.state {
            *s.write().await = NodeState::Degraded;
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    NotFound(String),
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Ledger(e) => {
                let status = match &e {
                    LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
                    LedgerError::IntegrityViolation { .. } => StatusCode::CONFLICT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterIdentityRequest {
    pub name: String,
    pub external_id: String,
    #[serde(default)]
    pub public_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityHistoryResponse {
    pub external_id: String,
    pub count: usize,
    pub registrations: Vec<RegisteredIdentity>,
}

#[derive(Serialize)]
pub struct ApiStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub identities_registered: u64,
    pub records_appended: u64,
    pub verifications: u64,
    pub uptime_seconds: u64,
    pub chain_length: u64,
}

#[derive(Serialize)]
struct KeyPairResponse {
    public_key: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct PaginationQuery {
    #[serde(default = "default_page")]
    page: u64,
    #[serde(default = "default_limit")]
    limit: u64,
}

fn default_page() -> u64 {
    0
}
fn default_limit() -> u64 {
    10
}

// ============================================================================
// Middleware
// ============================================================================

async fn stats_middleware(State(node): State<Arc<Node>>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    let mut stats = node.api_stats.write().await;
    stats.record_request(success);

    response
}

/// Logs method, path, status and duration of every request.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints nested under `/api`.
pub fn build_api_router(node: Arc<Node>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    let api_routes = Router::new()
        // Ledger endpoints
        .route("/ledger/height", get(get_ledger_height))
        .route("/ledger/blocks", get(get_blocks))
        .route("/ledger/block/:index", get(get_block_by_index))
        .route("/ledger/export", get(export_ledger))
        .route("/ledger/validate", get(validate_ledger))
        .route("/ledger/append", post(append_record))
        // Identity endpoints
        .route("/identity", post(register_identity))
        .route("/identity/keypair", post(create_keypair))
        .route("/identity/:external_id", get(verify_identity))
        .route("/identity/:external_id/history", get(identity_history))
        // System endpoints
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats))
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn_with_state(node.clone(), stats_middleware))
        .with_state(node);

    Router::new().nest("/api", api_routes).layer(cors)
}

pub async fn run_api_server(node: Arc<Node>, addr: SocketAddr) -> Result<(), LedgerError> {
    let app = build_api_router(node);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let chain_length = node.registry.read().await.ledger().len();
    let state = node.node_state().await;
    let (status, label) = match state {
        None | Some(NodeState::Ready) => (StatusCode::OK, "healthy"),
        Some(_) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };
    let node_state = state
        .map(|s| format!("{:?}", s))
        .unwrap_or_else(|| "unknown".to_string());

    (
        status,
        Json(serde_json::json!({
            "status": label,
            "node_state": node_state,
            "chain_length": chain_length,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

async fn get_ledger_height(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let registry = node.registry.read().await;
    Json(registry.ledger().len() as u64)
}

/// Newest blocks first.
async fn get_blocks(
    State(node): State<Arc<Node>>,
    Query(params): Query<PaginationQuery>,
) -> impl IntoResponse {
    let registry = node.registry.read().await;
    let blocks = registry.ledger().blocks();
    let total = blocks.len();

    let limit = params.limit.min(MAX_PAGE_SIZE);
    let offset = params.page.saturating_mul(limit);

    let page: Vec<&Block> = blocks
        .iter()
        .rev()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(limit as usize)
        .collect();

    Json(serde_json::json!({
        "blocks": page,
        "total": total,
        "page": params.page,
        "limit": limit
    }))
}

async fn get_block_by_index(
    State(node): State<Arc<Node>>,
    Path(index): Path<u64>,
) -> Result<Json<Block>, ApiError> {
    let registry = node.registry.read().await;

    registry
        .ledger()
        .get(index)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("Block {} not found", index)))
        .map(Json)
}

async fn export_ledger(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let registry = node.registry.read().await;
    Json(registry.ledger().export())
}

async fn validate_ledger(State(node): State<Arc<Node>>) -> Result<Json<ChainValidity>, ApiError> {
    let registry = node.registry.read().await;
    let validity = registry.audit()?;
    if let ChainValidity::InvalidAt { index, fault } = validity {
        tracing::error!(index, %fault, "api.validate.integrity_violation");
        node.mark_degraded().await;
    }
    drop(registry);
    Ok(Json(validity))
}

async fn append_record(
    State(node): State<Arc<Node>>,
    Json(data): Json<Value>,
) -> Result<(StatusCode, Json<Block>), ApiError> {
    let mut registry = node.registry.write().await;
    node.ensure_writable().await?;
    let block = registry.append(data)?;
    drop(registry);
    node.api_stats.write().await.records_appended += 1;
    Ok((StatusCode::CREATED, Json(block)))
}

async fn register_identity(
    State(node): State<Arc<Node>>,
    Json(req): Json<RegisterIdentityRequest>,
) -> Result<(StatusCode, Json<RegisteredIdentity>), ApiError> {
    let mut registry = node.registry.write().await;
    node.ensure_writable().await?;
    let registered = registry.register_identity(&req.name, &req.external_id, &req.public_key)?;
    drop(registry);
    node.api_stats.write().await.identities_registered += 1;
    Ok((StatusCode::CREATED, Json(registered)))
}

async fn verify_identity(
    State(node): State<Arc<Node>>,
    Path(external_id): Path<String>,
) -> Result<Json<RegisteredIdentity>, ApiError> {
    node.api_stats.write().await.verifications += 1;
    let registry = node.registry.read().await;
    registry
        .find_identity(&external_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No identity registered for {}", external_id)))
}

async fn identity_history(
    State(node): State<Arc<Node>>,
    Path(external_id): Path<String>,
) -> impl IntoResponse {
    let registrations = node.registry.read().await.identity_history(&external_id);
    Json(IdentityHistoryResponse {
        count: registrations.len(),
        external_id,
        registrations,
    })
}

async fn create_keypair() -> impl IntoResponse {
    let keypair = KeyPair::generate();
    Json(KeyPairResponse {
        public_key: keypair.public_key_hex(),
        secret_key: keypair.secret_key_hex(),
    })
}

async fn get_api_stats(State(node): State<Arc<Node>>) -> impl IntoResponse {
    Json(node.get_stats().await)
}

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use powchain_core::{
    validate_chain, Block, ChainStore, ChainView, Engine, LedgerError, MineOutcome, Transaction,
    ValidationReport,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

pub struct AppState<S: ChainStore> {
    pub engine: Arc<Engine<S>>,
    pub mine_timeout: Duration,
}

impl<S: ChainStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            mine_timeout: self.mine_timeout,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    Rejected(JsonRejection),
    Cancelled,
    Internal(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(rejection)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Ledger(err) => {
                let status = match &err {
                    LedgerError::InvalidTransaction(_) | LedgerError::EmptyMempool => {
                        StatusCode::BAD_REQUEST
                    }
                    LedgerError::ChainLinkage { .. } => StatusCode::CONFLICT,
                    LedgerError::InvalidDifficulty(_)
                    | LedgerError::ForeignGenesis
                    | LedgerError::Storage(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, json!({ "error": err.to_string() }))
            }
            ApiError::Rejected(rejection) => {
                (rejection.status(), json!({ "error": rejection.body_text() }))
            }
            ApiError::Cancelled => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "mining cancelled before a block was sealed", "cancelled": true }),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize, Deserialize)]
pub struct MempoolResponse {
    pub transactions: Vec<Transaction>,
    pub size: usize,
}

#[derive(Serialize, Deserialize)]
pub struct TxAccepted {
    pub accepted: bool,
    pub tx: Transaction,
    pub pending: usize,
}

#[derive(Serialize, Deserialize)]
pub struct MineResponse {
    pub block: Block,
    #[serde(flatten)]
    pub view: ChainView,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateRequest {
    pub chain: Vec<Block>,
}

/// Sets the cancel flag when the request future is dropped, e.g. on client disconnect.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

pub fn router<S: ChainStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/chain", get(get_chain::<S>))
        .route(
            "/chain/validate",
            get(validate_live::<S>).post(validate_snapshot),
        )
        .route("/mempool", get(get_mempool::<S>))
        .route("/tx", post(submit_tx::<S>))
        .route("/mine", post(mine::<S>))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_chain<S: ChainStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<ChainView>, ApiError> {
    Ok(Json(state.engine.chain()?))
}

async fn get_mempool<S: ChainStore + 'static>(
    State(state): State<AppState<S>>,
) -> Json<MempoolResponse> {
    let transactions = state.engine.mempool();
    Json(MempoolResponse {
        size: transactions.len(),
        transactions,
    })
}

async fn submit_tx<S: ChainStore + 'static>(
    State(state): State<AppState<S>>,
    payload: Result<Json<Transaction>, JsonRejection>,
) -> Result<(StatusCode, Json<TxAccepted>), ApiError> {
    let Json(tx) = payload?;
    let pending = state.engine.submit(tx.clone())?;
    Ok((
        StatusCode::CREATED,
        Json(TxAccepted {
            accepted: true,
            tx,
            pending,
        }),
    ))
}

async fn mine<S: ChainStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<(StatusCode, Json<MineResponse>), ApiError> {
    let cancel = Arc::new(AtomicBool::new(false));
    let _cancel_on_drop = CancelOnDrop(Arc::clone(&cancel));

    let engine = Arc::clone(&state.engine);
    let flag = Arc::clone(&cancel);
    let mut search = tokio::task::spawn_blocking(move || engine.mine(&flag));

    let joined = match tokio::time::timeout(state.mine_timeout, &mut search).await {
        Ok(joined) => joined,
        Err(_) => {
            warn!(timeout = ?state.mine_timeout, "nonce search timed out; cancelling");
            cancel.store(true, Ordering::Relaxed);
            search.await
        }
    };
    let outcome = joined.map_err(|e| ApiError::Internal(format!("mining task failed: {e}")))??;

    match outcome {
        MineOutcome::Sealed(block) => {
            info!(index = block.index, "served mined block");
            let view = state.engine.chain()?;
            Ok((StatusCode::CREATED, Json(MineResponse { block, view })))
        }
        MineOutcome::Cancelled => Err(ApiError::Cancelled),
    }
}

async fn validate_snapshot(
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<ValidationReport>, ApiError> {
    let Json(request) = payload?;
    let report = validate_chain(&request.chain);
    debug!(blocks = request.chain.len(), ?report, "validated submitted chain");
    Ok(Json(report))
}

async fn validate_live<S: ChainStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<ValidationReport>, ApiError> {
    Ok(Json(state.engine.validate_live()?))
}

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use batch_pipeline_common::{
    message::{ProverTaskSchema, SubmitProofMessage},
    status::ProofType,
};
use serde::{Deserialize, Serialize};

use crate::{
    collector::{BatchProverTask, ChunkProverTask, CollectError, ProverTaskCollector},
    context::ProverContext,
    proof_receiver::{ProofReceiver, SubmitError},
};

pub const PUBLIC_KEY_HEADER: &str = "x-prover-public-key";
pub const PROVER_NAME_HEADER: &str = "x-prover-name";

#[derive(Clone)]
pub struct AppState {
    chunk_collector: Arc<ChunkProverTask>,
    batch_collector: Arc<BatchProverTask>,
    proof_receiver: Arc<ProofReceiver>,
}

impl AppState {
    pub fn new(
        chunk_collector: ChunkProverTask,
        batch_collector: BatchProverTask,
        proof_receiver: ProofReceiver,
    ) -> Self {
        Self {
            chunk_collector: Arc::new(chunk_collector),
            batch_collector: Arc::new(batch_collector),
            proof_receiver: Arc::new(proof_receiver),
        }
    }

    fn collector(&self, proof_type: ProofType) -> &dyn ProverTaskCollector {
        match proof_type {
            ProofType::Chunk => self.chunk_collector.as_ref(),
            ProofType::Batch => self.batch_collector.as_ref(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/coordinator/v1/get_task", post(get_task))
        .route("/coordinator/v1/submit_proof", post(submit_proof))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTaskRequest {
    pub task_type: u8,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub errcode: i32,
    pub errmsg: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn ok(data: Option<T>) -> Self {
        Self {
            errcode: 0,
            errmsg: String::new(),
            data,
        }
    }
}

pub enum ApiError {
    Collect(CollectError),
    Submit(SubmitError),
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, errmsg) = match self {
            ApiError::Collect(e) => {
                let status = match e {
                    CollectError::MissingIdentity(_) => StatusCode::UNAUTHORIZED,
                    CollectError::AttemptsExceeded(..) => StatusCode::BAD_REQUEST,
                    CollectError::DataIntegrity { .. }
                    | CollectError::Encode(_)
                    | CollectError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            ApiError::Submit(e) => {
                let status = match e {
                    SubmitError::MissingIdentity(_) => StatusCode::UNAUTHORIZED,
                    SubmitError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, e.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = ApiResponse::<()> {
            errcode: i32::from(status.as_u16()),
            errmsg,
            data: None,
        };
        (status, Json(body)).into_response()
    }
}

/// Reads the prover identity set by the authenticating proxy.
pub fn prover_context(headers: &HeaderMap) -> ProverContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    ProverContext {
        public_key: header(PUBLIC_KEY_HEADER),
        prover_name: header(PROVER_NAME_HEADER),
    }
}

async fn get_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GetTaskRequest>,
) -> Result<Json<ApiResponse<ProverTaskSchema>>, ApiError> {
    let proof_type =
        ProofType::try_from(req.task_type).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let ctx = prover_context(&headers);

    let collector = state.collector(proof_type);
    let task = collector.collect(&ctx).await.map_err(|e| {
        tracing::error!("Failed to collect {} task: {}", collector.proof_type(), e);
        ApiError::Collect(e)
    })?;

    Ok(Json(ApiResponse::ok(task)))
}

async fn submit_proof(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(msg): Json<SubmitProofMessage>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let ctx = prover_context(&headers);
    let task_id = msg.task_id.clone();

    state
        .proof_receiver
        .submit_proof(&ctx, msg)
        .await
        .map_err(|e| {
            tracing::error!("Failed to handle proof for task {}: {}", task_id, e);
            ApiError::Submit(e)
        })?;

    Ok(Json(ApiResponse::ok(None)))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn context_is_read_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(PUBLIC_KEY_HEADER, HeaderValue::from_static("0xabc"));
        headers.insert(PROVER_NAME_HEADER, HeaderValue::from_static("prover-1"));

        let ctx = prover_context(&headers);
        assert_eq!(ctx.identity().unwrap(), ("0xabc", "prover-1"));
    }

    #[test]
    fn missing_headers_leave_identity_empty() {
        let ctx = prover_context(&HeaderMap::new());
        assert!(ctx.public_key.is_none());
        assert!(ctx.identity().is_err());
    }

    #[test]
    fn collect_errors_map_to_status_codes() {
        let response = ApiError::Collect(CollectError::AttemptsExceeded(
            ProofType::Chunk,
            "0x01".to_string(),
        ))
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::Collect(CollectError::MissingIdentity(
            crate::context::MissingIdentity("public key"),
        ))
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

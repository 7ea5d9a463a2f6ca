// HTTP surface for the browser chat client
// JSON endpoints for ingestion, questions and liveness, plus the static widget files


use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::ingestion::{IngestionService, IngestionSummary};
use crate::query::QueryService;
use crate::{RagError, Result};

pub const INGEST_SUCCESS_MESSAGE: &str = "Documents ingested successfully";

#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionService>,
    pub query: Arc<QueryService>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub message: String,
    pub summary: IngestionSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// API routes, with `static_dir` served for every other path
#[inline]
pub fn router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/api/ingest", post(ingest_handler))
        .route("/api/query", post(query_handler))
        .route("/api/health", get(health_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped
#[inline]
pub async fn serve(state: AppState, static_dir: &Path, addr: &str) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| RagError::Config(format!("Invalid bind address {}: {}", addr, e)))?;
    let app = router(state, static_dir);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server is running on http://{}", addr);
    info!("Serving static files from {}", static_dir.display());

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

async fn ingest_handler(
    State(state): State<AppState>,
) -> std::result::Result<Json<IngestResponse>, ApiError> {
    let summary = state.ingestion.ingest().await.map_err(internal_error)?;
    Ok(Json(IngestResponse {
        message: INGEST_SUCCESS_MESSAGE.to_string(),
        summary,
    }))
}

async fn query_handler(
    State(state): State<AppState>,
    request: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> std::result::Result<Json<QueryResponse>, ApiError> {
    let Json(request) = request.map_err(|rejection| error_body(rejection.body_text()))?;
    if request.question.trim().is_empty() {
        return Err(error_body("question must not be empty"));
    }

    let answer = state
        .query
        .answer(&request.question)
        .await
        .map_err(internal_error)?;
    Ok(Json(QueryResponse {
        answer: answer.text,
    }))
}

fn internal_error(err: RagError) -> ApiError {
    error_body(err.to_string())
}

// Every failure is reported as a 500, malformed requests included
fn error_body(message: impl Into<String>) -> ApiError {
    let message = message.into();
    error!("Request failed: {}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody { error: message }),
    )
}

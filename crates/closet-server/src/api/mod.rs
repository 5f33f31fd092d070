//! HTTP boundary
//!
//! Thin axum handlers over the stage modules: deserialize the request,
//! invoke the stage, map the result through [`ApiError`]. The document
//! event route runs the extraction stage to completion before responding,
//! so the caller observes the terminal outcome of the poll loop.

use crate::dispatch::{LocalDispatcher, StageRuntime};
use crate::error::{ApiError, ApiResult};
use crate::stages;
use crate::stages::extraction::{ExtractionResponse, S3Event, TokioSleeper};
use crate::stages::ingest::{UploadCommand, UploadResponse};
use crate::stages::listing::{ClosetResponse, GetClosetQuery};
use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<StageRuntime>,
    pub dispatcher: LocalDispatcher,
}

/// Build the application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/closet/:user_id", get(get_closet))
        .route("/events/document", post(document_event))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Closet Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    match sqlx::query("SELECT 1")
        .fetch_one(state.runtime.store.pool())
        .await
    {
        Ok(_) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}

/// Accept an image upload and fan out to the analysis stages.
async fn upload(
    State(state): State<AppState>,
    Json(command): Json<UploadCommand>,
) -> ApiResult<Json<UploadResponse>> {
    let response = stages::ingest::handle(
        &state.runtime.store,
        &state.runtime.storage,
        &state.dispatcher,
        command,
    )
    .await
    .map_err(ApiError::from)?;

    Ok(Json(response))
}

/// List a user's closet with fresh signed URLs.
async fn get_closet(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ClosetResponse>> {
    let response = stages::listing::handle(
        &state.runtime.store,
        &state.runtime.storage,
        GetClosetQuery { user_id },
    )
    .await
    .map_err(ApiError::from)?;

    Ok(Json(response))
}

/// Handle a document-arrival notification. The extraction stage polls the
/// document service until it reaches a terminal state, so this request
/// stays open for the duration of the job.
async fn document_event(
    State(state): State<AppState>,
    Json(event): Json<S3Event>,
) -> ApiResult<Json<ExtractionResponse>> {
    let response = stages::extraction::handle(
        &state.runtime.store,
        &state.runtime.storage,
        &state.runtime.extraction,
        &state.dispatcher,
        &TokioSleeper,
        state.runtime.poll_interval,
        event,
    )
    .await
    .map_err(ApiError::from)?;

    Ok(Json(response))
}

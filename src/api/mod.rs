use axum::{
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::IntegrityConfig;
use crate::error::IntegrityError;
use crate::models::{ApiResponse, ScoreResult};
use crate::services::ensemble::{EnsembleModel, ModelSummary};
use crate::services::pipeline::{self, ScoringService};
use crate::services::team_form::TeamProfile;
use crate::store::RawMatchRow;

type AppState = Arc<ScoringService>;
type ApiError = (StatusCode, Json<ApiResponse<()>>);
type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Serialize)]
struct ModelInfo {
    #[serde(flatten)]
    summary: ModelSummary,
    history_matches: usize,
}

pub async fn serve(config: IntegrityConfig, port: u16, prefix: &str, history: &Path) -> anyhow::Result<()> {
    let model = EnsembleModel::load(&config, prefix)?;
    let dataset = pipeline::load_and_process(history, &config)?;
    tracing::info!("Online form state built from {} matches", dataset.matches.len());

    let service = Arc::new(ScoringService::new(model, &config, dataset));
    let app = create_router().with_state(service);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Integrity API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/model", get(model_handler))
        .route("/score", post(score_handler))
        .route("/score/batch", post(score_batch_handler))
        .route("/score/features", post(score_features_handler))
        .route("/teams/{name}/form", get(team_form_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Caller mistakes are 422; anything else is a server failure.
fn status_for(err: &IntegrityError) -> StatusCode {
    if err.is_input_error() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn reject(context: &str, err: IntegrityError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!("{}: {}", context, err);
    } else {
        tracing::warn!("{}: {}", context, err);
    }
    (status, Json(ApiResponse::error(err.to_string())))
}

fn task_failed(err: tokio::task::JoinError) -> ApiError {
    tracing::error!("Scoring task failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::error("scoring task failed".to_string())),
    )
}

// Health check endpoint
async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("Match integrity API is running"))
}

// GET /model - Fitted model metadata and training report
async fn model_handler(State(service): State<AppState>) -> ApiResult<ModelInfo> {
    match service.model().summary() {
        Ok(summary) => Ok(Json(ApiResponse::success(ModelInfo {
            summary,
            history_matches: service.history_len(),
        }))),
        Err(e) => Err(reject("Failed to describe model", e)),
    }
}

// POST /score - Score one raw match row against the history
async fn score_handler(State(service): State<AppState>, Json(row): Json<RawMatchRow>) -> ApiResult<ScoreResult> {
    let scored = tokio::task::spawn_blocking(move || {
        service
            .score_rows(vec![row])
            .and_then(|results| results.into_iter().next().ok_or(IntegrityError::EmptyDataset))
    })
    .await;
    match scored {
        Ok(Ok(result)) => Ok(Json(ApiResponse::success(result))),
        Ok(Err(e)) => Err(reject("Failed to score match", e)),
        Err(e) => Err(task_failed(e)),
    }
}

// POST /score/batch - Score many raw rows; each is scored against the history alone
async fn score_batch_handler(
    State(service): State<AppState>,
    Json(rows): Json<Vec<RawMatchRow>>,
) -> ApiResult<Vec<ScoreResult>> {
    let scored = tokio::task::spawn_blocking(move || service.score_rows(rows)).await;
    match scored {
        Ok(Ok(results)) => Ok(Json(ApiResponse::success(results))),
        Ok(Err(e)) => Err(reject("Failed to score batch", e)),
        Err(e) => Err(task_failed(e)),
    }
}

// POST /score/features - Score pre-computed named feature values
async fn score_features_handler(
    State(service): State<AppState>,
    Json(values): Json<HashMap<String, f64>>,
) -> ApiResult<ScoreResult> {
    match service.score_values(&values) {
        Ok(result) => Ok(Json(ApiResponse::success(result))),
        Err(e) => Err(reject("Failed to score feature values", e)),
    }
}

// GET /teams/{name}/form - A team's record and recent form in the loaded history
async fn team_form_handler(
    State(service): State<AppState>,
    UrlPath(name): UrlPath<String>,
) -> ApiResult<TeamProfile> {
    match service.team(&name) {
        Some(team) => Ok(Json(ApiResponse::success(team.profile(&name)))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Team not found: {}", name))),
        )),
    }
}

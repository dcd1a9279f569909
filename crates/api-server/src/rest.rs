//! REST handlers for the registry, selection, click and operational
//! endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rotator_app::Rotator;
use rotator_core::error::{ErrorClass, RotatorError};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, warn};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub rotator: Rotator,
    pub node_id: String,
    pub start_time: Instant,
}

/// Rotator error on its way out over HTTP.
#[derive(Debug)]
pub struct ApiError(pub RotatorError);

impl From<RotatorError> for ApiError {
    fn from(e: RotatorError) -> Self {
        ApiError(e)
    }
}

pub fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let class = self.0.class();
        let (code, message) = match class {
            ErrorClass::InvalidArgument => ("invalid_argument", self.0.to_string()),
            ErrorClass::NotFound => ("not_found", self.0.to_string()),
            ErrorClass::FailedPrecondition => ("failed_precondition", self.0.to_string()),
            ErrorClass::Internal => {
                error!(error = %self.0, "Request failed");
                ("internal", "Internal processing error".to_string())
            }
        };
        metrics::counter!("api.errors", "class" => code).increment(1);
        if class != ErrorClass::Internal {
            warn!(error = %self.0, "Request rejected");
        }

        (
            status_for(class),
            Json(ErrorResponse {
                error: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub slot_id: String,
    pub social_group_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectResponse {
    pub banner_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ClickRequest {
    pub slot_id: String,
    pub banner_id: String,
    pub social_group_id: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

type Created = (StatusCode, Json<CreatedResponse>);

fn created(id: String) -> Created {
    (StatusCode::CREATED, Json(CreatedResponse { id }))
}

/// POST /v1/banners
pub async fn create_banner(
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> Result<Created, ApiError> {
    Ok(created(state.rotator.create_banner(&req.description).await?))
}

/// DELETE /v1/banners/:id
pub async fn delete_banner(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.rotator.delete_banner(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/slots
pub async fn create_slot(
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> Result<Created, ApiError> {
    Ok(created(state.rotator.create_slot(&req.description).await?))
}

/// DELETE /v1/slots/:id
pub async fn delete_slot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.rotator.delete_slot(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/social-groups
pub async fn create_social_group(
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> Result<Created, ApiError> {
    Ok(created(
        state.rotator.create_social_group(&req.description).await?,
    ))
}

/// DELETE /v1/social-groups/:id
pub async fn delete_social_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.rotator.delete_social_group(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/slots/:slot/banners/:banner
pub async fn attach_banner(
    State(state): State<AppState>,
    Path((slot_id, banner_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state.rotator.attach_banner(&slot_id, &banner_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /v1/slots/:slot/banners/:banner
pub async fn detach_banner(
    State(state): State<AppState>,
    Path((slot_id, banner_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state.rotator.detach_banner(&slot_id, &banner_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/select
pub async fn select_banner(
    State(state): State<AppState>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<SelectResponse>, ApiError> {
    let banner_id = state
        .rotator
        .select_banner(&req.slot_id, &req.social_group_id)
        .await?;
    Ok(Json(SelectResponse { banner_id }))
}

/// POST /v1/click
pub async fn click_banner(
    State(state): State<AppState>,
    Json(req): Json<ClickRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .rotator
        .click_banner(&req.slot_id, &req.banner_id, &req.social_group_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use serde_with::skip_serializing_none;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::{DecodeError, SessionError, StudioError, UploadError};
use crate::github::UploadReceipt;
use crate::models::{DesignId, DesignIntensity, EditDesignRequest, SelectDesignRequest, SessionSnapshot, StylesResponse, SubmitPhotoRequest, UploadDesignRequest};
use crate::session::EditOutcome;
use crate::studio::Studio;

#[derive(Clone)]
pub struct AppState {
    pub studio: Arc<Studio>,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/styles", get(list_styles))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(end_session))
        .route("/api/sessions/:id/photo", post(submit_photo))
        .route("/api/sessions/:id/select", post(select_design))
        .route("/api/sessions/:id/back", post(back_to_grid))
        .route("/api/sessions/:id/edit", post(edit_design))
        .route("/api/sessions/:id/reset", post(reset_session))
        .route("/api/sessions/:id/designs/:design_id/image", get(download_design))
        .route("/api/sessions/:id/designs/:design_id/github", post(upload_design))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

/// Error body: `{"error": "..."}` with a status picked per error kind.
#[derive(Debug)]
pub struct ApiError(StudioError);

impl From<StudioError> for ApiError {
    fn from(err: StudioError) -> Self { Self(err) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StudioError::Session(SessionError::NotFound(_) | SessionError::UnknownDesign(_)) => StatusCode::NOT_FOUND,
            StudioError::Session(SessionError::InvalidTransition { .. } | SessionError::EditInFlight) => StatusCode::CONFLICT,
            StudioError::Decode(DecodeError::Task(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            StudioError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StudioError::Upload(UploadError::MissingCredentials(_) | UploadError::InvalidRepository(_) | UploadError::EmptyPath) => StatusCode::BAD_REQUEST,
            StudioError::Upload(UploadError::Http(_) | UploadError::Rejected { .. }) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            tracing::error!("❌ {}", self.0);
        } else {
            tracing::debug!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub async fn list_styles(State(state): State<AppState>) -> Json<StylesResponse> {
    Json(StylesResponse {
        styles: state.studio.styles().to_vec(),
        intensities: DesignIntensity::ALL.to_vec(),
    })
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionSnapshot>) {
    (StatusCode::CREATED, Json(state.studio.create_session()))
}

pub async fn get_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionSnapshot>, ApiError> {
    Ok(Json(state.studio.snapshot(id)?))
}

pub async fn end_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.studio.end_session(id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn submit_photo(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<SubmitPhotoRequest>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    tracing::info!("📷 Session {}: photo received ({} chars, {})", id, body.image.len(), body.intensity);
    // The batch finishes in the background; clients poll the session.
    let _batch = state.studio.submit_photo_payload(id, &body.image, body.intensity).await?;
    Ok((StatusCode::ACCEPTED, Json(state.studio.snapshot(id)?)))
}

pub async fn select_design(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<SelectDesignRequest>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    Ok(Json(state.studio.select(id, &body.design_id)?))
}

pub async fn back_to_grid(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionSnapshot>, ApiError> {
    Ok(Json(state.studio.back(id)?))
}

pub async fn reset_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionSnapshot>, ApiError> {
    Ok(Json(state.studio.reset(id)?))
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct EditResponse {
    pub outcome: EditOutcome,
    pub notice: Option<&'static str>,
    pub session: SessionSnapshot,
}

pub async fn edit_design(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<EditDesignRequest>,
) -> Result<Json<EditResponse>, ApiError> {
    let outcome = state.studio.submit_edit(id, &body.instruction).await?;
    Ok(Json(EditResponse { outcome, notice: outcome.notice(), session: state.studio.snapshot(id)? }))
}

pub async fn download_design(
    Path((id, design_id)): Path<(Uuid, String)>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let design = state.studio.download(id, &DesignId::from(design_id))?;
    let filename = design.filename;
    let content_type = HeaderValue::from_str(design.image.mime_type()).unwrap_or(HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .unwrap_or(HeaderValue::from_static("attachment"));
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)],
        design.image.bytes().clone(),
    ).into_response())
}

pub async fn upload_design(
    Path((id, design_id)): Path<(Uuid, String)>,
    State(state): State<AppState>,
    Json(body): Json<UploadDesignRequest>,
) -> Result<Json<UploadReceipt>, ApiError> {
    Ok(Json(state.studio.upload_design(id, &DesignId::from(design_id), body).await?))
}

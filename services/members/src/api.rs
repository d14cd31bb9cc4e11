use crate::config::ApiConfig;
use crate::media_uploader::MediaHost;
use crate::member_store::{Member, MemberPatch, MemberStore, NewMember, StoreError};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{
        multipart::{Multipart, MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

const NO_FILE_MESSAGE: &str = "Nenhum arquivo enviado.";
const UPLOAD_FAILED_MESSAGE: &str = "Erro ao fazer upload da imagem.";
const DELETED_MESSAGE: &str = "Membro deletado com sucesso";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub members: Arc<dyn MemberStore>,
    pub media: Arc<dyn MediaHost>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Photo upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub secure_url: String,
}

/// Confirmation for a removed member
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            message: message.into(),
        }),
    )
}

/// Map a store failure; `fallback` is the status this route uses for
/// anything other than a missing record.
fn store_error(err: StoreError, fallback: StatusCode) -> ApiError {
    match err {
        StoreError::NotFound => api_error(StatusCode::NOT_FOUND, err.to_string()),
        StoreError::Validation(_) | StoreError::InvalidId(_) => {
            api_error(fallback, err.to_string())
        }
        StoreError::Database(_) => {
            error!(error = %err, "Member store operation failed");
            api_error(fallback, err.to_string())
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route(
            "/upload",
            post(upload_photo).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
        .route("/members", get(list_members).post(create_member))
        .route("/members/:id", put(update_member).delete(delete_member))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Keep-alive target; never touches the store
async fn ping() -> &'static str {
    "pong"
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "members-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.members.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Forward the `file` field of a multipart form to the media host
#[instrument(skip_all)]
async fn upload_photo(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        warn!(error = %rejection, "Upload request is not a multipart form");
        api_error(StatusCode::BAD_REQUEST, NO_FILE_MESSAGE)
    })?;

    let file = read_file_field(&mut multipart)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to read multipart upload");
            api_error(e.status(), e.body_text())
        })?
        .filter(|data| !data.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, NO_FILE_MESSAGE))?;

    let secure_url = state.media.upload(file).await.map_err(|e| {
        error!(error = %e, "Upload to media host failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, UPLOAD_FAILED_MESSAGE)
    })?;

    Ok(Json(UploadResponse { secure_url }))
}

/// Contents of the first field named `file`, skipping any other fields
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<Bytes>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            return field.bytes().await.map(Some);
        }
    }
    Ok(None)
}

/// List all members ordered by name
#[instrument(skip_all)]
async fn list_members(State(state): State<AppState>) -> Result<Json<Vec<Member>>, ApiError> {
    let members = state
        .members
        .list()
        .await
        .map_err(|e| store_error(e, StatusCode::INTERNAL_SERVER_ERROR))?;

    Ok(Json(members))
}

#[instrument(skip_all)]
async fn create_member(
    State(state): State<AppState>,
    payload: Result<Json<NewMember>, JsonRejection>,
) -> Result<(StatusCode, Json<Member>), ApiError> {
    let Json(new_member) =
        payload.map_err(|rejection| api_error(StatusCode::BAD_REQUEST, rejection.body_text()))?;

    let member = state
        .members
        .create(new_member)
        .await
        .map_err(|e| store_error(e, StatusCode::BAD_REQUEST))?;

    info!(id = %member.id, "Member created");

    Ok((StatusCode::CREATED, Json(member)))
}

#[instrument(skip_all)]
async fn update_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<MemberPatch>, JsonRejection>,
) -> Result<Json<Member>, ApiError> {
    let Json(patch) =
        payload.map_err(|rejection| api_error(StatusCode::BAD_REQUEST, rejection.body_text()))?;

    let member = state
        .members
        .update(&id, patch)
        .await
        .map_err(|e| store_error(e, StatusCode::BAD_REQUEST))?;

    Ok(Json(member))
}

#[instrument(skip_all)]
async fn delete_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state
        .members
        .delete(&id)
        .await
        .map_err(|e| store_error(e, StatusCode::INTERNAL_SERVER_ERROR))?;

    info!(id = %id, "Member deleted");

    Ok(Json(DeleteResponse {
        message: DELETED_MESSAGE.to_string(),
    }))
}

/// Start the HTTP API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting members API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

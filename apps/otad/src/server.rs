//! Localhost HTTP API
//!
//! Three trigger/poll endpoints plus a version query. Trigger handlers
//! enqueue into the engine and answer as soon as it accepts or rejects;
//! the progress handler reads the watch snapshot without touching the
//! engine at all.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use otad_engine::EngineHandle;
use otad_errors::{Error, ErrorCode};
use otad_layout::{LinkName, VersionLayout};
use otad_types::PackageDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub layout: VersionLayout,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1.0/download", post(trigger_download))
        .route("/api/v1.0/update", post(trigger_update))
        .route("/api/v1.0/progress", get(progress))
        .route("/api/v1.0/version", get(version))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct DownloadBody {
    version: String,
    package_url: String,
    package_name: String,
    package_size: u64,
    package_md5: String,
}

#[derive(Debug, Deserialize)]
struct UpdateBody {
    version: String,
}

#[derive(Debug, Serialize)]
struct VersionBody {
    current: Option<String>,
    previous: Option<String>,
}

async fn trigger_download(
    State(state): State<AppState>,
    Json(body): Json<DownloadBody>,
) -> Response {
    let descriptor = PackageDescriptor {
        version: body.version,
        url: body.package_url,
        file_name: body.package_name,
        size_bytes: body.package_size,
        md5_hex: body.package_md5,
    };
    match state.engine.start_download(descriptor).await {
        Ok(()) => accepted(),
        Err(e) => rejection(&e),
    }
}

async fn trigger_update(State(state): State<AppState>, Json(body): Json<UpdateBody>) -> Response {
    match state.engine.start_install(body.version).await {
        Ok(()) => accepted(),
        Err(e) => rejection(&e),
    }
}

async fn progress(State(state): State<AppState>) -> Response {
    Json(state.engine.progress()).into_response()
}

async fn version(State(state): State<AppState>) -> Response {
    let body = VersionBody {
        current: state.layout.resolved_version(LinkName::Current).await,
        previous: state.layout.resolved_version(LinkName::Previous).await,
    };
    Json(body).into_response()
}

fn accepted() -> Response {
    (StatusCode::OK, Json(json!({ "accepted": true }))).into_response()
}

fn rejection(error: &Error) -> Response {
    let code = error.code();
    let status = match code {
        ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::PackageExpired => StatusCode::GONE,
        ErrorCode::VersionMismatch => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({ "error": code, "message": error.to_string() })),
    )
        .into_response()
}

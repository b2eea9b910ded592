//! HTTP entry point.
//!
//! One endpoint, three answers: 400 when the url is missing (before any
//! browser is launched), 200 with the capture payload, 500 with a
//! structured error string for any unrecovered failure. Never a raw panic
//! or a protocol-level crash.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use capture::{CaptureError, Outcome};

use crate::config::ServiceConfig;
use crate::isolation;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/capture", post(capture))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct CaptureRequest {
    #[serde(default)]
    pub url: Option<String>,
}

async fn capture(State(state): State<AppState>, Json(request): Json<CaptureRequest>) -> Response {
    let Some(url) = request.url.filter(|url| !url.trim().is_empty()) else {
        tracing::warn!("capture request without url");
        return respond(Err(CaptureError::MissingUrl));
    };

    tracing::info!(%url, "capture request");
    respond(isolation::run(&state.config, &url).await)
}

fn respond(result: Result<Outcome, CaptureError>) -> Response {
    match result {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err @ CaptureError::MissingUrl) => {
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err) => {
            tracing::error!("capture failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::invocation::{InvocationEvent, Invoker};

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn create_router(invoker: Arc<Invoker>) -> Router {
    Router::new()
        .route("/invoke", post(invoke))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(invoker)
}

/// Runs once. An empty body is an invocation without event; the HTTP status
/// mirrors `statusCode`.
async fn invoke(
    State(invoker): State<Arc<Invoker>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let event = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let event: InvocationEvent = serde_json::from_slice(&body)
            .map_err(|err| {
                AppError::bad_request(format!(
                    "invalid invocation event: {err}"
                ))
            })?;
        Some(event)
    };

    let response = invoker.invoke(event.as_ref()).await;
    let status = StatusCode::from_u16(response.status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(response)).into_response())
}

async fn healthz() -> &'static str {
    "ok"
}

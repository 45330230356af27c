//! Request middleware: timing and panic recovery

use std::any::Any;
use std::time::Instant;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::routes::ErrorBody;

/// Log method, path, status, and latency of every request
pub async fn log_timing(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "Request handled"
    );

    response
}

/// Turn a handler panic into a 500 response
pub fn recover_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };

    tracing::error!(panic = %detail, "Recovered from handler panic");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            code: ErrorBody::INTERNAL,
            reason: "internal error".to_string(),
        }),
    )
        .into_response()
}

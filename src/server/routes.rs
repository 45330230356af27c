//! HTTP and WebSocket routes
//!
//! - `GET /ws?user_id=<id>`: upgrade and join the registry
//! - `POST /message`: broadcast, or push to one client when `user_id` is set
//! - `GET /stats`: counters snapshot

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use bytes::Bytes;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tower_http::catch_panic::CatchPanicLayer;

use crate::connection::ConnectionConfig;
use crate::registry::{PushMessage, Registry, RegistryError};
use crate::stats::Stats;

use super::hooks;
use super::socket;

/// WebSocket endpoint
pub const WS_PATH: &str = "/ws";
/// Push endpoint
pub const PUSH_PATH: &str = "/message";
/// Status endpoint
pub const STATS_PATH: &str = "/stats";

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub stats: Arc<Stats>,
    pub connection: ConnectionConfig,
    pub welcome_message: Option<Bytes>,
    pub echo_inbound: bool,
    pub connection_semaphore: Option<Arc<Semaphore>>,
}

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(WS_PATH, get(ws_handler))
        .route(PUSH_PATH, post(push_handler))
        .route(STATS_PATH, get(stats_handler))
        .layer(middleware::from_fn(hooks::log_timing))
        .layer(CatchPanicLayer::custom(hooks::recover_panic))
        .with_state(state)
}

/// JSON error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub reason: String,
}

impl ErrorBody {
    pub const INVALID_MESSAGE: i32 = 0;
    pub const INVALID_CLIENT_ID: i32 = 1;
    pub const CLIENT_NOT_FOUND: i32 = 2;
    pub const CONNECTION_CLOSED: i32 = 3;
    pub const PIPELINE_CLOSED: i32 = 4;
    pub const SERVER_BUSY: i32 = 5;
    pub const INTERNAL: i32 = 6;
}

/// Error response: status plus [`ErrorBody`]
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, code: i32, reason: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                reason: reason.into(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ClientNotFound(_) => {
                ApiError::new(StatusCode::NOT_FOUND, ErrorBody::CLIENT_NOT_FOUND, err.to_string())
            }
            RegistryError::Connection(_) => {
                ApiError::new(StatusCode::GONE, ErrorBody::CONNECTION_CLOSED, err.to_string())
            }
            RegistryError::PipelineClosed => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody::PIPELINE_CLOSED,
                err.to_string(),
            ),
        }
    }
}

/// Query parameters of the WebSocket upgrade
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub user_id: Option<String>,
}

/// Body of a push request
///
/// `msg` and `message` are accepted as aliases of `text`.
#[derive(Debug, Deserialize)]
pub struct PushRequest {
    #[serde(alias = "msg", alias = "message")]
    pub text: String,
    #[serde(default, deserialize_with = "deserialize_client_id")]
    pub user_id: Option<u64>,
}

/// Client id as sent by callers: a JSON number or a numeric string
#[derive(Deserialize)]
#[serde(untagged)]
enum RawClientId {
    Number(u64),
    Text(String),
}

fn deserialize_client_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawClientId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawClientId::Number(id)) => Ok(Some(id)),
        Some(RawClientId::Text(raw)) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid user_id: {:?}", raw))),
    }
}

/// Body of a successful push
#[derive(Debug, Serialize, Deserialize)]
pub struct PushResponse {
    pub status: String,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let client_id = params
        .user_id
        .as_deref()
        .and_then(|raw| raw.parse::<u64>().ok())
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                ErrorBody::INVALID_CLIENT_ID,
                "user_id invalid",
            )
        })?;

    // Check connection limit
    let permit = match state.connection_semaphore {
        Some(ref sem) => match Arc::clone(sem).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(client_id = client_id, "Connection rejected: limit reached");
                return Err(ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorBody::SERVER_BUSY,
                    "connection limit reached",
                ));
            }
        },
        None => None,
    };

    Ok(ws.on_upgrade(move |socket| async move {
        let _permit = permit;
        serve_socket(socket, client_id, state).await;
    }))
}

/// Drive one client from upgrade to teardown
async fn serve_socket(socket: WebSocket, client_id: u64, state: AppState) {
    let connection = socket::open(client_id, socket, &state.connection);

    if let Some(ref welcome) = state.welcome_message {
        if connection.write(welcome.clone()).await.is_err() {
            connection.close();
            return;
        }
    }

    state.registry.register_connection(Arc::clone(&connection)).await;
    // Exits on its own once the connection closes
    state
        .registry
        .spawn_heartbeat(Arc::clone(&connection), &state.connection);

    while let Ok(payload) = connection.read().await {
        tracing::debug!(client_id = client_id, bytes = payload.len(), "Inbound message");

        if state.echo_inbound && connection.write(payload).await.is_err() {
            break;
        }
    }

    state.registry.unregister_connection(&connection).await;
    connection.close();
}

async fn push_handler(
    State(state): State<AppState>,
    request: Result<Json<PushRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PushResponse>), ApiError> {
    let Json(request) = request.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected push request");
        ApiError::new(
            StatusCode::BAD_REQUEST,
            ErrorBody::INVALID_MESSAGE,
            "message invalid",
        )
    })?;

    let message = PushMessage::text(request.text);

    match request.user_id {
        Some(client_id) => {
            state.registry.push_to(client_id, message).await?;
            Ok((
                StatusCode::OK,
                Json(PushResponse {
                    status: "delivered".to_string(),
                }),
            ))
        }
        None => {
            state.registry.submit(message).await?;
            Ok((
                StatusCode::ACCEPTED,
                Json(PushResponse {
                    status: "queued".to_string(),
                }),
            ))
        }
    }
}

async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.stats.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_request_numeric_user_id() {
        let request: PushRequest =
            serde_json::from_str(r#"{"text": "hi", "user_id": 10}"#).unwrap();
        assert_eq!(request.text, "hi");
        assert_eq!(request.user_id, Some(10));
    }

    #[test]
    fn test_push_request_string_user_id() {
        let request: PushRequest =
            serde_json::from_str(r#"{"user_id": "10", "message": "test_user_10"}"#).unwrap();
        assert_eq!(request.text, "test_user_10");
        assert_eq!(request.user_id, Some(10));
    }

    #[test]
    fn test_push_request_without_user_id() {
        let request: PushRequest = serde_json::from_str(r#"{"msg": "all"}"#).unwrap();
        assert_eq!(request.user_id, None);

        let request: PushRequest =
            serde_json::from_str(r#"{"text": "all", "user_id": null}"#).unwrap();
        assert_eq!(request.user_id, None);
    }

    #[test]
    fn test_push_request_rejects_bad_user_id() {
        assert!(serde_json::from_str::<PushRequest>(r#"{"text": "x", "user_id": "ten"}"#).is_err());
        assert!(serde_json::from_str::<PushRequest>(r#"{"text": "x", "user_id": -1}"#).is_err());
    }
}

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::nav_structs::{ServerAddress, Vec3, DEFAULT_SERVER_PORT};
use crate::net_client::{BotHandle, ControlError};
use crate::status::BotStatus;

const LISTEN_BACKLOG: i32 = 128;

#[derive(Clone)]
struct AppState {
    bot: BotHandle,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Control(#[from] ControlError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Control(ControlError::InvalidCenter(_)) => StatusCode::BAD_REQUEST,
            ApiError::Control(ControlError::NotInGame) => StatusCode::CONFLICT,
            ApiError::Control(ControlError::Persist(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Control(ControlError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CenterRequest {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
}

impl CenterRequest {
    fn into_center(self) -> Result<Option<Vec3>, ApiError> {
        match (self.x, self.y, self.z) {
            (Some(x), Some(y), Some(z)) => Ok(Some(Vec3::new(x, y, z))),
            (None, None, None) => Ok(None),
            _ => Err(ApiError::BadRequest(
                "x, y and z must be given together, or not at all".to_string(),
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WanderRequest {
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ServerRequest {
    host: String,
    port: Option<u16>,
}

pub fn build_router(bot: BotHandle, static_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(api_status))
        .route("/api/center", post(api_center))
        .route("/api/wander", post(api_wander))
        .route("/api/server", post(api_server))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(AppState { bot })
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

async fn api_status(State(state): State<AppState>) -> Json<BotStatus> {
    Json(state.bot.status())
}

async fn api_center(
    State(state): State<AppState>,
    payload: Result<Json<CenterRequest>, JsonRejection>,
) -> Result<Json<BotStatus>, ApiError> {
    let Json(request) = payload?;
    let center = request.into_center()?;
    Ok(Json(state.bot.set_center(center).await?))
}

async fn api_wander(
    State(state): State<AppState>,
    payload: Result<Json<WanderRequest>, JsonRejection>,
) -> Result<Json<BotStatus>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.bot.set_wandering(request.enabled).await?))
}

async fn api_server(
    State(state): State<AppState>,
    payload: Result<Json<ServerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BotStatus>), ApiError> {
    let Json(request) = payload?;
    let server = ServerAddress::new(request.host, request.port.unwrap_or(DEFAULT_SERVER_PORT))
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;
    let status = state.bot.switch_server(server).await?;
    Ok((StatusCode::ACCEPTED, Json(status)))
}

/// Binds with SO_REUSEADDR so a quick restart doesn't trip over TIME_WAIT.
pub fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    TcpListener::from_std(socket.into())
}

pub async fn serve(
    listener: TcpListener,
    bot: BotHandle,
    static_dir: &Path,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> io::Result<()> {
    let app = build_router(bot, static_dir);
    info!(addr = %listener.local_addr()?, "dashboard listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_request_needs_all_or_no_coordinates() {
        let full = CenterRequest {
            x: Some(1.0),
            y: Some(2.0),
            z: Some(3.0),
        };
        assert_eq!(full.into_center().unwrap(), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(CenterRequest::default().into_center().unwrap(), None);
        let partial = CenterRequest {
            x: Some(1.0),
            ..CenterRequest::default()
        };
        assert!(matches!(partial.into_center(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn control_errors_map_to_http_statuses() {
        assert_eq!(
            ApiError::from(ControlError::NotInGame).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ControlError::Closed).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(ControlError::InvalidCenter("nan".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ControlError::Persist("disk full".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = bind_listener(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}

//! HTTP ingestion surface.
//!
//! `GET /` is an unauthenticated liveness probe. The broadcast routes sit
//! behind [`auth::AuthGate`], validate their body and hand a classified
//! event to the relay. The caller learns only whether the event was
//! accepted, never how delivery went.

pub mod auth;

use std::future::Future;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use auth::AuthGate;

use crate::error::Result;
use crate::model::{Event, ScanMode};
use crate::relay::EventSink;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error responses, all shaped `{"result":"error","error":<message>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    InvalidContentType,
    InvalidValues,
    BroadcastFailed,
    Unauthorized,
}

impl ApiError {
    pub fn status(self) -> StatusCode {
        match self {
            ApiError::InvalidContentType | ApiError::InvalidValues => StatusCode::BAD_REQUEST,
            ApiError::BroadcastFailed => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ApiError::InvalidContentType => "Invalid content type",
            ApiError::InvalidValues => "Invalid values",
            ApiError::BroadcastFailed => "Broadcast failed",
            ApiError::Unauthorized => "Unauthorized",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "result": "error", "error": self.message() });
        (self.status(), Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Body parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BodyFormat {
    Json,
    Form,
    Multipart { boundary: String },
}

impl BodyFormat {
    pub(crate) fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let raw = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())?;
        let content_type = raw.to_ascii_lowercase();
        if content_type.starts_with("application/json") {
            Some(BodyFormat::Json)
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            Some(BodyFormat::Form)
        } else if content_type.starts_with("multipart/form-data") {
            // Boundary is case-sensitive; parse it from the raw header.
            multer::parse_boundary(raw)
                .ok()
                .map(|boundary| BodyFormat::Multipart { boundary })
        } else {
            None
        }
    }
}

/// Top-level fields of a JSON object, form or multipart body. `None` if
/// the body does not parse into a set of named fields.
pub(crate) async fn parse_fields(format: &BodyFormat, body: &Bytes) -> Option<Map<String, Value>> {
    match format {
        BodyFormat::Json => match serde_json::from_slice(body).ok()? {
            Value::Object(map) => Some(map),
            _ => None,
        },
        BodyFormat::Form => {
            let mut map = Map::new();
            for (name, value) in url::form_urlencoded::parse(body) {
                map.entry(name.into_owned())
                    .or_insert_with(|| Value::String(value.into_owned()));
            }
            Some(map)
        }
        BodyFormat::Multipart { boundary } => multipart_fields(boundary, body.clone()).await,
    }
}

async fn multipart_fields(boundary: &str, body: Bytes) -> Option<Map<String, Value>> {
    let stream = futures::stream::once(async move { Ok::<_, std::convert::Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut map = Map::new();
    while let Some(field) = multipart.next_field().await.ok()? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field.text().await.ok()?;
        map.entry(name).or_insert(Value::String(value));
    }
    Some(map)
}

async fn read_fields(
    headers: &HeaderMap,
    body: &Bytes,
) -> std::result::Result<Map<String, Value>, ApiError> {
    let format = BodyFormat::from_headers(headers).ok_or(ApiError::InvalidContentType)?;
    parse_fields(&format, body).await.ok_or(ApiError::InvalidValues)
}

/// A non-empty string field. Numbers are accepted and stringified.
fn text_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn count_field(fields: &Map<String, Value>, name: &str) -> Option<u64> {
    match fields.get(name)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn with_hints(event: Event, fields: &Map<String, Value>) -> Event {
    let mut event = event;
    if let Some(count) = count_field(fields, "file_count") {
        event = event.file_count(count);
    }
    if let Some(size) = count_field(fields, "total_size") {
        event = event.total_size(size);
    }
    event
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ApiState {
    sink: Arc<dyn EventSink>,
}

/// Build the router. Only the broadcast routes require a key.
pub fn router(sink: Arc<dyn EventSink>, gate: AuthGate) -> Router {
    let broadcasts = Router::new()
        .route("/api/broadcasts/gds", post(broadcast_gds))
        .route("/api/broadcasts/downloader", post(broadcast_downloader))
        .route_layer(middleware::from_fn_with_state(gate, auth::require_api_key));

    Router::new()
        .route("/", get(index))
        .merge(broadcasts)
        .layer(TraceLayer::new_for_http())
        .with_state(ApiState { sink })
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listen on http://{addr}");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn index() -> &'static str {
    ":)"
}

async fn broadcast_gds(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<StatusCode, ApiError> {
    let fields = read_fields(&headers, &body).await?;
    let path = text_field(&fields, "path");
    let mode = text_field(&fields, "mode");
    let (Some(path), Some(mode)) = (path, mode) else {
        warn!("gds broadcast missing path or mode");
        return Err(ApiError::InvalidValues);
    };
    let mode: ScanMode = mode.parse().map_err(|e: String| {
        warn!(%path, "{e}");
        ApiError::InvalidValues
    })?;

    enqueue(&state, with_hints(Event::filesystem(path, mode), &fields))
}

async fn broadcast_downloader(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<StatusCode, ApiError> {
    let fields = read_fields(&headers, &body).await?;
    let path = text_field(&fields, "path");
    let item = text_field(&fields, "item");
    let (Some(path), Some(item)) = (path, item) else {
        warn!("downloader broadcast missing path or item");
        return Err(ApiError::InvalidValues);
    };

    enqueue(&state, with_hints(Event::downloader(path, item), &fields))
}

fn enqueue(state: &ApiState, event: Event) -> std::result::Result<StatusCode, ApiError> {
    let path = event.path.clone();
    match state.sink.push_event(event) {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            error!(%path, "failed to enqueue broadcast: {e}");
            Err(ApiError::BroadcastFailed)
        }
    }
}

//! API key gate for the broadcast routes.
//!
//! A key may arrive in the `X-apikey` header, the `apikey` query parameter,
//! or an `apikey` field of a JSON, form or multipart POST body, checked in
//! that order.
//! With no keys configured every request passes.

use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::{ApiError, BodyFormat, parse_fields};
use crate::config::secrets::{ExposeSecret, SecretString, secret_matches};

pub const HEADER_API_KEY: &str = "X-apikey";
pub const PARAM_API_KEY: &str = "apikey";

/// Largest body buffered while looking for a body credential.
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AuthGate {
    keys: Arc<[SecretString]>,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl AuthGate {
    pub fn new(keys: &[SecretString]) -> Self {
        Self {
            keys: keys
                .iter()
                .map(|k| SecretString::from(k.expose_secret()))
                .collect(),
        }
    }

    /// A gate with no keys: everything is authorized.
    pub fn open() -> Self {
        Self { keys: Arc::new([]) }
    }

    pub fn is_open(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn accepts(&self, presented: &str) -> bool {
        self.keys.iter().any(|k| secret_matches(k, presented))
    }

    /// Authorize from the three credential sources in precedence order.
    pub fn authorize(&self, header: Option<&str>, query: Option<&str>, body: Option<&str>) -> bool {
        self.is_open() || [header, query, body].into_iter().flatten().any(|k| self.accepts(k))
    }
}

pub(crate) async fn require_api_key(
    State(gate): State<AuthGate>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if gate.is_open() {
        return next.run(req).await;
    }

    let header = req
        .headers()
        .get(HEADER_API_KEY)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .map(str::to_string);
    let query = req.uri().query().and_then(query_api_key);
    if gate.authorize(header.as_deref(), query.as_deref(), None) {
        return next.run(req).await;
    }

    let format = match BodyFormat::from_headers(req.headers()) {
        Some(format) if req.method() == Method::POST => format,
        _ => return unauthorized(req.uri().path()),
    };

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("could not read body for credential: {e}");
            return unauthorized(parts.uri.path());
        }
    };
    let body_key = parse_fields(&format, &bytes).await.and_then(|fields| {
        fields
            .get(PARAM_API_KEY)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    });

    if gate.authorize(None, None, body_key.as_deref()) {
        next.run(Request::from_parts(parts, Body::from(bytes))).await
    } else {
        unauthorized(parts.uri.path())
    }
}

fn query_api_key(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, value)| name == PARAM_API_KEY && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

fn unauthorized(path: &str) -> Response {
    debug!(%path, "rejected request without a valid api key");
    ApiError::Unauthorized.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AuthGate {
        AuthGate::new(&[SecretString::from("abc")])
    }

    #[test]
    fn any_source_can_authorize() {
        let gate = gate();
        assert!(gate.authorize(Some("abc"), None, None));
        assert!(gate.authorize(Some("nope"), Some("abc"), None));
        assert!(gate.authorize(None, None, Some("abc")));
        assert!(!gate.authorize(Some("nope"), Some("ab"), Some("abcd")));
        assert!(!gate.authorize(None, None, None));
    }

    #[test]
    fn open_gate_authorizes_everything() {
        let gate = AuthGate::open();
        assert!(gate.is_open());
        assert!(gate.authorize(None, None, None));
    }

    #[test]
    fn query_key_is_decoded() {
        assert_eq!(query_api_key("x=1&apikey=a%2Bb"), Some("a+b".to_string()));
        assert_eq!(query_api_key("apikey="), None);
        assert_eq!(query_api_key("other=abc"), None);
    }

    #[test]
    fn debug_hides_keys() {
        assert!(!format!("{:?}", gate()).contains("abc"));
    }
}

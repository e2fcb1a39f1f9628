//! Page gate middleware.
//!
//! Translates the request into a [`FormRequest`] carrying the session cookie
//! and asks the [`SessionGate`](knobs_core::auth::SessionGate) whether it
//! may proceed. Denied requests are redirected to the login page. Writes are
//! gated again by the block itself.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{Method as HttpMethod, header};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use knobs_core::auth::{AuthGate, GateDecision};
use knobs_core::request::{FormRequest, Method};

use crate::error::found;
use crate::state::AppState;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "KNOBS_SESSION";

/// Extract the session token from a `Cookie` header value. Quoted cookie
/// values are unquoted.
pub fn parse_cookie_token(header: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        if name.trim() != SESSION_COOKIE {
            return None;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        (!value.is_empty()).then(|| value.to_owned())
    })
}

/// Session token carried by the `Cookie` headers, if any.
pub fn session_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(parse_cookie_token)
}

/// Core view of an HTTP request without its body.
pub fn form_request(method: &HttpMethod, path: &str, headers: &axum::http::HeaderMap) -> FormRequest {
    let method = if *method == HttpMethod::GET || *method == HttpMethod::HEAD {
        Method::Get
    } else {
        Method::Post
    };
    let request = FormRequest::new(method, path);
    match session_token(headers) {
        Some(token) => request.with_session(token),
        None => request,
    }
}

/// Middleware applying the session gate to page routes.
pub async fn page_gate(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let request = form_request(req.method(), req.uri().path(), req.headers());
    match state.gate.require(&request) {
        GateDecision::Proceed => next.run(req).await,
        GateDecision::Deny { redirect } => {
            debug!(path = %request.path(), "page requires login");
            found(redirect)
        }
    }
}

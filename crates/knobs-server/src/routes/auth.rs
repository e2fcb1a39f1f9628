//! Session login routes: `/login` and `/logout`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use serde::Deserialize;

use crate::error::found;
use crate::middleware::{SESSION_COOKIE, session_token};
use crate::routes::ui::page;
use crate::state::AppState;

/// Delay before answering a failed login.
const LOGIN_FAILURE_DELAY: Duration = Duration::from_millis(400);

/// Build the login router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", get(logout))
}

#[derive(Debug, Default, Deserialize)]
struct NextQuery {
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoginForm {
    #[serde(default)]
    u: String,
    #[serde(default)]
    p: String,
    next: Option<String>,
}

/// Local redirect target from a `next` argument; anything that is not a
/// plain absolute path becomes `/`.
pub fn sanitize_next(next: Option<&str>) -> String {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.contains('\\') => n.to_owned(),
        _ => "/".to_owned(),
    }
}

const LOGIN_FORM: &str = "<h3>Login</h3>\n\
<form method='POST' action='/login'>\n\
<label>User<br><input type='text' name='u' autofocus></label><br>\n\
<label>Password<br><input type='password' name='p'></label><br>\n\
<input type='hidden' name='next' value='{next}'>\n\
<button type='submit'>Login</button></form>\n";

async fn login_page(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<NextQuery>,
) -> Response {
    let next = sanitize_next(query.next.as_deref());
    if state.gate.validate(session_token(&headers).as_deref()) {
        return found(next);
    }
    let body = LOGIN_FORM.replace("{next}", &knobs_core::html::escape(&next));
    page("Login", &body).into_response()
}

async fn login(State(state): State<Arc<AppState>>, Form(form): Form<LoginForm>) -> Response {
    let next = sanitize_next(form.next.as_deref());
    if let Some(token) = state.gate.login(&form.u, &form.p) {
        let cookie = format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/");
        return (
            StatusCode::FOUND,
            [(header::LOCATION, next), (header::SET_COOKIE, cookie)],
        )
            .into_response();
    }

    tokio::time::sleep(LOGIN_FAILURE_DELAY).await;
    (
        StatusCode::UNAUTHORIZED,
        [(header::CACHE_CONTROL, "no-store")],
        Html("<p>Wrong user or password.</p><p><a href='/login'>Try again</a></p>\n"),
    )
        .into_response()
}

async fn logout(State(state): State<Arc<AppState>>) -> Response {
    state.gate.logout();
    let expired = format!("{SESSION_COOKIE}=; Max-Age=0; Path=/");
    (
        StatusCode::FOUND,
        [(header::LOCATION, "/login".to_owned()), (header::SET_COOKIE, expired)],
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_must_be_local() {
        assert_eq!(sanitize_next(Some("/hydro")), "/hydro");
        assert_eq!(sanitize_next(Some("/hydro?x=1")), "/hydro?x=1");
        assert_eq!(sanitize_next(None), "/");
        assert_eq!(sanitize_next(Some("")), "/");
        assert_eq!(sanitize_next(Some("https://evil.example")), "/");
        assert_eq!(sanitize_next(Some("//evil.example")), "/");
        assert_eq!(sanitize_next(Some("/\\evil.example")), "/");
    }
}

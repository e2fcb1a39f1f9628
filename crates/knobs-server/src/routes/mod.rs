//! HTTP route handlers for `knobs`.
//!
//! Routes are organized by concern:
//! - `ui`: landing page listing every settings block
//! - `settings`: per-block edit pages and form submissions
//! - `auth`: session login and logout

pub mod auth;
pub mod settings;
pub mod ui;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::middleware as axum_mw;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::middleware::page_gate;
use crate::state::AppState;

/// Build the complete application router.
pub fn app(state: Arc<AppState>) -> Router {
    // Pages go through the session gate; writes are gated by their block.
    let pages = Router::new()
        .merge(ui::router())
        .merge(settings::page_router(&state))
        .route_layer(axum_mw::from_fn_with_state(Arc::clone(&state), page_gate));

    Router::new()
        .merge(pages)
        .merge(settings::update_router(&state))
        .merge(auth::router())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound("Not Found".to_owned())
}

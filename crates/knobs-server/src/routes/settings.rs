//! Settings block routes: `GET {path}` and `POST {path}/update`.
//!
//! Each block gets its own pair of routes, bound to the block through a
//! small per-block state.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Method};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use tower::limit::ConcurrencyLimitLayer;
use tracing::info;

use knobs_core::block::SettingsBlock;
use knobs_core::html::escape;

use crate::error::AppError;
use crate::middleware::form_request;
use crate::routes::ui::page;
use crate::state::AppState;

/// In-flight form submissions allowed per block.
const MAX_CONCURRENT_UPDATES: usize = 4;

#[derive(Clone)]
struct BlockRoute {
    block: Arc<SettingsBlock>,
}

/// `GET {path}` for every block.
pub fn page_router(state: &AppState) -> Router<Arc<AppState>> {
    state.blocks.iter().fold(Router::new(), |router, block| {
        let route = Router::new()
            .route(block.path(), get(settings_page))
            .with_state(BlockRoute {
                block: Arc::clone(block),
            });
        router.merge(route)
    })
}

/// `POST {path}/update` for every block.
pub fn update_router(state: &AppState) -> Router<Arc<AppState>> {
    state.blocks.iter().fold(Router::new(), |router, block| {
        let route = Router::new()
            .route(&block.update_path(), post(update_settings))
            .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_UPDATES))
            .with_state(BlockRoute {
                block: Arc::clone(block),
            });
        router.merge(route)
    })
}

async fn settings_page(State(route): State<BlockRoute>) -> Html<String> {
    let block = &route.block;
    let mut body = format!("<h3>{}</h3>\n", escape(block.title()));
    if block.is_diverged().await {
        body.push_str("<p><b>Unsaved values shown: the last submission was not stored.</b></p>\n");
    }
    body.push_str(&block.generate_form().await);
    body.push_str("<p><a href='/'>Back</a></p>\n");
    page(block.title(), &body)
}

async fn update_settings(
    State(route): State<BlockRoute>,
    method: Method,
    headers: HeaderMap,
    Form(args): Form<HashMap<String, String>>,
) -> Response {
    let block = &route.block;
    let request = form_request(&method, &block.update_path(), &headers).with_args(args);

    let outcome = block.handle_update(&request).await;
    match AppError::from_outcome(outcome) {
        None => {
            info!(namespace = %block.namespace(), "settings updated");
            Redirect::to("/").into_response()
        }
        Some(err) => err.into_response(),
    }
}

//! Landing page with every block's edit form, plus the shared page shell.

use std::fmt::Write as _;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;

use knobs_core::auth::AuthGate;
use knobs_core::html::escape;

use crate::state::AppState;

/// Build the UI router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(landing_page))
}

const PAGE_STYLE: &str = "body{font-family:sans-serif;max-width:640px;margin:2em auto;padding:0 1em}\
input[type=text]{padding:.3em;width:8em}form{line-height:2}";

/// Wrap `body` in a minimal HTML document titled `title`.
pub fn page(title: &str, body: &str) -> Html<String> {
    let title = escape(title);
    Html(format!(
        "<!doctype html><html><head><meta charset='utf-8'>\
         <meta name='viewport' content='width=device-width, initial-scale=1'>\
         <title>{title}</title><style>{PAGE_STYLE}</style></head>\
         <body>\n{body}</body></html>\n"
    ))
}

async fn landing_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let mut body = format!("<h2>{}</h2>\n<ul>\n", escape(&state.name));
    for block in &state.blocks {
        let _ = writeln!(
            body,
            "<li><a href='{}'>{}</a></li>",
            escape(block.path()),
            escape(block.title())
        );
    }
    body.push_str("</ul>\n");
    for block in &state.blocks {
        let _ = writeln!(body, "<h3>{}</h3>", escape(block.title()));
        body.push_str(&block.generate_form().await);
    }
    if state.gate.is_active() {
        body.push_str("<p><a href='/logout'>Logout</a></p>\n");
    }
    page(&state.name, &body)
}

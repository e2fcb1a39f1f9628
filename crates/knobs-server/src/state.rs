//! Shared application state for the `knobs` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use std::sync::Arc;

use knobs_core::auth::SessionGate;
use knobs_core::block::SettingsBlock;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Settings blocks in display order.
    pub blocks: Vec<Arc<SettingsBlock>>,
    /// Session gate shared by page routes and every block.
    pub gate: Arc<SessionGate>,
    /// Display name shown in page titles.
    pub name: String,
}

impl AppState {
    /// The block served at `path`.
    pub fn block(&self, path: &str) -> Option<&Arc<SettingsBlock>> {
        self.blocks.iter().find(|b| b.path() == path)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("blocks", &self.blocks.len())
            .finish_non_exhaustive()
    }
}

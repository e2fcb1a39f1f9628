//! `knobs` HTTP server.
//!
//! Wires the settings blocks, storage backend, and session gate into a
//! running Axum server. Every block is served as an HTML edit page at its
//! path, with form submissions posted to `{path}/update`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod schema;
pub mod state;

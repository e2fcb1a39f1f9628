//! Core library for `knobs`.
//!
//! Contains the typed settings registry: value kinds, scalar and array
//! fields, the namespaced [`Preferences`](prefs::Preferences) view over a
//! storage backend, settings blocks with their edit-form protocol, and the
//! authentication gate that guards writes. This crate depends on
//! `knobs-storage` for the storage backend trait and knows nothing about
//! HTTP servers.

pub mod array;
pub mod auth;
pub mod block;
pub mod error;
pub mod field;
pub mod html;
pub mod prefs;
pub mod request;
pub mod session;
pub mod value;

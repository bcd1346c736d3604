//! Release tracker library - discovery pipeline shared with the binary.

pub mod config;
pub mod discover;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod progress;
pub mod query;
pub mod safety;
pub mod store;

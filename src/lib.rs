//! Project catalog notification feed client.
//!
//! Re-exports modules needed by the CLI and by integration tests in `tests/`.

pub mod api;
pub mod config;
pub mod errors;
pub mod feed;
pub mod models;
pub mod realtime;
pub mod service;
pub mod session;

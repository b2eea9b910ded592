//! Request layer for the capture pipeline.
//!
//! A thin axum front over the `capture` crate: one endpoint that takes
//! `{"url": ...}` and answers with the capture payload, plus the
//! subprocess-isolated runner variant and its worker-side protocol.

pub mod config;
pub mod handler;
pub mod isolation;

pub use config::ServiceConfig;
pub use handler::{router, AppState};
pub use isolation::IsolationMode;

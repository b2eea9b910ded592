//! Error types for the capture pipeline.
//!
//! Simple, flat hierarchy. Only launch, navigation (after retries) and
//! engine failures ever reach the caller; every other anomaly degrades to a
//! defined fallback value and is logged where it happens.

use thiserror::Error;

use crate::driver::DriverError;

pub type Result<T> = std::result::Result<T, CaptureError>;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// Request arrived without a target URL. Never retried; the request
    /// layer maps this to a 400 before any browser is launched.
    #[error("URL is required")]
    MissingUrl,

    /// Browser or environment failure at startup.
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// Navigation failed fatally, or the detached-frame retry budget ran
    /// out.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Reduced (worker) pipeline produced no new tab. The full pipeline
    /// never surfaces this - exhaustion resolves through the clipboard
    /// fallback instead.
    #[error("no new tab opened")]
    NoNewTab,

    /// Subprocess worker failed or produced no result message.
    #[error("worker failed: {0}")]
    Worker(String),

    /// Engine command failed mid-strategy.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

//! Driver seam between the orchestration core and the browser engine.
//!
//! The spec'd pipeline needs a small set of capabilities - navigate, inject
//! input, enumerate tabs, evaluate script, force-close - and nothing else.
//! Modeling them as a trait keeps the state machine testable with scripted
//! drivers; the production implementation is [`crate::cdp_driver::CdpDriver`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One open tab at a point in time. Snapshots are diffed by `id` only;
/// there is no long-term tab identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabRef {
    pub id: String,
    pub url: String,
}

impl TabRef {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("browser command failed: {0}")]
    Command(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl DriverError {
    /// The one transient navigation failure class worth retrying: the
    /// navigating frame was detached mid-load, a known race during
    /// redirects and reloads. Classified by message, the same signal the
    /// engine itself reports.
    pub fn is_frame_detached(&self) -> bool {
        matches!(self, DriverError::Navigation(message) if message.contains("frame was detached"))
    }
}

/// Capabilities the capture pipeline calls on the browser engine. All
/// operations target the session's primary page unless stated otherwise.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Load `url`, resolving on DOMContentLoaded, bounded by `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Reload the page, resolving on DOMContentLoaded.
    async fn reload(&self, timeout: Duration) -> Result<(), DriverError>;

    /// Press and release a key, with the given modifier bits active.
    async fn press(&self, key: &str, modifiers: i64) -> Result<(), DriverError>;

    /// Push a modifier key down and leave it held.
    async fn hold(&self, key: &str) -> Result<(), DriverError>;

    /// Release a held modifier key.
    async fn release_key(&self, key: &str) -> Result<(), DriverError>;

    /// Left-click at page coordinates.
    async fn click(&self, x: f64, y: f64) -> Result<(), DriverError>;

    /// Visual viewport size in CSS pixels.
    async fn viewport(&self) -> Result<(f64, f64), DriverError>;

    /// Ordered snapshot of currently open tabs.
    async fn tabs(&self) -> Result<Vec<TabRef>, DriverError>;

    /// Evaluate JavaScript in the page, returning the completion value.
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, DriverError>;

    /// Synthesize the OS close-window accelerator on the given tab.
    async fn send_close_keys(&self, tab: &TabRef) -> Result<(), DriverError>;

    /// Kill the underlying browser process if it is still alive.
    async fn kill(&self) -> Result<(), DriverError>;

    /// Release session-scoped registrations (event subscriptions, request
    /// filter) and clean up the profile directory.
    async fn release(&self) -> Result<(), DriverError>;

    /// Requests aborted by the request filter so far.
    fn blocked_request_count(&self) -> u64;
}

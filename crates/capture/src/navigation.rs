//! Navigation step with bounded retry on the detached-frame transient.

use std::time::Duration;

use crate::driver::Driver;
use crate::error::CaptureError;

/// Upper bound for one navigation awaiting DOMContentLoaded.
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause before retrying after a detached-frame failure.
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Post-load settle. Target pages are not under our control and wire up
/// their shortcut handlers from deferred script; latency is traded for
/// reliability here.
const SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Retry budget for detached-frame failures. Any other failure is fatal on
/// first occurrence.
const NAVIGATION_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct NavigationConfig {
    pub timeout: Duration,
    pub backoff: Duration,
    pub settle: Duration,
    pub retries: u32,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            timeout: NAVIGATION_TIMEOUT,
            backoff: RETRY_BACKOFF,
            settle: SETTLE_DELAY,
            retries: NAVIGATION_RETRIES,
        }
    }
}

/// Load `url` in the primary page. Detached-frame failures are retried up
/// to the configured budget with a fixed backoff; anything else propagates
/// immediately. A successful load is followed by the settle delay before
/// returning.
pub async fn navigate_with_retry<D: Driver>(
    driver: &D,
    url: &str,
    config: &NavigationConfig,
) -> Result<(), CaptureError> {
    let mut retries = config.retries;
    loop {
        match driver.navigate(url, config.timeout).await {
            Ok(()) => {
                tracing::debug!(%url, "navigation succeeded, settling");
                tokio::time::sleep(config.settle).await;
                return Ok(());
            }
            Err(err) if err.is_frame_detached() && retries > 0 => {
                retries -= 1;
                tracing::warn!(%url, remaining = retries, "navigating frame detached, retrying");
                tokio::time::sleep(config.backoff).await;
            }
            Err(err) => {
                tracing::error!(%url, "navigation failed: {}", err);
                return Err(CaptureError::Navigation(err.to_string()));
            }
        }
    }
}

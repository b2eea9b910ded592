//! Session controller.
//!
//! Owns one browser-controlled request lifecycle: sequence the navigation
//! step, the strategy engine and the resolver, then release every resource
//! exactly once - success and failure paths alike. Teardown is forceful:
//! the OS close accelerator per tab instead of a graceful close API (which
//! can hang on pages stuck in a modal state), then a process kill after a
//! short grace period.

use std::time::Duration;

use browser::launcher::BrowserConfig;

use crate::cdp_driver::CdpDriver;
use crate::driver::Driver;
use crate::error::{CaptureError, Result};
use crate::events::{SessionEvent, SessionEvents};
use crate::navigation::{self, NavigationConfig};
use crate::outcome::Outcome;
use crate::resolver;
use crate::strategy::{full_plan, single_attempt_plan, Attempt, StrategyConfig, StrategyEngine};

/// Grace period between the close chords and the process kill.
const TEARDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub browser: BrowserConfig,
    pub navigation: NavigationConfig,
    pub strategy: StrategyConfig,
    pub teardown_grace: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            navigation: NavigationConfig::default(),
            strategy: StrategyConfig::default(),
            teardown_grace: TEARDOWN_GRACE,
        }
    }
}

/// One capture session over an already-launched driver.
pub struct Session<D: Driver> {
    driver: D,
    config: CaptureConfig,
    events: SessionEvents,
}

impl<D: Driver> Session<D> {
    pub fn new(driver: D, config: CaptureConfig) -> Self {
        Self {
            driver,
            config,
            events: SessionEvents::new(),
        }
    }

    /// Lifecycle event bus for this session. Subscribe before calling
    /// [`Session::run`] to observe every transition.
    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    /// Full pipeline: navigate, escalate through the whole attempt
    /// schedule, resolve through the clipboard fallback. Teardown runs on
    /// every exit path.
    pub async fn run(&self, url: &str) -> Result<Outcome> {
        let started = std::time::Instant::now();
        let result = match self.drive(url, &full_plan()).await {
            Ok(found) => {
                let outcome = resolver::resolve(&self.driver, found).await;
                self.events.publish(SessionEvent::Resolved);
                Ok(outcome)
            }
            Err(err) => Err(err),
        };

        self.teardown().await;
        tracing::info!(elapsed = ?started.elapsed(), "session finished");
        result
    }

    /// Reduced pipeline for the isolated worker: single plain attempt, no
    /// clipboard fallback. Exhaustion is a failure here, not a fallback.
    pub async fn run_reduced(&self, url: &str) -> Result<String> {
        let result = match self.drive(url, &single_attempt_plan()).await {
            Ok(Some(found)) => {
                self.events.publish(SessionEvent::Resolved);
                Ok(found)
            }
            Ok(None) => Err(CaptureError::NoNewTab),
            Err(err) => Err(err),
        };

        self.teardown().await;
        result
    }

    async fn drive(&self, url: &str, plan: &[Attempt]) -> Result<Option<String>> {
        self.events.publish(SessionEvent::Launched);

        navigation::navigate_with_retry(&self.driver, url, &self.config.navigation).await?;
        self.events.publish(SessionEvent::Navigated {
            url: url.to_string(),
        });

        self.events.publish(SessionEvent::StrategyStarted);
        let engine = StrategyEngine::new(&self.driver, &self.config.strategy, &self.events);
        Ok(engine.run(plan).await?)
    }

    /// Forced resource release. Every failure in here is logged and
    /// swallowed; teardown must never mask the primary result.
    async fn teardown(&self) {
        match self.driver.tabs().await {
            Ok(tabs) => {
                for tab in &tabs {
                    if let Err(err) = self.driver.send_close_keys(tab).await {
                        tracing::warn!(tab = %tab.id, "close chord failed: {}", err);
                    }
                }
            }
            Err(err) => tracing::warn!("tab enumeration during teardown failed: {}", err),
        }

        tokio::time::sleep(self.config.teardown_grace).await;

        if let Err(err) = self.driver.kill().await {
            tracing::warn!("browser kill failed: {}", err);
        }
        if let Err(err) = self.driver.release().await {
            tracing::warn!("session release failed: {}", err);
        }

        tracing::debug!(
            blocked_requests = self.driver.blocked_request_count(),
            "session torn down"
        );
        self.events.publish(SessionEvent::TornDown);
    }
}

/// Entry point for running capture sessions: launches a browser per call
/// and guarantees its teardown via [`Session`].
pub struct Controller {
    config: CaptureConfig,
}

impl Controller {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Run the full pipeline against a freshly launched browser.
    pub async fn capture(&self, url: &str) -> Result<Outcome> {
        let driver = CdpDriver::launch(&self.config, url)
            .await
            .map_err(|err| CaptureError::Launch(err.to_string()))?;
        Session::new(driver, self.config.clone()).run(url).await
    }

    /// Run the reduced worker pipeline against a freshly launched browser.
    pub async fn capture_once(&self, url: &str) -> Result<String> {
        let driver = CdpDriver::launch(&self.config, url)
            .await
            .map_err(|err| CaptureError::Launch(err.to_string()))?;
        Session::new(driver, self.config.clone())
            .run_reduced(url)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverError, TabRef};
    use crate::mock::MockDriver;

    fn fast_config() -> CaptureConfig {
        CaptureConfig {
            navigation: NavigationConfig {
                timeout: Duration::from_millis(10),
                backoff: Duration::ZERO,
                settle: Duration::ZERO,
                retries: 3,
            },
            strategy: StrategyConfig {
                modifier_hold: Duration::ZERO,
                materialize_delay: Duration::ZERO,
                between_attempts: Duration::ZERO,
                reload_settle: Duration::ZERO,
                reload_timeout: Duration::from_millis(10),
                ..Default::default()
            },
            teardown_grace: Duration::ZERO,
            ..Default::default()
        }
    }

    fn tab(id: &str) -> TabRef {
        TabRef::new(id, format!("https://example.com/{id}"))
    }

    #[tokio::test]
    async fn test_successful_run_tears_down_once() {
        let driver = MockDriver::new();
        driver.push_tabs(vec![tab("A")]);
        driver.push_tabs(vec![tab("A"), tab("B")]);

        let session = Session::new(driver, fast_config());
        let mut rx = session.events().subscribe();

        let outcome = session.run("https://example.com").await.unwrap();
        assert_eq!(
            outcome,
            Outcome::NewTabUrl("https://example.com/B".to_string())
        );

        assert_eq!(session.driver.count("kill"), 1);
        assert_eq!(session.driver.count("release"), 1);
        // Both open tabs got the close chord.
        assert_eq!(session.driver.count("close"), 2);

        let mut torn_down = 0;
        while let Ok(event) = rx.try_recv() {
            if event == SessionEvent::TornDown {
                torn_down += 1;
            }
        }
        assert_eq!(torn_down, 1);
    }

    #[tokio::test]
    async fn test_navigation_error_still_tears_down() {
        let driver = MockDriver::new();
        driver.push_navigation(Err(DriverError::Navigation(
            "net::ERR_CONNECTION_REFUSED".to_string(),
        )));

        let session = Session::new(driver, fast_config());
        let mut rx = session.events().subscribe();

        let err = session.run("https://example.com").await.unwrap_err();
        assert!(matches!(err, CaptureError::Navigation(_)));

        assert_eq!(session.driver.count("kill"), 1);
        assert_eq!(session.driver.count("release"), 1);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events.iter().filter(|e| **e == SessionEvent::TornDown).count(),
            1
        );
        assert!(!events.contains(&SessionEvent::Resolved));
    }

    #[tokio::test]
    async fn test_strategy_error_still_tears_down() {
        let driver = MockDriver::new();
        driver.push_tabs(vec![tab("A")]);
        driver.fail_presses();

        let session = Session::new(driver, fast_config());

        let err = session.run("https://example.com").await.unwrap_err();
        assert!(matches!(err, CaptureError::Driver(_)));

        assert_eq!(session.driver.count("kill"), 1);
        assert_eq!(session.driver.count("release"), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_resolves_through_clipboard() {
        let driver = MockDriver::new();
        driver.push_tabs(vec![tab("A")]);
        driver.set_evaluate(Ok(serde_json::json!("copied link")));

        let session = Session::new(driver, fast_config());
        let outcome = session.run("https://example.com").await.unwrap();
        assert_eq!(outcome, Outcome::ClipboardText("copied link".to_string()));
    }

    #[tokio::test]
    async fn test_reduced_run_fails_without_fallback() {
        let driver = MockDriver::new();
        driver.push_tabs(vec![tab("A")]);

        let session = Session::new(driver, fast_config());
        let err = session.run_reduced("https://example.com").await.unwrap_err();
        assert!(matches!(err, CaptureError::NoNewTab));
        // No clipboard probe on the reduced path.
        assert_eq!(session.driver.count("evaluate"), 0);
        assert_eq!(session.driver.count("kill"), 1);
    }

    #[tokio::test]
    async fn test_sequential_sessions_share_no_state() {
        for _ in 0..2 {
            let driver = MockDriver::new();
            driver.push_tabs(vec![tab("A")]);
            driver.push_tabs(vec![tab("A"), tab("B")]);

            let session = Session::new(driver, fast_config());
            let outcome = session.run("https://example.com").await.unwrap();
            assert_eq!(
                outcome,
                Outcome::NewTabUrl("https://example.com/B".to_string())
            );
            // Each session starts from a clean journal: one kill, one
            // release, exactly one before/after snapshot pair plus the
            // teardown enumeration.
            assert_eq!(session.driver.count("kill"), 1);
            assert_eq!(session.driver.count("tabs"), 3);
        }
    }
}

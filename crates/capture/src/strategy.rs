//! Shortcut-trigger strategy engine.
//!
//! An escalating, ordered sequence of attempts to provoke the page into
//! opening a new tab via its keyboard shortcut, with tab-set diffing to
//! detect success. The schedule is an explicit state machine rather than
//! nested retry loops, so tests can drive individual states directly.

use std::time::Duration;

use browser::input::modifier_bit;
use serde::{Deserialize, Serialize};

use crate::driver::{Driver, DriverError, TabRef};
use crate::events::{SessionEvent, SessionEvents};

/// Escape is pressed this many times before each trigger, to knock the
/// page out of any modal state that would swallow the shortcut.
const ESCAPE_PRESSES: usize = 3;

/// Held-modifier duration. Some pages only arm their shortcut handler
/// after the modifier has been down for a while.
const MODIFIER_HOLD: Duration = Duration::from_secs(2);

/// Wait after the trigger for the new tab to materialize. A tab that is
/// still initializing would otherwise be missed by the diff.
const MATERIALIZE_DELAY: Duration = Duration::from_secs(5);

/// Fixed delay between attempts.
const BETWEEN_ATTEMPTS: Duration = Duration::from_secs(1);

/// Settle after the final-attempt reload.
const RELOAD_SETTLE: Duration = Duration::from_secs(1);

/// Bound for the final-attempt reload awaiting DOMContentLoaded.
const RELOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// One state of the escalation schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attempt {
    /// Escape x3, hold modifier, trigger key.
    Plain { round: u8 },
    /// Same, but click the page's visual center first to recover keyboard
    /// focus lost to the page.
    ClickFirst { round: u8 },
    /// Reload the page, then one last plain attempt.
    AfterReload,
}

/// The full escalation schedule: two plain attempts, two click-first
/// attempts, one attempt after a reload. Terminal on first success.
pub fn full_plan() -> Vec<Attempt> {
    vec![
        Attempt::Plain { round: 0 },
        Attempt::Plain { round: 1 },
        Attempt::ClickFirst { round: 0 },
        Attempt::ClickFirst { round: 1 },
        Attempt::AfterReload,
    ]
}

/// Reduced schedule used by the subprocess worker: a single plain attempt,
/// trading robustness for isolation.
pub fn single_attempt_plan() -> Vec<Attempt> {
    vec![Attempt::Plain { round: 0 }]
}

/// First tab present in `after` but not in `before`, by id. When more than
/// one new tab appeared, any of them is acceptable; first found wins.
pub fn first_new_tab<'a>(before: &[TabRef], after: &'a [TabRef]) -> Option<&'a TabRef> {
    after
        .iter()
        .find(|tab| !before.iter().any(|old| old.id == tab.id))
}

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Modifier held while the trigger key is pressed.
    pub modifier: String,
    /// The trigger key itself.
    pub trigger_key: String,
    pub modifier_hold: Duration,
    pub materialize_delay: Duration,
    pub between_attempts: Duration,
    pub reload_settle: Duration,
    pub reload_timeout: Duration,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            modifier: "Alt".to_string(),
            trigger_key: "s".to_string(),
            modifier_hold: MODIFIER_HOLD,
            materialize_delay: MATERIALIZE_DELAY,
            between_attempts: BETWEEN_ATTEMPTS,
            reload_settle: RELOAD_SETTLE,
            reload_timeout: RELOAD_TIMEOUT,
        }
    }
}

/// Runs an attempt schedule against a driver.
pub struct StrategyEngine<'a, D: Driver> {
    driver: &'a D,
    config: &'a StrategyConfig,
    events: &'a SessionEvents,
}

impl<'a, D: Driver> StrategyEngine<'a, D> {
    pub fn new(driver: &'a D, config: &'a StrategyConfig, events: &'a SessionEvents) -> Self {
        Self {
            driver,
            config,
            events,
        }
    }

    /// Execute `plan` in order, stopping at the first attempt that yields a
    /// new tab. `Ok(None)` means the schedule is exhausted.
    pub async fn run(&self, plan: &[Attempt]) -> Result<Option<String>, DriverError> {
        for (index, attempt) in plan.iter().copied().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.between_attempts).await;
            }

            if attempt == Attempt::AfterReload {
                tracing::info!("reloading page for final attempt");
                self.driver.reload(self.config.reload_timeout).await?;
                tokio::time::sleep(self.config.reload_settle).await;
            }

            let found = self.execute(attempt).await?;
            self.events.publish(SessionEvent::AttemptFinished {
                attempt,
                found: found.is_some(),
            });

            match found {
                Some(url) => {
                    tracing::info!(?attempt, %url, "new tab opened");
                    return Ok(Some(url));
                }
                None => tracing::debug!(?attempt, "no new tab"),
            }
        }

        tracing::info!("strategy schedule exhausted without a new tab");
        Ok(None)
    }

    /// One attempt: snapshot, (optionally) refocus, dismiss modals, fire
    /// the shortcut, wait, snapshot again, diff.
    async fn execute(&self, attempt: Attempt) -> Result<Option<String>, DriverError> {
        let before = self.driver.tabs().await?;

        if matches!(attempt, Attempt::ClickFirst { .. }) {
            self.click_page_center().await;
        }

        for _ in 0..ESCAPE_PRESSES {
            self.driver.press("Escape", 0).await?;
        }

        self.driver.hold(&self.config.modifier).await?;
        tokio::time::sleep(self.config.modifier_hold).await;
        self.driver
            .press(&self.config.trigger_key, modifier_bit(&self.config.modifier))
            .await?;
        self.driver.release_key(&self.config.modifier).await?;

        tokio::time::sleep(self.config.materialize_delay).await;

        let after = self.driver.tabs().await?;
        Ok(first_new_tab(&before, &after).map(|tab| tab.url.clone()))
    }

    /// Focus recovery. Failures here are logged and skipped - the attempt
    /// itself still runs, matching the rest of the escalation's tolerance
    /// for flaky page state.
    async fn click_page_center(&self) {
        match self.driver.viewport().await {
            Ok((width, height)) => {
                if let Err(err) = self.driver.click(width / 2.0, height / 2.0).await {
                    tracing::warn!("center click failed: {}", err);
                }
            }
            Err(err) => tracing::warn!("viewport lookup failed: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;

    fn fast_config() -> StrategyConfig {
        StrategyConfig {
            modifier_hold: Duration::ZERO,
            materialize_delay: Duration::ZERO,
            between_attempts: Duration::ZERO,
            reload_settle: Duration::ZERO,
            reload_timeout: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn tab(id: &str) -> TabRef {
        TabRef::new(id, format!("https://example.com/{id}"))
    }

    #[test]
    fn test_full_plan_shape() {
        let plan = full_plan();
        assert_eq!(plan.len(), 5);
        assert_eq!(plan[0], Attempt::Plain { round: 0 });
        assert_eq!(plan[2], Attempt::ClickFirst { round: 0 });
        assert_eq!(plan[4], Attempt::AfterReload);
    }

    #[test]
    fn test_diff_finds_the_new_tab() {
        let before = vec![tab("A")];
        let after = vec![tab("A"), tab("B")];
        let found = first_new_tab(&before, &after).unwrap();
        assert_eq!(found.url, "https://example.com/B");
    }

    #[test]
    fn test_diff_with_no_new_tab() {
        let tabs = vec![tab("A")];
        assert!(first_new_tab(&tabs, &tabs).is_none());
    }

    #[test]
    fn test_diff_with_multiple_new_tabs_takes_first_found() {
        let before = vec![tab("A")];
        let after = vec![tab("A"), tab("B"), tab("C")];
        assert_eq!(first_new_tab(&before, &after).unwrap().id, "B");
    }

    #[tokio::test]
    async fn test_first_success_is_terminal() {
        let driver = MockDriver::new();
        // Before first attempt: {A}; after: {A,B}.
        driver.push_tabs(vec![tab("A")]);
        driver.push_tabs(vec![tab("A"), tab("B")]);

        let events = SessionEvents::new();
        let config = fast_config();
        let engine = StrategyEngine::new(&driver, &config, &events);

        let found = engine.run(&full_plan()).await.unwrap();
        assert_eq!(found.as_deref(), Some("https://example.com/B"));
        // A terminal first attempt means exactly one before/after pair.
        assert_eq!(driver.count("tabs"), 2);
        assert_eq!(driver.count("reload"), 0);
        assert_eq!(driver.count("click"), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_runs_all_five_attempts() {
        let driver = MockDriver::new();
        driver.push_tabs(vec![tab("A")]); // repeats forever

        let events = SessionEvents::new();
        let mut rx = events.subscribe();
        let config = fast_config();
        let engine = StrategyEngine::new(&driver, &config, &events);

        let found = engine.run(&full_plan()).await.unwrap();
        assert!(found.is_none());

        // 5 attempts, each taking a before and an after snapshot.
        assert_eq!(driver.count("tabs"), 10);
        // Click-first attempts clicked; the reload attempt reloaded.
        assert_eq!(driver.count("click"), 2);
        assert_eq!(driver.count("reload"), 1);
        // Escape dismissal ran for every attempt.
        assert_eq!(driver.count("press Escape"), 15);

        let mut finished = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::AttemptFinished { attempt, found } = event {
                assert!(!found);
                finished.push(attempt);
            }
        }
        assert_eq!(finished, full_plan());
    }

    #[tokio::test]
    async fn test_click_first_attempt_clicks_center() {
        let driver = MockDriver::new();
        // Plain rounds find nothing; the first click-first round succeeds.
        driver.push_tabs(vec![tab("A")]); // plain 0 before
        driver.push_tabs(vec![tab("A")]); // plain 0 after
        driver.push_tabs(vec![tab("A")]); // plain 1 before
        driver.push_tabs(vec![tab("A")]); // plain 1 after
        driver.push_tabs(vec![tab("A")]); // click-first 0 before
        driver.push_tabs(vec![tab("A"), tab("B")]); // click-first 0 after

        let events = SessionEvents::new();
        let config = fast_config();
        let engine = StrategyEngine::new(&driver, &config, &events);

        let found = engine.run(&full_plan()).await.unwrap();
        assert_eq!(found.as_deref(), Some("https://example.com/B"));
        assert_eq!(driver.count("click"), 1);
        assert_eq!(driver.count("reload"), 0);
    }

    #[tokio::test]
    async fn test_viewport_failure_does_not_abort_the_attempt() {
        let driver = MockDriver::new();
        driver.fail_viewport();
        driver.push_tabs(vec![tab("A")]);

        let events = SessionEvents::new();
        let config = fast_config();
        let engine = StrategyEngine::new(&driver, &config, &events);

        // Exhausts the plan rather than erroring out on the click step.
        let found = engine.run(&full_plan()).await.unwrap();
        assert!(found.is_none());
        assert_eq!(driver.count("click"), 0);
    }

    #[tokio::test]
    async fn test_reduced_plan_is_one_plain_attempt() {
        let driver = MockDriver::new();
        driver.push_tabs(vec![tab("A")]);

        let events = SessionEvents::new();
        let config = fast_config();
        let engine = StrategyEngine::new(&driver, &config, &events);

        let found = engine.run(&single_attempt_plan()).await.unwrap();
        assert!(found.is_none());
        assert_eq!(driver.count("tabs"), 2);
        assert_eq!(driver.count("click"), 0);
        assert_eq!(driver.count("reload"), 0);
    }
}

//! Scripted driver for state-machine tests.
//!
//! Records every call in a journal and replays scripted responses, so
//! individual pipeline states can be driven without a browser.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::driver::{Driver, DriverError, TabRef};

#[derive(Default)]
pub(crate) struct MockDriver {
    journal: Mutex<Vec<String>>,
    navigations: Mutex<VecDeque<Result<(), DriverError>>>,
    tab_script: Mutex<Vec<Vec<TabRef>>>,
    tab_cursor: Mutex<usize>,
    evaluate: Mutex<Option<Result<Value, DriverError>>>,
    press_failure: AtomicBool,
    viewport_failure: AtomicBool,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next navigation. An empty queue means Ok.
    pub fn push_navigation(&self, result: Result<(), DriverError>) {
        self.navigations.lock().unwrap().push_back(result);
    }

    /// Queue the next tab snapshot. The last queued snapshot repeats once
    /// the script runs out.
    pub fn push_tabs(&self, tabs: Vec<TabRef>) {
        self.tab_script.lock().unwrap().push(tabs);
    }

    /// Set the result of the next clipboard probe.
    pub fn set_evaluate(&self, result: Result<Value, DriverError>) {
        *self.evaluate.lock().unwrap() = Some(result);
    }

    /// Make every key press fail.
    pub fn fail_presses(&self) {
        self.press_failure.store(true, Ordering::SeqCst);
    }

    /// Make viewport lookups fail.
    pub fn fail_viewport(&self) {
        self.viewport_failure.store(true, Ordering::SeqCst);
    }

    /// Number of journal entries starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }

    fn record(&self, entry: impl Into<String>) {
        self.journal.lock().unwrap().push(entry.into());
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), DriverError> {
        self.record(format!("navigate {url}"));
        self.navigations.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn reload(&self, _timeout: Duration) -> Result<(), DriverError> {
        self.record("reload");
        Ok(())
    }

    async fn press(&self, key: &str, _modifiers: i64) -> Result<(), DriverError> {
        self.record(format!("press {key}"));
        if self.press_failure.load(Ordering::SeqCst) {
            return Err(DriverError::Command("scripted press failure".to_string()));
        }
        Ok(())
    }

    async fn hold(&self, key: &str) -> Result<(), DriverError> {
        self.record(format!("keydown {key}"));
        Ok(())
    }

    async fn release_key(&self, key: &str) -> Result<(), DriverError> {
        self.record(format!("keyup {key}"));
        Ok(())
    }

    async fn click(&self, _x: f64, _y: f64) -> Result<(), DriverError> {
        self.record("click");
        Ok(())
    }

    async fn viewport(&self) -> Result<(f64, f64), DriverError> {
        self.record("viewport");
        if self.viewport_failure.load(Ordering::SeqCst) {
            return Err(DriverError::Command("scripted viewport failure".to_string()));
        }
        Ok((1280.0, 720.0))
    }

    async fn tabs(&self) -> Result<Vec<TabRef>, DriverError> {
        self.record("tabs");
        let script = self.tab_script.lock().unwrap();
        if script.is_empty() {
            return Ok(Vec::new());
        }
        let mut cursor = self.tab_cursor.lock().unwrap();
        let index = (*cursor).min(script.len() - 1);
        *cursor += 1;
        Ok(script[index].clone())
    }

    async fn evaluate(&self, _expression: &str) -> Result<Value, DriverError> {
        self.record("evaluate");
        self.evaluate
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Ok(Value::Null))
    }

    async fn send_close_keys(&self, tab: &TabRef) -> Result<(), DriverError> {
        self.record(format!("close {}", tab.id));
        Ok(())
    }

    async fn kill(&self) -> Result<(), DriverError> {
        self.record("kill");
        Ok(())
    }

    async fn release(&self) -> Result<(), DriverError> {
        self.record("release");
        Ok(())
    }

    fn blocked_request_count(&self) -> u64 {
        0
    }
}

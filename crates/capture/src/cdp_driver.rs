//! Production driver: the capture seam implemented over CDP plumbing.
//!
//! Owns the launched browser, the primary page session and the request
//! filter for one capture session. Everything the state machine calls goes
//! through here; nothing else in the core touches CDP.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

use browser::cdp::{CdpClient, CdpError};
use browser::filter::RequestFilter;
use browser::launcher::{self, Browser, LaunchError};
use browser::page::PageSession;

use crate::driver::{Driver, DriverError, TabRef};
use crate::session::CaptureConfig;

pub struct CdpDriver {
    browser: Mutex<Browser>,
    page: PageSession,
    filter: RequestFilter,
    client: Arc<CdpClient>,
    config: CaptureConfig,
}

impl CdpDriver {
    /// Launch a browser, open the primary page, pre-grant clipboard access
    /// for the target origin and install the request filter.
    pub async fn launch(config: &CaptureConfig, target_url: &str) -> Result<Self, LaunchError> {
        let browser = Browser::launch(&config.browser).await?;
        let client = browser.client.clone();
        let page = PageSession::create(client.clone()).await?;

        match Url::parse(target_url) {
            Ok(parsed) => {
                let origin = parsed.origin().ascii_serialization();
                if let Err(err) = page.grant_clipboard(&origin).await {
                    tracing::warn!(%origin, "clipboard grant failed: {}", err);
                }
            }
            Err(err) => tracing::warn!(%target_url, "cannot derive origin for clipboard grant: {}", err),
        }

        let filter = RequestFilter::install(&page).await?;

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            filter,
            client,
            config: config.clone(),
        })
    }
}

fn command_err(err: CdpError) -> DriverError {
    DriverError::Command(err.to_string())
}

fn navigation_err(err: CdpError) -> DriverError {
    match err {
        CdpError::Timeout(duration) => DriverError::Timeout(duration),
        other => DriverError::Navigation(other.to_string()),
    }
}

#[async_trait]
impl Driver for CdpDriver {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DriverError> {
        self.page.navigate(url, timeout).await.map_err(navigation_err)
    }

    async fn reload(&self, timeout: Duration) -> Result<(), DriverError> {
        self.page.reload(timeout).await.map_err(navigation_err)
    }

    async fn press(&self, key: &str, modifiers: i64) -> Result<(), DriverError> {
        self.page.press(key, modifiers).await.map_err(command_err)
    }

    async fn hold(&self, key: &str) -> Result<(), DriverError> {
        self.page.hold(key).await.map_err(command_err)
    }

    async fn release_key(&self, key: &str) -> Result<(), DriverError> {
        self.page.release(key).await.map_err(command_err)
    }

    async fn click(&self, x: f64, y: f64) -> Result<(), DriverError> {
        self.page.click(x, y).await.map_err(command_err)
    }

    async fn viewport(&self) -> Result<(f64, f64), DriverError> {
        self.page.viewport().await.map_err(command_err)
    }

    async fn tabs(&self) -> Result<Vec<TabRef>, DriverError> {
        let pages = self
            .browser
            .lock()
            .await
            .pages()
            .await
            .map_err(command_err)?;
        Ok(pages
            .into_iter()
            .map(|info| TabRef::new(info.target_id, info.url))
            .collect())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, DriverError> {
        self.page.evaluate(expression).await.map_err(command_err)
    }

    async fn send_close_keys(&self, tab: &TabRef) -> Result<(), DriverError> {
        if tab.id == self.page.target_id {
            return self.page.close_chord().await.map_err(command_err);
        }
        let session = PageSession::attach(self.client.clone(), tab.id.clone())
            .await
            .map_err(command_err)?;
        session.close_chord().await.map_err(command_err)
    }

    async fn kill(&self) -> Result<(), DriverError> {
        self.browser.lock().await.kill().await;
        Ok(())
    }

    async fn release(&self) -> Result<(), DriverError> {
        // Profile cleanup always runs, even when dropping the filter
        // subscription fails; the error is still reported to the caller.
        let filter_result = self.filter.release().await;

        let profile_dir = self.browser.lock().await.profile_dir().to_path_buf();
        launcher::cleanup_profiles(
            &self.config.browser.temp_dir,
            &profile_dir,
            self.config.browser.sweep_stale_profiles,
        )
        .await;

        filter_result.map_err(command_err)
    }

    fn blocked_request_count(&self) -> u64 {
        self.filter.blocked()
    }
}

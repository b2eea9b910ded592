//! Chromium launcher.
//!
//! Spawns a browser process with the fixed capability profile the capture
//! flow needs, waits for the DevTools endpoint to come up, and hands back a
//! connected [`CdpClient`]. Each launch gets its own profile directory under
//! the OS temp dir, named with a session-scoped suffix so concurrent
//! sessions cannot trample each other's profiles.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use uuid::Uuid;

use crate::cdp::client::{CdpClient, CdpError};
use crate::cdp::protocol::TargetInfo;

/// Name prefix for per-session profile directories in the temp dir.
pub const PROFILE_PREFIX: &str = "capture-chrome-profile-";

/// How often the DevToolsActivePort file is polled during startup.
const PORT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Fixed capability profile. Sandboxing off, full-screen start, GPU off,
/// HTTPS errors ignored, site isolation off. Not negotiated per call.
const LAUNCH_FLAGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--start-fullscreen",
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-infobars",
    "--ignore-certificate-errors",
    "--disable-web-security",
    "--disable-features=IsolateOrigins,site-per-process",
    "--disable-site-isolation-trials",
    "--disable-features=BlockInsecurePrivateNetworkRequests",
    "--no-first-run",
    "--no-default-browser-check",
];

/// Install locations probed when neither config nor environment names an
/// executable.
const WELL_KNOWN_EXECUTABLES: &[&str] = &[
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/opt/google/chrome/chrome",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
];

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no usable browser executable found")]
    ExecutableNotFound,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser did not open its DevTools endpoint within {0:?}")]
    Timeout(Duration),

    #[error("endpoint discovery failed: {0}")]
    Endpoint(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Cdp(#[from] CdpError),
}

/// Launch configuration.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Explicit executable path. Falls back to `CHROME` / `CHROMIUM_PATH`
    /// env vars, then well-known install locations.
    pub executable: Option<PathBuf>,
    /// The shortcut flow drives a real window by default, like the system
    /// it automates.
    pub headless: bool,
    /// Where per-session profile directories are created.
    pub temp_dir: PathBuf,
    pub launch_timeout: Duration,
    /// Also remove leftover profile directories from earlier crashed runs
    /// during cleanup. Off by default: a stale-looking directory may belong
    /// to a concurrent session.
    pub sweep_stale_profiles: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: false,
            temp_dir: std::env::temp_dir(),
            launch_timeout: Duration::from_secs(30),
            sweep_stale_profiles: false,
        }
    }
}

/// A launched browser process plus its CDP connection.
pub struct Browser {
    child: Option<Child>,
    pub client: Arc<CdpClient>,
    profile_dir: PathBuf,
}

impl Browser {
    /// Spawn Chromium and connect to its DevTools endpoint.
    pub async fn launch(config: &BrowserConfig) -> Result<Self, LaunchError> {
        let executable = resolve_executable(config)?;
        let profile_dir = config
            .temp_dir
            .join(format!("{}{}", PROFILE_PREFIX, Uuid::now_v7()));
        tokio::fs::create_dir_all(&profile_dir).await?;

        let mut command = Command::new(&executable);
        command
            .args(LAUNCH_FLAGS)
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile_dir.display()));
        if config.headless {
            command.arg("--headless=new");
        }
        command
            .arg("about:blank")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        tracing::debug!(executable = %executable.display(), profile = %profile_dir.display(), "launching browser");
        let started = std::time::Instant::now();
        let mut child = command.spawn()?;

        match Self::connect_launched(&profile_dir, config.launch_timeout).await {
            Ok(client) => {
                tracing::debug!(elapsed = ?started.elapsed(), "browser launched");
                Ok(Self {
                    child: Some(child),
                    client,
                    profile_dir,
                })
            }
            Err(e) => {
                if let Err(kill_err) = child.kill().await {
                    tracing::warn!("failed to kill browser after bad launch: {}", kill_err);
                }
                Err(e)
            }
        }
    }

    async fn connect_launched(
        profile_dir: &Path,
        timeout: Duration,
    ) -> Result<Arc<CdpClient>, LaunchError> {
        let port = wait_for_devtools_port(profile_dir, timeout).await?;
        let ws_url = discover_ws_url(port).await?;
        tracing::debug!(%ws_url, "browser endpoint up");
        Ok(CdpClient::connect(&ws_url).await?)
    }

    /// Profile directory backing this instance.
    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    /// Currently open page targets, in browser order.
    pub async fn pages(&self) -> Result<Vec<TargetInfo>, CdpError> {
        let result = self
            .client
            .send_request("Target.getTargets", None, None)
            .await?;
        let infos: Vec<TargetInfo> = serde_json::from_value(result["targetInfos"].clone())?;
        Ok(infos.into_iter().filter(TargetInfo::is_page).collect())
    }

    /// Forcibly kill the underlying browser process if it is still alive.
    /// Idempotent; errors are reported to the caller's log, not propagated.
    pub async fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.kill().await {
                Ok(()) => tracing::debug!("browser process killed"),
                Err(e) => tracing::warn!("failed to kill browser process: {}", e),
            }
        }
    }
}

fn resolve_executable(config: &BrowserConfig) -> Result<PathBuf, LaunchError> {
    if let Some(path) = &config.executable {
        return Ok(path.clone());
    }
    for var in ["CHROME", "CHROMIUM_PATH"] {
        if let Ok(value) = std::env::var(var) {
            let path = PathBuf::from(value);
            if path.exists() {
                return Ok(path);
            }
        }
    }
    for candidate in WELL_KNOWN_EXECUTABLES {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Ok(path);
        }
    }
    Err(LaunchError::ExecutableNotFound)
}

/// First line of DevToolsActivePort is the ephemeral debugging port.
fn parse_active_port(contents: &str) -> Option<u16> {
    contents.lines().next()?.trim().parse().ok()
}

async fn wait_for_devtools_port(profile_dir: &Path, timeout: Duration) -> Result<u16, LaunchError> {
    let port_file = profile_dir.join("DevToolsActivePort");
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(contents) = tokio::fs::read_to_string(&port_file).await {
            if let Some(port) = parse_active_port(&contents) {
                return Ok(port);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(LaunchError::Timeout(timeout));
        }
        tokio::time::sleep(PORT_POLL_INTERVAL).await;
    }
}

async fn discover_ws_url(port: u16) -> Result<String, LaunchError> {
    let version: Value = reqwest::get(format!("http://127.0.0.1:{}/json/version", port))
        .await?
        .json()
        .await?;
    version["webSocketDebuggerUrl"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| LaunchError::Endpoint("version info without webSocketDebuggerUrl".into()))
}

/// Best-effort removal of this session's profile directory, plus (opt-in)
/// leftovers from earlier runs matching the profile prefix. Errors are
/// logged and swallowed: cleanup must never mask the primary result.
pub async fn cleanup_profiles(temp_dir: &Path, own: &Path, sweep_stale: bool) {
    if let Err(e) = tokio::fs::remove_dir_all(own).await {
        tracing::warn!(dir = %own.display(), "profile cleanup failed: {}", e);
    }

    if !sweep_stale {
        return;
    }

    let mut entries = match tokio::fs::read_dir(temp_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %temp_dir.display(), "temp dir scan failed: {}", e);
            return;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(PROFILE_PREFIX) || entry.path() == own {
            continue;
        }
        if let Err(e) = tokio::fs::remove_dir_all(entry.path()).await {
            tracing::warn!(dir = %entry.path().display(), "stale profile removal failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_active_port() {
        assert_eq!(parse_active_port("33445\n/devtools/browser/abc"), Some(33445));
        assert_eq!(parse_active_port(""), None);
        assert_eq!(parse_active_port("not-a-port\n"), None);
    }

    #[test]
    fn test_explicit_executable_wins() {
        let config = BrowserConfig {
            executable: Some(PathBuf::from("/custom/chrome")),
            ..Default::default()
        };
        assert_eq!(
            resolve_executable(&config).unwrap(),
            PathBuf::from("/custom/chrome")
        );
    }

    #[tokio::test]
    async fn test_cleanup_removes_own_profile_only() {
        let temp = tempfile::tempdir().unwrap();
        let own = temp.path().join(format!("{}own", PROFILE_PREFIX));
        let stale = temp.path().join(format!("{}stale", PROFILE_PREFIX));
        let unrelated = temp.path().join("unrelated");
        for dir in [&own, &stale, &unrelated] {
            std::fs::create_dir_all(dir).unwrap();
        }

        cleanup_profiles(temp.path(), &own, false).await;

        assert!(!own.exists());
        assert!(stale.exists());
        assert!(unrelated.exists());
    }

    #[tokio::test]
    async fn test_cleanup_sweeps_stale_profiles_when_asked() {
        let temp = tempfile::tempdir().unwrap();
        let own = temp.path().join(format!("{}own", PROFILE_PREFIX));
        let stale = temp.path().join(format!("{}stale", PROFILE_PREFIX));
        let unrelated = temp.path().join("unrelated");
        for dir in [&own, &stale, &unrelated] {
            std::fs::create_dir_all(dir).unwrap();
        }

        cleanup_profiles(temp.path(), &own, true).await;

        assert!(!own.exists());
        assert!(!stale.exists());
        assert!(unrelated.exists());
    }

    #[tokio::test]
    #[ignore] // Needs an installed Chromium
    async fn test_launch_and_kill() {
        let config = BrowserConfig {
            headless: true,
            ..Default::default()
        };
        let mut browser = Browser::launch(&config).await.unwrap();
        let pages = browser.pages().await.unwrap();
        assert!(!pages.is_empty());
        browser.kill().await;
        cleanup_profiles(&config.temp_dir, browser.profile_dir(), false).await;
    }
}

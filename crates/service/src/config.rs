//! Service configuration from the environment.

use std::net::SocketAddr;

use capture::CaptureConfig;

use crate::isolation::IsolationMode;

/// Default bind address when `CAPTURE_BIND` is unset.
const DEFAULT_BIND: &str = "127.0.0.1:4500";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub isolation: IsolationMode,
    pub capture: CaptureConfig,
}

impl ServiceConfig {
    /// Read configuration from the environment:
    /// - `CAPTURE_BIND`: listen address
    /// - `CAPTURE_ISOLATION`: `in-process` (default) or `subprocess`
    ///
    /// The browser executable is resolved at launch time (`CHROME` /
    /// `CHROMIUM_PATH` env, then well-known locations).
    pub fn from_env() -> anyhow::Result<Self> {
        let bind = std::env::var("CAPTURE_BIND")
            .unwrap_or_else(|_| DEFAULT_BIND.to_string())
            .parse()?;

        let isolation = match std::env::var("CAPTURE_ISOLATION") {
            Ok(value) => value.parse()?,
            Err(_) => IsolationMode::InProcess,
        };

        Ok(Self {
            bind,
            isolation,
            capture: CaptureConfig::default(),
        })
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 4500)),
            isolation: IsolationMode::InProcess,
            capture: CaptureConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bind() {
        let config = ServiceConfig::default();
        assert_eq!(config.bind.port(), 4500);
        assert_eq!(config.isolation, IsolationMode::InProcess);
    }
}

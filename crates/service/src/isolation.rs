//! Per-request fault isolation.
//!
//! Two interchangeable runners behind one interface: the in-process call
//! into `capture`, and a subprocess variant that forks the worker binary so
//! a crashed browser interaction takes down only the child. The worker
//! receives its input as a base64 JSON argument and answers with a single
//! JSON message line on stdout.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use capture::{CaptureError, Controller, Outcome};

use crate::config::ServiceConfig;

/// Argument prefix carrying the worker payload.
pub const INPUT_DATA_FLAG: &str = "--input-data=";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationMode {
    /// Run the session on the server's own runtime.
    InProcess,
    /// Fork the worker binary per request (crash containment; reduced
    /// strategy schedule, no clipboard fallback).
    Subprocess,
}

impl FromStr for IsolationMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "in-process" => Ok(Self::InProcess),
            "subprocess" => Ok(Self::Subprocess),
            other => Err(anyhow::anyhow!("unknown isolation mode: {other}")),
        }
    }
}

/// Input handed to the worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPayload {
    pub url: String,
}

/// Message the worker prints on stdout before exiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_tab_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerMessage {
    pub fn new_tab(url: String) -> Self {
        Self {
            new_tab_url: Some(url),
            error: None,
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            new_tab_url: None,
            error: Some(message),
        }
    }
}

/// Encode a worker payload as base64 JSON for the command line.
pub fn encode_payload(payload: &WorkerPayload) -> Result<String, serde_json::Error> {
    Ok(STANDARD.encode(serde_json::to_vec(payload)?))
}

/// Decode a base64 JSON worker payload.
pub fn decode_payload(encoded: &str) -> anyhow::Result<WorkerPayload> {
    let bytes = STANDARD.decode(encoded)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Extract the worker payload from process arguments.
pub fn payload_from_args<I>(args: I) -> anyhow::Result<WorkerPayload>
where
    I: IntoIterator<Item = String>,
{
    let arg = args
        .into_iter()
        .find(|arg| arg.starts_with(INPUT_DATA_FLAG))
        .ok_or_else(|| anyhow::anyhow!("missing {INPUT_DATA_FLAG} argument"))?;
    decode_payload(&arg[INPUT_DATA_FLAG.len()..])
}

/// Run a capture through the configured isolation mode.
pub async fn run(config: &ServiceConfig, url: &str) -> Result<Outcome, CaptureError> {
    match config.isolation {
        IsolationMode::InProcess => Controller::new(config.capture.clone()).capture(url).await,
        IsolationMode::Subprocess => run_in_subprocess(url).await,
    }
}

/// Fork the worker binary and map its message/exit to an outcome.
pub async fn run_in_subprocess(url: &str) -> Result<Outcome, CaptureError> {
    let payload = encode_payload(&WorkerPayload {
        url: url.to_string(),
    })
    .map_err(|err| CaptureError::Worker(format!("payload encoding failed: {err}")))?;

    let binary = worker_binary().map_err(|err| CaptureError::Worker(err.to_string()))?;

    tracing::debug!(worker = %binary.display(), "forking capture worker");
    let output = tokio::process::Command::new(&binary)
        .arg(format!("{INPUT_DATA_FLAG}{payload}"))
        .stdin(std::process::Stdio::null())
        .stderr(std::process::Stdio::inherit())
        .output()
        .await
        .map_err(|err| CaptureError::Worker(format!("failed to spawn worker: {err}")))?;

    map_worker_output(&output.stdout, output.status.success())
}

/// The worker binary sits next to the server binary unless
/// `CAPTURE_WORKER_BIN` points elsewhere.
fn worker_binary() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("CAPTURE_WORKER_BIN") {
        return Ok(PathBuf::from(path));
    }
    let exe = std::env::current_exe()?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow::anyhow!("executable has no parent directory"))?;
    Ok(dir.join("capture-worker"))
}

/// Map worker stdout plus exit status to a result. A message line wins over
/// the exit code; a missing message is a failure either way.
pub fn map_worker_output(stdout: &[u8], clean_exit: bool) -> Result<Outcome, CaptureError> {
    for line in String::from_utf8_lossy(stdout).lines() {
        let Ok(message) = serde_json::from_str::<WorkerMessage>(line) else {
            continue;
        };
        if let Some(url) = message.new_tab_url {
            return Ok(Outcome::NewTabUrl(url));
        }
        if let Some(error) = message.error {
            return Err(CaptureError::Worker(error));
        }
    }

    if clean_exit {
        Err(CaptureError::Worker(
            "worker produced no result message".to_string(),
        ))
    } else {
        Err(CaptureError::Worker(
            "worker exited with failure".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_mode_parsing() {
        assert_eq!(
            "in-process".parse::<IsolationMode>().unwrap(),
            IsolationMode::InProcess
        );
        assert_eq!(
            "subprocess".parse::<IsolationMode>().unwrap(),
            IsolationMode::Subprocess
        );
        assert!("threads".parse::<IsolationMode>().is_err());
    }

    #[test]
    fn test_payload_codec() {
        let payload = WorkerPayload {
            url: "https://example.com/page?x=1".to_string(),
        };
        let encoded = encode_payload(&payload).unwrap();
        assert_eq!(decode_payload(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_payload_from_args() {
        let payload = WorkerPayload {
            url: "https://example.com".to_string(),
        };
        let args = vec![
            "capture-worker".to_string(),
            format!("{INPUT_DATA_FLAG}{}", encode_payload(&payload).unwrap()),
        ];
        assert_eq!(payload_from_args(args).unwrap(), payload);

        assert!(payload_from_args(vec!["capture-worker".to_string()]).is_err());
    }

    #[test]
    fn test_worker_message_wire_shape() {
        let ok = WorkerMessage::new_tab("https://x.test".to_string());
        assert_eq!(
            serde_json::to_string(&ok).unwrap(),
            r#"{"newTabUrl":"https://x.test"}"#
        );

        let failed = WorkerMessage::failure("boom".to_string());
        assert_eq!(serde_json::to_string(&failed).unwrap(), r#"{"error":"boom"}"#);
    }

    #[test]
    fn test_map_worker_output_message_wins() {
        let result = map_worker_output(br#"{"newTabUrl":"https://x.test"}"#, true).unwrap();
        assert_eq!(result, Outcome::NewTabUrl("https://x.test".to_string()));

        // A message beats a dirty exit code.
        let result = map_worker_output(br#"{"newTabUrl":"https://x.test"}"#, false).unwrap();
        assert_eq!(result, Outcome::NewTabUrl("https://x.test".to_string()));
    }

    #[test]
    fn test_map_worker_output_error_message() {
        let err = map_worker_output(br#"{"error":"no new tab opened"}"#, false).unwrap_err();
        assert!(matches!(err, CaptureError::Worker(message) if message == "no new tab opened"));
    }

    #[test]
    fn test_map_worker_output_without_message() {
        assert!(map_worker_output(b"", false).is_err());
        assert!(map_worker_output(b"", true).is_err());
        // Stray log lines on stdout are skipped, not fatal.
        assert!(map_worker_output(b"warming up\n", true).is_err());
    }
}

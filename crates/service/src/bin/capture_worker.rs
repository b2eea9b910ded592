//! Subprocess capture worker.
//!
//! Receives `--input-data=<base64 {"url"}>` on the command line, runs the
//! reduced pipeline (navigation retry plus one plain shortcut attempt) and
//! prints a single JSON message line on stdout: `{"newTabUrl": ...}` or
//! `{"error": ...}`. Exits 0 on success, 1 on failure. Logs go to stderr
//! so they cannot corrupt the message channel.

use capture::{CaptureConfig, Controller};
use service::isolation::{payload_from_args, WorkerMessage};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    let payload = match payload_from_args(std::env::args()) {
        Ok(payload) => payload,
        Err(err) => return emit(WorkerMessage::failure(format!("bad worker input: {err}"))),
    };

    let controller = Controller::new(CaptureConfig::default());
    match controller.capture_once(&payload.url).await {
        Ok(url) => emit(WorkerMessage::new_tab(url)),
        Err(err) => emit(WorkerMessage::failure(err.to_string())),
    }
}

fn emit(message: WorkerMessage) -> i32 {
    match serde_json::to_string(&message) {
        Ok(line) => println!("{line}"),
        Err(err) => {
            eprintln!("failed to serialize worker message: {err}");
            return 1;
        }
    }
    if message.error.is_some() {
        1
    } else {
        0
    }
}

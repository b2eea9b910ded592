//! Run one full capture session against a URL from the command line.
//!
//! ```sh
//! cargo run --example capture_url -- https://example.com
//! ```

use capture::{CaptureConfig, Controller};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://example.com".to_string());

    let controller = Controller::new(CaptureConfig::default());
    let outcome = controller.capture(&url).await?;
    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}

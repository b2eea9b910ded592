//! Result resolver - turns the strategy outcome into a payload.
//!
//! When no new tab appeared, the page clipboard is probed as a fallback:
//! some targets copy the link instead of opening it. The probe is
//! best-effort and confined to the page's script context; a failed read
//! degrades to the sentinel value rather than an error.

use serde_json::Value;

use crate::driver::Driver;
use crate::outcome::Outcome;

/// Sentinel reported when the clipboard was empty or unreadable. The two
/// cases are distinguished only in logs, not in the payload.
pub const EMPTY_CLIPBOARD: &str = "nothing";

/// Paste into an ephemeral invisible input and read it back. Runs inside
/// the page, so it sees whatever the page's origin is allowed to see.
const CLIPBOARD_PROBE: &str = r#"
(() => {
    const input = document.createElement('input');
    document.body.appendChild(input);
    input.style.position = 'fixed';
    input.style.opacity = '0';
    input.focus();
    document.execCommand('paste');
    const text = input.value;
    document.body.removeChild(input);
    return text;
})()
"#;

/// Convert the strategy engine's outcome into the session payload.
pub async fn resolve<D: Driver>(driver: &D, found: Option<String>) -> Outcome {
    match found {
        Some(url) => Outcome::NewTabUrl(url),
        None => Outcome::ClipboardText(read_clipboard(driver).await),
    }
}

async fn read_clipboard<D: Driver>(driver: &D) -> String {
    match driver.evaluate(CLIPBOARD_PROBE).await {
        Ok(Value::String(text)) => {
            tracing::info!(clipboard = %text, "clipboard fallback read");
            text
        }
        Ok(other) => {
            tracing::warn!(?other, "clipboard probe returned a non-string");
            EMPTY_CLIPBOARD.to_string()
        }
        Err(err) => {
            tracing::warn!("clipboard read failed: {}", err);
            EMPTY_CLIPBOARD.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverError;
    use crate::mock::MockDriver;

    #[tokio::test]
    async fn test_found_url_short_circuits() {
        let driver = MockDriver::new();
        let outcome = resolve(&driver, Some("https://example.com/share".to_string())).await;
        assert_eq!(
            outcome,
            Outcome::NewTabUrl("https://example.com/share".to_string())
        );
        assert_eq!(driver.count("evaluate"), 0);
    }

    #[tokio::test]
    async fn test_clipboard_fallback_reads_text() {
        let driver = MockDriver::new();
        driver.set_evaluate(Ok(serde_json::json!("X")));

        let outcome = resolve(&driver, None).await;
        assert_eq!(outcome, Outcome::ClipboardText("X".to_string()));
    }

    #[tokio::test]
    async fn test_clipboard_failure_degrades_to_sentinel() {
        let driver = MockDriver::new();
        driver.set_evaluate(Err(DriverError::Command("Execution context destroyed".to_string())));

        let outcome = resolve(&driver, None).await;
        assert_eq!(outcome, Outcome::ClipboardText(EMPTY_CLIPBOARD.to_string()));
    }

    #[tokio::test]
    async fn test_non_string_probe_result_degrades_to_sentinel() {
        let driver = MockDriver::new();
        driver.set_evaluate(Ok(serde_json::json!(null)));

        let outcome = resolve(&driver, None).await;
        assert_eq!(outcome, Outcome::ClipboardText(EMPTY_CLIPBOARD.to_string()));
    }
}

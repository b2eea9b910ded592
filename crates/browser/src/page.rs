//! Page session - a CDP session attached to one page target.
//!
//! Design: lightweight wrapper around [`CdpClient`] with target-specific
//! context. All sessions share the same WebSocket - no per-session
//! connection overhead. On top of the raw command channel this layer adds
//! the page operations the capture flow needs: navigation with a
//! DOMContentLoaded completion condition, script evaluation, and
//! synthesized keyboard/mouse input.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::cdp::client::{CdpClient, CdpError, Result};
use crate::cdp::protocol::{AttachToTargetResult, SessionId, TargetId};
use crate::input::{self, modifiers};

/// CDP session bound to a specific page target.
#[derive(Clone)]
pub struct PageSession {
    client: Arc<CdpClient>,
    pub target_id: TargetId,
    pub session_id: SessionId,
}

impl PageSession {
    /// Create a fresh blank page target and attach to it.
    pub async fn create(client: Arc<CdpClient>) -> Result<Self> {
        let result = client
            .send_request(
                "Target.createTarget",
                Some(json!({ "url": "about:blank" })),
                None,
            )
            .await?;

        let target_id: TargetId = result["targetId"]
            .as_str()
            .ok_or_else(|| CdpError::Protocol {
                code: 0,
                message: "missing targetId in createTarget result".to_string(),
            })?
            .to_string();

        Self::attach(client, target_id).await
    }

    /// Attach to an existing target and enable the domains the capture
    /// flow relies on.
    pub async fn attach(client: Arc<CdpClient>, target_id: TargetId) -> Result<Self> {
        let result = client
            .send_request(
                "Target.attachToTarget",
                Some(json!({
                    "targetId": target_id,
                    "flatten": true,
                })),
                None,
            )
            .await?;

        let attach_result: AttachToTargetResult = serde_json::from_value(result)?;
        let session_id = attach_result.session_id;

        for domain in ["Page", "Runtime"] {
            client
                .send_request(format!("{}.enable", domain), None, Some(session_id.clone()))
                .await?;
        }

        Ok(Self {
            client,
            target_id,
            session_id,
        })
    }

    /// Send a command within this session's context.
    pub async fn send(&self, method: impl Into<String>, params: Option<Value>) -> Result<Value> {
        self.client
            .send_request(method, params, Some(self.session_id.clone()))
            .await
    }

    /// Shared CDP client handle.
    pub fn client(&self) -> &Arc<CdpClient> {
        &self.client
    }

    /// Navigate to `url`, resolving on DOMContentLoaded (not network idle,
    /// which stalls on long-polling pages), bounded by `timeout`.
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        // Register the waiter first so a fast load cannot slip past us.
        let loaded = self
            .client
            .expect_event("Page.domContentEventFired", Some(self.session_id.clone()));

        let result = self
            .send("Page.navigate", Some(json!({ "url": url })))
            .await?;

        if let Some(text) = result.get("errorText").and_then(Value::as_str) {
            if !text.is_empty() {
                return Err(CdpError::Navigation(text.to_string()));
            }
        }

        loaded.wait(timeout).await?;
        Ok(())
    }

    /// Reload the page, resolving on DOMContentLoaded.
    pub async fn reload(&self, timeout: Duration) -> Result<()> {
        let loaded = self
            .client
            .expect_event("Page.domContentEventFired", Some(self.session_id.clone()));

        self.send("Page.reload", None).await?;

        loaded.wait(timeout).await?;
        Ok(())
    }

    /// Evaluate JavaScript in the page, returning the completion value.
    /// `userGesture` is set so clipboard access inside the expression is
    /// treated as user-activated.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .send(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                    "userGesture": true,
                })),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let text = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("unknown script exception");
            return Err(CdpError::Evaluate(text.to_string()));
        }

        Ok(result["result"]["value"].clone())
    }

    async fn dispatch_key(&self, event_type: &str, name: &str, mods: i64) -> Result<()> {
        let def = input::lookup(name).ok_or_else(|| CdpError::UnknownKey(name.to_string()))?;
        self.send(
            "Input.dispatchKeyEvent",
            Some(json!({
                "type": event_type,
                "key": def.key,
                "code": def.code,
                "windowsVirtualKeyCode": def.key_code,
                "nativeVirtualKeyCode": def.key_code,
                "modifiers": mods,
            })),
        )
        .await?;
        Ok(())
    }

    /// Press and release a key with the given modifier bits active.
    pub async fn press(&self, name: &str, mods: i64) -> Result<()> {
        self.dispatch_key("rawKeyDown", name, mods).await?;
        self.dispatch_key("keyUp", name, mods).await
    }

    /// Push a modifier key down and leave it held.
    pub async fn hold(&self, name: &str) -> Result<()> {
        self.dispatch_key("rawKeyDown", name, input::modifier_bit(name))
            .await
    }

    /// Release a previously held modifier key.
    pub async fn release(&self, name: &str) -> Result<()> {
        self.dispatch_key("keyUp", name, input::modifier_bit(name))
            .await
    }

    /// Synthesize the OS close-window accelerator (Alt+F4) on this page.
    /// Used instead of Target.closeTarget, which can hang when the page is
    /// stuck in a modal state.
    pub async fn close_chord(&self) -> Result<()> {
        self.hold("Alt").await?;
        self.press("F4", modifiers::ALT).await?;
        self.release("Alt").await
    }

    /// Left-click at page coordinates.
    pub async fn click(&self, x: f64, y: f64) -> Result<()> {
        for event_type in ["mousePressed", "mouseReleased"] {
            self.send(
                "Input.dispatchMouseEvent",
                Some(json!({
                    "type": event_type,
                    "x": x,
                    "y": y,
                    "button": "left",
                    "clickCount": 1,
                })),
            )
            .await?;
        }
        Ok(())
    }

    /// Visual viewport size in CSS pixels.
    pub async fn viewport(&self) -> Result<(f64, f64)> {
        let metrics = self.send("Page.getLayoutMetrics", None).await?;
        let viewport = if metrics.get("cssVisualViewport").is_some() {
            &metrics["cssVisualViewport"]
        } else {
            &metrics["layoutViewport"]
        };

        let width = viewport["clientWidth"].as_f64();
        let height = viewport["clientHeight"].as_f64();
        match (width, height) {
            (Some(w), Some(h)) => Ok((w, h)),
            _ => Err(CdpError::Protocol {
                code: 0,
                message: "layout metrics without viewport dimensions".to_string(),
            }),
        }
    }

    /// Pre-grant clipboard read/write for `origin` (browser-level command,
    /// applies to the default browser context).
    pub async fn grant_clipboard(&self, origin: &str) -> Result<()> {
        self.client
            .send_request(
                "Browser.grantPermissions",
                Some(json!({
                    "origin": origin,
                    "permissions": ["clipboardReadWrite", "clipboardSanitizedWrite"],
                })),
                None,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Page-level behavior needs a live browser; covered by the ignored
    // end-to-end test in the launcher module. What can be checked here is
    // the key table wiring.

    #[test]
    fn test_close_chord_keys_are_defined() {
        assert!(input::lookup("Alt").is_some());
        assert!(input::lookup("F4").is_some());
    }
}

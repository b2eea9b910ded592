//! CDP protocol types.
//!
//! Fundamental wire types for CDP communication. Keep them minimal - add
//! domain-specific types only when a caller actually needs them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request ID - monotonically increasing per connection.
pub type RequestId = u64;

/// Target ID from Chrome (one per page/tab).
pub type TargetId = String;

/// Session ID for attached targets.
pub type SessionId = String;

/// CDP request sent to the browser.
#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// CDP response from the browser.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponse {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<CdpProtocolError>,
}

/// Error object inside a CDP response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CdpProtocolError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// CDP event from the browser (no request ID).
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

/// Unified incoming CDP message (response or event).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CdpMessage {
    Response(CdpResponse),
    Event(CdpEvent),
}

/// Target info from Target.getTargets / Target.getTargetInfo.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetInfo {
    #[serde(rename = "targetId")]
    pub target_id: TargetId,
    #[serde(rename = "type")]
    pub target_type: String,
    pub title: String,
    pub url: String,
    pub attached: bool,
}

impl TargetInfo {
    /// Only page targets count as tabs; workers, extensions and the
    /// browser target itself are filtered out by callers.
    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }
}

/// Result of Target.attachToTarget.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachToTargetResult {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_skips_empty_fields() {
        let request = CdpRequest {
            id: 1,
            method: "Browser.getVersion".to_string(),
            params: None,
            session_id: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"id":1,"method":"Browser.getVersion"}"#);
    }

    #[test]
    fn test_message_disambiguation() {
        let response: CdpMessage =
            serde_json::from_str(r#"{"id":3,"result":{"ok":true}}"#).unwrap();
        assert!(matches!(response, CdpMessage::Response(r) if r.id == 3));

        let event: CdpMessage = serde_json::from_str(
            r#"{"method":"Page.domContentEventFired","params":{"timestamp":1.0},"sessionId":"S1"}"#,
        )
        .unwrap();
        match event {
            CdpMessage::Event(e) => {
                assert_eq!(e.method, "Page.domContentEventFired");
                assert_eq!(e.session_id.as_deref(), Some("S1"));
            }
            _ => panic!("expected event"),
        }
    }

    #[test]
    fn test_page_targets() {
        let info: TargetInfo = serde_json::from_str(
            r#"{"targetId":"T1","type":"page","title":"t","url":"https://example.com","attached":false}"#,
        )
        .unwrap();
        assert!(info.is_page());

        let worker: TargetInfo = serde_json::from_str(
            r#"{"targetId":"T2","type":"service_worker","title":"","url":"","attached":true}"#,
        )
        .unwrap();
        assert!(!worker.is_page());
    }
}

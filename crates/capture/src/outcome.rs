//! Final payload of a capture session.

use serde::{Deserialize, Serialize};

/// Exactly one outcome is produced per session. Serialized externally
/// tagged, so the wire shape is `{"newTabUrl": ...}` or
/// `{"clipboardText": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The strategy engine provoked a new tab; this is its URL.
    #[serde(rename = "newTabUrl")]
    NewTabUrl(String),

    /// No tab appeared; clipboard fallback result. Carries the sentinel
    /// `"nothing"` when the clipboard was empty or unreadable.
    #[serde(rename = "clipboardText")]
    ClipboardText(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let tab = Outcome::NewTabUrl("https://example.com/share".to_string());
        assert_eq!(
            serde_json::to_string(&tab).unwrap(),
            r#"{"newTabUrl":"https://example.com/share"}"#
        );

        let clipboard = Outcome::ClipboardText("nothing".to_string());
        assert_eq!(
            serde_json::to_string(&clipboard).unwrap(),
            r#"{"clipboardText":"nothing"}"#
        );
    }

    #[test]
    fn test_roundtrip_from_wire() {
        let parsed: Outcome = serde_json::from_str(r#"{"newTabUrl":"https://x.test"}"#).unwrap();
        assert_eq!(parsed, Outcome::NewTabUrl("https://x.test".to_string()));
    }
}

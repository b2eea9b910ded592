//! Request filter - aborts render-only resource loads.
//!
//! Only DOM and interaction state matter to the capture flow, not rendering
//! fidelity, so image/stylesheet/font requests are failed before they reach
//! the network. Everything else continues unmodified. The aborted count is
//! kept for the teardown summary log.

use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::cdp::client::{CdpClient, Result, SubscriptionId};
use crate::cdp::protocol::SessionId;
use crate::page::PageSession;

/// Resource types dropped by the filter (CDP `Network.ResourceType` names).
pub const BLOCKED_RESOURCE_TYPES: [&str; 3] = ["Image", "Stylesheet", "Font"];

/// Whether a paused request of this resource type should be aborted.
pub fn is_blocked_resource(resource_type: &str) -> bool {
    BLOCKED_RESOURCE_TYPES.contains(&resource_type)
}

/// Scoped Fetch-domain interception on one page session. Installed at
/// session start, released at teardown; the subscription ID ties the
/// lifetime of the event handler to the session that registered it.
pub struct RequestFilter {
    client: Arc<CdpClient>,
    session_id: SessionId,
    subscription: SubscriptionId,
    blocked: Arc<AtomicU64>,
}

impl RequestFilter {
    /// Enable Fetch interception on `page` and start filtering.
    pub async fn install(page: &PageSession) -> Result<Self> {
        page.send(
            "Fetch.enable",
            Some(json!({
                "patterns": [{ "urlPattern": "*", "requestStage": "Request" }],
            })),
        )
        .await?;

        let client = page.client().clone();
        let session_id = page.session_id.clone();
        let blocked = Arc::new(AtomicU64::new(0));

        // The callback must not keep the client alive past teardown, so it
        // holds a Weak and upgrades per event.
        let weak: Weak<CdpClient> = Arc::downgrade(&client);
        let counter = blocked.clone();
        let session = session_id.clone();

        let subscription = client.subscribe(
            "Fetch.requestPaused",
            Arc::new(move |event| {
                if event.session_id.as_deref() != Some(session.as_str()) {
                    return;
                }
                let Some(client) = weak.upgrade() else { return };
                let Some(params) = event.params else { return };
                let Some(request_id) = params["requestId"].as_str().map(str::to_string) else {
                    return;
                };
                let resource_type = params["resourceType"].as_str().unwrap_or("").to_string();

                let counter = counter.clone();
                let session = session.clone();
                tokio::spawn(async move {
                    let verdict = if is_blocked_resource(&resource_type) {
                        counter.fetch_add(1, Ordering::Relaxed);
                        client
                            .send_request(
                                "Fetch.failRequest",
                                Some(json!({
                                    "requestId": request_id,
                                    "errorReason": "BlockedByClient",
                                })),
                                Some(session),
                            )
                            .await
                    } else {
                        client
                            .send_request(
                                "Fetch.continueRequest",
                                Some(json!({ "requestId": request_id })),
                                Some(session),
                            )
                            .await
                    };
                    if let Err(e) = verdict {
                        // Races with navigation are expected; the request is
                        // already gone by the time the verdict lands.
                        tracing::debug!("request filter verdict failed: {}", e);
                    }
                });
            }),
        );

        Ok(Self {
            client,
            session_id,
            subscription,
            blocked,
        })
    }

    /// Number of requests aborted so far.
    pub fn blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    /// Drop the event subscription and disable interception.
    pub async fn release(&self) -> Result<()> {
        self.client
            .unsubscribe("Fetch.requestPaused", self.subscription);
        self.client
            .send_request("Fetch.disable", None, Some(self.session_id.clone()))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_resource_classification() {
        assert!(is_blocked_resource("Image"));
        assert!(is_blocked_resource("Stylesheet"));
        assert!(is_blocked_resource("Font"));
        assert!(!is_blocked_resource("Document"));
        assert!(!is_blocked_resource("XHR"));
        assert!(!is_blocked_resource("Script"));
    }
}

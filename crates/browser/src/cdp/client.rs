//! CDP client - the core communication layer.
//!
//! Design decisions:
//! 1. Single WebSocket per browser connection (no per-session WS overhead)
//! 2. Async message passing - no locks on send/receive path
//! 3. Request/response matching via ID, events broadcast to subscribers
//! 4. Subscriptions carry IDs so a session can release exactly what it
//!    registered at teardown
//! 5. Fail fast - no retries, no queuing. Let the caller decide.

use dashmap::DashMap;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::protocol::*;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Error, Debug)]
pub enum CdpError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CDP protocol error: {code} - {message}")]
    Protocol { code: i32, message: String },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("script exception: {0}")]
    Evaluate(String),

    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed")]
    Closed,
}

/// Result type for CDP operations.
pub type Result<T> = std::result::Result<T, CdpError>;

/// Event subscriber callback.
pub type EventCallback = Arc<dyn Fn(CdpEvent) + Send + Sync>;

/// Handle for releasing a subscription registered with [`CdpClient::subscribe`].
pub type SubscriptionId = u64;

struct Waiter {
    session: Option<SessionId>,
    tx: oneshot::Sender<CdpEvent>,
}

/// One-shot wait for a single protocol event, registered before the
/// triggering command is sent so the event cannot be missed.
pub struct EventWaiter {
    rx: oneshot::Receiver<CdpEvent>,
}

impl EventWaiter {
    /// Wait for the event, bounded by `timeout`.
    pub async fn wait(self, timeout: Duration) -> Result<CdpEvent> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(CdpError::Closed),
            Err(_) => Err(CdpError::Timeout(timeout)),
        }
    }
}

/// CDP client - manages a single WebSocket connection to the browser.
pub struct CdpClient {
    /// Monotonic request ID counter.
    next_id: AtomicU64,

    /// Monotonic subscription ID counter.
    next_subscription: AtomicU64,

    /// Pending requests waiting for responses, keyed by request ID.
    pending: Arc<DashMap<RequestId, oneshot::Sender<CdpResponse>>>,

    /// Persistent event subscribers, keyed by method name.
    subscribers: Arc<DashMap<String, Vec<(SubscriptionId, EventCallback)>>>,

    /// One-shot event waiters, keyed by method name.
    waiters: Arc<DashMap<String, Vec<Waiter>>>,

    /// WebSocket write half (wrapped for concurrent sending).
    ws_sink: Arc<RwLock<WsSink>>,
}

impl CdpClient {
    /// Connect to a Chrome DevTools Protocol endpoint.
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (sink, mut stream) = ws_stream.split();

        let client = Arc::new(Self {
            next_id: AtomicU64::new(1),
            next_subscription: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
            subscribers: Arc::new(DashMap::new()),
            waiters: Arc::new(DashMap::new()),
            ws_sink: Arc::new(RwLock::new(sink)),
        });

        // Reader task: lives until the socket closes or errors out.
        let client_clone = client.clone();
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Err(e) = client_clone.handle_message(&text) {
                            tracing::error!("failed to handle CDP message: {}", e);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::debug!("CDP WebSocket closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("CDP WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            // Dropping the senders fails every in-flight wait with Closed.
            client_clone.pending.clear();
            client_clone.waiters.clear();
        });

        Ok(client)
    }

    /// Send a CDP request and wait for its response.
    pub async fn send_request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method: method.into(),
            params,
            session_id,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let json = serde_json::to_string(&request)?;
        let mut sink = self.ws_sink.write().await;
        sink.send(Message::Text(json)).await?;
        drop(sink); // Release lock immediately

        let response = rx.await.map_err(|_| CdpError::Closed)?;

        if let Some(error) = response.error {
            return Err(CdpError::Protocol {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Subscribe to a CDP event. The returned ID releases exactly this
    /// subscription via [`CdpClient::unsubscribe`].
    pub fn subscribe(&self, method: impl Into<String>, callback: EventCallback) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .entry(method.into())
            .or_default()
            .push((id, callback));
        id
    }

    /// Remove a previously registered subscription.
    pub fn unsubscribe(&self, method: &str, id: SubscriptionId) {
        if let Some(mut entry) = self.subscribers.get_mut(method) {
            entry.retain(|(sub_id, _)| *sub_id != id);
        }
    }

    /// Register a one-shot waiter for the next matching event. Must be
    /// called before sending the command that triggers the event.
    pub fn expect_event(
        &self,
        method: impl Into<String>,
        session: Option<SessionId>,
    ) -> EventWaiter {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .entry(method.into())
            .or_default()
            .push(Waiter { session, tx });
        EventWaiter { rx }
    }

    /// Handle an incoming WebSocket message.
    fn handle_message(&self, text: &str) -> Result<()> {
        let msg: CdpMessage = serde_json::from_str(text)?;

        match msg {
            CdpMessage::Response(response) => {
                if let Some((_, tx)) = self.pending.remove(&response.id) {
                    let _ = tx.send(response); // Ignore send errors (receiver dropped)
                } else {
                    tracing::warn!("response for unknown request: {}", response.id);
                }
            }
            CdpMessage::Event(event) => {
                for tx in self.take_matching_waiters(&event) {
                    let _ = tx.send(event.clone());
                }
                if let Some(subscribers) = self.subscribers.get(&event.method) {
                    for (_, callback) in subscribers.value() {
                        callback(event.clone());
                    }
                }
            }
        }

        Ok(())
    }

    /// Pull out every one-shot waiter matched by `event`, keeping the rest.
    fn take_matching_waiters(&self, event: &CdpEvent) -> Vec<oneshot::Sender<CdpEvent>> {
        let mut taken = Vec::new();
        if let Some(mut entry) = self.waiters.get_mut(&event.method) {
            let mut kept = Vec::new();
            for waiter in entry.drain(..) {
                let matched = match &waiter.session {
                    Some(session) => event.session_id.as_deref() == Some(session.as_str()),
                    None => true,
                };
                if matched {
                    taken.push(waiter.tx);
                } else {
                    kept.push(waiter);
                }
            }
            entry.extend(kept);
        }
        taken
    }

    /// Close the connection gracefully.
    pub async fn close(self: Arc<Self>) -> Result<()> {
        let mut sink = self.ws_sink.write().await;
        sink.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Connection-level tests need a running Chrome instance.

    #[tokio::test]
    #[ignore]
    async fn test_connect() {
        let client = CdpClient::connect("ws://localhost:9222/devtools/browser")
            .await
            .unwrap();

        let result = client
            .send_request("Browser.getVersion", None, None)
            .await
            .unwrap();

        println!("Browser version: {:?}", result);
    }

    #[tokio::test]
    async fn test_waiter_times_out_without_event() {
        let (_tx, rx) = oneshot::channel();
        let waiter = EventWaiter { rx };
        let err = waiter.wait(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, CdpError::Timeout(_)));
    }
}

//! Upstream pub/sub subscriber.
//!
//! ```text
//! DISCONNECTED → CONNECTING → SUBSCRIBED → (error / close) → DISCONNECTED
//! ```
//!
//! While `SUBSCRIBED` the subscriber keeps the upstream subscription set
//! equal to what the adapter wants for the current wallet snapshot, pings
//! the node every `keepalive`, and turns each notification into a
//! [`RawEvent`] on the outbound channel. On disconnect all bookkeeping is
//! dropped and the connection is retried with capped exponential backoff
//! until the reconnect budget runs out.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use walletwatch_core::adapter::{ChainAdapter, RawEvent};
use walletwatch_core::policy::{Backoff, RateLimiter};
use walletwatch_core::registry::WalletSnapshot;
use walletwatch_core::request::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RpcId};

use crate::subscriptions::{ConfirmOutcome, SubscriptionId, SubscriptionManager};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("connection closed by node")]
    Closed,

    #[error("gave up after {attempts} reconnect attempts: {last}")]
    ReconnectExhausted { attempts: u32, last: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriberState {
    Disconnected,
    Connecting,
    Subscribed,
}

/// Configuration for [`ChainSubscriber`].
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub url: String,
    /// Interval between keepalive pings while subscribed.
    pub keepalive: Duration,
    /// Reconnect schedule. `max_attempts = 0` disables reconnecting.
    pub reconnect: Backoff,
}

impl SubscriberConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            keepalive: Duration::from_secs(30),
            reconnect: Backoff::default(),
        }
    }
}

// ─── Frame classification ────────────────────────────────────────────────────

/// An inbound text frame, as far as the subscriber cares.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A response carrying a subscription id.
    Confirmation { request_id: u64, id: SubscriptionId },
    /// Any other successful response (e.g. `true` for an unsubscribe).
    Ack { request_id: u64 },
    /// An error response.
    Rejected { request_id: u64, code: i64, message: String },
    /// A pushed notification for subscription `id`.
    Notification { id: SubscriptionId, result: Value },
    Other,
}

/// Classify one text frame without touching any state.
pub fn classify_frame(text: &str) -> Frame {
    let Ok(val) = serde_json::from_str::<Value>(text) else {
        return Frame::Other;
    };

    if val.get("method").is_some() {
        return match serde_json::from_value::<JsonRpcNotification>(val) {
            Ok(n) if n.params.subscription != RpcId::Null => Frame::Notification {
                id: SubscriptionId(n.params.subscription),
                result: n.params.result,
            },
            _ => Frame::Other,
        };
    }

    let Ok(resp) = serde_json::from_value::<JsonRpcResponse>(val) else {
        return Frame::Other;
    };
    let Some(request_id) = resp.id.as_number() else {
        return Frame::Other;
    };
    match resp.into_result() {
        Ok(Value::Number(n)) => match n.as_u64() {
            Some(n) => Frame::Confirmation {
                request_id,
                id: SubscriptionId(RpcId::Number(n)),
            },
            None => Frame::Ack { request_id },
        },
        Ok(Value::String(s)) => Frame::Confirmation {
            request_id,
            id: SubscriptionId(RpcId::String(s)),
        },
        Ok(_) => Frame::Ack { request_id },
        Err(JsonRpcError { code, message, .. }) => Frame::Rejected {
            request_id,
            code,
            message,
        },
    }
}

// ─── Subscriber ──────────────────────────────────────────────────────────────

enum SessionEnd {
    /// Downstream or the registry went away; stop for good.
    Shutdown,
}

pub struct ChainSubscriber<A: ChainAdapter> {
    adapter: Arc<A>,
    config: SubscriberConfig,
    limiter: Arc<RateLimiter>,
    wallets: watch::Receiver<Arc<WalletSnapshot>>,
    events: mpsc::Sender<RawEvent>,
    state: SubscriberState,
    subscriptions: SubscriptionManager,
    next_request_id: u64,
}

impl<A: ChainAdapter> ChainSubscriber<A> {
    pub fn new(
        adapter: Arc<A>,
        config: SubscriberConfig,
        limiter: Arc<RateLimiter>,
        wallets: watch::Receiver<Arc<WalletSnapshot>>,
        events: mpsc::Sender<RawEvent>,
    ) -> Self {
        Self {
            adapter,
            config,
            limiter,
            wallets,
            events,
            state: SubscriberState::Disconnected,
            subscriptions: SubscriptionManager::new(),
            next_request_id: 1,
        }
    }

    /// Shared view of the live subscription set.
    pub fn subscriptions(&self) -> SubscriptionManager {
        self.subscriptions.clone()
    }

    /// Run until the event receiver is dropped (`Ok`) or the reconnect
    /// budget is spent (`Err`).
    pub async fn run(mut self) -> Result<(), SubscriptionError> {
        let family = self.adapter.family();
        let mut attempt = 0u32;

        loop {
            let mut connected = false;
            let outcome = self.run_session(&mut connected).await;

            self.subscriptions.clear();
            self.set_state(SubscriberState::Disconnected);

            let err = match outcome {
                Ok(SessionEnd::Shutdown) => {
                    tracing::info!(chain = %family, "subscriber stopped");
                    return Ok(());
                }
                Err(e) => e,
            };

            if connected {
                attempt = 0;
            }
            attempt += 1;

            match self.config.reconnect.next_delay(attempt) {
                Some(delay) => {
                    tracing::warn!(
                        chain = %family,
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "upstream connection lost, reconnecting"
                    );
                    time::sleep(delay).await;
                }
                None => {
                    tracing::error!(
                        chain = %family,
                        error = %err,
                        "upstream connection lost, not reconnecting"
                    );
                    return Err(SubscriptionError::ReconnectExhausted {
                        attempts: attempt - 1,
                        last: err.to_string(),
                    });
                }
            }
        }
    }

    async fn run_session(&mut self, connected: &mut bool) -> Result<SessionEnd, SubscriptionError> {
        self.set_state(SubscriberState::Connecting);
        tracing::info!(url = %redact(&self.config.url), "connecting to upstream node");

        let (ws, _) = tokio_tungstenite::connect_async(self.config.url.as_str())
            .await
            .map_err(|e| SubscriptionError::Connect {
                url: redact(&self.config.url),
                reason: e.to_string(),
            })?;
        *connected = true;
        let (mut sink, mut stream): (WsSink, SplitStream<WsStream>) = ws.split();

        self.set_state(SubscriberState::Subscribed);
        let snapshot = self.wallets.borrow_and_update().clone();
        self.reconcile(&mut sink, &snapshot).await?;

        let period = self.config.keepalive;
        let mut keepalive = time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                msg = stream.next() => match msg {
                    None | Some(Ok(Message::Close(_))) => return Err(SubscriptionError::Closed),
                    Some(Err(e)) => return Err(SubscriptionError::Receive(e.to_string())),
                    Some(Ok(Message::Text(text))) => {
                        if let Some(end) = self.handle_text(&mut sink, text.as_str()).await? {
                            return Ok(end);
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        sink.send(Message::Pong(payload))
                            .await
                            .map_err(|e| SubscriptionError::Send(e.to_string()))?;
                    }
                    Some(Ok(_)) => {}
                },
                _ = keepalive.tick() => {
                    tracing::trace!("keepalive ping");
                    sink.send(Message::Ping(Default::default()))
                        .await
                        .map_err(|e| SubscriptionError::Send(e.to_string()))?;
                }
                changed = self.wallets.changed() => {
                    if changed.is_err() {
                        return Ok(SessionEnd::Shutdown);
                    }
                    let snapshot = self.wallets.borrow_and_update().clone();
                    self.reconcile(&mut sink, &snapshot).await?;
                }
            }
        }
    }

    async fn handle_text(
        &mut self,
        sink: &mut WsSink,
        text: &str,
    ) -> Result<Option<SessionEnd>, SubscriptionError> {
        match classify_frame(text) {
            Frame::Notification { id, result } => {
                if self.subscriptions.key_for(&id).is_none() {
                    tracing::debug!(subscription = %id, "notification for unknown subscription");
                    return Ok(None);
                }
                let Some(event) = self.adapter.parse_event(&result) else {
                    tracing::debug!(subscription = %id, "notification without transaction id");
                    return Ok(None);
                };
                tracing::debug!(id = %event.id, "event received");
                if self.events.send(event).await.is_err() {
                    return Ok(Some(SessionEnd::Shutdown));
                }
            }
            Frame::Confirmation { request_id, id } => match self.subscriptions.confirm(request_id, id) {
                ConfirmOutcome::Active(key) => {
                    tracing::debug!(criterion = %key, "subscription confirmed");
                }
                ConfirmOutcome::Orphaned(id) => {
                    self.unsubscribe(sink, id).await?;
                }
                ConfirmOutcome::Unknown => {}
            },
            Frame::Rejected {
                request_id,
                code,
                message,
            } => {
                if let Some(key) = self.subscriptions.reject(request_id) {
                    tracing::warn!(criterion = %key, code, error = %message, "subscription rejected");
                }
            }
            Frame::Ack { .. } | Frame::Other => {}
        }
        Ok(None)
    }

    /// Bring the upstream set in line with `snapshot`. Every request takes
    /// a limiter token first.
    async fn reconcile(
        &mut self,
        sink: &mut WsSink,
        snapshot: &WalletSnapshot,
    ) -> Result<(), SubscriptionError> {
        let wanted = self.adapter.subscriptions(snapshot);
        let diff = self.subscriptions.reconcile(&wanted);
        if diff.is_empty() {
            return Ok(());
        }
        tracing::info!(
            chain = %self.adapter.family(),
            subscribe = diff.subscribe.len(),
            unsubscribe = diff.unsubscribe.len(),
            "reconciling upstream subscriptions"
        );

        for id in diff.unsubscribe {
            self.unsubscribe(sink, id).await?;
        }
        for req in diff.subscribe {
            self.limiter.acquire().await;
            let request_id = self.next_id();
            self.subscriptions.mark_pending(&req.key, request_id);
            send_request(sink, &JsonRpcRequest::new(request_id, req.method, req.params)).await?;
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, sink: &mut WsSink, id: SubscriptionId) -> Result<(), SubscriptionError> {
        self.limiter.acquire().await;
        let request_id = self.next_id();
        let param = serde_json::to_value(&id.0).unwrap_or(Value::Null);
        tracing::debug!(subscription = %id, "unsubscribing");
        send_request(
            sink,
            &JsonRpcRequest::new(request_id, self.adapter.unsubscribe_method(), vec![param]),
        )
        .await
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn set_state(&mut self, state: SubscriberState) {
        if self.state != state {
            tracing::debug!(
                chain = %self.adapter.family(),
                from = ?self.state,
                to = ?state,
                "subscriber state"
            );
            self.state = state;
        }
    }
}

async fn send_request(sink: &mut WsSink, req: &JsonRpcRequest) -> Result<(), SubscriptionError> {
    let text = serde_json::to_string(req).map_err(|e| SubscriptionError::Send(e.to_string()))?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| SubscriptionError::Send(e.to_string()))
}

/// Strip the query string (API keys travel there) before logging a URL.
pub fn redact(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?…"),
        None => url.to_string(),
    }
}

//! Client-facing live-update server.
//!
//! Every connected client owns a bounded outbound queue drained by its own
//! writer task. `broadcast` only ever `try_send`s into those queues, so a
//! slow or dead client is skipped instead of stalling the pipeline. A new
//! client is registered and handed the current wallet snapshot under the
//! same lock `broadcast` takes, so it sees every update published after its
//! snapshot and nothing from before it connected.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use walletwatch_core::record::ServerMessage;
use walletwatch_core::registry::WalletSnapshot;

pub type ClientId = u64;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("failed to encode {kind} message: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("accept failed: {0}")]
    Accept(String),

    #[error("client {0} queue is full")]
    Full(ClientId),

    #[error("client {0} is gone")]
    Closed(ClientId),
}

#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Messages buffered per client before further sends to it are skipped.
    pub client_buffer: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self { client_buffer: 256 }
    }
}

pub struct Broadcaster {
    clients: Mutex<HashMap<ClientId, mpsc::Sender<Message>>>,
    next_id: AtomicU64,
    wallets: watch::Receiver<Arc<WalletSnapshot>>,
    config: BroadcasterConfig,
}

impl Broadcaster {
    pub fn new(wallets: watch::Receiver<Arc<WalletSnapshot>>, config: BroadcasterConfig) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            wallets,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClientId, mpsc::Sender<Message>>> {
        self.clients.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Register a client; its queue starts with the `TRACKED_WALLETS`
    /// snapshot.
    pub fn register(&self) -> Result<(ClientId, mpsc::Receiver<Message>), BroadcastError> {
        let (tx, rx) = mpsc::channel(self.config.client_buffer.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut clients = self.lock();
        let snapshot = self.wallets.borrow().clone();
        let greeting = encode(&ServerMessage::TrackedWallets(snapshot.wallets().to_vec()))?;
        tx.try_send(greeting).map_err(|_| BroadcastError::Full(id))?;
        clients.insert(id, tx);
        tracing::info!(client = id, clients = clients.len(), "client connected");
        Ok((id, rx))
    }

    pub fn unregister(&self, id: ClientId) {
        let mut clients = self.lock();
        if clients.remove(&id).is_some() {
            tracing::info!(client = id, clients = clients.len(), "client disconnected");
        }
    }

    pub fn client_count(&self) -> usize {
        self.lock().len()
    }

    /// Queue `message` for every connected client. Returns how many clients
    /// accepted it; clients with a full queue are skipped and clients whose
    /// writer has gone away are dropped.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let frame = match encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "dropping broadcast");
                return 0;
            }
        };

        let mut clients = self.lock();
        let mut delivered = 0;
        let mut gone = Vec::new();
        for (id, tx) in clients.iter() {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        client = id,
                        kind = message.kind(),
                        error = %BroadcastError::Full(*id),
                        "skipping client"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => gone.push(*id),
            }
        }
        for id in gone {
            clients.remove(&id);
            tracing::debug!(client = id, error = %BroadcastError::Closed(id), "pruned client");
        }
        tracing::debug!(kind = message.kind(), delivered, "broadcast");
        delivered
    }

    /// Push a `TRACKED_WALLETS` message on every registry change until the
    /// registry goes away.
    pub async fn forward_wallet_updates(&self, mut wallets: watch::Receiver<Arc<WalletSnapshot>>) {
        while wallets.changed().await.is_ok() {
            let snapshot = wallets.borrow_and_update().clone();
            self.broadcast(&ServerMessage::TrackedWallets(snapshot.wallets().to_vec()));
        }
    }

    /// Accept clients forever.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), BroadcastError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(addr = %addr, "live-update server listening");
        }
        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .map_err(|e| BroadcastError::Accept(e.to_string()))?;
            let this = self.clone();
            tokio::spawn(async move {
                this.handle_connection(stream, peer).await;
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "websocket handshake failed");
                return;
            }
        };
        let (mut sink, mut inbound) = ws.split();

        let (id, mut outbound) = match self.register() {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "could not register client");
                return;
            }
        };

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound.recv().await {
                if let Err(e) = sink.send(msg).await {
                    tracing::debug!(client = id, error = %e, "send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Clients have nothing to say; read only to notice the close.
        while let Some(msg) = inbound.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }

        self.unregister(id);
        writer.abort();
    }
}

fn encode(message: &ServerMessage) -> Result<Message, BroadcastError> {
    message
        .to_json()
        .map(|text| Message::Text(text.into()))
        .map_err(|source| BroadcastError::Encode {
            kind: message.kind(),
            source,
        })
}

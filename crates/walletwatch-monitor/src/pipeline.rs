//! One chain pipeline: subscriber → fetcher → match engine → {persister,
//! broadcaster}, plus the registry refresh timer.
//!
//! Every inbound event is resolved on its own task, so a slow fetch never
//! holds up an unrelated match. The shared rate limiter bounds the load on
//! the node; `max_in_flight` bounds the tasks waiting on it, and once that
//! many are running, events stay queued upstream. Completion order is not
//! arrival order.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use walletwatch_core::adapter::{ChainAdapter, RawEvent};
use walletwatch_core::error::TransportError;
use walletwatch_core::fetcher::TransactionFetcher;
use walletwatch_core::matcher::{MatchEngine, MatchResult};
use walletwatch_core::policy::RateLimiter;
use walletwatch_core::record::NormalizedTransactionRecord;
use walletwatch_core::registry::{WalletDirectory, WalletRegistry};
use walletwatch_core::sink::TransactionSink;
use walletwatch_core::transport::RpcTransport;
use walletwatch_http::{DirectoryClient, HttpClientConfig, HttpPersister, HttpRpcClient};
use walletwatch_ws::{Broadcaster, BroadcasterConfig, ChainSubscriber, SubscriberConfig};

use crate::config::PipelineConfig;

/// Upstream events buffered between the subscriber and dispatch.
const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to bind live-update server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Why [`Pipeline::dispatch`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEnd {
    Shutdown,
    UpstreamClosed,
}

pub struct Pipeline<A: ChainAdapter> {
    config: Arc<PipelineConfig>,
    engine: MatchEngine<A>,
    registry: Arc<WalletRegistry>,
    directory: Arc<dyn WalletDirectory>,
    transport: Arc<dyn RpcTransport>,
    sink: Arc<dyn TransactionSink>,
    fetcher: Arc<TransactionFetcher>,
    limiter: Arc<RateLimiter>,
    broadcaster: Arc<Broadcaster>,
    in_flight: Arc<Semaphore>,
}

impl<A: ChainAdapter> Clone for Pipeline<A> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            engine: self.engine.clone(),
            registry: self.registry.clone(),
            directory: self.directory.clone(),
            transport: self.transport.clone(),
            sink: self.sink.clone(),
            fetcher: self.fetcher.clone(),
            limiter: self.limiter.clone(),
            broadcaster: self.broadcaster.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<A: ChainAdapter> Pipeline<A> {
    /// Wire a pipeline around explicit collaborators.
    pub fn new(
        config: PipelineConfig,
        adapter: Arc<A>,
        directory: Arc<dyn WalletDirectory>,
        transport: Arc<dyn RpcTransport>,
        sink: Arc<dyn TransactionSink>,
    ) -> Self {
        let registry = Arc::new(WalletRegistry::new(adapter.family()));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let fetcher = TransactionFetcher::new(limiter.clone(), config.retry.clone())
            .retry_on_missing(adapter.retry_on_missing());
        let broadcaster = Arc::new(Broadcaster::new(
            registry.subscribe(),
            BroadcasterConfig::default(),
        ));

        let in_flight = Arc::new(Semaphore::new(config.max_in_flight.max(1)));

        Self {
            config: Arc::new(config),
            engine: MatchEngine::new(adapter),
            registry,
            directory,
            transport,
            sink,
            fetcher: Arc::new(fetcher),
            limiter,
            broadcaster,
            in_flight,
        }
    }

    /// Wire a pipeline against the HTTP directory, persistence API and node
    /// named in `config`.
    pub fn from_config(config: PipelineConfig, adapter: Arc<A>) -> Result<Self, PipelineError> {
        let transport = HttpRpcClient::new(
            config.rpc_url.clone(),
            HttpClientConfig {
                request_timeout: config.http_timeout,
            },
        )?;
        let directory = DirectoryClient::new(&config.directory_url, config.http_timeout)?;
        let sink = HttpPersister::new(&config.directory_url, config.http_timeout)?;
        Ok(Self::new(
            config,
            adapter,
            Arc::new(directory),
            Arc::new(transport),
            Arc::new(sink),
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<WalletRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// One directory pull. A failure keeps the previous wallet set.
    pub async fn refresh_wallets(&self) {
        let family = self.registry.family();
        match self.registry.refresh(self.directory.as_ref()).await {
            Ok(report) => tracing::info!(
                chain = %family,
                wallets = report.accepted,
                invalid = report.invalid,
                other_chain = report.other_chain,
                changed = report.changed,
                added = report.added.len(),
                "tracked wallets refreshed"
            ),
            Err(e) => tracing::warn!(
                chain = %family,
                error = %e,
                wallets = self.registry.current().len(),
                "wallet refresh failed, keeping previous set"
            ),
        }
    }

    /// Resolve, match and fan out one event. Returns the match, if any.
    /// Persistence runs on its own task and never delays the broadcast.
    pub async fn process_event(&self, event: RawEvent) -> Option<MatchResult<A::Transaction>> {
        let adapter = self.engine.adapter();
        let tx = match self
            .fetcher
            .resolve(&**adapter, self.transport.as_ref(), &event)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!(id = %event.id, error = %e, "dropping event");
                return None;
            }
        };

        let snapshot = self.registry.current();
        let Some(result) = self.engine.evaluate(&event, tx, &snapshot) else {
            tracing::debug!(id = %event.id, "no tracked wallet involved");
            return None;
        };

        tracing::info!(
            id = %event.id,
            wallets = result.wallets.len(),
            role = ?result.role(),
            kind = ?result.record.tx_type,
            status = ?result.record.status,
            "tracked wallet transaction"
        );

        self.persist(result.record.clone());
        let delivered = self.broadcaster.broadcast(&result.to_message());
        tracing::debug!(id = %event.id, delivered, "match broadcast");
        Some(result)
    }

    fn persist(&self, record: NormalizedTransactionRecord) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            match sink.persist(&record).await {
                Ok(()) => tracing::debug!(hash = %record.hash, "transaction persisted"),
                Err(e) => tracing::warn!(hash = %record.hash, error = %e, "failed to persist transaction"),
            }
        });
    }

    fn spawn_refresh_timer(&self) -> JoinHandle<()> {
        let this = self.clone();
        let period = self.config.refresh_interval;
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                this.refresh_wallets().await;
            }
        })
    }

    /// Hand events to per-event tasks until `shutdown` resolves or the
    /// channel closes. A slot is taken before each event is read, so with
    /// `max_in_flight` tasks running the channel fills and the subscriber
    /// waits.
    pub async fn dispatch<S>(&self, events: &mut mpsc::Receiver<RawEvent>, shutdown: S) -> DispatchEnd
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => return DispatchEnd::Shutdown,
                permit = self.in_flight.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return DispatchEnd::Shutdown,
                },
            };
            let event = tokio::select! {
                _ = &mut shutdown => return DispatchEnd::Shutdown,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => return DispatchEnd::UpstreamClosed,
                },
            };

            tracing::debug!(
                id = %event.id,
                free = self.in_flight.available_permits(),
                "upstream event"
            );
            let this = self.clone();
            tokio::spawn(async move {
                this.process_event(event).await;
                drop(permit);
            });
        }
    }

    /// Run until `shutdown` resolves.
    ///
    /// The wallet set is loaded before the subscriber starts, so no event is
    /// matched against an empty registry. If the subscriber gives up on the
    /// upstream node the live-update server keeps serving until shutdown.
    pub async fn run<S>(self, shutdown: S) -> Result<(), PipelineError>
    where
        S: Future<Output = ()>,
    {
        let family = self.registry.family();
        self.refresh_wallets().await;

        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| PipelineError::Bind { addr, source })?;

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn({
            let broadcaster = self.broadcaster.clone();
            async move {
                if let Err(e) = broadcaster.serve(listener).await {
                    tracing::error!(error = %e, "live-update server stopped");
                }
            }
        }));
        tasks.push(tokio::spawn({
            let broadcaster = self.broadcaster.clone();
            let updates = self.registry.subscribe();
            async move { broadcaster.forward_wallet_updates(updates).await }
        }));
        tasks.push(self.spawn_refresh_timer());

        let (events_tx, mut events) = mpsc::channel(EVENT_BUFFER);
        let subscriber = ChainSubscriber::new(
            self.engine.adapter().clone(),
            SubscriberConfig {
                url: self.config.ws_url.clone(),
                keepalive: self.config.keepalive,
                reconnect: self.config.reconnect.clone(),
            },
            self.limiter.clone(),
            self.registry.subscribe(),
            events_tx,
        );
        let mut upstream = tokio::spawn(subscriber.run());

        tracing::info!(chain = %family, listen = %addr, "pipeline running");

        tokio::pin!(shutdown);
        if self.dispatch(&mut events, shutdown.as_mut()).await == DispatchEnd::UpstreamClosed {
            match (&mut upstream).await {
                Ok(Ok(())) => tracing::info!(chain = %family, "upstream subscriber finished"),
                Ok(Err(e)) => tracing::error!(chain = %family, error = %e, "upstream subscription lost"),
                Err(e) => tracing::error!(chain = %family, error = %e, "upstream subscriber panicked"),
            }
            shutdown.await;
        }
        tracing::info!(chain = %family, "shutting down");

        upstream.abort();
        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}

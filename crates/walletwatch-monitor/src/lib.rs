//! walletwatch-monitor: wires one chain pipeline end to end.
//!
//! ```text
//! ChainSubscriber ─RawEvent─▶ TransactionFetcher ─▶ MatchEngine ─┬▶ Persister
//!        ▲                                                       └▶ Broadcaster
//!        └──────────── WalletRegistry (refresh every 60s) ───────────┘
//! ```
//!
//! [`Pipeline`] owns that wiring; [`config`] reads it from the environment
//! and [`telemetry`] installs the tracing subscriber.

pub mod config;
pub mod pipeline;
pub mod telemetry;

pub use config::{ConfigError, PipelineConfig};
pub use pipeline::{DispatchEnd, Pipeline, PipelineError};
pub use telemetry::{init_tracing, LogConfig};

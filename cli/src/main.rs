//! walletwatch CLI: run one chain pipeline until Ctrl-C.
//!
//! # Commands
//! ```text
//! walletwatch evm       # pending-transaction monitor (EVM_WS_URL required)
//! walletwatch solana    # per-wallet log monitor (HELIUS_API_KEY required)
//! walletwatch info      # effective defaults for both pipelines
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use walletwatch_core::adapter::ChainAdapter;
use walletwatch_core::chain::ChainFamily;
use walletwatch_core::rules::RuleTable;
use walletwatch_evm::EvmAdapter;
use walletwatch_monitor::config::prefix;
use walletwatch_monitor::{init_tracing, LogConfig, Pipeline, PipelineConfig};
use walletwatch_solana::SolanaAdapter;
use walletwatch_ws::redact;

#[derive(Parser)]
#[command(
    name = "walletwatch",
    about = "Watch blockchain nodes for transactions touching tracked wallets",
    long_about = "
walletwatch: stream activity of tracked wallets from an EVM or Solana node,
persist each match and fan it out to WebSocket clients.

ENVIRONMENT VARIABLES (a .env file is read if present):
  DIRECTORY_BASE_URL   Wallet directory + persistence API  [http://localhost:3000]
  EVM_WS_URL           EVM node WebSocket URL (BSC_NODE_URL also accepted)
  EVM_RPC_URL          EVM node HTTP URL                    [EVM_WS_URL as http]
  HELIUS_API_KEY       Helius API key for the Solana feed
  SOL_WS_URL           Solana WebSocket URL                 [Helius mainnet]
  SOL_RPC_URL          Solana HTTP URL                      [api.mainnet-beta]
  <EVM|SOL>_LISTEN_ADDR, _REFRESH_INTERVAL_SECS, _KEEPALIVE_SECS,
  _FETCH_ATTEMPTS, _FETCH_RETRY_DELAY_MS, _FETCH_TIMEOUT_SECS,
  _MAX_RECONNECTS, _MAX_IN_FLIGHT, _RULES_FILE, _RATE_LIMIT_CAPACITY
",
    version
)]
struct Cli {
    /// Global log level (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit JSON structured logs
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor an EVM chain's pending-transaction feed
    Evm,
    /// Monitor Solana log mentions of every tracked wallet
    Solana,
    /// Print the effective defaults of both pipelines
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&LogConfig::default().with_level(cli.log_level).json(cli.json_logs));

    match cli.command {
        Commands::Evm => run(ChainFamily::Evm, EvmAdapter::new, walletwatch_evm::signature::default_rules()).await,
        Commands::Solana => {
            run(ChainFamily::Solana, SolanaAdapter::new, walletwatch_solana::programs::default_rules()).await
        }
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

async fn run<A, F>(family: ChainFamily, adapter: F, defaults: RuleTable) -> Result<()>
where
    A: ChainAdapter,
    F: FnOnce(RuleTable) -> A,
{
    let config = PipelineConfig::from_env(family).map_err(|e| {
        tracing::error!(chain = %family, error = %e, "invalid configuration");
        e
    })?;
    let rules = config
        .rules(defaults)
        .with_context(|| format!("loading {} rule table", prefix(family)))?;

    tracing::info!(
        chain = %family,
        ws = %redact(&config.ws_url),
        rpc = %redact(&config.rpc_url),
        directory = %config.directory_url,
        listen = %config.listen_addr,
        "starting pipeline"
    );

    let pipeline = Pipeline::from_config(config, Arc::new(adapter(rules)))?;
    pipeline
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

fn cmd_info() {
    println!("walletwatch v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let placeholders = |key: &str| match key {
        "EVM_WS_URL" => Some("<EVM_WS_URL>".to_string()),
        "HELIUS_API_KEY" => Some("<HELIUS_API_KEY>".to_string()),
        _ => None,
    };
    let pipelines = [
        (ChainFamily::Evm, walletwatch_evm::signature::default_rules()),
        (ChainFamily::Solana, walletwatch_solana::programs::default_rules()),
    ];
    for (family, rules) in pipelines {
        let Ok(cfg) = PipelineConfig::from_lookup(family, placeholders) else {
            continue;
        };
        println!("{family} pipeline ({}_*):", prefix(family));
        println!("  upstream ws:       {}", redact(&cfg.ws_url));
        println!("  upstream rpc:      {}", redact(&cfg.rpc_url));
        println!("  directory:         {}", cfg.directory_url);
        println!("  listen:            {}", cfg.listen_addr);
        println!(
            "  rate limit:        {} burst, {:.3}/s",
            cfg.rate_limit.capacity, cfg.rate_limit.refill_rate
        );
        println!(
            "  fetch:             {} attempts, {}ms apart, {}s timeout",
            cfg.retry.max_attempts,
            cfg.retry.delay.as_millis(),
            cfg.retry.attempt_timeout.as_secs()
        );
        println!("  wallet refresh:    every {}s", cfg.refresh_interval.as_secs());
        println!("  keepalive:         every {}s", cfg.keepalive.as_secs());
        println!("  events in flight:  {}", cfg.max_in_flight);
        println!("  reconnects:        {}", cfg.reconnect.max_attempts);
        println!(
            "  rules:             {} token-transfer, {} swap, {} initialize markers",
            rules.token_transfer.len(),
            rules.swap.len(),
            rules.initialize.len()
        );
        println!();
    }
}

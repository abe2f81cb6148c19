use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use walletwatch_core::adapter::{ChainAdapter, RawEvent};
use walletwatch_core::chain::ChainFamily;
use walletwatch_core::fetcher::TransactionFetcher;
use walletwatch_core::matcher::{MatchEngine, Role};
use walletwatch_core::policy::{RateLimiter, RateLimiterConfig, RetryConfig};
use walletwatch_core::record::{TxStatus, TxType};
use walletwatch_core::registry::WalletRegistry;
use walletwatch_core::wallet::WalletEntry;
use walletwatch_http::HttpRpcClient;
use walletwatch_solana::SolanaAdapter;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const W1: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
const W2: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
const W3: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

fn rpc_ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

fn instruction_referenced_tx() -> Value {
    json!({
        "slot": 250000000,
        "blockTime": 1700000000,
        "transaction": {
            "signatures": ["5sig"],
            "message": {
                "accountKeys": [W1, W2, W3],
                "instructions": [{ "programIdIndex": 1, "accounts": [2], "data": "" }]
            }
        },
        "meta": { "err": null, "fee": 5000, "logMessages": ["Program log: hello"] }
    })
}

fn fetcher() -> TransactionFetcher {
    TransactionFetcher::new(
        Arc::new(RateLimiter::new(RateLimiterConfig::per_second(10, 10))),
        RetryConfig {
            max_attempts: 3,
            delay: Duration::from_millis(20),
            attempt_timeout: Duration::from_secs(5),
        },
    )
    .retry_on_missing(true)
}

#[tokio::test]
async fn instruction_reference_matches_third_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "getTransaction",
            "params": ["5sig", { "commitment": "confirmed", "maxSupportedTransactionVersion": 0 }]
        })))
        .respond_with(rpc_ok(instruction_referenced_tx()))
        .mount(&server)
        .await;

    let registry = WalletRegistry::new(ChainFamily::Solana);
    registry.apply(vec![WalletEntry::new(W3, "W3").with_chain("SOL")]);

    let client = HttpRpcClient::default_for(server.uri()).unwrap();
    let adapter = Arc::new(SolanaAdapter::default());
    let event = RawEvent::new("5sig");
    let tx = adapter.resolve_transaction(&client, &event).await.unwrap().unwrap();

    let result = MatchEngine::new(adapter)
        .evaluate(&event, tx, &registry.current())
        .expect("W3 matched through the instruction");
    assert_eq!(result.wallets.len(), 1);
    assert_eq!(result.wallets[0].wallet.label, "W3");
    assert_eq!(result.role(), Role::Participant);
    assert_eq!(result.record.status, TxStatus::Success);
    assert_eq!(result.record.tx_type, TxType::ContractCall);
    assert_eq!(result.logs, vec!["Program log: hello".to_string()]);
}

#[tokio::test]
async fn indexing_lag_is_absorbed_by_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_ok(Value::Null))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(rpc_ok(instruction_referenced_tx()))
        .mount(&server)
        .await;

    let client = HttpRpcClient::default_for(server.uri()).unwrap();
    let adapter = SolanaAdapter::default();
    let event = RawEvent::new("5sig");
    let fetcher = fetcher();
    let tx = fetcher
        .fetch(&event.id, || adapter.resolve_transaction(&client, &event))
        .await
        .unwrap();
    assert_eq!(tx.transaction.signature(), Some("5sig"));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

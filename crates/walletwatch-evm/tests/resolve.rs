use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use walletwatch_core::adapter::{ChainAdapter, RawEvent};
use walletwatch_core::address::Address;
use walletwatch_core::amount::Amount;
use walletwatch_core::chain::ChainFamily;
use walletwatch_core::fetcher::TransactionFetcher;
use walletwatch_core::matcher::MatchEngine;
use walletwatch_core::policy::{RateLimiter, RateLimiterConfig, RetryConfig};
use walletwatch_core::record::{TxStatus, TxType};
use walletwatch_core::registry::WalletSnapshot;
use walletwatch_core::wallet::TrackedWallet;
use walletwatch_evm::EvmAdapter;
use walletwatch_http::HttpRpcClient;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rpc_ok(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

/// Fetcher over a two-call bucket that never refills during a test.
fn fetcher() -> (TransactionFetcher, Arc<RateLimiter>) {
    let limiter = Arc::new(RateLimiter::new(RateLimiterConfig::window(
        2,
        Duration::from_secs(3600),
    )));
    (TransactionFetcher::new(limiter.clone(), RetryConfig::default()), limiter)
}

fn snapshot() -> WalletSnapshot {
    WalletSnapshot::new(
        ChainFamily::Evm,
        vec![TrackedWallet::new(
            Address::parse(ChainFamily::Evm, "0xABC").unwrap(),
            "W1",
        )],
    )
}

#[tokio::test]
async fn pending_transaction_skips_receipt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getTransactionByHash", "params": ["0xfeed"] })))
        .respond_with(rpc_ok(json!({
            "hash": "0xfeed",
            "from": "0xabc",
            "to": "0xdef",
            "value": "100",
            "input": "0x",
            "blockNumber": null
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getTransactionReceipt" })))
        .respond_with(rpc_ok(json!(null)))
        .expect(0)
        .mount(&server)
        .await;

    let client = HttpRpcClient::default_for(server.uri()).unwrap();
    let adapter = Arc::new(EvmAdapter::default());
    let event = RawEvent::new("0xfeed");
    let (fetcher, limiter) = fetcher();
    let tx = fetcher.resolve(adapter.as_ref(), &client, &event).await.unwrap();
    assert!(tx.receipt.is_none());
    // One call, one token.
    assert!(limiter.try_acquire());
    assert!(!limiter.try_acquire());

    let result = MatchEngine::new(adapter)
        .evaluate(&event, tx, &snapshot())
        .expect("wallet matched");
    assert_eq!(result.wallets.len(), 1);
    assert_eq!(result.record.tx_type, TxType::Transfer);
    assert_eq!(result.record.status, TxStatus::Pending);
    assert_eq!(result.record.value, Some(Amount::from_u64(100)));
    assert_eq!(result.record.raw["hash"], "0xfeed");
}

#[tokio::test]
async fn mined_transaction_fetches_receipt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getTransactionByHash" })))
        .respond_with(rpc_ok(json!({
            "hash": "0xbeef",
            "from": "0xabc",
            "to": "0xdef",
            "value": "0x0",
            "input": "0xdeadbeef",
            "gasPrice": "0x1",
            "blockNumber": "0x10"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getTransactionReceipt", "params": ["0xbeef"] })))
        .respond_with(rpc_ok(json!({
            "status": "0x0",
            "gasUsed": "0x5208",
            "blockNumber": "0x10",
            "logs": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpRpcClient::default_for(server.uri()).unwrap();
    let adapter = Arc::new(EvmAdapter::default());
    let event = RawEvent::new("0xbeef");
    let (fetcher, limiter) = fetcher();
    let tx = fetcher.resolve(adapter.as_ref(), &client, &event).await.unwrap();
    assert!(tx.receipt.is_some());
    // Transaction and receipt lookups each took a token.
    assert!(!limiter.try_acquire());

    let result = MatchEngine::new(adapter).evaluate(&event, tx, &snapshot()).unwrap();
    assert_eq!(result.record.status, TxStatus::Failed);
    assert_eq!(result.record.tx_type, TxType::ContractCall);
    assert_eq!(result.record.block_number, Some(Amount::from_u64(16)));
    // gasUsed * gasPrice when the receipt has no effective price.
    assert_eq!(result.record.fee, Some(Amount::from_u64(21_000)));
}

#[tokio::test]
async fn unknown_hash_resolves_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_ok(json!(null)))
        .mount(&server)
        .await;

    let client = HttpRpcClient::default_for(server.uri()).unwrap();
    let adapter = EvmAdapter::default();
    let resolved = adapter
        .resolve_transaction(&client, &RawEvent::new("0xgone"))
        .await
        .unwrap();
    assert!(resolved.is_none());
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use walletwatch_core::chain::ChainFamily;
use walletwatch_core::error::TransportError;
use walletwatch_core::record::NormalizedTransactionRecord;
use walletwatch_core::registry::WalletDirectory;
use walletwatch_core::request::{JsonRpcRequest, JsonRpcResponse};
use walletwatch_core::sink::{PersistError, TransactionSink};
use walletwatch_core::transport::RpcTransport;
use walletwatch_core::wallet::WalletEntry;
use walletwatch_evm::EvmAdapter;
use walletwatch_monitor::{Pipeline, PipelineConfig};

struct Directory;

#[async_trait]
impl WalletDirectory for Directory {
    async fn fetch_wallets(&self) -> Result<Vec<WalletEntry>, TransportError> {
        Ok(vec![WalletEntry::new("0xABC", "W1").with_chain("EVM")])
    }
}

struct Node;

#[async_trait]
impl RpcTransport for Node {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let result = match req.method.as_str() {
            "eth_getTransactionByHash" => json!({ "hash": "0xfeed", "from": "0xdef", "to": "0xabc", "value": "5" }),
            _ => Value::Null,
        };
        Ok(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: req.id,
            result: Some(result),
            error: None,
        })
    }

    fn url(&self) -> &str {
        "mock://node"
    }
}

struct Recorder(mpsc::UnboundedSender<NormalizedTransactionRecord>);

#[async_trait]
impl TransactionSink for Recorder {
    async fn persist(&self, record: &NormalizedTransactionRecord) -> Result<(), PersistError> {
        let _ = self.0.send(record.clone());
        Ok(())
    }
}

async fn free_addr() -> SocketAddr {
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    probe.local_addr().unwrap()
}

fn text(msg: Message) -> Value {
    match msg {
        Message::Text(t) => serde_json::from_str(t.as_str()).unwrap(),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn pending_feed_reaches_clients_and_storage() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_url = format!("ws://{}", upstream.local_addr().unwrap());
    let listen = free_addr().await;

    let mut config = PipelineConfig::from_lookup(ChainFamily::Evm, |key| {
        (key == "EVM_WS_URL").then(|| upstream_url.clone())
    })
    .unwrap();
    config.listen_addr = listen;

    let (records_tx, mut records) = mpsc::unbounded_channel();
    let pipeline = Pipeline::new(
        config,
        Arc::new(EvmAdapter::default()),
        Arc::new(Directory),
        Arc::new(Node),
        Arc::new(Recorder(records_tx)),
    );
    let (stop, stopped) = oneshot::channel::<()>();
    let running = tokio::spawn(pipeline.run(async {
        let _ = stopped.await;
    }));

    // Live client first, so it is connected before any match is broadcast.
    let client_url = format!("ws://{listen}");
    let mut client = timeout(Duration::from_secs(5), async {
        loop {
            match tokio_tungstenite::connect_async(client_url.as_str()).await {
                Ok((ws, _)) => break ws,
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await
    .expect("server came up");
    let greeting = text(client.next().await.unwrap().unwrap());
    assert_eq!(greeting["type"], "TRACKED_WALLETS");
    assert_eq!(greeting["data"][0]["address"], "0xabc");

    // Upstream: confirm the mempool subscription and push one hash.
    let (stream, _) = timeout(Duration::from_secs(5), upstream.accept()).await.unwrap().unwrap();
    let mut node = tokio_tungstenite::accept_async(stream).await.unwrap();
    let request = loop {
        if let Message::Text(t) = node.next().await.unwrap().unwrap() {
            break serde_json::from_str::<Value>(t.as_str()).unwrap();
        }
    };
    assert_eq!(request["method"], "eth_subscribe");
    assert_eq!(request["params"], json!(["newPendingTransactions"]));
    let confirm = json!({ "jsonrpc": "2.0", "id": request["id"], "result": "0x1" });
    node.send(Message::Text(confirm.to_string().into())).await.unwrap();
    let push = json!({
        "jsonrpc": "2.0",
        "method": "eth_subscription",
        "params": { "subscription": "0x1", "result": "0xfeed" }
    });
    node.send(Message::Text(push.to_string().into())).await.unwrap();

    let msg = timeout(Duration::from_secs(5), async {
        loop {
            let msg = text(client.next().await.unwrap().unwrap());
            if msg["type"] == "TRANSACTION" {
                break msg;
            }
        }
    })
    .await
    .expect("match broadcast");
    assert_eq!(msg["data"]["hash"], "0xfeed");
    assert_eq!(msg["data"]["transaction"]["to"], "0xabc");

    let record = timeout(Duration::from_secs(5), records.recv()).await.unwrap().unwrap();
    assert_eq!(record.hash, "0xfeed");

    stop.send(()).unwrap();
    timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

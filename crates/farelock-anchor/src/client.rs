//! Chain client abstraction and the JSON-RPC HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use farelock_core::{BatchId, Digest};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::ChainError;

/// Blockchain surface the anchoring pipeline needs.
///
/// Deliberately narrow: estimate a fee, broadcast a root, read back
/// confirmation depth. Everything chain-specific stays behind this seam so
/// tests run against [`mock::MockChain`] and production against
/// [`HttpChainClient`].
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Estimates the fee a submission would currently pay.
    async fn estimate_fee(&self) -> Result<u64, ChainError>;

    /// Broadcasts a batch's Merkle root, returning the transaction hash.
    async fn submit_root(
        &self,
        batch_id: BatchId,
        root: Digest,
        fee: u64,
    ) -> Result<String, ChainError>;

    /// Confirmation depth of a transaction.
    ///
    /// `Ok(None)` means the node no longer knows the transaction, which
    /// the poller treats as potentially lost.
    async fn confirmations(&self, tx_hash: &str) -> Result<Option<u64>, ChainError>;
}

/// JSON-RPC 2.0 client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpChainClient {
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl HttpChainClient {
    /// Creates a client against the given JSON-RPC endpoint.
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Transport { message: e.to_string() })?;
        Ok(Self { endpoint, http })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, ChainError> {
        debug!(method, "chain rpc call");

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Transport { message: e.to_string() })?;

        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ChainError::MalformedResponse { detail: e.to_string() })?;

        if let Some(error) = parsed.error {
            return Err(ChainError::Rpc { code: error.code, message: error.message });
        }
        parsed.result.ok_or_else(|| ChainError::MalformedResponse {
            detail: "response carries neither result nor error".to_string(),
        })
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn estimate_fee(&self) -> Result<u64, ChainError> {
        self.call("anchor_estimateFee", json!([])).await
    }

    async fn submit_root(
        &self,
        batch_id: BatchId,
        root: Digest,
        fee: u64,
    ) -> Result<String, ChainError> {
        self.call(
            "anchor_submitRoot",
            json!([{ "batch_id": batch_id, "root": root.to_string(), "fee": fee }]),
        )
        .await
    }

    async fn confirmations(&self, tx_hash: &str) -> Result<Option<u64>, ChainError> {
        self.call("anchor_getConfirmations", json!([tx_hash])).await
    }
}

/// In-memory chain for tests and local runs.
pub mod mock {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicU64, Ordering},
    };

    use tokio::sync::Mutex;

    use super::*;

    /// One broadcast the mock has accepted.
    #[derive(Debug, Clone)]
    pub struct Submission {
        /// Batch the root belonged to.
        pub batch_id: BatchId,
        /// The submitted root.
        pub root: Digest,
        /// Fee the submission paid.
        pub fee: u64,
        /// Hash assigned to the transaction.
        pub tx_hash: String,
    }

    /// Scriptable [`ChainClient`] double.
    ///
    /// Confirmation depth is set per transaction by the test; unknown
    /// transactions report `None` as a real node would for a dropped
    /// transaction.
    #[derive(Debug, Default)]
    pub struct MockChain {
        fee: AtomicU64,
        next_tx: AtomicU64,
        state: Mutex<State>,
    }

    #[derive(Debug, Default)]
    struct State {
        submissions: Vec<Submission>,
        confirmations: HashMap<String, Option<u64>>,
        fail_submissions: bool,
    }

    impl MockChain {
        /// Creates a mock quoting the given fee.
        pub fn with_fee(fee: u64) -> Self {
            let chain = Self::default();
            chain.fee.store(fee, Ordering::Release);
            chain
        }

        /// Changes the quoted fee.
        pub fn set_fee(&self, fee: u64) {
            self.fee.store(fee, Ordering::Release);
        }

        /// Makes subsequent submissions fail with a transport error.
        pub async fn fail_submissions(&self, fail: bool) {
            self.state.lock().await.fail_submissions = fail;
        }

        /// Sets the confirmation depth reported for a transaction.
        pub async fn set_confirmations(&self, tx_hash: &str, depth: u64) {
            self.state.lock().await.confirmations.insert(tx_hash.to_string(), Some(depth));
        }

        /// Makes a transaction unknown to the node, as if dropped.
        pub async fn drop_transaction(&self, tx_hash: &str) {
            self.state.lock().await.confirmations.insert(tx_hash.to_string(), None);
        }

        /// Everything submitted so far.
        pub async fn submissions(&self) -> Vec<Submission> {
            self.state.lock().await.submissions.clone()
        }
    }

    #[async_trait]
    impl ChainClient for MockChain {
        async fn estimate_fee(&self) -> Result<u64, ChainError> {
            Ok(self.fee.load(Ordering::Acquire))
        }

        async fn submit_root(
            &self,
            batch_id: BatchId,
            root: Digest,
            fee: u64,
        ) -> Result<String, ChainError> {
            let mut state = self.state.lock().await;
            if state.fail_submissions {
                return Err(ChainError::Transport { message: "connection refused".to_string() });
            }

            let tx_hash = format!("0xmock{:08x}", self.next_tx.fetch_add(1, Ordering::AcqRel));
            state.submissions.push(Submission { batch_id, root, fee, tx_hash: tx_hash.clone() });
            state.confirmations.insert(tx_hash.clone(), Some(0));
            Ok(tx_hash)
        }

        async fn confirmations(&self, tx_hash: &str) -> Result<Option<u64>, ChainError> {
            Ok(self.state.lock().await.confirmations.get(tx_hash).copied().flatten())
        }
    }
}

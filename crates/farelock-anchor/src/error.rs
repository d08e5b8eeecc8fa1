//! Anchoring-side error taxonomy.

use farelock_core::StorageError;

/// Errors from talking to the blockchain RPC endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The RPC transport failed or timed out.
    #[error("chain rpc transport failed: {message}")]
    Transport {
        /// Underlying transport failure.
        message: String,
    },

    /// The node answered with a JSON-RPC error object.
    #[error("chain rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The node's response did not match the expected shape.
    #[error("malformed chain rpc response: {detail}")]
    MalformedResponse {
        /// What was wrong with the payload.
        detail: String,
    },
}

impl ChainError {
    /// Whether the operation is worth retrying with backoff.
    ///
    /// Transport failures and server-side JSON-RPC errors are transient;
    /// a malformed response indicates an incompatible node and retrying
    /// cannot help.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Rpc { code, .. } => *code <= -32000,
            Self::MalformedResponse { .. } => false,
        }
    }
}

/// Errors surfaced by the submission and polling schedulers.
#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    /// The chain client gave up after exhausting retries.
    #[error("chain operation failed after {attempts} attempts")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The final error.
        #[source]
        source: ChainError,
    },

    /// Underlying chain failure outside a retry loop.
    #[error("chain operation failed")]
    Chain(#[from] ChainError),

    /// The record store rejected or lost an operation.
    #[error("storage operation failed")]
    Storage(#[from] StorageError),

    /// A batch expected to carry a Merkle root has none.
    #[error("batch {batch_id} has no merkle root to anchor")]
    MissingRoot {
        /// The rootless batch.
        batch_id: farelock_core::BatchId,
    },
}

/// Result alias for anchoring operations.
pub type Result<T> = std::result::Result<T, AnchorError>;

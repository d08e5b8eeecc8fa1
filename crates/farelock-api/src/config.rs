//! Service configuration with defaults, file, and environment overrides.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use farelock_anchor::{PollerConfig, RetryPolicy, SubmitterConfig};
use farelock_core::HashScheme;
use farelock_issuer::{BatchConfig, IssuerConfig};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.toml";

/// Complete service configuration.
///
/// Loaded in priority order: environment variables, then `config.toml`,
/// then built-in defaults. The service runs out of the box with an
/// in-memory store and a freshly generated signing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Bind address. Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Bind port. Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT_SECONDS")]
    pub request_timeout_seconds: u64,

    // Signing
    /// Path to a PKCS#8 PEM private key. A missing value generates an
    /// ephemeral key at startup. Environment variable: `ISSUER_KEY_PATH`
    #[serde(default, alias = "ISSUER_KEY_PATH")]
    pub issuer_key_path: Option<String>,
    /// Claims every ticket must carry.
    #[serde(default = "default_required_claims")]
    pub required_claims: Vec<String>,

    // Batching
    /// Tickets per batch before a capacity freeze.
    #[serde(default = "default_batch_max_size", alias = "BATCH_MAX_SIZE")]
    pub batch_max_size: u32,
    /// Age in seconds after which a non-empty open batch is frozen.
    #[serde(default = "default_batch_max_age", alias = "BATCH_MAX_AGE_SECONDS")]
    pub batch_max_age_seconds: u64,
    /// Cadence of the batch close scheduler, seconds.
    #[serde(default = "default_batch_close_interval", alias = "BATCH_CLOSE_INTERVAL_SECONDS")]
    pub batch_close_interval_seconds: u64,
    /// Cadence of the ticket expiry sweeper, seconds.
    #[serde(default = "default_expiry_sweep_interval", alias = "EXPIRY_SWEEP_INTERVAL_SECONDS")]
    pub expiry_sweep_interval_seconds: u64,
    /// Use double SHA-256 for interior tree nodes.
    #[serde(default, alias = "DOUBLE_HASH_NODES")]
    pub double_hash_nodes: bool,

    // Anchoring
    /// JSON-RPC endpoint of the anchoring chain.
    #[serde(default = "default_chain_rpc_url", alias = "CHAIN_RPC_URL")]
    pub chain_rpc_url: String,
    /// Chain RPC timeout in seconds.
    #[serde(default = "default_chain_rpc_timeout", alias = "CHAIN_RPC_TIMEOUT_SECONDS")]
    pub chain_rpc_timeout_seconds: u64,
    /// Maximum fee the submitter will pay. Zero means unlimited.
    #[serde(default, alias = "ANCHOR_FEE_CEILING")]
    pub anchor_fee_ceiling: u64,
    /// Cadence of the anchor submitter, seconds.
    #[serde(default = "default_anchor_interval", alias = "ANCHOR_INTERVAL_SECONDS")]
    pub anchor_interval_seconds: u64,
    /// Cadence of the confirmation poller, seconds.
    #[serde(default = "default_poll_interval", alias = "CONFIRMATION_POLL_INTERVAL_SECONDS")]
    pub confirmation_poll_interval_seconds: u64,
    /// Confirmation depth at which an anchor is final.
    #[serde(default = "default_required_confirmations", alias = "REQUIRED_CONFIRMATIONS")]
    pub required_confirmations: u64,
    /// Seconds after which an unconfirmed submission is declared lost.
    #[serde(default = "default_confirmation_timeout", alias = "CONFIRMATION_TIMEOUT_SECONDS")]
    pub confirmation_timeout_seconds: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_required_claims() -> Vec<String> {
    vec!["subject".to_string()]
}
fn default_batch_max_size() -> u32 {
    100
}
fn default_batch_max_age() -> u64 {
    3600
}
fn default_batch_close_interval() -> u64 {
    60
}
fn default_expiry_sweep_interval() -> u64 {
    300
}
fn default_chain_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}
fn default_chain_rpc_timeout() -> u64 {
    10
}
fn default_anchor_interval() -> u64 {
    60
}
fn default_poll_interval() -> u64 {
    30
}
fn default_required_confirmations() -> u64 {
    12
}
fn default_confirmation_timeout() -> u64 {
    7200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            issuer_key_path: None,
            required_claims: default_required_claims(),
            batch_max_size: default_batch_max_size(),
            batch_max_age_seconds: default_batch_max_age(),
            batch_close_interval_seconds: default_batch_close_interval(),
            expiry_sweep_interval_seconds: default_expiry_sweep_interval(),
            double_hash_nodes: false,
            chain_rpc_url: default_chain_rpc_url(),
            chain_rpc_timeout_seconds: default_chain_rpc_timeout(),
            anchor_fee_ceiling: 0,
            anchor_interval_seconds: default_anchor_interval(),
            confirmation_poll_interval_seconds: default_poll_interval(),
            required_confirmations: default_required_confirmations(),
            confirmation_timeout_seconds: default_confirmation_timeout(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, `config.toml`, and environment.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.batch_max_size > 0, "batch_max_size must be at least 1");
        anyhow::ensure!(
            self.required_confirmations > 0,
            "required_confirmations must be at least 1"
        );
        SocketAddr::from_str(&format!("{}:{}", self.host, self.port))
            .context("host/port do not form a valid socket address")?;
        Ok(())
    }

    /// Address the server binds to.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        SocketAddr::from_str(&format!("{}:{}", self.host, self.port))
            .context("invalid bind address")
    }

    /// Hash scheme for interior Merkle nodes.
    pub fn hash_scheme(&self) -> HashScheme {
        if self.double_hash_nodes { HashScheme::Double } else { HashScheme::Single }
    }

    /// Batch construction settings.
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig { max_size: self.batch_max_size, scheme: self.hash_scheme() }
    }

    /// Issuance validation settings.
    pub fn issuer_config(&self) -> IssuerConfig {
        IssuerConfig { required_claims: self.required_claims.clone() }
    }

    /// Anchor submission settings.
    pub fn submitter_config(&self) -> SubmitterConfig {
        SubmitterConfig {
            interval: Duration::from_secs(self.anchor_interval_seconds),
            fee_ceiling: if self.anchor_fee_ceiling == 0 {
                u64::MAX
            } else {
                self.anchor_fee_ceiling
            },
            retry: RetryPolicy::default(),
        }
    }

    /// Confirmation polling settings.
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(self.confirmation_poll_interval_seconds),
            required_confirmations: self.required_confirmations,
            confirmation_timeout: chrono::Duration::seconds(
                self.confirmation_timeout_seconds as i64,
            ),
        }
    }
}

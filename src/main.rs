//! Farelock ticket service.
//!
//! Wires configuration, the in-memory store, the signing key, the batch
//! and anchoring schedulers, and the HTTP server together, then runs
//! until a shutdown signal stops everything gracefully.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use farelock_anchor::{AnchorSubmitter, ConfirmationPoller, HttpChainClient};
use farelock_api::{AppState, Config};
use farelock_core::{Clock, MemoryStore, SystemClock};
use farelock_crypto::{IssuerKey, KeyRegistry};
use farelock_issuer::{BatchCloseScheduler, BatchManager, ExpirySweeper, TicketIssuer};
use farelock_verify::Verifier;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("starting farelock ticket service");

    let config = Config::load()?;
    let addr = config.socket_addr()?;
    info!(
        %addr,
        batch_max_size = config.batch_max_size,
        required_confirmations = config.required_confirmations,
        chain_rpc_url = %config.chain_rpc_url,
        "configuration loaded"
    );

    let store = Arc::new(MemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let key = Arc::new(load_issuer_key(&config)?);
    info!(key_id = %key.key_id(), "issuer key ready");

    let manager = Arc::new(BatchManager::new(
        store.clone(),
        store.clone(),
        clock.clone(),
        config.batch_config(),
    ));
    let issuer = Arc::new(TicketIssuer::new(
        store.clone(),
        manager.clone(),
        key.clone(),
        clock.clone(),
        config.issuer_config(),
    ));

    let mut keys = KeyRegistry::new();
    keys.insert(*key.verifying_key());
    let verifier = Arc::new(Verifier::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(keys),
        clock.clone(),
        config.hash_scheme(),
    ));

    let chain = Arc::new(
        HttpChainClient::new(
            config.chain_rpc_url.clone(),
            Duration::from_secs(config.chain_rpc_timeout_seconds),
        )
        .context("failed to build chain rpc client")?,
    );

    // Background schedulers share one cancellation token.
    let cancel = CancellationToken::new();
    let mut workers = Vec::new();

    let batch_closer = BatchCloseScheduler::new(
        manager.clone(),
        store.clone(),
        clock.clone(),
        Duration::from_secs(config.batch_close_interval_seconds),
        chrono::Duration::seconds(config.batch_max_age_seconds as i64),
    );
    workers.push(tokio::spawn(batch_closer.run(cancel.clone())));

    let sweeper = ExpirySweeper::new(
        store.clone(),
        clock.clone(),
        Duration::from_secs(config.expiry_sweep_interval_seconds),
    );
    workers.push(tokio::spawn(sweeper.run(cancel.clone())));

    let submitter = AnchorSubmitter::new(
        store.clone(),
        store.clone(),
        chain.clone(),
        clock.clone(),
        config.submitter_config(),
    );
    workers.push(tokio::spawn(submitter.run(cancel.clone())));

    let poller = ConfirmationPoller::new(
        store.clone(),
        store.clone(),
        chain,
        clock.clone(),
        config.poller_config(),
    );
    workers.push(tokio::spawn(poller.run(cancel.clone())));

    let state = AppState {
        issuer,
        verifier,
        tickets: store.clone(),
        batches: store.clone(),
        anchors: store,
        key,
        clock,
    };

    info!(%addr, "farelock is ready to issue tickets");
    if let Err(e) = farelock_api::start_server(
        state,
        addr,
        Duration::from_secs(config.request_timeout_seconds),
    )
    .await
    {
        error!(error = %e, "http server failed");
    }

    info!("stopping background schedulers");
    cancel.cancel();
    for worker in workers {
        if let Err(e) = worker.await {
            error!(error = %e, "scheduler task panicked");
        }
    }

    info!("farelock shutdown complete");
    Ok(())
}

/// Loads the signing key from the configured path, or generates one.
///
/// An ephemeral key is fine for development; tickets signed with it stop
/// verifying after a restart, so production deployments configure
/// `issuer_key_path`.
fn load_issuer_key(config: &Config) -> Result<IssuerKey> {
    match config.issuer_key_path.as_deref() {
        Some(path) => IssuerKey::from_pem_file(std::path::Path::new(path))
            .with_context(|| format!("failed to load issuer key from {path}")),
        None => {
            warn!("no issuer_key_path configured, generating an ephemeral signing key");
            Ok(IssuerKey::generate())
        },
    }
}

/// Initializes tracing with environment-based filtering.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,farelock=debug,tower_http=debug"))
        .expect("default tracing filter is valid");

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

//! Full pipeline scenarios: issue, batch, anchor, verify.

use std::{sync::Arc, time::Duration};

use farelock_anchor::{
    AnchorSubmitter, ConfirmationPoller, MockChain, PollerConfig, RetryPolicy, SubmitterConfig,
};
use farelock_core::{
    canonicalize, sha256,
    storage::{AnchorStore, BatchStore},
    BatchStatus, Clock, HashScheme, MemoryStore, TestClock, Ticket,
};
use farelock_crypto::{merkle, verify_digest, IssuerKey, KeyRegistry};
use farelock_issuer::{BatchConfig, BatchManager, IssueRequest, IssuerConfig, TicketIssuer};
use farelock_verify::{Strength, Verifier, VerifyRequest};
use serde_json::json;

struct Service {
    store: Arc<MemoryStore>,
    chain: Arc<MockChain>,
    clock: TestClock,
    key: Arc<IssuerKey>,
    issuer: TicketIssuer,
    verifier: Verifier,
    submitter: AnchorSubmitter,
    poller: ConfirmationPoller,
}

fn service(max_size: u32) -> Service {
    let store = Arc::new(MemoryStore::new());
    let chain = Arc::new(MockChain::with_fee(10));
    let clock = TestClock::new();
    let key = Arc::new(IssuerKey::generate());

    let manager = Arc::new(BatchManager::new(
        store.clone(),
        store.clone(),
        Arc::new(clock.clone()),
        BatchConfig { max_size, scheme: HashScheme::Single },
    ));
    let issuer = TicketIssuer::new(
        store.clone(),
        manager,
        key.clone(),
        Arc::new(clock.clone()),
        IssuerConfig::default(),
    );

    let mut keys = KeyRegistry::new();
    keys.insert(*key.verifying_key());
    let verifier = Verifier::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(keys),
        Arc::new(clock.clone()),
        HashScheme::Single,
    );

    let submitter = AnchorSubmitter::new(
        store.clone(),
        store.clone(),
        chain.clone(),
        Arc::new(clock.clone()),
        SubmitterConfig {
            interval: Duration::from_secs(60),
            fee_ceiling: u64::MAX,
            retry: RetryPolicy { jitter_factor: 0.0, ..RetryPolicy::default() },
        },
    );
    let poller = ConfirmationPoller::new(
        store.clone(),
        store.clone(),
        chain.clone(),
        Arc::new(clock.clone()),
        PollerConfig::default(),
    );

    Service { store, chain, clock, key, issuer, verifier, submitter, poller }
}

async fn issue(s: &Service, subject: &str) -> Ticket {
    s.issuer
        .issue(IssueRequest {
            claims: json!({"subject": subject, "route": "central-airport"}),
            valid_from: s.clock.now(),
            valid_until: s.clock.now() + chrono::Duration::hours(24),
            idempotency_key: None,
        })
        .await
        .expect("issuance should succeed")
}

#[tokio::test]
async fn hundred_and_one_tickets_anchor_the_first_batch_and_open_a_second() {
    let s = service(100);

    let mut tickets = Vec::new();
    for i in 0..101 {
        tickets.push(issue(&s, &format!("rider-{i:03}")).await);
    }

    // First 100 share batch A, frozen by the capacity trigger.
    let batch_a = tickets[0].batch_id.expect("first ticket is batched");
    for ticket in &tickets[..100] {
        assert_eq!(ticket.batch_id, Some(batch_a));
    }
    let frozen = s.store.find_batch(batch_a).await.unwrap().unwrap();
    assert_eq!(frozen.status, BatchStatus::Ready);
    let root = frozen.merkle_root.expect("frozen batch has a root");

    // Ticket 101 opened batch B, still accepting assignments.
    let batch_b = tickets[100].batch_id.expect("overflow ticket is batched");
    assert_ne!(batch_b, batch_a);
    let open = s.store.find_batch(batch_b).await.unwrap().unwrap();
    assert_eq!(open.status, BatchStatus::Open);

    // Anchor batch A and let it reach the required confirmation depth.
    assert_eq!(s.submitter.tick().await.unwrap(), 1);
    let anchor = s.store.active_anchor(batch_a).await.unwrap().unwrap();
    s.chain.set_confirmations(&anchor.tx_hash, 12).await;
    assert_eq!(s.poller.tick().await.unwrap(), 1);
    assert_eq!(
        s.store.find_batch(batch_a).await.unwrap().unwrap().status,
        BatchStatus::Anchored
    );

    // The on-chain root matches what we computed locally.
    let submissions = s.chain.submissions().await;
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].root, root);

    // Every ticket in batch A verifies at blockchain strength, and its
    // stored proof replays to the anchored root.
    for ticket in &tickets[..100] {
        let proof = s.store.find_proof(ticket.id).await.unwrap().expect("proof persisted");
        assert!(merkle::verify(ticket.hash, &proof.path, root, HashScheme::Single));

        let result = s
            .verifier
            .verify(VerifyRequest {
                ticket_id: ticket.id,
                strength: Strength::Blockchain,
                consume: false,
                presented_claims: None,
                presented_signature: None,
                verifier_identity: "auditor".to_string(),
                client_metadata: None,
            })
            .await
            .unwrap();
        assert!(result.valid, "ticket {} should verify: {:?}", ticket.id, result.reason);
    }

    // The straggler can only reach signature strength for now.
    let result = s
        .verifier
        .verify(VerifyRequest {
            ticket_id: tickets[100].id,
            strength: Strength::Blockchain,
            consume: false,
            presented_claims: None,
            presented_signature: None,
            verifier_identity: "auditor".to_string(),
            client_metadata: None,
        })
        .await
        .unwrap();
    assert!(!result.valid);
}

#[tokio::test]
async fn tampering_with_one_claim_breaks_only_the_tampered_copy() {
    let s = service(100);
    let ticket = issue(&s, "alice").await;

    // Original verifies offline with just the public key.
    let payload = canonicalize(&ticket.claims).unwrap();
    assert_eq!(sha256(&payload), ticket.hash);
    assert!(verify_digest(s.key.verifying_key(), &ticket.hash, &ticket.signature));

    // One changed claim produces a different canonical payload.
    let mut tampered = ticket.clone();
    tampered.claims["route"] = json!("central-harbor");
    let tampered_payload = canonicalize(&tampered.claims).unwrap();
    assert_ne!(sha256(&tampered_payload), tampered.hash);

    // The stored ticket still verifies through the full service path.
    let result = s
        .verifier
        .verify(VerifyRequest {
            ticket_id: ticket.id,
            strength: Strength::Signature,
            consume: false,
            presented_claims: None,
            presented_signature: None,
            verifier_identity: "gate-1".to_string(),
            client_metadata: None,
        })
        .await
        .unwrap();
    assert!(result.valid);
}

#[tokio::test]
async fn consumed_ticket_stays_provable_but_not_reusable() {
    let s = service(2);
    let first = issue(&s, "bob").await;
    issue(&s, "carol").await;

    let consume = |id| VerifyRequest {
        ticket_id: id,
        strength: Strength::Merkle,
        consume: true,
        presented_claims: None,
        presented_signature: None,
        verifier_identity: "gate-2".to_string(),
        client_metadata: None,
    };

    let result = s.verifier.verify(consume(first.id)).await.unwrap();
    assert!(result.valid);
    assert!(result.consumed);

    let replay = s.verifier.verify(consume(first.id)).await.unwrap();
    assert!(!replay.valid);

    // Inclusion evidence survives consumption.
    let proof = s.store.find_proof(first.id).await.unwrap().unwrap();
    let batch = s.store.find_batch(first.batch_id.unwrap()).await.unwrap().unwrap();
    assert!(merkle::verify(
        first.hash,
        &proof.path,
        batch.merkle_root.unwrap(),
        HashScheme::Single
    ));
}

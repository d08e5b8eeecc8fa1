//! Verification behavior across strengths, reason codes, and consumption.

use std::{sync::Arc, time::Duration};

use farelock_core::{
    storage::{AnchorStore, BatchStore, TicketStore, VerificationLogStore},
    AnchorStatus, BlockchainAnchor, Clock, HashScheme, MemoryStore, ReasonCode, TestClock,
    TicketId, VerificationMethod,
};
use farelock_crypto::{IssuerKey, KeyRegistry};
use farelock_issuer::{BatchConfig, BatchManager, IssueRequest, IssuerConfig, TicketIssuer};
use farelock_verify::{Strength, Verifier, VerifyRequest};
use serde_json::json;

struct Harness {
    store: Arc<MemoryStore>,
    clock: TestClock,
    issuer: TicketIssuer,
    verifier: Verifier,
}

fn harness(max_size: u32) -> Harness {
    let store = Arc::new(MemoryStore::new());
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

    Harness { store, clock, issuer, verifier }
}

async fn issue(h: &Harness, subject: &str) -> farelock_core::Ticket {
    h.issuer
        .issue(IssueRequest {
            claims: json!({"subject": subject, "route": "A-B"}),
            valid_from: h.clock.now(),
            valid_until: h.clock.now() + chrono::Duration::hours(24),
            idempotency_key: None,
        })
        .await
        .unwrap()
}

fn request(id: TicketId, strength: Strength, consume: bool) -> VerifyRequest {
    VerifyRequest {
        ticket_id: id,
        strength,
        consume,
        presented_claims: None,
        presented_signature: None,
        verifier_identity: "gate-7".to_string(),
        client_metadata: None,
    }
}

#[tokio::test]
async fn fresh_ticket_passes_signature_verification() {
    let h = harness(100);
    let ticket = issue(&h, "alice").await;

    let result = h.verifier.verify(request(ticket.id, Strength::Signature, false)).await.unwrap();
    assert!(result.valid);
    assert!(result.reason.is_none());
    assert!(!result.consumed);
}

#[tokio::test]
async fn unknown_ticket_reports_not_found() {
    let h = harness(100);
    let result =
        h.verifier.verify(request(TicketId::new(), Strength::Signature, false)).await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.reason, Some(ReasonCode::NotFound));
    assert_eq!(result.method, VerificationMethod::StatusOnly, "no crypto check ran");
}

#[tokio::test]
async fn merkle_strength_before_freeze_reports_not_yet_frozen() {
    let h = harness(100);
    let ticket = issue(&h, "bob").await;

    let result = h.verifier.verify(request(ticket.id, Strength::Merkle, false)).await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.reason, Some(ReasonCode::NotYetFrozen));
}

#[tokio::test]
async fn merkle_strength_passes_after_freeze() {
    let h = harness(2);
    let first = issue(&h, "carol").await;
    issue(&h, "dave").await;

    let result = h.verifier.verify(request(first.id, Strength::Merkle, false)).await.unwrap();
    assert!(result.valid, "frozen batch proof must verify: {:?}", result.reason);
}

#[tokio::test]
async fn blockchain_strength_requires_an_anchored_batch() {
    let h = harness(2);
    let first = issue(&h, "erin").await;
    issue(&h, "frank").await;
    let batch_id = first.batch_id.unwrap();

    let result = h.verifier.verify(request(first.id, Strength::Blockchain, false)).await.unwrap();
    assert_eq!(result.reason, Some(ReasonCode::NotYetAnchored));

    // Anchor the batch through its full lifecycle.
    h.store.mark_batch_anchoring(batch_id).await.unwrap();
    h.store
        .insert_anchor(BlockchainAnchor {
            batch_id,
            tx_hash: "0xabc".to_string(),
            submitted_at: h.clock.now(),
            confirmations: 12,
            status: AnchorStatus::Submitted,
            fee_paid: 10,
            retry_count: 0,
        })
        .await
        .unwrap();
    h.store.mark_anchor_confirmed(batch_id).await.unwrap();
    h.store.mark_batch_anchored(batch_id).await.unwrap();

    let result = h.verifier.verify(request(first.id, Strength::Blockchain, false)).await.unwrap();
    assert!(result.valid, "anchored batch must verify: {:?}", result.reason);
}

#[tokio::test]
async fn tampered_claims_fail_with_hash_mismatch() {
    let h = harness(100);
    let ticket = issue(&h, "grace").await;

    let mut tampered = h.store.find_ticket(ticket.id).await.unwrap().unwrap();
    tampered.claims["route"] = json!("A-Z");
    assert_eq!(h.verifier.check_signature(&tampered), Some(ReasonCode::HashMismatch));

    // The unmodified stored copy still verifies.
    let result = h.verifier.verify(request(ticket.id, Strength::Signature, false)).await.unwrap();
    assert!(result.valid);
}

#[tokio::test]
async fn forged_signature_fails_with_signature_invalid() {
    let h = harness(100);
    let ticket = issue(&h, "heidi").await;

    let mut forged = h.store.find_ticket(ticket.id).await.unwrap().unwrap();
    let other = IssuerKey::generate();
    forged.signature = other.sign_digest(&forged.hash).unwrap();
    assert_eq!(h.verifier.check_signature(&forged), Some(ReasonCode::SignatureInvalid));
}

#[tokio::test]
async fn presented_copy_is_checked_against_the_sealed_record() {
    let h = harness(100);
    let ticket = issue(&h, "mallory").await;

    // Matching presented claims and signature pass.
    let mut req = request(ticket.id, Strength::Signature, false);
    req.presented_claims = Some(json!({"subject": "mallory", "route": "A-B"}));
    req.presented_signature = Some(ticket.signature.clone());
    let result = h.verifier.verify(req).await.unwrap();
    assert!(result.valid, "holder's faithful copy must verify: {:?}", result.reason);

    // An altered presented copy fails even though the stored record is intact.
    let mut req = request(ticket.id, Strength::Signature, false);
    req.presented_claims = Some(json!({"subject": "mallory", "route": "A-Z"}));
    let result = h.verifier.verify(req).await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.reason, Some(ReasonCode::HashMismatch));

    // A signature from some other key fails.
    let mut req = request(ticket.id, Strength::Signature, false);
    req.presented_signature = Some(IssuerKey::generate().sign_digest(&ticket.hash).unwrap());
    let result = h.verifier.verify(req).await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.reason, Some(ReasonCode::SignatureInvalid));
}

#[tokio::test]
async fn key_not_in_registry_reports_unknown_key() {
    let h = harness(100);
    let ticket = issue(&h, "ivan").await;

    let mut rekeyed = h.store.find_ticket(ticket.id).await.unwrap().unwrap();
    rekeyed.key_id = farelock_core::KeyId::new();
    assert_eq!(h.verifier.check_signature(&rekeyed), Some(ReasonCode::UnknownKey));
}

#[tokio::test]
async fn consuming_verification_is_single_use() {
    let h = harness(100);
    let ticket = issue(&h, "judy").await;

    let first = h.verifier.verify(request(ticket.id, Strength::Signature, true)).await.unwrap();
    assert!(first.valid);
    assert!(first.consumed);

    let second = h.verifier.verify(request(ticket.id, Strength::Signature, true)).await.unwrap();
    assert!(!second.valid);
    assert_eq!(second.reason, Some(ReasonCode::AlreadyUsed));
}

#[tokio::test]
async fn concurrent_consumers_admit_exactly_one() {
    let h = harness(100);
    let ticket = issue(&h, "mallory").await;
    let verifier = Arc::new(h.verifier);

    let mut handles = Vec::new();
    for i in 0..16 {
        let verifier = verifier.clone();
        let id = ticket.id;
        handles.push(tokio::spawn(async move {
            verifier
                .verify(VerifyRequest {
                    ticket_id: id,
                    strength: Strength::Signature,
                    consume: true,
                    presented_claims: None,
                    presented_signature: None,
                    verifier_identity: format!("gate-{i}"),
                    client_metadata: None,
                })
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        if result.consumed {
            assert!(result.valid);
            winners += 1;
        } else {
            assert_eq!(result.reason, Some(ReasonCode::AlreadyUsed));
        }
    }
    assert_eq!(winners, 1, "exactly one concurrent consumer may succeed");
}

#[tokio::test]
async fn expired_window_is_rejected_even_before_the_sweeper_runs() {
    let h = harness(100);
    let ticket = issue(&h, "nina").await;

    h.clock.advance(Duration::from_secs(25 * 3600));

    let result = h.verifier.verify(request(ticket.id, Strength::Signature, false)).await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.reason, Some(ReasonCode::Expired));
}

#[tokio::test]
async fn revoked_ticket_is_rejected() {
    let h = harness(100);
    let ticket = issue(&h, "oscar").await;
    h.store.revoke_ticket(ticket.id).await.unwrap();

    let result = h.verifier.verify(request(ticket.id, Strength::Signature, false)).await.unwrap();
    assert_eq!(result.reason, Some(ReasonCode::Revoked));
}

#[tokio::test]
async fn not_yet_active_window_is_rejected_without_consuming() {
    let h = harness(100);
    let ticket = h
        .issuer
        .issue(IssueRequest {
            claims: json!({"subject": "peggy"}),
            valid_from: h.clock.now() + chrono::Duration::hours(5),
            valid_until: h.clock.now() + chrono::Duration::hours(6),
            idempotency_key: None,
        })
        .await
        .unwrap();

    let result = h.verifier.verify(request(ticket.id, Strength::Signature, true)).await.unwrap();
    assert_eq!(result.reason, Some(ReasonCode::NotYetActive));
    assert!(!result.consumed);
}

#[tokio::test]
async fn every_verification_attempt_is_logged() {
    let h = harness(100);
    let ticket = issue(&h, "quentin").await;

    h.verifier.verify(request(ticket.id, Strength::Signature, false)).await.unwrap();
    h.verifier.verify(request(ticket.id, Strength::Merkle, false)).await.unwrap();
    h.verifier.verify(request(TicketId::new(), Strength::Signature, false)).await.unwrap();

    let entries = h.store.verifications_for(ticket.id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].passed);
    assert!(!entries[1].passed, "failed attempts are logged too");
}

//! Ticket issuance, lookup, proof, and public-key endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use farelock_core::{
    models::ProofStep, AnchorStatus, BatchId, KeyId, Ticket, TicketId, TicketStatus,
};
use farelock_crypto::{signature_to_base64, ALGORITHM};
use farelock_issuer::IssueRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::ApiError, AppState};

/// Body of `POST /tickets`.
#[derive(Debug, Deserialize)]
pub struct IssueTicketRequest {
    /// Business claims. Must be a JSON object.
    pub claims: Value,
    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,
    /// End of the validity window.
    pub valid_until: DateTime<Utc>,
    /// Optional idempotency key for safe retries.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Ticket as exposed over HTTP.
#[derive(Debug, Serialize)]
pub struct TicketResponse {
    /// Ticket identifier.
    pub id: TicketId,
    /// Sealed claims.
    pub claims: Value,
    /// When the ticket was issued.
    pub issued_at: DateTime<Utc>,
    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,
    /// End of the validity window.
    pub valid_until: DateTime<Utc>,
    /// Lifecycle status.
    pub status: TicketStatus,
    /// Hex SHA-256 of the canonical claim payload.
    pub hash: String,
    /// Base64 DER signature over the hash.
    pub signature: String,
    /// Key that produced the signature.
    pub key_id: KeyId,
    /// Batch the ticket belongs to, once assigned.
    pub batch_id: Option<BatchId>,
    /// Leaf index within the batch, once assigned.
    pub merkle_index: Option<u32>,
}

impl From<Ticket> for TicketResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            id: ticket.id,
            claims: ticket.claims,
            issued_at: ticket.issued_at,
            valid_from: ticket.valid_from,
            valid_until: ticket.valid_until,
            status: ticket.status,
            hash: ticket.hash.to_string(),
            signature: signature_to_base64(&ticket.signature),
            key_id: ticket.key_id,
            batch_id: ticket.batch_id,
            merkle_index: ticket.merkle_index,
        }
    }
}

/// `POST /tickets`
pub async fn issue_ticket(
    State(state): State<AppState>,
    Json(body): Json<IssueTicketRequest>,
) -> Result<(StatusCode, Json<TicketResponse>), ApiError> {
    let ticket = state
        .issuer
        .issue(IssueRequest {
            claims: body.claims,
            valid_from: body.valid_from,
            valid_until: body.valid_until,
            idempotency_key: body.idempotency_key,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(ticket.into())))
}

/// `GET /tickets/{id}`
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<TicketId>,
) -> Result<Json<TicketResponse>, ApiError> {
    let ticket = state
        .tickets
        .find_ticket(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("ticket {id} not found")))?;
    Ok(Json(ticket.into()))
}

/// Anchor summary attached to a proof.
#[derive(Debug, Serialize)]
pub struct AnchorSummary {
    /// Transaction carrying the root.
    pub tx_hash: String,
    /// Confirmations observed so far.
    pub confirmations: u64,
    /// Anchor attempt status.
    pub status: AnchorStatus,
}

/// Body of `GET /tickets/{id}/proof`.
#[derive(Debug, Serialize)]
pub struct ProofResponse {
    /// Ticket the proof covers.
    pub ticket_id: TicketId,
    /// Batch whose root the proof resolves to.
    pub batch_id: BatchId,
    /// Leaf index within the batch.
    pub leaf_index: u32,
    /// Sibling path from leaf to root.
    pub path: Vec<ProofStep>,
    /// Hex Merkle root of the frozen batch.
    pub merkle_root: String,
    /// On-chain anchor, when one is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<AnchorSummary>,
}

/// `GET /tickets/{id}/proof`
///
/// 404 until the ticket's batch has frozen and persisted its proof.
pub async fn get_proof(
    State(state): State<AppState>,
    Path(id): Path<TicketId>,
) -> Result<Json<ProofResponse>, ApiError> {
    let proof = state
        .batches
        .find_proof(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no proof for ticket {id} yet")))?;

    let batch = state
        .batches
        .find_batch(proof.batch_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("batch {} not found", proof.batch_id)))?;
    let root = batch
        .merkle_root
        .ok_or_else(|| ApiError::NotFound(format!("batch {} has no root yet", batch.id)))?;

    let anchor = state.anchors.active_anchor(batch.id).await?.map(|a| AnchorSummary {
        tx_hash: a.tx_hash,
        confirmations: a.confirmations,
        status: a.status,
    });

    Ok(Json(ProofResponse {
        ticket_id: proof.ticket_id,
        batch_id: proof.batch_id,
        leaf_index: proof.leaf_index,
        path: proof.path,
        merkle_root: root.to_string(),
        anchor,
    }))
}

/// Body of `GET /public-key`.
#[derive(Debug, Serialize)]
pub struct PublicKeyResponse {
    /// Signature algorithm identifier.
    pub algorithm: &'static str,
    /// Identifier of the current signing key.
    pub key_id: KeyId,
    /// SPKI PEM encoding of the public key.
    pub public_key_pem: String,
}

/// `GET /public-key`
pub async fn public_key(
    State(state): State<AppState>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    let pem = state.key.public_key_pem().map_err(|e| ApiError::Internal(e.into()))?;
    Ok(Json(PublicKeyResponse {
        algorithm: ALGORITHM,
        key_id: state.key.key_id(),
        public_key_pem: pem,
    }))
}

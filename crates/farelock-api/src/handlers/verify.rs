//! Verification endpoint.

use axum::{
    extract::{Path, State},
    Json,
};
use farelock_core::TicketId;
use farelock_crypto::signature_from_base64;
use farelock_verify::{Strength, VerificationResult, VerifyRequest};
use serde::Deserialize;

use crate::{error::ApiError, AppState};

/// Body of `POST /tickets/{id}/verify`.
#[derive(Debug, Deserialize)]
pub struct VerifyTicketRequest {
    /// Requested guarantee level.
    #[serde(default = "default_strength")]
    pub strength: Strength,
    /// Consume the ticket on success (pickup-time verification).
    #[serde(default)]
    pub consume: bool,
    /// Claim map the holder presents, compared against the sealed hash.
    #[serde(default)]
    pub claims: Option<serde_json::Value>,
    /// Base64 signature the holder presents.
    #[serde(default)]
    pub signature: Option<String>,
    /// Who is verifying, recorded in the audit log.
    #[serde(default = "default_identity")]
    pub verifier_identity: String,
    /// Free-form client context for the audit log.
    #[serde(default)]
    pub client_metadata: Option<String>,
}

fn default_strength() -> Strength {
    Strength::Signature
}

fn default_identity() -> String {
    "api".to_string()
}

/// `POST /tickets/{id}/verify`
///
/// Always answers 200 with a [`VerificationResult`]. An invalid ticket is
/// an expected outcome carrying a reason code, not an HTTP error.
pub async fn verify_ticket(
    State(state): State<AppState>,
    Path(id): Path<TicketId>,
    Json(body): Json<VerifyTicketRequest>,
) -> Result<Json<VerificationResult>, ApiError> {
    let presented_signature = body
        .signature
        .as_deref()
        .map(signature_from_base64)
        .transpose()
        .map_err(|_| ApiError::Validation("signature is not valid base64".to_string()))?;

    let result = state
        .verifier
        .verify(VerifyRequest {
            ticket_id: id,
            strength: body.strength,
            consume: body.consume,
            presented_claims: body.claims,
            presented_signature,
            verifier_identity: body.verifier_identity,
            client_metadata: body.client_metadata,
        })
        .await?;
    Ok(Json(result))
}

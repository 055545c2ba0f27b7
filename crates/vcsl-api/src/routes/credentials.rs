//! # Credential Issuance and Status Updates
//!
//! ## Endpoints
//!
//! - `POST /v1/credentials/issue`: sign a credential with embedded status.
//! - `POST /v1/credentials/status`: set or clear a credential's status bit.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vcsl_core::{AllocatorName, CredentialId};

use super::extract_json;
use crate::error::AppError;
use crate::state::AppState;

/// Request body for issuance.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssueRequest {
    /// The unsigned credential.
    pub credential: Value,
    /// `credentialId`, `mandatoryPointers`, `extraInformation`,
    /// `indexAllocator`.
    #[serde(default)]
    pub options: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueResponse {
    pub verifiable_credential: Value,
}

/// Request body for a status update.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateStatusRequest {
    pub credential_id: String,
    #[serde(default)]
    pub index_allocator: Option<String>,
    /// One status entry as embedded in the credential.
    pub credential_status: Value,
    /// `true` sets the bit, `false` clears it.
    pub status: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/credentials/issue", post(issue_credential))
        .route("/v1/credentials/status", post(update_status))
}

async fn issue_credential(
    State(state): State<AppState>,
    body: Result<Json<IssueRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<IssueResponse>), AppError> {
    let request = extract_json(body)?;
    let verifiable_credential = state
        .issuer
        .issue_request(request.credential, request.options.as_ref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(IssueResponse {
            verifiable_credential,
        }),
    ))
}

async fn update_status(
    State(state): State<AppState>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let request = extract_json(body)?;
    let credential_id = CredentialId::new(request.credential_id)?;
    let allocator = request
        .index_allocator
        .map(AllocatorName::new)
        .transpose()?;
    state
        .issuer
        .update_status(
            &credential_id,
            allocator.as_ref(),
            &request.credential_status,
            request.status,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

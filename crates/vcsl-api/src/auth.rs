//! # Authorization Middleware
//!
//! Every request to an engine operation passes an [`Authorizer`] before a
//! handler runs. Denials surface as `NOT_ALLOWED_ERROR` (403), or 401 when
//! the request carried no credential at all.
//!
//! ## Token Format
//!
//! ```text
//! Authorization: Bearer {secret}
//! ```
//!
//! Status list reads are public by default: verifiers fetch them without
//! credentials.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use vcsl_core::StatusError;

use crate::error::AppError;

/// The engine operation a request invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    IssueCredential,
    UpdateStatus,
    ReadStatusList,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IssueCredential => "issue_credential",
            Self::UpdateStatus => "update_status",
            Self::ReadStatusList => "read_status_list",
        }
    }

    /// Classify a request by method and path. `None` for routes that are
    /// not engine operations.
    pub fn classify(method: &Method, path: &str) -> Option<Self> {
        match (method, path) {
            (&Method::POST, "/v1/credentials/issue") => Some(Self::IssueCredential),
            (&Method::POST, "/v1/credentials/status") => Some(Self::UpdateStatus),
            (&Method::GET, p) if p.starts_with("/v1/status-lists/") => Some(Self::ReadStatusList),
            _ => None,
        }
    }
}

/// What an [`Authorizer`] decides on.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub operation: Operation,
    /// Bearer credential, if one was presented.
    pub bearer: Option<&'a str>,
}

/// Decides whether an invocation may proceed.
pub trait Authorizer: Send + Sync {
    /// # Errors
    ///
    /// `NotAllowed` to deny.
    fn check(&self, invocation: &Invocation<'_>) -> Result<(), StatusError>;
}

/// Permits everything. Used when no bearer secret is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn check(&self, _invocation: &Invocation<'_>) -> Result<(), StatusError> {
        Ok(())
    }
}

/// Requires a shared bearer secret, compared in constant time.
///
/// Custom `Debug` redacts the secret.
#[derive(Clone)]
pub struct BearerTokenAuthorizer {
    token: String,
    public: Vec<Operation>,
}

impl std::fmt::Debug for BearerTokenAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenAuthorizer")
            .field("token", &"[REDACTED]")
            .field("public", &self.public)
            .finish()
    }
}

impl BearerTokenAuthorizer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            public: vec![Operation::ReadStatusList],
        }
    }

    /// Require the secret for every operation, status list reads included.
    pub fn all_private(mut self) -> Self {
        self.public.clear();
        self
    }
}

impl Authorizer for BearerTokenAuthorizer {
    fn check(&self, invocation: &Invocation<'_>) -> Result<(), StatusError> {
        if self.public.contains(&invocation.operation) {
            return Ok(());
        }
        match invocation.bearer {
            Some(provided) if constant_time_token_eq(provided, &self.token) => Ok(()),
            Some(_) => Err(StatusError::NotAllowed(format!(
                "invalid bearer token for {}",
                invocation.operation.as_str()
            ))),
            None => Err(StatusError::NotAllowed(format!(
                "{} requires a bearer token",
                invocation.operation.as_str()
            ))),
        }
    }
}

/// Constant-time comparison of bearer tokens.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

fn bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware that consults the [`Authorizer`] for engine operations.
pub async fn auth_middleware(
    State(authorizer): State<Arc<dyn Authorizer>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(operation) = Operation::classify(request.method(), request.uri().path()) else {
        return next.run(request).await;
    };
    let presented = bearer(&request).map(str::to_owned);
    let invocation = Invocation {
        operation,
        bearer: presented.as_deref(),
    };
    match authorizer.check(&invocation) {
        Ok(()) => next.run(request).await,
        Err(err) => {
            tracing::warn!(operation = operation.as_str(), error = %err, "request denied");
            metrics::counter!("vcsl_requests_denied_total", "operation" => operation.as_str())
                .increment(1);
            match (presented.is_none(), err) {
                (true, StatusError::NotAllowed(msg)) => AppError::Unauthorized(msg).into_response(),
                (_, err) => AppError::Status(err).into_response(),
            }
        }
    }
}

//! # Status List Publication
//!
//! `GET /v1/status-lists/{allocator}/{purpose}/{list}?refresh=bool`
//!
//! `{list}` is the trailing segment of the list's published URL: the list
//! id for full configurations, the per-purpose list index for terse ones.
//! Responses carry the shard version in `ETag`.

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use vcsl_core::{AllocatorName, ShardKey, StatusError, StatusPurpose};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PublishedQuery {
    /// Regenerate and re-sign even if a cached artifact is current.
    #[serde(default)]
    pub refresh: bool,
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/v1/status-lists/{allocator}/{purpose}/{list}",
        get(get_status_list),
    )
}

async fn get_status_list(
    State(state): State<AppState>,
    path: Result<Path<(String, String, u64)>, PathRejection>,
    query: Result<Query<PublishedQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Path((allocator, purpose, list)) =
        path.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let allocator = AllocatorName::new(allocator)?;
    let purpose: StatusPurpose = purpose.parse()?;
    let config = state.issuer.engine().registry.get(&allocator)?.config();
    let list_id = config.shard_for_url(&purpose, list).ok_or_else(|| {
        StatusError::NotFound(format!("status list {allocator}/{purpose}/{list}"))
    })?;

    let key = ShardKey::new(allocator, purpose, list_id);
    let published = state.issuer.get_published(&key, query.refresh).await?;
    Ok((
        [(header::ETAG, format!("\"{}\"", published.version))],
        Json(published.credential.clone()),
    )
        .into_response())
}

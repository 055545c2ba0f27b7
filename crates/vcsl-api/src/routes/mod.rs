//! # Route Modules
//!
//! | Prefix                 | Module            |
//! |------------------------|-------------------|
//! | `/v1/credentials/*`    | [`credentials`]   |
//! | `/v1/status-lists/*`   | [`status_lists`]  |

pub mod credentials;
pub mod status_lists;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::error::AppError;

/// Extract a JSON body, mapping deserialization errors to
/// [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

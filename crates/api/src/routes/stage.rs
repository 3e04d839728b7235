//! Upload endpoint for issued stage credentials.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UploadQuery {
    pub token: String,
}

/// PUT /stage/{bucket}/{key}?token=... performs the single upload a
/// credential allows.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    if bucket != state.stage.bucket() {
        return Err(ApiError::NotFound(format!("Unknown bucket: {bucket}")));
    }
    if query.token.is_empty() {
        return Err(ApiError::BadRequest("Missing upload token".to_string()));
    }

    state
        .stage
        .put_with_credential(&key, &query.token, body.to_vec())
        .await?;
    Ok(StatusCode::OK)
}

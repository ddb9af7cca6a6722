use axum::{extract::Path, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::pin;
use crate::error::ApiError;
use crate::handlers::parse_scope;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::pin_service::{PinError, PinService, PinSession};

#[derive(Debug, Deserialize)]
pub struct RotatePinRequest {
    pub pin: String,
}

/// PUT /api/manage/pin/:scope - Set a new PIN for `scope`
///
/// Every live session of that scope is revoked, including the caller's own
/// when rotating the manager PIN.
pub async fn rotate(
    Path(scope): Path<String>,
    Extension(session): Extension<PinSession>,
    Json(payload): Json<RotatePinRequest>,
) -> ApiResult<Value> {
    let scope = parse_scope(&scope)?;
    pin::validate_format(&payload.pin).map_err(|_| ApiError::from(PinError::Malformed))?;

    let service = PinService::new().await?;
    let revoked = service.set_pin(scope, &payload.pin).await?;

    tracing::warn!(scope = %scope, rotated_by = %session.id, revoked_sessions = revoked, "PIN rotated via API");

    Ok(ApiResponse::success(json!({
        "scope": scope,
        "revoked_sessions": revoked,
    })))
}

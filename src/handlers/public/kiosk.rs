use axum::{extract::Path, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::{parse_kind, parse_uuid};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::attendance_service::{AttendanceService, AttendanceSession};
use crate::types::PersonKind;

const MAX_KIOSK_NAME_LEN: usize = 64;

#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    pub kind: PersonKind,
    pub person_id: Uuid,
    pub kiosk: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckOutRequest {
    pub kind: PersonKind,
    pub person_id: Uuid,
}

fn validate_kiosk(kiosk: Option<&str>) -> Result<Option<&str>, ApiError> {
    match kiosk.map(str::trim) {
        None | Some("") => Ok(None),
        Some(name) if name.len() > MAX_KIOSK_NAME_LEN => Err(ApiError::invalid_field(
            "kiosk",
            format!("Kiosk name must be at most {} characters", MAX_KIOSK_NAME_LEN),
        )),
        Some(name) => Ok(Some(name)),
    }
}

/// POST /kiosk/check-in
///
/// ```json
/// { "kind": "student", "person_id": "…", "kiosk": "front-desk" }
/// ```
pub async fn check_in(Json(payload): Json<CheckInRequest>) -> ApiResult<Value> {
    let kiosk = validate_kiosk(payload.kiosk.as_deref())?;

    let service = AttendanceService::new().await?;
    let session = service.check_in(payload.kind, payload.person_id, kiosk).await?;

    Ok(ApiResponse::created(json!({
        "kind": payload.kind,
        "session": session,
    })))
}

/// POST /kiosk/check-out
pub async fn check_out(Json(payload): Json<CheckOutRequest>) -> ApiResult<Value> {
    let service = AttendanceService::new().await?;
    let session = service.check_out(payload.kind, payload.person_id).await?;

    Ok(ApiResponse::success(json!({
        "kind": payload.kind,
        "session": session,
    })))
}

/// GET /kiosk/status/:kind/:person_id - Is this person currently checked in
pub async fn status(Path((kind, person_id)): Path<(String, String)>) -> ApiResult<Value> {
    let kind = parse_kind(&kind)?;
    let person_id = parse_uuid("person_id", &person_id)?;

    let service = AttendanceService::new().await?;
    let session = service.open_session(kind, person_id).await?;

    Ok(ApiResponse::success(json!({
        "kind": kind,
        "person_id": person_id,
        "checked_in": session.as_ref().is_some_and(AttendanceSession::is_open),
        "session": session,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_kiosk_names_are_dropped() {
        assert_eq!(validate_kiosk(None).unwrap(), None);
        assert_eq!(validate_kiosk(Some("   ")).unwrap(), None);
        assert_eq!(validate_kiosk(Some(" lobby ")).unwrap(), Some("lobby"));
    }

    #[test]
    fn long_kiosk_names_are_rejected() {
        let name = "k".repeat(MAX_KIOSK_NAME_LEN + 1);
        assert!(validate_kiosk(Some(&name)).is_err());
    }

    #[test]
    fn check_in_body_uses_lowercase_kind() {
        let body: CheckInRequest = serde_json::from_value(json!({
            "kind": "staff",
            "person_id": "7f1c0c8e-7a52-4b37-9d3d-0a0f1b8f4a11",
        }))
        .unwrap();
        assert_eq!(body.kind, PersonKind::Staff);
        assert!(body.kiosk.is_none());
    }
}

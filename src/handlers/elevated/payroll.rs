use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::middleware::{ApiResponse, ApiResult};
use crate::services::pin_service::PinSession;
use crate::services::report_service::ReportService;

#[derive(Debug, Deserialize)]
pub struct ApproveDayRequest {
    pub staff_id: Uuid,
    pub work_date: NaiveDate,
}

/// POST /api/manage/payroll/approve - Approve one staff member's day for payroll
///
/// ```json
/// { "staff_id": "…", "work_date": "2026-10-16" }
/// ```
///
/// The approval rules live in the database; a rejection comes back as 422
/// with the procedure's message.
pub async fn approve_day(
    Extension(session): Extension<PinSession>,
    Json(payload): Json<ApproveDayRequest>,
) -> ApiResult<Value> {
    let service = ReportService::new().await?;
    let result = service
        .approve_staff_day(payload.staff_id, payload.work_date, session.id)
        .await?;

    Ok(ApiResponse::success(json!({
        "staff_id": payload.staff_id,
        "work_date": payload.work_date,
        "result": result,
    })))
}

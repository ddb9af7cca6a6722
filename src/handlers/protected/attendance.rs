use axum::{
    extract::{Path, Query},
    http::StatusCode,
    Extension,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config;
use crate::handlers::{clamp_limit, parse_kind, parse_uuid};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::attendance_service::AttendanceService;
use crate::services::pin_service::PinSession;
use crate::services::reconciler::{reconcile, ReconcileReport};
use crate::types::PersonKind;

#[derive(Debug, Deserialize)]
pub struct OpenQuery {
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// GET /api/attendance/open[?kind=student|staff] - Everyone currently checked in
pub async fn open_sessions(Query(query): Query<OpenQuery>) -> ApiResult<Value> {
    let kinds = match query.kind.as_deref() {
        Some(raw) => vec![parse_kind(raw)?],
        None => PersonKind::ALL.to_vec(),
    };

    let service = AttendanceService::new().await?;
    let mut data = serde_json::Map::new();
    for kind in kinds {
        let sessions = service.open_sessions(kind).await?;
        data.insert(kind.as_str().to_string(), json!(sessions));
    }

    Ok(ApiResponse::success(Value::Object(data)))
}

/// GET /api/attendance/:kind/:person_id/history[?limit=N]
pub async fn history(
    Path((kind, person_id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Value> {
    let kind = parse_kind(&kind)?;
    let person_id = parse_uuid("person_id", &person_id)?;
    let limit = clamp_limit(query.limit, config::config().api.max_history_rows);

    let service = AttendanceService::new().await?;
    let sessions = service.history(kind, person_id, limit).await?;

    Ok(ApiResponse::success(json!({
        "kind": kind,
        "person_id": person_id,
        "sessions": sessions,
    })))
}

/// POST /api/attendance/reconcile - Auto-checkout abandoned sessions now
///
/// 200 when both cleanups succeed, 207 when one failed, 503 when both failed.
pub async fn reconcile_now(Extension(session): Extension<PinSession>) -> ApiResult<ReconcileReport> {
    let service = AttendanceService::new().await?;
    let report = reconcile(&service, service.stale_after()).await;

    tracing::info!(
        session_id = %session.id,
        closed = report.total_closed(),
        ok = report.all_ok(),
        "manual attendance reconciliation"
    );

    let status = reconcile_status(&report);
    Ok(ApiResponse::with_status(report, status))
}

fn reconcile_status(report: &ReconcileReport) -> StatusCode {
    if report.all_ok() {
        StatusCode::OK
    } else if report.all_failed() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::MULTI_STATUS
    }
}

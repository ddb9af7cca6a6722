use axum::{
    extract::{Path, Query},
    Extension,
};
use serde::Deserialize;
use serde_json::Value;

use crate::config;
use crate::handlers::clamp_limit;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::pin_service::PinSession;
use crate::services::report_service::{Report, ReportError, ReportRows, ReportService};

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub limit: Option<i64>,
}

/// GET /api/reports/:report and GET /api/manage/reports/:report
///
/// The gate decides which PIN to prompt for; the report itself decides
/// whether the admitted session is enough.
pub async fn report_get(
    Path(report): Path<String>,
    Query(query): Query<ReportQuery>,
    Extension(session): Extension<PinSession>,
) -> ApiResult<ReportRows> {
    let report: Report = report.parse()?;
    let required = report.required_scope();
    if !session.scope.grants(required) {
        return Err(ReportError::WrongScope { report, required }.into());
    }

    let limit = clamp_limit(query.limit, config::config().api.max_report_rows);
    let service = ReportService::new().await?;
    Ok(ApiResponse::success(service.fetch(report, limit).await?))
}

/// GET /api/reports/freshness - When each reporting source was last refreshed
pub async fn freshness() -> ApiResult<Vec<Value>> {
    let service = ReportService::new().await?;
    Ok(ApiResponse::success(service.freshness().await?))
}

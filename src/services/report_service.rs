use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::fmt;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::timing::timed;
use crate::types::PinScope;

/// Management reports. Each one is a read-only view owned by the reporting schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Report {
    Learning,
    Engagement,
    Exams,
    Finance,
    Personnel,
    Payroll,
}

impl Report {
    pub const ALL: [Report; 6] = [
        Report::Learning,
        Report::Engagement,
        Report::Exams,
        Report::Finance,
        Report::Personnel,
        Report::Payroll,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Report::Learning => "learning",
            Report::Engagement => "engagement",
            Report::Exams => "exams",
            Report::Finance => "finance",
            Report::Personnel => "personnel",
            Report::Payroll => "payroll",
        }
    }

    // Fixed identifiers; never derived from request input.
    fn view(&self) -> &'static str {
        match self {
            Report::Learning => "mgmt.learning_v",
            Report::Engagement => "mgmt.engagement_v",
            Report::Exams => "mgmt.exams_v",
            Report::Finance => "mgmt.finance_v",
            Report::Personnel => "mgmt.personnel_v",
            Report::Payroll => "mgmt.payroll_v",
        }
    }

    pub fn required_scope(&self) -> PinScope {
        match self {
            Report::Learning | Report::Engagement | Report::Exams => PinScope::Staff,
            Report::Finance | Report::Personnel | Report::Payroll => PinScope::Manager,
        }
    }

    pub fn for_scope(scope: PinScope) -> impl Iterator<Item = Report> {
        Self::ALL.into_iter().filter(move |r| r.required_scope() == scope)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Report {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Report::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ReportError::UnknownReport(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("unknown report '{0}'")]
    UnknownReport(String),
    #[error("report '{report}' requires the {required} PIN")]
    WrongScope { report: Report, required: PinScope },
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for ReportError {
    fn from(err: sqlx::Error) -> Self {
        // RAISE EXCEPTION inside a stored procedure is a business rejection, not a fault
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some("P0001") {
                return ReportError::Rejected(db.message().to_string());
            }
        }
        ReportError::Database(DatabaseError::Sqlx(err))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportRows {
    pub report: Report,
    pub rows: Vec<Value>,
    pub limit: i64,
    pub truncated: bool,
}

pub struct ReportService {
    pool: PgPool,
}

impl ReportService {
    pub async fn new() -> Result<Self, ReportError> {
        Ok(Self::with_pool(DatabaseManager::pool().await?))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Rows of the report's view, at most `limit` of them
    pub async fn fetch(&self, report: Report, limit: i64) -> Result<ReportRows, ReportError> {
        // Fetch one extra row to tell the caller whether the cap cut anything off
        let sql = format!(
            "SELECT COALESCE(json_agg(row_to_json(t)), '[]'::json) AS rows FROM (SELECT * FROM {} LIMIT $1) t",
            report.view()
        );

        let row = timed("report.fetch", sqlx::query(&sql).bind(limit + 1).fetch_one(&self.pool)).await?;
        let value: Value = row.try_get("rows")?;
        let mut rows = match value {
            Value::Array(rows) => rows,
            _ => Vec::new(),
        };

        let truncated = rows.len() as i64 > limit;
        rows.truncate(limit.max(0) as usize);
        Ok(ReportRows {
            report,
            rows,
            limit,
            truncated,
        })
    }

    /// Last refresh time of each materialized reporting source
    pub async fn freshness(&self) -> Result<Vec<Value>, ReportError> {
        let row = timed(
            "report.freshness",
            sqlx::query("SELECT COALESCE(json_agg(row_to_json(t)), '[]'::json) AS rows FROM mgmt.last_refresh_v t")
                .fetch_one(&self.pool),
        )
        .await?;
        let value: Value = row.try_get("rows")?;
        Ok(match value {
            Value::Array(rows) => rows,
            _ => Vec::new(),
        })
    }

    /// Approve one staff member's working day for payroll
    pub async fn approve_staff_day(
        &self,
        staff_id: Uuid,
        work_date: NaiveDate,
        approved_by: Uuid,
    ) -> Result<Value, ReportError> {
        let row = timed(
            "payroll.approve_staff_day",
            sqlx::query(
                "SELECT COALESCE(json_agg(row_to_json(r)), '[]'::json) AS result FROM approve_staff_day($1, $2) r",
            )
            .bind(staff_id)
            .bind(work_date)
            .fetch_one(&self.pool),
        )
        .await?;

        info!(%staff_id, %work_date, session_id = %approved_by, "staff day approved");
        Ok(row.try_get("result")?)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config;
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::timing::timed;
use crate::services::reconciler::StaleSessionCleaner;
use crate::types::PersonKind;

#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("{kind} {person_id} is already checked in")]
    AlreadyCheckedIn { kind: PersonKind, person_id: Uuid },
    #[error("{kind} {person_id} is not checked in")]
    NotCheckedIn { kind: PersonKind, person_id: Uuid },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for AttendanceError {
    fn from(err: sqlx::Error) -> Self {
        AttendanceError::Database(DatabaseError::Sqlx(err))
    }
}

/// One check-in/check-out record
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AttendanceSession {
    pub id: Uuid,
    pub person_id: Uuid,
    pub kiosk: Option<String>,
    pub checked_in_at: DateTime<Utc>,
    pub checked_out_at: Option<DateTime<Utc>>,
    pub auto_checked_out: bool,
}

impl AttendanceSession {
    pub fn is_open(&self) -> bool {
        self.checked_out_at.is_none()
    }
}

/// Postgres unique_violation, raised by the one-open-session-per-person index
fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn columns(kind: PersonKind) -> String {
    format!(
        "id, {} AS person_id, kiosk, checked_in_at, checked_out_at, auto_checked_out",
        kind.id_column()
    )
}

pub struct AttendanceService {
    pool: PgPool,
    stale_after: Duration,
}

impl AttendanceService {
    pub async fn new() -> Result<Self, AttendanceError> {
        let pool = DatabaseManager::pool().await?;
        Ok(Self::with_pool(pool, config::config().stale_after()))
    }

    pub fn with_pool(pool: PgPool, stale_after: Duration) -> Self {
        Self { pool, stale_after }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Open a session for the person. An abandoned session of theirs is closed first.
    pub async fn check_in(
        &self,
        kind: PersonKind,
        person_id: Uuid,
        kiosk: Option<&str>,
    ) -> Result<AttendanceSession, AttendanceError> {
        let closed = self.close_stale_for(kind, person_id).await?;
        if !closed.is_empty() {
            info!(kind = %kind, %person_id, "auto-checked-out abandoned session before check-in");
        }

        let sql = format!(
            "INSERT INTO {} (id, {}, kiosk) VALUES ($1, $2, $3) RETURNING {}",
            kind.table(),
            kind.id_column(),
            columns(kind)
        );

        let inserted = timed(
            "attendance.check_in",
            sqlx::query_as::<_, AttendanceSession>(&sql)
                .bind(Uuid::new_v4())
                .bind(person_id)
                .bind(kiosk)
                .fetch_one(&self.pool),
        )
        .await;

        match inserted {
            Ok(session) => {
                info!(kind = %kind, %person_id, session_id = %session.id, "checked in");
                Ok(session)
            }
            Err(e) if is_unique_violation(&e) => Err(AttendanceError::AlreadyCheckedIn { kind, person_id }),
            Err(e) => Err(e.into()),
        }
    }

    /// Close the person's open session. A session that went stale is closed at
    /// check-in + timeout instead of now, and returned with `auto_checked_out` set.
    pub async fn check_out(&self, kind: PersonKind, person_id: Uuid) -> Result<AttendanceSession, AttendanceError> {
        if let Some(capped) = self.close_stale_for(kind, person_id).await?.into_iter().next() {
            info!(kind = %kind, %person_id, session_id = %capped.id, "stale session capped at check-out");
            return Ok(capped);
        }

        let sql = format!(
            "UPDATE {} SET checked_out_at = now() WHERE {} = $1 AND checked_out_at IS NULL RETURNING {}",
            kind.table(),
            kind.id_column(),
            columns(kind)
        );

        let closed = timed(
            "attendance.check_out",
            sqlx::query_as::<_, AttendanceSession>(&sql)
                .bind(person_id)
                .fetch_optional(&self.pool),
        )
        .await?;

        let session = closed.ok_or(AttendanceError::NotCheckedIn { kind, person_id })?;
        info!(kind = %kind, %person_id, session_id = %session.id, "checked out");
        Ok(session)
    }

    pub async fn open_session(
        &self,
        kind: PersonKind,
        person_id: Uuid,
    ) -> Result<Option<AttendanceSession>, AttendanceError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 AND checked_out_at IS NULL",
            columns(kind),
            kind.table(),
            kind.id_column()
        );
        let session = sqlx::query_as::<_, AttendanceSession>(&sql)
            .bind(person_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    pub async fn open_sessions(&self, kind: PersonKind) -> Result<Vec<AttendanceSession>, AttendanceError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE checked_out_at IS NULL ORDER BY checked_in_at",
            columns(kind),
            kind.table()
        );
        let sessions = timed(
            "attendance.open_sessions",
            sqlx::query_as::<_, AttendanceSession>(&sql).fetch_all(&self.pool),
        )
        .await?;
        Ok(sessions)
    }

    pub async fn history(
        &self,
        kind: PersonKind,
        person_id: Uuid,
        limit: i64,
    ) -> Result<Vec<AttendanceSession>, AttendanceError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 ORDER BY checked_in_at DESC LIMIT $2",
            columns(kind),
            kind.table(),
            kind.id_column()
        );
        let sessions = timed(
            "attendance.history",
            sqlx::query_as::<_, AttendanceSession>(&sql)
                .bind(person_id)
                .bind(limit)
                .fetch_all(&self.pool),
        )
        .await?;
        Ok(sessions)
    }

    // Stale sessions are closed at check-in + timeout, not at cleanup time,
    // so an abandoned check-in never books more than the timeout.
    async fn close_stale_for(
        &self,
        kind: PersonKind,
        person_id: Uuid,
    ) -> Result<Vec<AttendanceSession>, AttendanceError> {
        let sql = format!(
            r#"
            UPDATE {table}
            SET checked_out_at = checked_in_at + make_interval(secs => $1), auto_checked_out = true
            WHERE {col} = $2
            AND checked_out_at IS NULL
            AND checked_in_at < now() - make_interval(secs => $1)
            RETURNING {columns}
            "#,
            table = kind.table(),
            col = kind.id_column(),
            columns = columns(kind)
        );
        let closed = sqlx::query_as::<_, AttendanceSession>(&sql)
            .bind(stale_secs(self.stale_after))
            .bind(person_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(closed)
    }
}

fn stale_secs(stale_after: Duration) -> f64 {
    stale_after.num_seconds() as f64
}

#[async_trait]
impl StaleSessionCleaner for AttendanceService {
    async fn close_stale(&self, kind: PersonKind, stale_after: Duration) -> Result<u64, AttendanceError> {
        let sql = format!(
            r#"
            UPDATE {table}
            SET checked_out_at = checked_in_at + make_interval(secs => $1), auto_checked_out = true
            WHERE checked_out_at IS NULL
            AND checked_in_at < now() - make_interval(secs => $1)
            "#,
            table = kind.table()
        );
        let result = timed(
            "attendance.close_stale",
            sqlx::query(&sql).bind(stale_secs(stale_after)).execute(&self.pool),
        )
        .await?;

        let closed = result.rows_affected();
        debug!(kind = %kind, closed, "stale session cleanup finished");
        Ok(closed)
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::pin::{self, PinHashError};
use crate::auth::{self, Claims, TokenError};
use crate::config;
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::timing::timed;
use crate::types::PinScope;

#[derive(Debug, thiserror::Error)]
pub enum PinError {
    #[error("PIN must be {} to {} digits", pin::MIN_PIN_LEN, pin::MAX_PIN_LEN)]
    Malformed,
    #[error("no PIN configured for scope '{0}'")]
    NotConfigured(PinScope),
    #[error("incorrect PIN")]
    Incorrect,
    #[error("session expired")]
    Expired,
    #[error("session revoked or unknown")]
    Revoked,
    #[error("session for '{held}' does not grant '{required}'")]
    ScopeMismatch { held: PinScope, required: PinScope },
    #[error("invalid session token: {0}")]
    InvalidToken(String),
    #[error("session secret not configured")]
    SecretMissing,
    #[error("credential processing failed: {0}")]
    Internal(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for PinError {
    fn from(err: sqlx::Error) -> Self {
        PinError::Database(DatabaseError::Sqlx(err))
    }
}

impl From<PinHashError> for PinError {
    fn from(err: PinHashError) -> Self {
        match err {
            PinHashError::Malformed => PinError::Malformed,
            other => PinError::Internal(other.to_string()),
        }
    }
}

impl From<TokenError> for PinError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidSecret => PinError::SecretMissing,
            TokenError::Expired => PinError::Expired,
            TokenError::Invalid(msg) => PinError::InvalidToken(msg),
            TokenError::Generation(msg) => PinError::Internal(msg),
        }
    }
}

impl PinError {
    /// Errors that mean "show the PIN prompt again" rather than a server fault
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PinError::Expired | PinError::Revoked | PinError::ScopeMismatch { .. } | PinError::InvalidToken(_)
        )
    }
}

/// A live, server-side PIN session
#[derive(Debug, Clone, Serialize)]
pub struct PinSession {
    pub id: Uuid,
    pub scope: PinScope,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    scope: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for PinSession {
    type Error = PinError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let scope = row
            .scope
            .parse::<PinScope>()
            .map_err(|e| PinError::Internal(format!("pin_sessions.scope: {}", e)))?;
        Ok(PinSession {
            id: row.id,
            scope,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

/// Result of a successful unlock: the token to hand back plus its session
#[derive(Debug, Clone, Serialize)]
pub struct UnlockedSession {
    pub token: String,
    #[serde(flatten)]
    pub session: PinSession,
}

pub struct PinService {
    pool: PgPool,
    secret: String,
}

impl PinService {
    pub async fn new() -> Result<Self, PinError> {
        let pool = DatabaseManager::pool().await?;
        Ok(Self::with_pool(pool, config::config().security.session_secret.clone()))
    }

    pub fn with_pool(pool: PgPool, secret: String) -> Self {
        Self { pool, secret }
    }

    /// Compare a PIN against the stored hash for `scope` and mint a session on success
    pub async fn unlock(&self, scope: PinScope, pin: &str) -> Result<UnlockedSession, PinError> {
        pin::validate_format(pin)?;

        let stored: Option<(String,)> = timed(
            "pin_credentials.select",
            sqlx::query_as("SELECT pin_hash FROM pin_credentials WHERE scope = $1")
                .bind(scope.as_str())
                .fetch_optional(&self.pool),
        )
        .await?;

        let (hash,) = stored.ok_or(PinError::NotConfigured(scope))?;

        if !pin::verify_pin_blocking(pin.to_string(), hash).await? {
            warn!(scope = %scope, "PIN unlock rejected");
            return Err(PinError::Incorrect);
        }

        self.mint(scope).await
    }

    async fn mint(&self, scope: PinScope) -> Result<UnlockedSession, PinError> {
        let claims = Claims::new(Uuid::new_v4(), scope, config::config().session_ttl(scope));
        let token = auth::issue_token(&claims, &self.secret)?;

        let row: SessionRow = timed(
            "pin_sessions.insert",
            sqlx::query_as(
                r#"
                INSERT INTO pin_sessions (id, scope, expires_at)
                VALUES ($1, $2, $3)
                RETURNING id, scope, created_at, expires_at
                "#,
            )
            .bind(claims.sid)
            .bind(scope.as_str())
            .bind(claims.expires_at())
            .fetch_one(&self.pool),
        )
        .await?;

        let session = PinSession::try_from(row)?;
        info!(scope = %scope, session_id = %session.id, expires_at = %session.expires_at, "PIN session unlocked");
        Ok(UnlockedSession { token, session })
    }

    /// Admit `token` for a gate requiring `required`. Both the signature and the
    /// session row must be valid.
    pub async fn check(&self, token: &str, required: PinScope) -> Result<PinSession, PinError> {
        let claims = auth::decode_token(token, &self.secret)?;
        if !claims.scope.grants(required) {
            return Err(PinError::ScopeMismatch {
                held: claims.scope,
                required,
            });
        }

        let row: Option<SessionRow> = timed(
            "pin_sessions.check",
            sqlx::query_as(
                r#"
                SELECT id, scope, created_at, expires_at
                FROM pin_sessions
                WHERE id = $1
                AND scope = $2
                AND revoked_at IS NULL
                AND expires_at > now()
                "#,
            )
            .bind(claims.sid)
            .bind(claims.scope.as_str())
            .fetch_optional(&self.pool),
        )
        .await?;

        row.ok_or(PinError::Revoked)?.try_into()
    }

    /// Revoke the session behind `token`. Returns false if it was already gone.
    pub async fn lock(&self, token: &str) -> Result<bool, PinError> {
        let claims = match auth::decode_token(token, &self.secret) {
            Ok(claims) => claims,
            Err(TokenError::Expired) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let result = timed(
            "pin_sessions.revoke",
            sqlx::query("UPDATE pin_sessions SET revoked_at = now() WHERE id = $1 AND revoked_at IS NULL")
                .bind(claims.sid)
                .execute(&self.pool),
        )
        .await?;

        let revoked = result.rows_affected() > 0;
        if revoked {
            info!(scope = %claims.scope, session_id = %claims.sid, "PIN session locked");
        }
        Ok(revoked)
    }

    /// Store a new PIN for `scope` and revoke every live session of that scope.
    /// Returns the number of sessions revoked.
    pub async fn set_pin(&self, scope: PinScope, pin: &str) -> Result<u64, PinError> {
        let cost = config::config().security.bcrypt_cost;
        let hash = pin::hash_pin_blocking(pin.to_string(), cost).await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO pin_credentials (scope, pin_hash, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (scope) DO UPDATE
            SET pin_hash = EXCLUDED.pin_hash, updated_at = now()
            "#,
        )
        .bind(scope.as_str())
        .bind(&hash)
        .execute(&mut *tx)
        .await?;

        let revoked = sqlx::query(
            r#"
            UPDATE pin_sessions SET revoked_at = now()
            WHERE scope = $1 AND revoked_at IS NULL AND expires_at > now()
            "#,
        )
        .bind(scope.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        info!(scope = %scope, revoked_sessions = revoked, "PIN rotated");
        Ok(revoked)
    }

    /// Delete session rows that expired or were revoked more than a day ago
    pub async fn purge_expired(&self) -> Result<u64, PinError> {
        let result = timed(
            "pin_sessions.purge",
            sqlx::query(
                r#"
                DELETE FROM pin_sessions
                WHERE expires_at < now() - interval '1 day'
                OR revoked_at < now() - interval '1 day'
                "#,
            )
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_token_errors_to_prompt_rejections() {
        assert!(PinError::from(TokenError::Expired).is_rejection());
        assert!(PinError::from(TokenError::Invalid("bad".into())).is_rejection());
        assert!(matches!(PinError::from(TokenError::InvalidSecret), PinError::SecretMissing));
        assert!(!PinError::SecretMissing.is_rejection());
    }

    #[test]
    fn malformed_hash_input_stays_malformed() {
        assert!(matches!(PinError::from(PinHashError::Malformed), PinError::Malformed));
        assert!(!PinError::Malformed.is_rejection());
    }

    #[test]
    fn unknown_scope_in_row_is_an_internal_error() {
        let row = SessionRow {
            id: Uuid::new_v4(),
            scope: "root".to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now(),
        };
        assert!(matches!(PinSession::try_from(row), Err(PinError::Internal(_))));
    }

    #[test]
    fn unlocked_session_serializes_flat() {
        let unlocked = UnlockedSession {
            token: "t".to_string(),
            session: PinSession {
                id: Uuid::nil(),
                scope: PinScope::Staff,
                created_at: Utc::now(),
                expires_at: Utc::now(),
            },
        };
        let v = serde_json::to_value(&unlocked).unwrap();
        assert_eq!(v["token"], "t");
        assert_eq!(v["scope"], "staff");
        assert!(v.get("session").is_none());
    }
}

pub mod pin;
pub mod throttle;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::PinScope;

/// Claims carried by a PIN session token. `sid` points at the `pin_sessions` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sid: Uuid,
    pub scope: PinScope,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(sid: Uuid, scope: PinScope, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sid,
            scope,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Expiry as a timestamp, at the same one-second resolution the token carries
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("session secret not configured")]
    InvalidSecret,
    #[error("token generation failed: {0}")]
    Generation(String),
    #[error("session token expired")]
    Expired,
    #[error("invalid session token: {0}")]
    Invalid(String),
}

pub fn issue_token(claims: &Claims, secret: &str) -> Result<String, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::new(Algorithm::HS256), claims, &encoding_key)
        .map_err(|e| TokenError::Generation(e.to_string()))
}

/// Check signature and expiry. Does not consult the session table.
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e.to_string()),
        })
}

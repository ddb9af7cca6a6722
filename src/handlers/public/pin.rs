use axum::{
    extract::{ConnectInfo, Path},
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;

use crate::auth::{self, pin, throttle::throttle};
use crate::config;
use crate::error::ApiError;
use crate::handlers::parse_scope;
use crate::middleware::client_address;
use crate::middleware::pin_gate::{clear_cookie, plausible_tokens, session_cookie};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::pin_service::{PinError, PinService};

#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    pub pin: String,
}

/// POST /pin/:scope/unlock - Exchange the scope's PIN for a session
///
/// Expected Input:
/// ```json
/// { "pin": "4821" }
/// ```
///
/// On success the session token is returned in the body and set as the
/// `pin_session_<scope>` cookie. Failed attempts are throttled per client.
pub async fn unlock(
    Path(scope): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<UnlockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = parse_scope(&scope)?;
    pin::validate_format(&payload.pin).map_err(|_| ApiError::from(PinError::Malformed))?;

    let client = client_address(&headers, peer);
    let attempt = throttle().try_begin(scope, &client).map_err(|wait| {
        tracing::warn!(scope = %scope, client = %client, "PIN unlock throttled");
        ApiError::too_many_requests("Too many incorrect PIN attempts, try again later", wait)
    })?;

    // Only a wrong PIN keeps the attempt counted; other errors drop it unsettled
    let service = PinService::new().await?;
    let unlocked = match service.unlock(scope, &payload.pin).await {
        Ok(unlocked) => unlocked,
        Err(PinError::Incorrect) => {
            attempt.failed();
            return Err(PinError::Incorrect.into());
        }
        Err(e) => return Err(e.into()),
    };
    attempt.succeeded();

    let max_age = (unlocked.session.expires_at - Utc::now()).num_seconds();
    let cookie = session_cookie(
        scope,
        &unlocked.token,
        max_age,
        config::config().security.secure_cookies,
    );

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        ApiResponse::created(unlocked),
    ))
}

/// GET /pin/:scope/status - Whether the caller holds a live session for `scope`
///
/// Never fails with PIN_REQUIRED; a UI calls this to decide whether to render
/// the prompt or the gated page.
pub async fn status(Path(scope): Path<String>, headers: HeaderMap) -> ApiResult<Value> {
    let scope = parse_scope(&scope)?;
    let tokens = plausible_tokens(&headers, scope);
    if tokens.is_empty() {
        return Ok(ApiResponse::success(json!({ "scope": scope, "unlocked": false })));
    }

    let service = PinService::new().await?;
    for token in tokens {
        match service.check(&token, scope).await {
            Ok(session) => {
                return Ok(ApiResponse::success(json!({
                    "scope": scope,
                    "unlocked": true,
                    "session": session,
                })));
            }
            Err(e) if e.is_rejection() => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(ApiResponse::success(json!({ "scope": scope, "unlocked": false })))
}

/// DELETE /pin/:scope/session - Lock: revoke the caller's session and clear the cookie
pub async fn lock(Path(scope): Path<String>, headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    let scope = parse_scope(&scope)?;
    let secret = &config::config().security.session_secret;

    // Only sessions minted for exactly this scope; locking staff must not end a manager session
    let tokens: Vec<String> = plausible_tokens(&headers, scope)
        .into_iter()
        .filter(|t| matches!(auth::decode_token(t, secret), Ok(claims) if claims.scope == scope))
        .collect();

    let mut revoked = 0u32;
    if !tokens.is_empty() {
        let service = PinService::new().await?;
        for token in tokens {
            if service.lock(&token).await? {
                revoked += 1;
            }
        }
    }

    let cookie = clear_cookie(scope, config::config().security.secure_cookies);
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        ApiResponse::success(json!({ "scope": scope, "revoked": revoked })),
    ))
}

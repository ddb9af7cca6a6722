use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth;
use crate::config;
use crate::error::ApiError;
use crate::services::pin_service::PinService;
use crate::types::PinScope;

/// Gate for routes that require an unlocked PIN session of `required` scope
/// (or a scope that grants it). Admitted requests carry the `PinSession` as an extension.
pub async fn pin_gate(State(required): State<PinScope>, mut request: Request, next: Next) -> Response {
    let candidates = plausible_tokens(request.headers(), required);
    if candidates.is_empty() {
        tracing::debug!(scope = %required, "no PIN session presented");
        return ApiError::pin_required(required).into_response();
    }

    let service = match PinService::new().await {
        Ok(service) => service,
        Err(e) => return ApiError::from(e).into_response(),
    };

    for token in candidates {
        match service.check(&token, required).await {
            Ok(session) => {
                tracing::debug!(scope = %required, session_id = %session.id, "PIN gate passed");
                request.extensions_mut().insert(session);
                return next.run(request).await;
            }
            Err(e) if e.is_rejection() => {
                tracing::debug!(scope = %required, reason = %e, "PIN session rejected");
            }
            Err(e) => return ApiError::from(e).into_response(),
        }
    }

    ApiError::pin_required(required).into_response()
}

/// Tokens worth checking for `required`, bearer first, then scope cookies
pub fn candidate_tokens(headers: &HeaderMap, required: PinScope) -> Vec<String> {
    let mut tokens = Vec::new();
    if let Some(token) = bearer_token(headers) {
        tokens.push(token);
    }
    for scope in required.granted_by() {
        if let Some(token) = cookie_value(headers, &scope.cookie_name()) {
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
    }
    tokens
}

/// Candidate tokens whose signature, expiry and scope already pass, so forged
/// or foreign tokens never cost a DB round trip
pub fn plausible_tokens(headers: &HeaderMap, required: PinScope) -> Vec<String> {
    let secret = &config::config().security.session_secret;
    candidate_tokens(headers, required)
        .into_iter()
        .filter(|token| matches!(auth::decode_token(token, secret), Ok(claims) if claims.scope.grants(required)))
        .collect()
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| *k == name && !v.is_empty())
        .map(|(_, v)| v.to_string())
}

/// `Set-Cookie` value carrying a freshly unlocked session
pub fn session_cookie(scope: PinScope, token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        scope.cookie_name(),
        token,
        max_age_secs.max(0)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that deletes the scope's session cookie
pub fn clear_cookie(scope: PinScope, secure: bool) -> String {
    session_cookie(scope, "", 0, secure)
}

// handlers/mod.rs - 3-Tier Handler Architecture
//
// Public (no PIN) → Protected (staff PIN) → Elevated (manager PIN)
pub mod public; // Tier 1: kiosks and PIN prompt endpoints (/pin/*, /kiosk/*)
pub mod protected; // Tier 2: staff PIN session required (/api/*)
pub mod elevated; // Tier 3: manager PIN session required (/api/manage/*)

use uuid::Uuid;

use crate::error::ApiError;
use crate::types::{PersonKind, PinScope};

pub(crate) fn parse_scope(raw: &str) -> Result<PinScope, ApiError> {
    raw.parse().map_err(ApiError::not_found)
}

pub(crate) fn parse_kind(raw: &str) -> Result<PersonKind, ApiError> {
    raw.parse().map_err(|e: String| ApiError::invalid_field("kind", e))
}

pub(crate) fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::invalid_field(field, format!("Invalid UUID format: {}", raw)))
}

/// Clamp a client-supplied row limit to the configured ceiling
pub(crate) fn clamp_limit(requested: Option<i64>, max: i64) -> i64 {
    requested.unwrap_or(max).clamp(1, max.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_scope_is_not_found() {
        let err = parse_scope("root").unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert_eq!(parse_scope("staff").unwrap(), PinScope::Staff);
    }

    #[test]
    fn bad_ids_are_validation_errors() {
        assert_eq!(parse_uuid("person_id", "42").unwrap_err().error_code(), "VALIDATION_ERROR");
        assert_eq!(parse_kind("visitor").unwrap_err().error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(None, 200), 200);
        assert_eq!(clamp_limit(Some(5000), 200), 200);
        assert_eq!(clamp_limit(Some(0), 200), 1);
        assert_eq!(clamp_limit(Some(25), 200), 25);
    }
}

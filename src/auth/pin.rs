// PIN format checks and bcrypt hashing

pub const MIN_PIN_LEN: usize = 4;
pub const MAX_PIN_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum PinHashError {
    #[error("PIN must be {MIN_PIN_LEN} to {MAX_PIN_LEN} digits")]
    Malformed,
    #[error("bcrypt failure: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Reject anything that is not 4 to 8 ASCII digits
pub fn validate_format(pin: &str) -> Result<(), PinHashError> {
    let len_ok = (MIN_PIN_LEN..=MAX_PIN_LEN).contains(&pin.len());
    if len_ok && pin.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(PinHashError::Malformed)
    }
}

pub fn hash_pin(pin: &str, cost: u32) -> Result<String, PinHashError> {
    validate_format(pin)?;
    Ok(bcrypt::hash(pin, cost)?)
}

pub fn verify_pin(pin: &str, hash: &str) -> Result<bool, PinHashError> {
    validate_format(pin)?;
    Ok(bcrypt::verify(pin, hash)?)
}

// bcrypt is deliberately slow; keep it off the async worker threads.

pub async fn hash_pin_blocking(pin: String, cost: u32) -> Result<String, PinHashError> {
    tokio::task::spawn_blocking(move || hash_pin(&pin, cost)).await?
}

pub async fn verify_pin_blocking(pin: String, hash: String) -> Result<bool, PinHashError> {
    tokio::task::spawn_blocking(move || verify_pin(&pin, &hash)).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_four_to_eight_digits() {
        assert!(validate_format("1234").is_ok());
        assert!(validate_format("12345678").is_ok());
        assert!(validate_format("123").is_err());
        assert!(validate_format("123456789").is_err());
        assert!(validate_format("12a4").is_err());
        assert!(validate_format("").is_err());
        assert!(validate_format("١٢٣٤").is_err());
    }

    #[test]
    fn hash_verifies_only_the_original_pin() {
        let hash = hash_pin("4821", 4).unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_pin("4821", &hash).unwrap());
        assert!(!verify_pin("4822", &hash).unwrap());
    }

    #[test]
    fn malformed_pin_never_reaches_bcrypt() {
        assert!(matches!(hash_pin("abcd", 4), Err(PinHashError::Malformed)));
        assert!(matches!(verify_pin("12", "not-a-hash"), Err(PinHashError::Malformed)));
    }

    #[tokio::test]
    async fn blocking_wrappers_agree_with_sync_versions() {
        let hash = hash_pin_blocking("90210".to_string(), 4).await.unwrap();
        assert!(verify_pin_blocking("90210".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_pin_blocking("90211".to_string(), hash).await.unwrap());
    }
}

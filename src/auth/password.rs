use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;
/// bcrypt ignores everything past 72 bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// At least eight characters with an upper-case letter, a lower-case letter
/// and a digit.
pub fn check_strength(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::WeakPassword(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::WeakPassword(format!(
            "Password must be at most {} bytes long",
            MAX_PASSWORD_BYTES
        )));
    }
    let upper = password.chars().any(char::is_uppercase);
    let lower = password.chars().any(char::is_lowercase);
    let digit = password.chars().any(|c| c.is_ascii_digit());
    if !(upper && lower && digit) {
        return Err(AppError::WeakPassword(
            "Password must contain upper-case and lower-case letters and a number".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_mixed_passwords() {
        assert!(check_strength("Tucunare2024").is_ok());
        assert!(check_strength("Pescaria1").is_ok());
    }

    #[test]
    fn rejects_short_or_uniform_passwords() {
        for weak in ["Ab1", "tucunare2024", "TUCUNARE2024", "Tucunaredourado", ""] {
            assert!(
                matches!(check_strength(weak), Err(AppError::WeakPassword(_))),
                "{weak} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_passwords_bcrypt_would_truncate() {
        let long = format!("Aa1{}", "x".repeat(80));
        assert!(check_strength(&long).is_err());
    }
}

/// Password Hashing and Verification
///
/// Handles password hashing with bcrypt and password strength validation.
/// The work factor is threaded in from configuration rather than read from
/// ambient state.

use bcrypt::{hash, verify};
use lazy_static::lazy_static;

use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

lazy_static! {
    // Precomputed hash of an unguessable value, verified against when the
    // user record does not exist so lookup misses take as long as mismatches.
    static ref DUMMY_HASH: String =
        hash("dummy-password-for-timing-uniformity", 4).expect("static bcrypt hash");
}

/// Hash a password using bcrypt
///
/// # Arguments
/// * `password` - Plain text password to hash
/// * `cost` - bcrypt work factor (from `ApplicationSettings`)
///
/// # Errors
/// Returns error if:
/// - Password fails validation (too short, weak, etc.)
/// - bcrypt hashing fails
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    validate_password_strength(password)?;

    hash(password, cost)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// bcrypt's comparison is constant-time with respect to the password.
///
/// # Errors
/// Returns error if verification fails to run
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// Burn a bcrypt verification against a dummy hash.
///
/// Called on the user-not-found path of login so the response time does not
/// reveal whether the email exists.
pub fn verify_dummy_password(password: &str) {
    let _ = verify(password, &DUMMY_HASH);
}

/// Validate password strength requirements
///
/// Requirements:
/// - Minimum 8 characters
/// - Maximum 128 characters
/// - At least one digit
/// - At least one lowercase letter
/// - At least one uppercase letter
fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        )));
    }

    // bcrypt limitation and DoS prevention
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        )));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // low cost keeps the tests fast
    const TEST_COST: u32 = 4;

    #[test]
    fn hash_is_not_plaintext() {
        let password = "ValidPassword123";
        let hash = hash_password(password, TEST_COST).expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn correct_password_verifies() {
        let password = "ValidPassword123";
        let hash = hash_password(password, TEST_COST).expect("Failed to hash password");

        let is_valid = verify_password(password, &hash).expect("Failed to verify password");
        assert!(is_valid);
    }

    #[test]
    fn wrong_password_does_not_verify() {
        let password = "ValidPassword123";
        let hash = hash_password(password, TEST_COST).expect("Failed to hash password");

        let is_valid =
            verify_password("WrongPassword123", &hash).expect("Failed to verify password");
        assert!(!is_valid);
    }

    #[test]
    fn weak_passwords_are_rejected() {
        let long_password = "a".repeat(MAX_PASSWORD_LENGTH + 1) + "A1";
        for weak in [
            "Short1",
            "nouppercase1",
            "NOLOWERCASE1",
            "NoDigitsHere",
            long_password.as_str(),
        ] {
            assert!(hash_password(weak, TEST_COST).is_err(), "should reject {}", weak);
        }
    }

    #[test]
    fn valid_password_is_accepted() {
        assert!(hash_password("ValidPassword123", TEST_COST).is_ok());
    }

    #[test]
    fn dummy_verification_does_not_panic() {
        verify_dummy_password("anything-at-all");
    }
}

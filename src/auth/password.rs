//! Account passwords: policy, Argon2id hashing and verification

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::CommunityError;

pub const MIN_PASSWORD_CHARS: usize = 8;

/// Reject passwords shorter than the minimum
pub fn check_password_policy(password: &str) -> Result<(), CommunityError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(CommunityError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_CHARS
        )));
    }
    Ok(())
}

/// PHC string for a new account password
pub fn hash_password(password: &str) -> Result<String, CommunityError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CommunityError::Internal(format!("Password hashing failed: {e}")))
}

/// Check a login attempt against the stored PHC string.
///
/// A stored hash that does not parse is a server fault, not a wrong password.
pub fn verify_password(attempt: &str, stored: &str) -> Result<bool, CommunityError> {
    let stored = PasswordHash::new(stored)
        .map_err(|e| CommunityError::Internal(format!("Stored password hash unreadable: {e}")))?;
    Ok(Argon2::default()
        .verify_password(attempt.as_bytes(), &stored)
        .is_ok())
}

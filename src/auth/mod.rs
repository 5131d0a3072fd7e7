//! Authentication and authorization
//!
//! Provides:
//! - JWT session and email-verification tokens
//! - Permission levels for route authorization
//! - Password hashing with Argon2

pub mod jwt;
pub mod password;
pub mod permissions;

pub use jwt::{
    extract_token_from_header, extract_token_from_query, Claims, JwtValidator, TokenPurpose,
    TokenValidationResult,
};
pub use password::{check_password_policy, hash_password, verify_password, MIN_PASSWORD_CHARS};
pub use permissions::PermissionLevel;

//! JWT token handling
//!
//! Session tokens authenticate HTTP requests and chat sockets. Verification
//! tokens are mailed out at registration and only confirm an email address.
//! Both are HS256-signed and carry a `purpose` claim so one cannot stand in
//! for the other.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{CommunityError, Result};

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPurpose {
    Session,
    Verify,
}

/// Payload stored in JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id (hex ObjectId)
    pub sub: String,
    /// Email at time of issue
    pub email: String,
    pub purpose: TokenPurpose,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }

    /// Claims of a valid token with the expected purpose
    pub fn claims_for(self, purpose: TokenPurpose) -> Result<Claims> {
        match self.claims {
            Some(claims) if self.valid && claims.purpose == purpose => Ok(claims),
            Some(_) if self.valid => Err(CommunityError::Unauthorized(
                "Token cannot be used here".into(),
            )),
            _ => Err(CommunityError::Unauthorized(
                self.error.unwrap_or_else(|| "Invalid token".into()),
            )),
        }
    }
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    session_expiry_seconds: u64,
    verify_expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(
        secret: String,
        session_expiry_seconds: u64,
        verify_expiry_seconds: u64,
    ) -> Result<Self> {
        if secret.is_empty() {
            return Err(CommunityError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(CommunityError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            session_expiry_seconds,
            verify_expiry_seconds,
        })
    }

    /// Create a validator for dev mode (allows empty secret)
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            session_expiry_seconds: 7 * 24 * 60 * 60,
            verify_expiry_seconds: 24 * 60 * 60,
        }
    }

    /// Issue a session token for a signed-in user
    pub fn generate_session_token(&self, user_id: &str, email: &str) -> Result<String> {
        self.generate(user_id, email, TokenPurpose::Session, self.session_expiry_seconds)
    }

    /// Issue an email verification token
    pub fn generate_verify_token(&self, user_id: &str, email: &str) -> Result<String> {
        self.generate(user_id, email, TokenPurpose::Verify, self.verify_expiry_seconds)
    }

    fn generate(
        &self,
        user_id: &str,
        email: &str,
        purpose: TokenPurpose,
        expiry_seconds: u64,
    ) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| CommunityError::Internal(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            purpose,
            iat: now,
            exp: now + expiry_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| CommunityError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Verify and decode a JWT token
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        let validation = Validation::default();

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) => TokenValidationResult::valid(token_data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let error_msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidToken => "Invalid token",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    _ => "Token validation failed",
                };
                TokenValidationResult::invalid(error_msg)
            }
        }
    }
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

/// Extract a token from a `token=` query parameter
pub fn extract_token_from_query(query: Option<&str>) -> Option<String> {
    let query = query?;
    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .ok()?
        .into_iter()
        .find(|(key, value)| key == "token" && !value.is_empty())
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> JwtValidator {
        JwtValidator::new("a-test-secret-that-is-at-least-32-chars".into(), 3600, 600).unwrap()
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(JwtValidator::new("short".into(), 3600, 600).is_err());
    }

    #[test]
    fn test_session_token_round_trip() {
        let jwt = validator();
        let token = jwt.generate_session_token("64b7f0c2a1b2c3d4e5f60718", "a@b.test").unwrap();

        let claims = jwt
            .verify_token(&token)
            .claims_for(TokenPurpose::Session)
            .unwrap();
        assert_eq!(claims.sub, "64b7f0c2a1b2c3d4e5f60718");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_verify_token_not_a_session() {
        let jwt = validator();
        let token = jwt.generate_verify_token("u1", "a@b.test").unwrap();

        let result = jwt.verify_token(&token).claims_for(TokenPurpose::Session);
        assert!(matches!(result, Err(CommunityError::Unauthorized(_))));
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let other = JwtValidator::new("another-secret-that-is-at-least-32-chars".into(), 3600, 600)
            .unwrap();
        let token = other.generate_session_token("u1", "a@b.test").unwrap();

        let result = validator().verify_token(&token);
        assert!(!result.valid);
        assert_eq!(result.error.as_deref(), Some("Invalid signature"));
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(extract_token_from_header(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(Some("abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(Some("Basic a b")), None);
        assert_eq!(extract_token_from_header(None), None);
    }

    #[test]
    fn test_extract_token_from_query() {
        assert_eq!(
            extract_token_from_query(Some("foo=1&token=xyz")),
            Some("xyz".to_string())
        );
        assert_eq!(extract_token_from_query(Some("token=")), None);
        assert_eq!(extract_token_from_query(None), None);
    }
}

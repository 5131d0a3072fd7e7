//! Accounts: registration, login, email verification and profile

use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{check_password_policy, hash_password, verify_password, JwtValidator, TokenPurpose};
use crate::community::views::SessionUser;
use crate::db::schemas::UserDoc;
use crate::services::EmailService;
use crate::store::{settle, Store, UnitOfWork};
use crate::types::{CommunityError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub postcode: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<()> {
        let email = self.email.trim();
        let at = email.find('@');
        if !matches!(at, Some(i) if i > 0 && email[i + 1..].contains('.')) {
            return Err(CommunityError::Validation("A valid email is required".into()));
        }
        check_password_policy(&self.password)?;
        if self.first_name.trim().is_empty() {
            return Err(CommunityError::Validation("firstName is required".into()));
        }
        validate_postcode(&self.postcode)
    }
}

fn validate_postcode(postcode: &str) -> Result<()> {
    if !(5..=8).contains(&postcode.trim().chars().count()) {
        return Err(CommunityError::Validation(
            "postcode must be 5 to 8 characters".into(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: SessionUser,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
}

pub struct AccountService {
    store: Arc<dyn Store>,
    jwt: JwtValidator,
    email: EmailService,
    client_origin: String,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn Store>,
        jwt: JwtValidator,
        email: EmailService,
        client_origin: impl Into<String>,
    ) -> Self {
        Self {
            store,
            jwt,
            email,
            client_origin: client_origin.into(),
        }
    }

    /// Create an account and mail its verification link
    pub async fn register(&self, request: &RegisterRequest) -> Result<&'static str> {
        request.validate()?;
        let password_hash = hash_password(&request.password)?;
        let user = UserDoc::new(
            &request.email,
            &password_hash,
            &request.first_name,
            &request.postcode,
        );

        let mut uow = self.store.begin().await?;
        let result = Self::register_in(&mut *uow, &user).await;
        settle(uow, result).await.map_err(|e| match e {
            CommunityError::Conflict(_) => CommunityError::Conflict("Email already registered".into()),
            other => other,
        })?;

        info!(user_id = %user.id, "User registered");

        let token = self.jwt.generate_verify_token(&user.id.to_hex(), &user.email)?;
        let link = format!(
            "{}/verify-email?token={}",
            self.client_origin.trim_end_matches('/'),
            urlencoding::encode(&token)
        );
        if let Err(e) = self
            .email
            .send_verification(&user.email, &user.first_name, &link)
            .await
        {
            warn!(user_id = %user.id, "Verification email failed: {}", e);
        }

        Ok("Registered. Check your email to verify your account.")
    }

    /// Exchange credentials for a session token
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        let invalid = || CommunityError::Unauthorized("Invalid credentials".into());

        let mut uow = self.store.begin().await?;
        let result = uow.user_by_email(&request.email.trim().to_lowercase()).await;
        let user = settle(uow, result).await?.ok_or_else(invalid)?;

        if !verify_password(&request.password, &user.password_hash)? {
            return Err(invalid());
        }

        let token = self.jwt.generate_session_token(&user.id.to_hex(), &user.email)?;
        info!(user_id = %user.id, "User logged in");
        Ok(LoginResponse {
            token,
            user: SessionUser::from(&user),
        })
    }

    /// Confirm an email address from a mailed verification token
    pub async fn verify_email(&self, token: &str) -> Result<&'static str> {
        let claims = self
            .jwt
            .verify_token(token)
            .claims_for(TokenPurpose::Verify)
            .map_err(|_| CommunityError::Validation("Invalid or expired token".into()))?;
        let user_id = ObjectId::parse_str(&claims.sub)
            .map_err(|_| CommunityError::Validation("Invalid or expired token".into()))?;

        let mut uow = self.store.begin().await?;
        let result = Self::verify_in(&mut *uow, user_id).await;
        settle(uow, result).await?;

        Ok("Email verified")
    }

    /// Change first name and/or postcode. Returns the applied changes.
    pub async fn update_profile(
        &self,
        user_id: ObjectId,
        update: &ProfileUpdate,
    ) -> Result<ProfileUpdate> {
        let mut applied = ProfileUpdate::default();
        if let Some(first_name) = &update.first_name {
            let first_name = first_name.trim();
            if first_name.is_empty() {
                return Err(CommunityError::Validation("firstName cannot be empty".into()));
            }
            applied.first_name = Some(first_name.to_string());
        }
        if let Some(postcode) = &update.postcode {
            validate_postcode(postcode)?;
            applied.postcode = Some(postcode.trim().to_uppercase());
        }

        let mut uow = self.store.begin().await?;
        let result = Self::update_in(&mut *uow, user_id, &applied).await;
        settle(uow, result).await?;

        Ok(applied)
    }

    async fn register_in(uow: &mut dyn UnitOfWork, user: &UserDoc) -> Result<()> {
        if uow.user_by_email(&user.email).await?.is_some() {
            return Err(CommunityError::Conflict("Email already registered".into()));
        }
        uow.insert_user(user).await
    }

    async fn verify_in(uow: &mut dyn UnitOfWork, user_id: ObjectId) -> Result<()> {
        let mut user = uow
            .user(user_id)
            .await?
            .ok_or_else(|| CommunityError::NotFound("User not found".into()))?;
        if user.email_verified_at.is_none() {
            user.email_verified_at = Some(DateTime::now());
            uow.save_user(&user).await?;
            info!(user_id = %user.id, "Email verified");
        }
        Ok(())
    }

    async fn update_in(
        uow: &mut dyn UnitOfWork,
        user_id: ObjectId,
        applied: &ProfileUpdate,
    ) -> Result<()> {
        let mut user = uow
            .user(user_id)
            .await?
            .ok_or_else(|| CommunityError::Unauthorized("User not found".into()))?;
        if let Some(first_name) = &applied.first_name {
            user.first_name = first_name.clone();
        }
        if let Some(postcode) = &applied.postcode {
            user.postcode = postcode.clone();
        }
        uow.save_user(&user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str, postcode: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: password.into(),
            first_name: "Ada".into(),
            postcode: postcode.into(),
        }
    }

    #[test]
    fn test_register_validation() {
        assert!(request("ada@example.com", "long-enough", "KA12 8EE").validate().is_ok());
        assert!(request("not-an-email", "long-enough", "KA12 8EE").validate().is_err());
        assert!(request("@example.com", "long-enough", "KA12 8EE").validate().is_err());
        assert!(request("ada@example.com", "short", "KA12 8EE").validate().is_err());
        assert!(request("ada@example.com", "long-enough", "KA1").validate().is_err());
    }
}

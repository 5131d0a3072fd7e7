//! Permission levels for routes
//!
//! A caller's level is derived from their user record on every request, so
//! verifying an email or being granted admin takes effect immediately.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::schemas::UserDoc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum PermissionLevel {
    /// No authentication
    #[default]
    Public = 0,
    /// Signed in, email not yet verified
    Authenticated = 1,
    /// Signed in with a verified email
    Verified = 2,
    /// Administrator
    Admin = 3,
}

impl PermissionLevel {
    /// Level held by a signed-in user
    pub fn of(user: &UserDoc) -> Self {
        if user.is_admin {
            PermissionLevel::Admin
        } else if user.email_verified_at.is_some() {
            PermissionLevel::Verified
        } else {
            PermissionLevel::Authenticated
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionLevel::Public => write!(f, "PUBLIC"),
            PermissionLevel::Authenticated => write!(f, "AUTHENTICATED"),
            PermissionLevel::Verified => write!(f, "VERIFIED"),
            PermissionLevel::Admin => write!(f, "ADMIN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(PermissionLevel::Admin > PermissionLevel::Verified);
        assert!(PermissionLevel::Verified > PermissionLevel::Authenticated);
        assert!(PermissionLevel::Authenticated > PermissionLevel::Public);
    }

    #[test]
    fn test_level_of_user() {
        let mut user = UserDoc::new("a@b.test", "hash", "Ada", "KA12 8EE");
        assert_eq!(PermissionLevel::of(&user), PermissionLevel::Authenticated);

        user.email_verified_at = Some(bson::DateTime::now());
        assert_eq!(PermissionLevel::of(&user), PermissionLevel::Verified);

        user.is_admin = true;
        assert_eq!(PermissionLevel::of(&user), PermissionLevel::Admin);
    }
}

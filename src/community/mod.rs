//! Community features around the street directory
//!
//! Accounts, posts and comments, direct messages, and moderation. None of
//! these write residency or membership state; that stays with
//! [`crate::membership::MembershipCoordinator`].

pub mod accounts;
pub mod conversations;
pub mod moderation;
pub mod posts;
pub mod views;

pub use accounts::{AccountService, LoginRequest, LoginResponse, ProfileUpdate, RegisterRequest};
pub use conversations::{ConversationService, OpenConversation, SendMessage};
pub use moderation::{AddressListing, CreateReport, ModerationService, ReportAction, Stats};
pub use posts::{CreateComment, CreatePost, PostService, PostUpdate};

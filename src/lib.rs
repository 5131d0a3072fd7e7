//! Connected Community - neighbourhood membership service
//!
//! Residents claim or join a postal address, owners approve who else lives
//! there, and approved residents become members of their street's group.
//!
//! ## Services
//!
//! - **Membership**: address claims, resident requests, removal and ownership
//!   transfer, each applied as one all-or-nothing unit
//! - **Street chat**: per-street rooms over WebSocket, with history bounded to
//!   the reader's own membership
//! - **Community**: accounts, street posts, direct messages and moderation

pub mod auth;
pub mod chat;
pub mod community;
pub mod config;
pub mod db;
pub mod logging;
pub mod membership;
pub mod routes;
pub mod server;
pub mod services;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, serve, AppState};
pub use types::{CommunityError, Result};

//! Shared types

pub mod error;

pub use error::{CommunityError, Result, GENERIC_FAILURE};

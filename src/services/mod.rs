//! Outbound collaborators
//!
//! - Transactional email (Resend)
//! - UK postcode lookup (postcodes.io)

pub mod email;
pub mod postcodes;

pub use email::{EmailMessage, EmailService};
pub use postcodes::{PostcodeClient, PostcodeInfo};

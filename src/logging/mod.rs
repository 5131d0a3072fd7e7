//! Logging infrastructure
//!
//! Structured audit records of membership changes.

pub mod audit;

pub use audit::{AuditEvent, AuditKind, AuditLogger};

//! Membership audit log
//!
//! Every committed residency change is recorded as an [`AuditEvent`]. Events
//! always go to the `audit` tracing target; when a path is configured they are
//! also appended to a JSONL file. File writes run on the blocking pool.

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info};
use uuid::Uuid;

/// Audit event kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// First claim on a new address, or promotion into a vacancy
    OwnershipClaimed,
    ResidentRequested,
    ResidentApproved,
    ResidentDenied,
    ResidentRemoved,
    OwnershipTransferred,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    /// Who performed the operation
    pub actor_id: String,
    /// Whose residency changed
    pub subject_id: String,
    pub address_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AuditEvent {
    pub fn new(kind: AuditKind, actor_id: ObjectId, subject_id: ObjectId, address_id: ObjectId) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            actor_id: actor_id.to_hex(),
            subject_id: subject_id.to_hex(),
            address_id: address_id.to_hex(),
            request_id: None,
        }
    }

    pub fn with_request(mut self, request_id: ObjectId) -> Self {
        self.request_id = Some(request_id.to_hex());
        self
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Audit logger, cheap to clone
#[derive(Clone, Default)]
pub struct AuditLogger {
    inner: Arc<Mutex<AuditLoggerInner>>,
}

#[derive(Default)]
struct AuditLoggerInner {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start appending events to a JSONL file
    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?
            .into_std()
            .await;

        let mut inner = self.lock();
        inner.writer = Some(BufWriter::new(file));
        inner.path = Some(path.clone());
        drop(inner);

        info!("Audit logging to {}", path.display());
        Ok(())
    }

    pub async fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            kind = ?event.kind,
            actor = %event.actor_id,
            subject = %event.subject_id,
            address = %event.address_id,
            "membership change"
        );

        let jsonl = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        let logger = self.clone();
        let written = tokio::task::spawn_blocking(move || {
            let mut inner = logger.lock();
            let Some(writer) = inner.writer.as_mut() else {
                return Ok(());
            };
            writeln!(writer, "{}", jsonl)?;
            writer.flush()
        })
        .await;

        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to write audit event: {}", e),
            Err(e) => error!("Audit write task failed: {}", e),
        }
    }

    /// File events are appended to, if any
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().path.clone()
    }

    // A writer poisoned by a panicked task is still usable for appends
    fn lock(&self) -> MutexGuard<'_, AuditLoggerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let request = ObjectId::new();
        let event = AuditEvent::new(
            AuditKind::ResidentApproved,
            ObjectId::new(),
            ObjectId::new(),
            ObjectId::new(),
        )
        .with_request(request);

        let jsonl = event.to_jsonl().unwrap();
        assert!(jsonl.contains("resident_approved"));
        assert!(jsonl.contains(&request.to_hex()));
    }

    #[tokio::test]
    async fn test_record_without_file_is_log_only() {
        let logger = AuditLogger::new();
        assert_eq!(logger.path(), None);
        let user = ObjectId::new();
        logger
            .record(AuditEvent::new(AuditKind::OwnershipClaimed, user, user, ObjectId::new()))
            .await;
    }

    #[tokio::test]
    async fn test_events_appended_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let logger = AuditLogger::new();
        logger.init_file(path.clone()).await.unwrap();
        assert_eq!(logger.path(), Some(path.clone()));

        let address = ObjectId::new();
        for kind in [AuditKind::ResidentRequested, AuditKind::ResidentDenied] {
            let user = ObjectId::new();
            logger.record(AuditEvent::new(kind, user, user, address)).await;
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: AuditEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.kind, AuditKind::ResidentRequested);
        assert_eq!(first.address_id, address.to_hex());
    }
}

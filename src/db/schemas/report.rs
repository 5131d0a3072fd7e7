//! Moderation report schema

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{index, IntoIndexes, MutMetadata, Record};
use crate::db::schemas::Metadata;

pub const REPORT_COLLECTION: &str = "reports";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportTarget {
    Post,
    Comment,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    Open,
    Actioned,
    Dismissed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Open => "OPEN",
            ReportStatus::Actioned => "ACTIONED",
            ReportStatus::Dismissed => "DISMISSED",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReportDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default)]
    pub metadata: Metadata,

    pub reporter_id: ObjectId,

    pub target_type: ReportTarget,

    pub target_id: ObjectId,

    pub reason: String,

    pub status: ReportStatus,

    #[serde(default)]
    pub handled_by: Option<ObjectId>,

    #[serde(default)]
    pub handled_at: Option<DateTime>,
}

impl ReportDoc {
    pub fn new(reporter_id: ObjectId, target_type: ReportTarget, target_id: ObjectId, reason: &str) -> Self {
        Self {
            id: ObjectId::new(),
            metadata: Metadata::new(),
            reporter_id,
            target_type,
            target_id,
            reason: reason.to_string(),
            status: ReportStatus::Open,
            handled_by: None,
            handled_at: None,
        }
    }
}

impl IntoIndexes for ReportDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![index(doc! { "status": 1, "_id": -1 }, "status_index", false)]
    }
}

impl MutMetadata for ReportDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for ReportDoc {
    const COLLECTION: &'static str = REPORT_COLLECTION;

    fn id(&self) -> ObjectId {
        self.id
    }
}

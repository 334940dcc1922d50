//! Submission records: one captured form entry (lead, applicant or subscriber).
//!
//! The serialized shape is the persisted layout: `{ id, createdAt, type, data, status }`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Form field name -> submitted text.
pub type Payload = BTreeMap<String, String>;

/// What kind of visitor produced the submission. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionKind {
    Lead,
    Applicant,
    Subscriber,
}

impl SubmissionKind {
    pub const ALL: [SubmissionKind; 3] = [Self::Lead, Self::Applicant, Self::Subscriber];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Applicant => "applicant",
            Self::Subscriber => "subscriber",
        }
    }
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lead" => Ok(Self::Lead),
            "applicant" => Ok(Self::Applicant),
            "subscriber" => Ok(Self::Subscriber),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Review state set by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    #[default]
    New,
    Processed,
    Archived,
}

impl SubmissionStatus {
    pub const ALL: [SubmissionStatus; 3] = [Self::New, Self::Processed, Self::Archived];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Processed => "processed",
            Self::Archived => "archived",
        }
    }

    /// Operator toggle: New <-> Processed; Archived records are restored to New.
    pub fn toggled(self) -> Self {
        match self {
            Self::New => Self::Processed,
            Self::Processed | Self::Archived => Self::New,
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "processed" => Ok(Self::Processed),
            "archived" => Ok(Self::Archived),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant: {0:?}")]
pub struct UnknownVariant(pub String);

/// One captured form entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "type")]
    pub kind: SubmissionKind,
    #[serde(rename = "data")]
    pub payload: Payload,
    #[serde(default)]
    pub status: SubmissionStatus,
}

impl SubmissionRecord {
    /// Fresh record: new UUID, current UTC timestamp, status New.
    pub fn new(kind: SubmissionKind, payload: Payload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now_iso8601(),
            kind,
            payload,
            status: SubmissionStatus::New,
        }
    }

    /// Payload as JSON text; this is what the admin search matches against.
    pub fn payload_text(&self) -> String {
        serde_json::to_string(&self.payload).unwrap_or_default()
    }
}

/// `2026-10-18T09:15:02.123Z`
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

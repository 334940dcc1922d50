//! Admin Viewer — review and curate captured submissions behind a passphrase gate.
//!
//! The gate compares a configured passphrase and hands out opaque session tokens. It keeps
//! casual visitors out of the review screen; it is not an authentication boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::local_store::{StoreError, SubmissionStore};
use crate::submission::{SubmissionKind, SubmissionRecord, SubmissionStatus, UnknownVariant};

/// Sessions older than this are dropped at the next login.
pub const SESSION_TTL_HOURS: i64 = 12;

/// Passphrase gate with in-memory session tokens.
pub struct AdminGate {
    passphrase: String,
    sessions: DashMap<String, DateTime<Utc>>,
}

impl AdminGate {
    /// An empty passphrase disables the gate: every attempt is refused.
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
            sessions: DashMap::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.passphrase.is_empty()
    }

    pub fn authenticate(&self, candidate: &str) -> bool {
        self.is_configured() && constant_time_eq(candidate, &self.passphrase)
    }

    /// Issue a session token when the passphrase matches.
    pub fn login(&self, candidate: &str) -> Option<String> {
        if !self.authenticate(candidate) {
            tracing::warn!("admin login refused");
            return None;
        }
        self.prune_sessions(Utc::now());
        let token = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(token.clone(), Utc::now());
        tracing::info!("admin session opened");
        Some(token)
    }

    pub fn verify(&self, token: &str) -> bool {
        let cutoff = Utc::now() - Duration::hours(SESSION_TTL_HOURS);
        self.sessions
            .get(token)
            .map(|issued| *issued > cutoff)
            .unwrap_or(false)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn prune_sessions(&self, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(SESSION_TTL_HOURS);
        self.sessions.retain(|_, issued| *issued > cutoff);
    }

    pub fn logout(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }
}

fn constant_time_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Kind selector of the review screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindFilter {
    #[default]
    All,
    Only(SubmissionKind),
}

impl KindFilter {
    pub fn matches(&self, kind: SubmissionKind) -> bool {
        match self {
            Self::All => true,
            Self::Only(k) => *k == kind,
        }
    }
}

impl FromStr for KindFilter {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.is_empty() || t.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        t.parse().map(Self::Only)
    }
}

impl fmt::Display for KindFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(k) => write!(f, "{}", k),
        }
    }
}

/// Records of the selected kind whose payload JSON contains `search` (case-insensitive).
/// Order is preserved; an empty search matches everything.
pub fn apply_filter(
    records: &[SubmissionRecord],
    kind: KindFilter,
    search: &str,
) -> Vec<SubmissionRecord> {
    let needle = search.to_lowercase();
    records
        .iter()
        .filter(|r| kind.matches(r.kind))
        .filter(|r| needle.is_empty() || r.payload_text().to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// `submissions-2026-10-18.json`
pub fn export_filename(date: NaiveDate) -> String {
    format!("submissions-{}.json", date.format("%Y-%m-%d"))
}

/// Counts shown above the review table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionSummary {
    pub total: usize,
    pub by_kind: BTreeMap<&'static str, usize>,
    pub by_status: BTreeMap<&'static str, usize>,
}

pub fn summarize(records: &[SubmissionRecord]) -> SubmissionSummary {
    let mut by_kind: BTreeMap<&'static str, usize> =
        SubmissionKind::ALL.iter().map(|k| (k.as_str(), 0)).collect();
    let mut by_status: BTreeMap<&'static str, usize> =
        SubmissionStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for r in records {
        *by_kind.entry(r.kind.as_str()).or_default() += 1;
        *by_status.entry(r.status.as_str()).or_default() += 1;
    }
    SubmissionSummary {
        total: records.len(),
        by_kind,
        by_status,
    }
}

/// Review operations over the shared store.
#[derive(Clone)]
pub struct AdminViewer {
    store: Arc<SubmissionStore>,
}

impl AdminViewer {
    pub fn new(store: Arc<SubmissionStore>) -> Self {
        Self { store }
    }

    pub fn list(&self, kind: KindFilter, search: &str) -> Vec<SubmissionRecord> {
        apply_filter(&self.store.list_all(), kind, search)
    }

    pub fn summary(&self) -> SubmissionSummary {
        summarize(&self.store.list_all())
    }

    /// Flip New <-> Processed (Archived goes back to New). Returns the new status.
    pub fn toggle_status(&self, id: &str) -> Option<SubmissionStatus> {
        self.store.update_status(id, SubmissionStatus::toggled)
    }

    pub fn archive(&self, id: &str) -> bool {
        self.store.set_status(id, SubmissionStatus::Archived)
    }

    pub fn delete(&self, id: &str) -> bool {
        self.store.remove(id)
    }

    pub fn wipe(&self) {
        self.store.clear()
    }

    /// Full unfiltered collection as pretty JSON, in the persisted layout.
    pub fn export_snapshot(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec_pretty(&self.store.list_all())?)
    }

    /// Snapshot plus its dated download name.
    pub fn export(&self) -> Result<(String, Vec<u8>), StoreError> {
        let name = export_filename(Utc::now().date_naive());
        Ok((name, self.export_snapshot()?))
    }
}

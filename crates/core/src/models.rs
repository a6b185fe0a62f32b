//! Domain model types used throughout branchwatch.
//!
//! These types bridge the registry backends, the analysis passes, and the
//! CLI. Only [`BranchRecord`] and [`RegistryDocument`] are persisted.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version written into every registry document.
pub const SCHEMA_VERSION: &str = "1";

// ---------------------------------------------------------------------------
// Branch status
// ---------------------------------------------------------------------------

/// Lifecycle status of a tracked branch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    #[default]
    Active,
    Completed,
    Abandoned,
}

impl BranchStatus {
    /// Parse a status string; `None` for anything unrecognised.
    pub fn from_str_val(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Branch record
// ---------------------------------------------------------------------------

/// One tracked branch and the files it intends to modify.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BranchRecord {
    pub name: String,
    /// Normalized repository-relative paths.
    pub files: BTreeSet<String>,
    pub registered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default)]
    pub status: BranchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BranchRecord {
    pub fn is_active(&self) -> bool {
        self.status == BranchStatus::Active
    }

    /// `true` if this record touches any of `paths`.
    pub fn touches_any(&self, paths: &BTreeSet<String>) -> bool {
        self.files.iter().any(|f| paths.contains(f))
    }

    /// Apply the provided fields of `update` in place.
    pub fn apply(&mut self, update: BranchUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(files) = update.files {
            self.files = files;
        }
        if let Some(agent) = update.agent {
            self.agent = agent;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
    }
}

/// Input to `register`: a record minus its timestamp and status.
#[derive(Debug, Clone, Default)]
pub struct NewBranch {
    pub name: String,
    pub files: Vec<String>,
    pub agent: Option<String>,
    pub description: Option<String>,
}

impl NewBranch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }
}

/// Partial update for an existing record. `None` leaves a field untouched;
/// the nested `Option` on `agent`/`description` allows clearing them.
#[derive(Debug, Clone, Default)]
pub struct BranchUpdate {
    pub status: Option<BranchStatus>,
    /// Validated and normalized by the store before it is applied.
    pub files: Option<BTreeSet<String>>,
    pub agent: Option<Option<String>>,
    pub description: Option<Option<String>>,
}

impl BranchUpdate {
    pub fn status(status: BranchStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.files.is_none()
            && self.agent.is_none()
            && self.description.is_none()
    }
}

// ---------------------------------------------------------------------------
// Registry document
// ---------------------------------------------------------------------------

/// The persisted registry: every record keyed by branch name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDocument {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub branches: BTreeMap<String, BranchRecord>,
}

impl RegistryDocument {
    pub fn new(project_id: Option<String>) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            project_id,
            branches: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(name: &str) -> BranchRecord {
        BranchRecord {
            name: name.into(),
            files: ["src/a.js".to_string(), "src/b.js".to_string()].into(),
            registered_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 45).unwrap(),
            agent: Some("agent-7".into()),
            status: BranchStatus::Active,
            description: None,
        }
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_string(&record("feat/x")).unwrap();
        assert!(json.contains("\"registeredAt\":\"2026-03-01T12:30:45Z\""));
        assert!(json.contains("\"status\":\"active\""));
        assert!(!json.contains("description"));
    }

    #[test]
    fn test_document_round_trip_preserves_fields() {
        let mut doc = RegistryDocument::new(Some("acme".into()));
        doc.branches.insert("feat/x".into(), record("feat/x"));
        let json = serde_json::to_string_pretty(&doc).unwrap();
        let back: RegistryDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
        assert_eq!(serde_json::to_string_pretty(&back).unwrap(), json);
    }

    #[test]
    fn test_apply_update() {
        let mut rec = record("feat/x");
        rec.apply(BranchUpdate {
            status: Some(BranchStatus::Completed),
            agent: Some(None),
            ..BranchUpdate::default()
        });
        assert_eq!(rec.status, BranchStatus::Completed);
        assert_eq!(rec.agent, None);
        assert_eq!(rec.files.len(), 2);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(BranchStatus::from_str_val("abandoned"), Some(BranchStatus::Abandoned));
        assert_eq!(BranchStatus::from_str_val("merged"), None);
        assert_eq!(BranchStatus::Completed.to_string(), "completed");
    }
}

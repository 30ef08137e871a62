//! Run records kept in the history store.

use chrono::{DateTime, Utc};
use hivebus::Record;
use serde::{Deserialize, Serialize};

/// Outcome of one agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub failed: bool,
    pub recorded_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(id: impl Into<String>, summary: Option<String>, failed: bool) -> Self {
        Self {
            id: id.into(),
            summary,
            failed,
            recorded_at: Utc::now(),
        }
    }
}

impl Record for RunRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn failed(&self) -> bool {
        self.failed
    }
}

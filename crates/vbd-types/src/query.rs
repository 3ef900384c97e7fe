use serde::{Deserialize, Serialize};

use crate::entity::VersionLineageRecord;
use crate::temporal::ObservedAt;

/// Inclusive bounds on a version's observation time. Either side may be open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default)]
    pub after: Option<ObservedAt>,
    #[serde(default)]
    pub before: Option<ObservedAt>,
}

impl TimeRange {
    pub fn between(after: ObservedAt, before: ObservedAt) -> Self {
        Self {
            after: Some(after),
            before: Some(before),
        }
    }

    pub fn contains(&self, at: ObservedAt) -> bool {
        self.after.map_or(true, |after| at >= after) && self.before.map_or(true, |before| at <= before)
    }

    pub fn matches(&self, record: &VersionLineageRecord) -> bool {
        self.contains(record.current_blob().observed_at)
    }
}

/// Filters for listing a client's contract versions.
///
/// `description` is reserved for semantic filtering, which is not
/// implemented. It is accepted so callers can send it, and reported back as
/// ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub version_ordinal: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.version_ordinal = Some(ordinal);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

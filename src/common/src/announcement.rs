use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An inbound event describing where a telemetry snapshot can be fetched and how it is packaged.
///
/// Built once per envelope by the announcement parser and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub account_id: Option<String>,
    pub org_id: String,
    pub content_type: String,
    pub url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub request_id: Option<String>,

    /// Set when the snapshot is a multi-file archive rather than a single compressed document.
    pub is_runtimes: bool,
}

impl Announcement {
    pub fn has_content_type(&self, content_type: &str) -> bool {
        self.content_type == content_type
    }
}

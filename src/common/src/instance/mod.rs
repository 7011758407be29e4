pub mod app_server;

use crate::jar_hash::JarHashSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceKind {
    Jvm,
    AppServer,
}

impl InstanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceKind::Jvm => "jvm",
            InstanceKind::AppServer => "app_server",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "jvm" => Some(InstanceKind::Jvm),
            "app_server" => Some(InstanceKind::AppServer),
            _ => None,
        }
    }
}

impl std::fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A JVM process as described by one telemetry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JvmInstance {
    pub linking_hash: String,

    pub account_id: Option<String>,
    pub org_id: String,
    /// Timestamp of the announcement that delivered this description.
    pub created: DateTime<Utc>,

    pub hostname: String,
    /// Epoch millis.
    pub launch_time: i64,
    pub vendor: Option<String>,
    pub version_string: Option<String>,
    pub version: Option<String>,
    pub heap_min: Option<i64>,
    pub heap_max: Option<i64>,
    pub processors: Option<i32>,
    pub java_home: Option<String>,
    pub java_class_path: Option<String>,
    pub pid: Option<i64>,

    /// The `basic` section of the snapshot, kept as reported.
    pub details: Value,

    pub jar_hashes: JarHashSet,
}

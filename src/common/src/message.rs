use crate::instance::app_server::AppServerInstance;
use crate::instance::{InstanceKind, JvmInstance};
use crate::jar_hash::JarHashSet;
use serde::{Deserialize, Serialize};

/// Which inbound flow a payload came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// One announcement, one gzip-compressed JSON document.
    SingleBlob,
    /// One announcement, a gzip-compressed tar of JSON documents.
    Archive,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::SingleBlob => "single_blob",
            SourceKind::Archive => "archive",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified snapshot payload, ready for reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InsightsMessage {
    NewInstance(NewInstance),
    UpdateInstance(UpdateInstance),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NewInstance {
    Jvm(JvmInstance),
    AppServer(Box<AppServerInstance>),
}

/// Jar hashes newly observed on an instance the store already knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateInstance {
    pub linking_hash: String,
    pub jar_hashes: JarHashSet,
}

impl InsightsMessage {
    pub fn linking_hash(&self) -> &str {
        match self {
            InsightsMessage::NewInstance(instance) => instance.linking_hash(),
            InsightsMessage::UpdateInstance(update) => &update.linking_hash,
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            InsightsMessage::NewInstance(NewInstance::Jvm(_)) => "new_jvm_instance",
            InsightsMessage::NewInstance(NewInstance::AppServer(_)) => "new_app_server_instance",
            InsightsMessage::UpdateInstance(_) => "update_instance",
        }
    }
}

impl NewInstance {
    pub fn jvm(&self) -> &JvmInstance {
        match self {
            NewInstance::Jvm(jvm) => jvm,
            NewInstance::AppServer(app) => &app.jvm,
        }
    }

    pub fn linking_hash(&self) -> &str {
        &self.jvm().linking_hash
    }

    pub fn kind(&self) -> InstanceKind {
        match self {
            NewInstance::Jvm(_) => InstanceKind::Jvm,
            NewInstance::AppServer(_) => InstanceKind::AppServer,
        }
    }
}

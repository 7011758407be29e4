use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

/// Content hash of one packaged library observed on a running instance.
///
/// Identity is the hash value alone: two entries with the same `hash` are the same jar no matter
/// which name or version the agent reported for them. Sets of jar hashes therefore de-duplicate
/// by value and keep the first descriptive metadata they saw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JarHash {
    pub hash: String,
    pub name: Option<String>,
    pub version: Option<String>,
}

pub type JarHashSet = BTreeSet<JarHash>;

impl JarHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            name: None,
            version: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl PartialEq for JarHash {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for JarHash {}

impl Hash for JarHash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl PartialOrd for JarHash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for JarHash {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hash.cmp(&other.hash)
    }
}

use inventory_common::{JarHash, JarHashSet};
use serde_json::Value;
use tracing::debug;

use crate::error::ClassificationError;

/// Checksum attributes in order of preference.
const CHECKSUM_ATTRIBUTES: [&str; 3] = ["sha256Checksum", "sha512Checksum", "sha1Checksum"];

/// Reads a jar list given either as a bare array or as an object wrapping one under `jars`.
///
/// Duplicate hashes collapse into one entry that keeps the first name and version seen.
pub(crate) fn jar_list(
    value: Option<&Value>,
    field: String,
) -> Result<JarHashSet, ClassificationError> {
    let items = match value {
        None | Some(Value::Null) => return Ok(JarHashSet::new()),
        Some(Value::Array(items)) => items,
        Some(Value::Object(wrapper)) => match wrapper.get("jars") {
            None | Some(Value::Null) => return Ok(JarHashSet::new()),
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(ClassificationError::InvalidField {
                    field: format!("{}.jars", field),
                    expected: "an array",
                })
            }
        },
        Some(_) => {
            return Err(ClassificationError::InvalidField {
                field,
                expected: "a jar list",
            })
        }
    };

    let mut jars = JarHashSet::new();
    for item in items {
        match jar_entry(item) {
            Some(jar) => {
                jars.insert(jar);
            }
            None => debug!(field = %field, entry = %item, "skipping jar entry without a checksum"),
        }
    }

    Ok(jars)
}

fn jar_entry(item: &Value) -> Option<JarHash> {
    match item {
        Value::String(hash) if !hash.is_empty() => Some(JarHash::new(hash.as_str())),
        Value::Object(entry) => {
            let attributes = entry.get("attributes").and_then(Value::as_object)?;
            let hash = CHECKSUM_ATTRIBUTES
                .iter()
                .filter_map(|key| attributes.get(*key).and_then(Value::as_str))
                .find(|hash| !hash.is_empty())?;

            let mut jar = JarHash::new(hash);
            if let Some(name) = entry.get("name").and_then(Value::as_str) {
                jar = jar.with_name(name);
            }
            if let Some(version) = entry.get("version").and_then(Value::as_str) {
                jar = jar.with_version(version);
            }
            Some(jar)
        }
        _ => None,
    }
}

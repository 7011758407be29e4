use inventory_common::UpdateInstance;
use serde_json::{Map, Value};

use super::fields::Section;
use super::jars::jar_list;
use crate::error::ClassificationError;

/// Reads an `updated-jars` delta.
pub(crate) fn build_update(
    updated: &Map<String, Value>,
) -> Result<UpdateInstance, ClassificationError> {
    let updated = Section::new("updated-jars", updated);

    let linking_hash = updated.required_str("idHash")?;
    if linking_hash.is_empty() {
        return Err(ClassificationError::MissingField(updated.path_of("idHash")));
    }

    Ok(UpdateInstance {
        linking_hash,
        jar_hashes: jar_list(updated.get("jars"), updated.path_of("jars"))?,
    })
}

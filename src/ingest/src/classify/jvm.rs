use inventory_common::{Announcement, JvmInstance};
use serde_json::{Map, Value};

use super::fields::Section;
use super::jars::jar_list;
use super::linking_hash::{compute_linking_hash, IdentityFields};
use crate::error::ClassificationError;

/// Builds the JVM part of a snapshot from its `basic` section and direct `jars` list.
pub(crate) fn build_jvm(
    announce: &Announcement,
    root: Section<'_>,
    basic: &Map<String, Value>,
) -> Result<JvmInstance, ClassificationError> {
    let basic = Section::new("basic", basic);

    let hostname = basic.required_str("system.hostname")?;
    let launch_time = basic.required_i64("jvm.report_time")?;
    let vendor = basic.opt_str("java.vm.specification.vendor")?;
    let version_string = basic.opt_str("java.runtime.version")?;
    let java_home = basic.opt_str("java.home")?;
    let pid = basic.opt_i64("jvm.pid")?;

    let linking_hash = match root.opt_str("idHash")? {
        Some(id_hash) if !id_hash.is_empty() => id_hash,
        _ => compute_linking_hash(&IdentityFields {
            hostname: &hostname,
            launch_time,
            vendor: vendor.as_deref(),
            version_string: version_string.as_deref(),
            java_home: java_home.as_deref(),
            pid,
        }),
    };

    Ok(JvmInstance {
        linking_hash,
        account_id: announce.account_id.clone(),
        org_id: announce.org_id.clone(),
        created: announce.timestamp,
        hostname,
        launch_time,
        vendor,
        version_string,
        version: basic.opt_str("java.version")?,
        heap_min: basic.opt_i64("jvm.heap.min")?,
        heap_max: basic.opt_i64("jvm.heap.max")?,
        processors: basic.opt_i32("system.cores.logical")?,
        java_home,
        java_class_path: basic.opt_str("java.class.path")?,
        pid,
        details: Value::Object(basic.map().clone()),
        jar_hashes: jar_list(root.get("jars"), root.path_of("jars"))?,
    })
}

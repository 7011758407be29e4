use std::collections::BTreeMap;

use inventory_common::{
    AppServerConfiguration, AppServerDeployment, AppServerExtension, AppServerInstance,
    ExtensionSubsystem, JvmInstance,
};
use serde_json::{Map, Value};

use super::fields::Section;
use super::jars::jar_list;
use crate::error::ClassificationError;

/// Wraps an already-built JVM with the application-server descriptor from the `eap` section.
pub(crate) fn build_app_server(
    jvm: JvmInstance,
    eap: &Map<String, Value>,
    raw: &str,
) -> Result<AppServerInstance, ClassificationError> {
    let eap = Section::new("eap", eap);

    let configuration = match eap.opt_object("eap-configuration")? {
        Some(config) => Some(build_configuration(Section::new(
            "eap.eap-configuration",
            config,
        ))?),
        None => None,
    };

    Ok(AppServerInstance {
        jvm,
        server_version: eap.opt_str("eap-version")?,
        xp: eap.opt_bool("eap-xp")?.unwrap_or(false),
        yaml_extension: eap.opt_bool("eap-yaml-extension")?,
        bootable_jar: eap.opt_bool("eap-bootable-jar")?,
        use_git: eap.opt_bool("eap-use-git")?,
        configuration,
        module_jar_hashes: jar_list(eap.get("eap-modules"), eap.path_of("eap-modules"))?,
        raw: raw.to_string(),
    })
}

fn build_configuration(
    config: Section<'_>,
) -> Result<AppServerConfiguration, ClassificationError> {
    let deployments = config
        .opt_array("deployments")?
        .iter()
        .enumerate()
        .map(|(i, item)| build_deployment(&config.path_of(&format!("deployments[{}]", i)), item))
        .collect::<Result<Vec<_>, _>>()?;

    let extensions = config
        .opt_array("extensions")?
        .iter()
        .enumerate()
        .map(|(i, item)| build_extension(&config.path_of(&format!("extensions[{}]", i)), item))
        .collect::<Result<Vec<_>, _>>()?;

    let subsystems: BTreeMap<String, Value> = config
        .opt_object("subsystems")?
        .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    Ok(AppServerConfiguration {
        version: config.opt_str("version")?,
        launch_type: config.opt_str("launch-type")?,
        name: config.opt_str("name")?,
        organization: config.opt_str("organization")?,
        process_type: config.opt_str("process-type")?,
        product_name: config.opt_str("product-name")?,
        product_version: config.opt_str("product-version")?,
        profile_name: config.opt_str("profile-name")?,
        release_codename: config.opt_str("release-codename")?,
        release_version: config.opt_str("release-version")?,
        running_mode: config.opt_str("running-mode")?,
        runtime_configuration_state: config.opt_str("runtime-configuration-state")?,
        server_state: config.opt_str("server-state")?,
        suspend_state: config.opt_str("suspend-state")?,

        socket_binding_groups: config.raw("socket-binding-groups"),
        paths: config.raw("paths"),
        interfaces: config.raw("interfaces"),

        deployments,
        extensions,
        subsystems,
    })
}

fn as_object<'a>(
    path: &str,
    item: &'a Value,
) -> Result<&'a Map<String, Value>, ClassificationError> {
    item.as_object()
        .ok_or_else(|| ClassificationError::InvalidField {
            field: path.to_string(),
            expected: "an object",
        })
}

fn build_deployment(path: &str, item: &Value) -> Result<AppServerDeployment, ClassificationError> {
    let deployment = Section::new(path, as_object(path, item)?);

    Ok(AppServerDeployment {
        name: deployment.required_str("name")?,
        runtime_name: deployment.opt_str("runtime-name")?,
        enabled: deployment.opt_bool("enabled")?,
        persistent: deployment.opt_bool("persistent")?,
        content: deployment.raw("content"),
        archive_jar_hashes: jar_list(deployment.get("archives"), deployment.path_of("archives"))?,
    })
}

fn build_extension(path: &str, item: &Value) -> Result<AppServerExtension, ClassificationError> {
    let extension = Section::new(path, as_object(path, item)?);

    let subsystems = extension
        .opt_array("subsystems")?
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let path = extension.path_of(&format!("subsystems[{}]", i));
            let subsystem = Section::new(&path, as_object(&path, item)?);
            Ok(ExtensionSubsystem {
                name: subsystem.required_str("name")?,
                management_major_version: subsystem.opt_i32("management-major-version")?,
                management_minor_version: subsystem.opt_i32("management-minor-version")?,
                management_micro_version: subsystem.opt_i32("management-micro-version")?,
            })
        })
        .collect::<Result<Vec<_>, ClassificationError>>()?;

    Ok(AppServerExtension {
        module: extension.required_str("module")?,
        subsystems,
    })
}

use super::JvmInstance;
use crate::jar_hash::JarHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// An application-server instance: a JVM plus the server's own descriptor and configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppServerInstance {
    pub jvm: JvmInstance,

    pub server_version: Option<String>,
    /// Extension pack installed.
    pub xp: bool,
    pub yaml_extension: Option<bool>,
    pub bootable_jar: Option<bool>,
    pub use_git: Option<bool>,

    pub configuration: Option<AppServerConfiguration>,
    pub module_jar_hashes: JarHashSet,

    /// The payload exactly as received, kept so the instance can be re-derived later.
    pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppServerConfiguration {
    pub version: Option<String>,
    pub launch_type: Option<String>,
    pub name: Option<String>,
    pub organization: Option<String>,
    pub process_type: Option<String>,
    pub product_name: Option<String>,
    pub product_version: Option<String>,
    pub profile_name: Option<String>,
    pub release_codename: Option<String>,
    pub release_version: Option<String>,
    pub running_mode: Option<String>,
    pub runtime_configuration_state: Option<String>,
    pub server_state: Option<String>,
    pub suspend_state: Option<String>,

    pub socket_binding_groups: Value,
    pub paths: Value,
    pub interfaces: Value,

    pub deployments: Vec<AppServerDeployment>,
    pub extensions: Vec<AppServerExtension>,
    pub subsystems: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppServerDeployment {
    pub name: String,
    pub runtime_name: Option<String>,
    pub enabled: Option<bool>,
    pub persistent: Option<bool>,
    pub content: Value,
    pub archive_jar_hashes: JarHashSet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppServerExtension {
    pub module: String,
    pub subsystems: Vec<ExtensionSubsystem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionSubsystem {
    pub name: String,
    pub management_major_version: Option<i32>,
    pub management_minor_version: Option<i32>,
    pub management_micro_version: Option<i32>,
}

impl AppServerInstance {
    /// Every jar hash referenced anywhere in the instance graph, de-duplicated by value.
    pub fn all_jar_hashes(&self) -> JarHashSet {
        let mut all = self.jvm.jar_hashes.clone();
        all.extend(self.module_jar_hashes.iter().cloned());
        if let Some(configuration) = &self.configuration {
            for deployment in &configuration.deployments {
                all.extend(deployment.archive_jar_hashes.iter().cloned());
            }
        }
        all
    }
}

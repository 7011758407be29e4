//! Shape-based classification of snapshot payloads into [`InsightsMessage`] variants.

mod app_server;
mod fields;
mod jars;
mod jvm;
mod linking_hash;
mod update;

pub use linking_hash::{compute_linking_hash, IdentityFields};

use inventory_common::{Announcement, InsightsMessage, NewInstance};
use serde_json::Value;
use tracing::debug;

use crate::error::{ClassificationError, IngestResult, ParseError};
use fields::Section;

/// Decides what a payload describes from its JSON shape alone.
///
/// An application-server descriptor (`basic` and `eap`) wins over a plain JVM descriptor
/// (`basic`). Only a payload without `basic` is read as an update delta (`updated-jars`), so a
/// full instance description is never dropped. Text that is not a JSON
/// object is a [`ParseError`]; JSON of no known shape, or a known shape missing a required
/// field, is a [`ClassificationError`].
pub fn classify(announce: &Announcement, payload: &str) -> IngestResult<InsightsMessage> {
    let value: Value = serde_json::from_str(payload).map_err(ParseError::from)?;
    let root_map = value.as_object().ok_or(ParseError::NotAnObject)?;
    let root = Section::new("", root_map);

    let basic = root.opt_object("basic")?;
    let eap = root.opt_object("eap")?;

    let message = match (basic, eap) {
        (Some(basic), Some(eap)) => {
            let jvm = jvm::build_jvm(announce, root, basic)?;
            let app = app_server::build_app_server(jvm, eap, payload)?;
            InsightsMessage::NewInstance(NewInstance::AppServer(Box::new(app)))
        }
        (Some(basic), None) => {
            let jvm = jvm::build_jvm(announce, root, basic)?;
            InsightsMessage::NewInstance(NewInstance::Jvm(jvm))
        }
        (None, _) => match root.opt_object("updated-jars")? {
            Some(updated) => InsightsMessage::UpdateInstance(update::build_update(updated)?),
            None => return Err(ClassificationError::UnrecognizedShape.into()),
        },
    };

    debug!(
        variant = message.variant_name(),
        linking_hash = message.linking_hash(),
        "classified payload"
    );

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::fixture;
    use chrono::{TimeZone, Utc};
    use inventory_common::UpdateInstance;
    use rstest::rstest;

    fn announce() -> Announcement {
        Announcement {
            account_id: Some("accountId".to_string()),
            org_id: "12345".to_string(),
            content_type: String::new(),
            url: None,
            timestamp: Utc.with_ymd_and_hms(2023, 4, 1, 1, 0, 0).unwrap(),
            request_id: None,
            is_runtimes: false,
        }
    }

    #[test]
    fn test_jvm_instance() {
        let message = classify(&announce(), &fixture("jvm_instance.json")).unwrap();

        let InsightsMessage::NewInstance(NewInstance::Jvm(jvm)) = message else {
            panic!("expected a jvm instance");
        };
        assert_eq!(jvm.hostname, "fedora");
        assert_eq!(jvm.launch_time, 1_680_310_800_000);
        assert_eq!(jvm.vendor.as_deref(), Some("Oracle Corporation"));
        assert_eq!(jvm.version_string.as_deref(), Some("17.0.6+10"));
        assert_eq!(jvm.heap_min, Some(256));
        assert_eq!(jvm.heap_max, Some(4096));
        assert_eq!(jvm.processors, Some(8));
        assert_eq!(jvm.pid, Some(4242));
        assert_eq!(jvm.org_id, "12345");
        assert_eq!(jvm.created, announce().timestamp);
        assert_eq!(jvm.details["system.os.name"], "Linux");

        assert_eq!(jvm.jar_hashes.len(), 1);
        let jar = jvm.jar_hashes.iter().next().unwrap();
        assert_eq!(
            jar.hash,
            "8efe877d93e5e1057a1388b2950503b88b0c28447364fde08adbec61e524eeb8"
        );

        let expected = compute_linking_hash(&IdentityFields {
            hostname: "fedora",
            launch_time: 1_680_310_800_000,
            vendor: Some("Oracle Corporation"),
            version_string: Some("17.0.6+10"),
            java_home: Some("/usr/lib/jvm/java-17-openjdk"),
            pid: Some(4242),
        });
        assert_eq!(jvm.linking_hash, expected);
    }

    #[test]
    fn test_app_server_instance() {
        let payload = fixture("app_server_instance.json");
        let message = classify(&announce(), &payload).unwrap();

        let InsightsMessage::NewInstance(NewInstance::AppServer(app)) = message else {
            panic!("expected an app server instance");
        };
        assert_eq!(app.jvm.linking_hash, "5b2c7a3f9e1d4c8b0a6f2e9d7c5b3a1f");
        assert_eq!(app.server_version.as_deref(), Some("7.4.9.GA"));
        assert!(app.xp);
        assert_eq!(app.bootable_jar, Some(false));
        assert_eq!(app.raw, payload);
        assert!(app.jvm.jar_hashes.is_empty());

        let modules: Vec<_> = app.module_jar_hashes.iter().map(|j| j.hash.as_str()).collect();
        assert_eq!(modules, vec!["abc123"]);

        let config = app.configuration.as_ref().unwrap();
        assert_eq!(config.launch_type.as_deref(), Some("STANDALONE"));
        assert_eq!(config.organization, None);
        assert_eq!(config.deployments.len(), 2);
        assert_eq!(config.deployments[1].name, "second.war");
        assert_eq!(config.deployments[1].enabled, Some(false));
        for deployment in &config.deployments {
            let archives: Vec<_> = deployment
                .archive_jar_hashes
                .iter()
                .map(|j| j.hash.as_str())
                .collect();
            assert_eq!(archives, vec!["abc123"]);
        }
        assert_eq!(config.extensions.len(), 2);
        assert_eq!(config.extensions[1].subsystems[0].name, "undertow");
        assert_eq!(
            config.extensions[1].subsystems[0].management_major_version,
            Some(12)
        );
        assert_eq!(
            config.subsystems.keys().collect::<Vec<_>>(),
            vec!["logging", "undertow"]
        );
        assert!(config.interfaces["public"].is_object());

        assert_eq!(app.all_jar_hashes().len(), 1);
    }

    #[test]
    fn test_update_instance() {
        let message = classify(&announce(), &fixture("update_jars.json")).unwrap();

        let InsightsMessage::UpdateInstance(UpdateInstance {
            linking_hash,
            jar_hashes,
        }) = message
        else {
            panic!("expected an update");
        };
        assert_eq!(linking_hash, "5b2c7a3f9e1d4c8b0a6f2e9d7c5b3a1f");
        let hashes: Vec<_> = jar_hashes.iter().map(|j| j.hash.as_str()).collect();
        assert_eq!(hashes, vec!["def456", "ghi789"]);
    }

    #[test]
    fn test_app_server_shape_wins_over_update() {
        let payload = r#"{
            "basic": {"system.hostname": "h", "jvm.report_time": 1},
            "eap": {"eap-version": "8.0"},
            "updated-jars": {"idHash": "x", "jars": ["a"]}
        }"#;
        let message = classify(&announce(), payload).unwrap();
        assert_eq!(message.variant_name(), "new_app_server_instance");
    }

    #[test]
    fn test_full_description_wins_over_update() {
        let payload = r#"{
            "basic": {"system.hostname": "h", "jvm.report_time": 1},
            "jars": ["a"],
            "updated-jars": {"idHash": "x", "jars": ["b"]}
        }"#;
        let message = classify(&announce(), payload).unwrap();

        let InsightsMessage::NewInstance(NewInstance::Jvm(jvm)) = message else {
            panic!("expected a jvm instance");
        };
        assert_ne!(jvm.linking_hash, "x");
        let hashes: Vec<_> = jvm.jar_hashes.iter().map(|j| j.hash.as_str()).collect();
        assert_eq!(hashes, vec!["a"]);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let payload = fixture("jvm_instance.json");
        let first = classify(&announce(), &payload).unwrap();
        let second = classify(&announce(), &payload).unwrap();
        assert_eq!(first, second);
    }

    #[rstest]
    #[case::not_json("{ nope", ErrorKind::Parse)]
    #[case::not_object("[]", ErrorKind::Parse)]
    #[case::unknown_shape(r#"{"version": "1.0.0"}"#, ErrorKind::Classification)]
    #[case::missing_hostname(r#"{"basic": {"jvm.report_time": 1}}"#, ErrorKind::Classification)]
    #[case::bad_launch_time(
        r#"{"basic": {"system.hostname": "h", "jvm.report_time": "soon"}}"#,
        ErrorKind::Classification
    )]
    #[case::basic_not_object(r#"{"basic": "x"}"#, ErrorKind::Classification)]
    #[case::update_without_hash(r#"{"updated-jars": {"jars": []}}"#, ErrorKind::Classification)]
    #[case::update_empty_hash(r#"{"updated-jars": {"idHash": ""}}"#, ErrorKind::Classification)]
    #[case::deployment_without_name(
        r#"{"basic": {"system.hostname": "h", "jvm.report_time": 1},
            "eap": {"eap-configuration": {"deployments": [{"enabled": true}]}}}"#,
        ErrorKind::Classification
    )]
    fn test_rejected_payloads(#[case] payload: &str, #[case] kind: ErrorKind) {
        let err = classify(&announce(), payload).unwrap_err();
        assert_eq!(err.kind(), kind);
    }
}

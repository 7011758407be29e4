use chrono::{DateTime, Utc};
use inventory_common::Announcement;
use serde_json::{Map, Value};

use crate::error::ParseError;

const PLATFORM_METADATA: &str = "platform_metadata";

/// Reads an inbound envelope. Fields are taken from the top level first, then from the nested
/// `platform_metadata` object that inventory events carry.
pub fn parse_announcement(envelope: &str) -> Result<Announcement, ParseError> {
    let value: Value = serde_json::from_str(envelope)?;
    let root = value.as_object().ok_or(ParseError::NotAnObject)?;
    let fields = EnvelopeFields {
        root,
        platform: root.get(PLATFORM_METADATA).and_then(Value::as_object),
    };

    let org_id = fields
        .string("org_id")?
        .ok_or(ParseError::MissingField("org_id"))?;

    let timestamp = fields
        .string("timestamp")?
        .ok_or(ParseError::MissingField("timestamp"))?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| ParseError::InvalidField {
            field: "timestamp",
            reason: e.to_string(),
        })?
        .with_timezone(&Utc);

    Ok(Announcement {
        account_id: fields.string("account")?,
        org_id,
        content_type: fields.string("content_type")?.unwrap_or_default(),
        url: fields.string("url")?,
        timestamp,
        request_id: fields.string("request_id")?,
        is_runtimes: fields.bool("is_runtimes")?.unwrap_or(false),
    })
}

struct EnvelopeFields<'a> {
    root: &'a Map<String, Value>,
    platform: Option<&'a Map<String, Value>>,
}

impl<'a> EnvelopeFields<'a> {
    fn get(&self, name: &str) -> Option<&'a Value> {
        let present = |v: &&Value| !v.is_null();
        self.root
            .get(name)
            .filter(present)
            .or_else(|| self.platform.and_then(|p| p.get(name)).filter(present))
    }

    fn string(&self, name: &'static str) -> Result<Option<String>, ParseError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(ParseError::InvalidField {
                field: name,
                reason: format!("expected a string, found {}", other),
            }),
        }
    }

    fn bool(&self, name: &'static str) -> Result<Option<bool>, ParseError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(ParseError::InvalidField {
                field: name,
                reason: format!("expected a boolean, found {}", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ACCEPTED_CONTENT_TYPE;
    use crate::test_support::fixture;
    use chrono::TimeZone;
    use rstest::rstest;

    #[test]
    fn test_parse_top_level_announcement() {
        let announce = parse_announcement(&fixture("incoming_announce.json")).unwrap();

        assert_eq!(announce.org_id, "12345");
        assert_eq!(announce.account_id.as_deref(), Some("accountId"));
        assert_eq!(announce.content_type, ACCEPTED_CONTENT_TYPE);
        assert_eq!(
            announce.url.as_deref(),
            Some("http://s3.localhost/insights-upload-perma/runtimes.json.gz")
        );
        assert_eq!(
            announce.timestamp,
            Utc.with_ymd_and_hms(2023, 4, 1, 1, 0, 0).unwrap()
        );
        assert!(!announce.is_runtimes);
    }

    #[test]
    fn test_parse_platform_metadata_announcement() {
        let announce = parse_announcement(&fixture("egg_announce.json")).unwrap();

        assert_eq!(announce.org_id, "12345");
        assert!(announce.is_runtimes);
        assert_eq!(announce.request_id.as_deref(), Some("a1b2c3"));
        assert_eq!(
            announce.url.as_deref(),
            Some("http://s3.localhost/insights-upload-perma/archive.tar.gz")
        );
    }

    #[test]
    fn test_top_level_wins_over_platform_metadata() {
        let envelope = r#"{
            "org_id": "top",
            "timestamp": "2023-04-01T01:00:00Z",
            "platform_metadata": {"org_id": "nested", "url": "http://s3/x"}
        }"#;
        let announce = parse_announcement(envelope).unwrap();
        assert_eq!(announce.org_id, "top");
        assert_eq!(announce.url.as_deref(), Some("http://s3/x"));
        assert_eq!(announce.content_type, "");
    }

    #[rstest]
    #[case::not_json("not json")]
    #[case::not_object("[1, 2]")]
    #[case::missing_org(r#"{"timestamp": "2023-04-01T01:00:00Z"}"#)]
    #[case::missing_timestamp(r#"{"org_id": "1"}"#)]
    #[case::bad_timestamp(r#"{"org_id": "1", "timestamp": "yesterday"}"#)]
    #[case::org_not_string(r#"{"org_id": 1, "timestamp": "2023-04-01T01:00:00Z"}"#)]
    #[case::flag_not_bool(
        r#"{"org_id": "1", "timestamp": "2023-04-01T01:00:00Z", "is_runtimes": "yes"}"#
    )]
    fn test_malformed_envelopes(#[case] envelope: &str) {
        assert!(parse_announcement(envelope).is_err());
    }
}

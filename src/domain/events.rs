use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier carried verbatim from the notification payload.
///
/// The trigger forwards whatever the source column holds, so client and
/// session ids may arrive as JSON numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalId {
    Int(i64),
    Text(String),
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalId::Int(v) => write!(f, "{}", v),
            ExternalId::Text(v) => f.write_str(v),
        }
    }
}

/// One newly inserted row of interest, as announced by the store trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(alias = "trajectory_id")]
    pub entity_id: i64,
    #[serde(default)]
    pub client_id: Option<ExternalId>,
    #[serde(default)]
    pub session_id: Option<ExternalId>,
    #[serde(default, deserialize_with = "deserialize_created_at")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ChangeEvent {
    pub fn new(entity_id: i64) -> Self {
        Self {
            entity_id,
            client_id: None,
            session_id: None,
            created_at: None,
        }
    }

    /// Parse a raw notification payload (a JSON object).
    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

// json_build_object renders `timestamp` columns without an offset and
// `timestamptz` columns with one; naive values are taken as UTC.
fn deserialize_created_at<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    // Postgres emits short offsets such as `+00`, which RFC 3339 rejects
    if let Ok(ts) = DateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f%#z") {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_full_payload() {
        let event = ChangeEvent::from_payload(
            r#"{"entity_id": 42, "client_id": 7, "session_id": "abc-1", "created_at": "2026-03-01T10:15:30.123456"}"#,
        )
        .expect("payload should parse");

        assert_eq!(event.entity_id, 42);
        assert_eq!(event.client_id, Some(ExternalId::Int(7)));
        assert_eq!(event.session_id, Some(ExternalId::Text("abc-1".to_string())));
        let created = event.created_at.expect("created_at present");
        assert_eq!(
            created.timestamp(),
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 15, 30).unwrap().timestamp()
        );
    }

    #[test]
    fn test_trajectory_id_alias() {
        let event = ChangeEvent::from_payload(r#"{"trajectory_id": 9}"#).unwrap();
        assert_eq!(event.entity_id, 9);
        assert!(event.client_id.is_none());
        assert!(event.created_at.is_none());
    }

    #[test]
    fn test_created_at_with_offset() {
        let event = ChangeEvent::from_payload(
            r#"{"entity_id": 1, "created_at": "2026-03-01T12:00:00+02:00"}"#,
        )
        .unwrap();
        assert_eq!(
            event.created_at,
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap())
        );

        let short = ChangeEvent::from_payload(
            r#"{"entity_id": 1, "created_at": "2026-03-01T10:00:00.5+00"}"#,
        )
        .unwrap();
        assert_eq!(
            short.created_at.map(|t| t.timestamp()),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap().timestamp())
        );
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        assert!(ChangeEvent::from_payload("not json").is_err());
        assert!(ChangeEvent::from_payload(r#"{"client_id": 3}"#).is_err());
        assert!(ChangeEvent::from_payload(r#"{"entity_id": "x"}"#).is_err());
        assert!(ChangeEvent::from_payload(r#"{"entity_id": 1, "created_at": "yesterday"}"#).is_err());
    }

    #[test]
    fn test_external_id_display() {
        assert_eq!(ExternalId::Int(12).to_string(), "12");
        assert_eq!(ExternalId::Text("s-9".into()).to_string(), "s-9");
    }
}

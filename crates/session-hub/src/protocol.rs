//! Wire protocol for the session hub WebSocket surface.
//!
//! Every frame is a JSON object tagged by `kind`. The enum is exhaustive:
//! adding a message kind is a compile-time change, and unknown kinds fail
//! deserialization and surface as a protocol error on the connection.

use serde::{Deserialize, Serialize};

/// One history entry: a wheel number 0-36, or the literal `"00"`.
///
/// Untagged so the wire form stays a bare JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpinValue {
    Number(i64),
    Text(String),
}

impl SpinValue {
    /// Whether this value is on the wheel.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            SpinValue::Number(n) => (0..=36).contains(n),
            SpinValue::Text(s) => s == "00",
        }
    }
}

/// A protocol frame, client-to-server or server-to-client.
///
/// Optional fields are omitted from the wire form when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Envelope {
    /// Client requests room membership. First frame on every connection.
    Join {
        #[serde(default)]
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Client appends a value; server broadcasts the accepted append.
    Add {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        number: SpinValue,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<usize>,
    },

    /// Client removes the entry at `index`; server broadcasts the removal.
    Remove {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<usize>,
    },

    /// Server sends the full history to a newly joined member.
    Sync {
        key: String,
        history: Vec<SpinValue>,
        full: bool,
    },

    /// Server reports a recoverable, client-safe error on this connection.
    Error { error: String },

    /// Server rejects a join to a protected room without a valid token.
    #[serde(rename = "authRequired")]
    AuthRequired {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_join_deserializes_with_and_without_token() {
        let msg: Envelope = serde_json::from_str(r#"{"kind":"join","key":"room42"}"#).unwrap();
        assert_eq!(
            msg,
            Envelope::Join {
                key: "room42".to_string(),
                token: None
            }
        );

        let msg: Envelope =
            serde_json::from_str(r#"{"kind":"join","key":"room42","token":"abc"}"#).unwrap();
        assert!(matches!(msg, Envelope::Join { token: Some(t), .. } if t == "abc"));
    }

    #[test]
    fn test_join_missing_key_defaults_to_empty() {
        let msg: Envelope = serde_json::from_str(r#"{"kind":"join"}"#).unwrap();
        assert!(matches!(msg, Envelope::Join { key, .. } if key.is_empty()));
    }

    #[test]
    fn test_add_accepts_number_and_double_zero() {
        let msg: Envelope = serde_json::from_str(r#"{"kind":"add","number":17}"#).unwrap();
        assert!(matches!(
            msg,
            Envelope::Add {
                number: SpinValue::Number(17),
                ..
            }
        ));

        let msg: Envelope = serde_json::from_str(r#"{"kind":"add","number":"00"}"#).unwrap();
        assert!(matches!(msg, Envelope::Add { number: SpinValue::Text(s), .. } if s == "00"));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let result = serde_json::from_str::<Envelope>(r#"{"kind":"shout","text":"hi"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_kind_is_rejected() {
        let result = serde_json::from_str::<Envelope>(r#"{"key":"room42"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_sync_serialization_shape() {
        let msg = Envelope::Sync {
            key: "room42".to_string(),
            history: vec![
                SpinValue::Number(3),
                SpinValue::Text("00".to_string()),
                SpinValue::Number(17),
            ],
            full: true,
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "sync");
        assert_eq!(json["history"], serde_json::json!([3, "00", 17]));
        assert_eq!(json["full"], true);
    }

    #[test]
    fn test_auth_required_wire_tag() {
        let msg = Envelope::AuthRequired {
            key: Some("room42".to_string()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""kind":"authRequired""#));
    }

    #[test]
    fn test_add_broadcast_carries_version() {
        let msg = Envelope::Add {
            key: Some("room42".to_string()),
            number: SpinValue::Number(5),
            version: Some(4),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["version"], 4);
    }

    #[test]
    fn test_spin_value_validation() {
        assert!(SpinValue::Number(0).is_valid());
        assert!(SpinValue::Number(36).is_valid());
        assert!(SpinValue::Text("00".to_string()).is_valid());

        assert!(!SpinValue::Number(-1).is_valid());
        assert!(!SpinValue::Number(37).is_valid());
        assert!(!SpinValue::Text("0".to_string()).is_valid());
        assert!(!SpinValue::Text("red".to_string()).is_valid());
    }

    #[test]
    fn test_optional_fields_omitted_on_wire() {
        let msg = Envelope::Add {
            key: None,
            number: SpinValue::Number(9),
            version: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("key"));
        assert!(!json.contains("version"));
    }
}

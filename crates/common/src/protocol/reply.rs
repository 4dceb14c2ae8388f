use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{CLOSE_PAYLOAD_KEY, TERMINAL_SCREEN};

/// What a handler sends back, before encryption.
///
/// `screen` is absent on liveness replies. `data` is omitted from the wire form
/// when null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolReply {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl ProtocolReply {
    pub fn new(version: impl Into<String>, screen: impl Into<String>, data: Value) -> Self {
        Self {
            version: version.into(),
            screen: Some(screen.into()),
            data,
        }
    }

    /// Move the user to `screen`, populating it with `data`
    pub fn navigate(version: impl Into<String>, screen: impl Into<String>, data: Value) -> Self {
        Self::new(version, screen, data)
    }

    /// Stay on (or return to) `screen` with fresh data
    pub fn success(version: impl Into<String>, screen: impl Into<String>, data: Value) -> Self {
        Self::new(version, screen, data)
    }

    /// Report a business error on `screen` without ending the exchange
    pub fn error(
        version: impl Into<String>,
        screen: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            version,
            screen,
            json!({
                "error": true,
                "error_message": message.into(),
            }),
        )
    }

    /// End the exchange, handing `params` back to the conversation
    pub fn close(version: impl Into<String>, params: Value) -> Self {
        let mut data = Map::new();
        data.insert(CLOSE_PAYLOAD_KEY.to_string(), json!({ "params": params }));
        Self::new(version, TERMINAL_SCREEN, Value::Object(data))
    }

    /// Fixed answer to the in-protocol liveness probe
    pub fn ping(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            screen: None,
            data: json!({"status": "active"}),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.screen.as_deref() == Some(TERMINAL_SCREEN)
    }

    /// The completion payload of a close reply, if this is one
    pub fn close_params(&self) -> Option<&Value> {
        self.data.get(CLOSE_PAYLOAD_KEY)?.get("params")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ping_wire_shape() {
        let reply = ProtocolReply::ping("3.0");
        let wire = serde_json::to_value(&reply).unwrap();
        assert_eq!(wire, json!({"version": "3.0", "data": {"status": "active"}}));
    }

    #[test]
    fn test_error_reply() {
        let reply = ProtocolReply::error("3.0", "FORM", "name is required");
        assert_eq!(reply.screen.as_deref(), Some("FORM"));
        assert_eq!(reply.data["error"], json!(true));
        assert_eq!(reply.data["error_message"], json!("name is required"));
        assert!(!reply.is_terminal());
    }

    #[test]
    fn test_close_reply() {
        let reply = ProtocolReply::close("3.0", json!({"order_id": 42}));
        assert!(reply.is_terminal());
        assert_eq!(reply.close_params(), Some(&json!({"order_id": 42})));

        let wire = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            wire["data"]["extension_message_response"]["params"]["order_id"],
            json!(42)
        );
    }

    #[test]
    fn test_empty_data_kept() {
        let reply = ProtocolReply::navigate("3.0", "SUCCESS", json!({}));
        let wire = serde_json::to_string(&reply).unwrap();
        assert_eq!(wire, r#"{"version":"3.0","screen":"SUCCESS","data":{}}"#);
    }
}

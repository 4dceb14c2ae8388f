use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A request after envelope decryption.
///
/// `flow_token` is opaque: it is handed to handlers untouched and never inspected
/// here. Liveness probes omit `screen`, `data` and `flow_token`, so all three
/// default to empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptedRequest {
    #[serde(default)]
    pub version: String,
    pub action: String,
    #[serde(default)]
    pub screen: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub flow_token: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl DecryptedRequest {
    pub fn new(version: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            action: action.into(),
            screen: String::new(),
            data: Map::new(),
            flow_token: String::new(),
        }
    }

    pub fn with_screen(mut self, screen: impl Into<String>) -> Self {
        self.screen = screen.into();
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_flow_token(mut self, flow_token: impl Into<String>) -> Self {
        self.flow_token = flow_token.into();
        self
    }

    /// Look up a submitted field by name
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_full_request_parses() {
        let raw = json!({
            "version": "3.0",
            "action": "data_exchange",
            "screen": "FORM",
            "data": {"name": "Ana"},
            "flow_token": "tok-1"
        });
        let request: DecryptedRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.action, "data_exchange");
        assert_eq!(request.screen, "FORM");
        assert_eq!(request.field("name"), Some(&json!("Ana")));
        assert_eq!(request.flow_token, "tok-1");
    }

    #[test]
    fn test_ping_request_defaults() {
        let request: DecryptedRequest =
            serde_json::from_str(r#"{"version":"3.0","action":"ping"}"#).unwrap();
        assert_eq!(request.screen, "");
        assert!(request.data.is_empty());
        assert_eq!(request.flow_token, "");
    }

    #[test]
    fn test_null_data_is_empty() {
        let request: DecryptedRequest =
            serde_json::from_str(r#"{"version":"3.0","action":"INIT","data":null}"#).unwrap();
        assert!(request.data.is_empty());
    }

    #[test]
    fn test_missing_action_rejected() {
        let result = serde_json::from_str::<DecryptedRequest>(r#"{"version":"3.0"}"#);
        assert!(result.is_err());
    }
}

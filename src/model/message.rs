use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CouchflowError, Result};

pub const PAYLOAD_KEY: &str = "payload";
pub const MSGID_KEY: &str = "_msgid";

/// A flow message: a JSON object with at least a `payload` field.
///
/// Nodes mutate the inbound message in place and forward it, so every field
/// set upstream travels through unchanged unless a node replaces it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Map<String, Value>);

impl Message {
    /// Create a message with a fresh `_msgid` and the given payload.
    pub fn new(payload: impl Into<Value>) -> Self {
        let mut fields = Map::new();
        fields.insert(MSGID_KEY.to_string(), Value::String(nanoid::nanoid!()));
        fields.insert(PAYLOAD_KEY.to_string(), payload.into());
        Self(fields)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(CouchflowError::Convert(format!("message must be an object, got {}", other))),
        }
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(s)?)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get(MSGID_KEY).and_then(Value::as_str)
    }

    pub fn payload(&self) -> Option<&Value> {
        self.0.get(PAYLOAD_KEY)
    }

    pub fn set_payload(
        &mut self,
        payload: impl Into<Value>,
    ) {
        self.0.insert(PAYLOAD_KEY.to_string(), payload.into());
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(
        &mut self,
        key: &str,
        value: impl Into<Value>,
    ) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(
        &mut self,
        key: &str,
    ) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The whole message as a JSON object value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Message> for Value {
    fn from(msg: Message) -> Self {
        Value::Object(msg.0)
    }
}

impl From<Map<String, Value>> for Message {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Message;

    #[test]
    fn test_new_sets_msgid_and_payload() {
        let msg = Message::new("hello");
        assert!(msg.id().is_some_and(|id| !id.is_empty()));
        assert_eq!(msg.payload(), Some(&json!("hello")));
    }

    #[test]
    fn test_from_value_requires_object() {
        assert!(Message::from_value(json!([1, 2])).is_err());
        let msg = Message::from_value(json!({"payload": 1, "topic": "t"})).unwrap();
        assert_eq!(msg.get("topic"), Some(&json!("t")));
    }

    #[test]
    fn test_set_and_remove() {
        let mut msg = Message::from_json(r#"{"payload": {}}"#).unwrap();
        msg.set("selector", json!({"a": 1}));
        msg.set_payload(json!(null));
        assert_eq!(msg.remove("selector"), Some(json!({"a": 1})));
        assert_eq!(msg.to_value(), json!({"payload": null}));
    }
}

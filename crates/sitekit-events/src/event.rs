//! Event value and wire codec

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::{EventError, Result},
    kind::EventKind,
};

/// A typed event with a transport-neutral payload.
///
/// Payloads are plain JSON maps so every event can be relayed without
/// carrying live handles.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Registered kind
    pub kind: EventKind,
    /// Free-form payload fields
    pub payload: Map<String, Value>,
}

/// On-the-wire shape: `{"type": "...", "payload": {...}}`.
#[derive(Serialize, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Map<String, Value>,
}

impl Event {
    /// Create an event with an empty payload.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            payload: Map::new(),
        }
    }

    /// Add a payload field, builder-style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Fetch a payload field as a string, if present.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Encode as a single relay line (no trailing newline).
    pub fn to_wire_line(&self) -> Result<String> {
        let wire = WireEvent {
            kind: self.kind.as_str().to_string(),
            payload: self.payload.clone(),
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Decode a relay line.
    ///
    /// Tags outside the closed registry yield [`EventError::UnknownKind`];
    /// callers at the relay boundary log and drop those.
    pub fn from_wire_line(line: &str) -> Result<Self> {
        let wire: WireEvent = serde_json::from_str(line)?;
        let kind = EventKind::parse(&wire.kind).ok_or(EventError::UnknownKind(wire.kind))?;
        Ok(Self {
            kind,
            payload: wire.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_round_trip() {
        let event = Event::new(EventKind::KitReady).with("url", "http://localhost:3000");
        let line = event.to_wire_line().unwrap();
        let back = Event::from_wire_line(&line).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.get_str("url"), Some("http://localhost:3000"));
    }

    #[test]
    fn test_unknown_kind_is_an_error_not_a_panic() {
        let err = Event::from_wire_line(r#"{"type":"telemetry-blip","payload":{}}"#).unwrap_err();
        assert!(matches!(err, EventError::UnknownKind(tag) if tag == "telemetry-blip"));
    }

    #[test]
    fn test_missing_payload_defaults_to_empty() {
        let event = Event::from_wire_line(r#"{"type":"reload-page"}"#).unwrap();
        assert_eq!(event.kind, EventKind::ReloadPage);
        assert!(event.payload.is_empty());
    }

    #[test]
    fn test_malformed_line_is_a_wire_error() {
        assert!(matches!(
            Event::from_wire_line("not json"),
            Err(EventError::Wire(_))
        ));
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// A field of an engine event that a subscription can select.
///
/// The set is closed: these are the fields the notification service exposes
/// on `engineEvents`. Each field knows the name it carries on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EngineEventField {
    ServiceName,
    ProcessDefinitionKey,
    EventType,
    EntityId,
    ProcessInstanceId,
}

impl EngineEventField {
    pub const ALL: [EngineEventField; 5] = [
        EngineEventField::ServiceName,
        EngineEventField::ProcessDefinitionKey,
        EngineEventField::EventType,
        EngineEventField::EntityId,
        EngineEventField::ProcessInstanceId,
    ];

    /// Returns the field name used in queries and data messages.
    pub fn wire_name(&self) -> &'static str {
        match self {
            EngineEventField::ServiceName => "serviceName",
            EngineEventField::ProcessDefinitionKey => "processDefinitionKey",
            EngineEventField::EventType => "eventType",
            EngineEventField::EntityId => "entityId",
            EngineEventField::ProcessInstanceId => "processInstanceId",
        }
    }

    /// Looks a field up by its wire name.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.wire_name() == name)
    }
}

impl fmt::Display for EngineEventField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A lifecycle notification emitted by the process engine.
///
/// Every field is optional: which ones are populated depends on the query
/// that produced the event. When used as an expectation, only the fields that
/// are present take part in matching (see [`satisfies`](Self::satisfies)).
///
/// # Example
///
/// ```rust
/// use enginewatch::EngineEvent;
///
/// let started = EngineEvent::new()
///     .service_name("rb")
///     .event_type("PROCESS_STARTED");
///
/// let pattern = EngineEvent::new().event_type("PROCESS_STARTED");
/// assert!(started.satisfies(&pattern));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_definition_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_instance_id: Option<String>,
}

impl EngineEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service_name(mut self, value: impl Into<String>) -> Self {
        self.service_name = Some(value.into());
        self
    }

    pub fn process_definition_key(mut self, value: impl Into<String>) -> Self {
        self.process_definition_key = Some(value.into());
        self
    }

    pub fn event_type(mut self, value: impl Into<String>) -> Self {
        self.event_type = Some(value.into());
        self
    }

    pub fn entity_id(mut self, value: impl Into<String>) -> Self {
        self.entity_id = Some(value.into());
        self
    }

    pub fn process_instance_id(mut self, value: impl Into<String>) -> Self {
        self.process_instance_id = Some(value.into());
        self
    }

    /// Returns the value of a single field.
    pub fn get(&self, field: EngineEventField) -> Option<&str> {
        match field {
            EngineEventField::ServiceName => self.service_name.as_deref(),
            EngineEventField::ProcessDefinitionKey => self.process_definition_key.as_deref(),
            EngineEventField::EventType => self.event_type.as_deref(),
            EngineEventField::EntityId => self.entity_id.as_deref(),
            EngineEventField::ProcessInstanceId => self.process_instance_id.as_deref(),
        }
    }

    /// Sets a single field.
    pub fn set(&mut self, field: EngineEventField, value: Option<String>) {
        let slot = match field {
            EngineEventField::ServiceName => &mut self.service_name,
            EngineEventField::ProcessDefinitionKey => &mut self.process_definition_key,
            EngineEventField::EventType => &mut self.event_type,
            EngineEventField::EntityId => &mut self.entity_id,
            EngineEventField::ProcessInstanceId => &mut self.process_instance_id,
        };
        *slot = value;
    }

    /// Returns true if every field present in `pattern` has the same value here.
    ///
    /// Fields absent from the pattern are ignored, so an empty pattern matches
    /// any event.
    pub fn satisfies(&self, pattern: &EngineEvent) -> bool {
        EngineEventField::ALL.iter().all(|field| match pattern.get(*field) {
            Some(expected) => self.get(*field) == Some(expected),
            None => true,
        })
    }

    /// Returns a copy holding only the given fields.
    pub fn project(&self, fields: &[EngineEventField]) -> EngineEvent {
        let mut projected = EngineEvent::new();
        for field in fields {
            projected.set(*field, self.get(*field).map(str::to_owned));
        }
        projected
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        let mut first = true;
        for field in EngineEventField::ALL {
            if let Some(value) = self.get(field) {
                if !first {
                    f.write_str(", ")?;
                }
                write!(f, "{}: {}", field.wire_name(), value)?;
                first = false;
            }
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal_received() -> EngineEvent {
        EngineEvent::new()
            .event_type("SIGNAL_RECEIVED")
            .entity_id("proc-123")
            .process_instance_id("proc-123")
            .process_definition_key("SignalCatchEventProcess")
    }

    #[test]
    fn pattern_matches_on_present_fields_only() {
        let event = signal_received();
        let pattern = EngineEvent::new()
            .event_type("SIGNAL_RECEIVED")
            .entity_id("proc-123");
        assert!(event.satisfies(&pattern));
        assert!(event.satisfies(&EngineEvent::new()));
    }

    #[test]
    fn pattern_rejects_differing_or_missing_values() {
        let event = signal_received();
        assert!(!event.satisfies(&EngineEvent::new().event_type("SIGNAL_SENT")));
        assert!(!event.satisfies(&EngineEvent::new().service_name("rb")));
    }

    #[test]
    fn wire_names_round_trip() {
        for field in EngineEventField::ALL {
            assert_eq!(EngineEventField::from_wire_name(field.wire_name()), Some(field));
        }
        assert_eq!(EngineEventField::from_wire_name("nope"), None);
    }

    #[test]
    fn project_keeps_selected_fields() {
        let projected = signal_received().project(&[EngineEventField::EventType]);
        assert_eq!(projected, EngineEvent::new().event_type("SIGNAL_RECEIVED"));
    }

    #[test]
    fn display_lists_present_fields() {
        let event = EngineEvent::new().service_name("rb").event_type("PROCESS_STARTED");
        assert_eq!(event.to_string(), "{serviceName: rb, eventType: PROCESS_STARTED}");
    }

    #[test]
    fn deserializes_camel_case_with_missing_fields() {
        let event: EngineEvent =
            serde_json::from_str(r#"{"serviceName":"rb","eventType":"PROCESS_STARTED"}"#)
                .expect("valid json");
        assert_eq!(event.service_name.as_deref(), Some("rb"));
        assert_eq!(event.entity_id, None);
    }
}

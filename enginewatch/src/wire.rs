//! Canonical data messages of the notification stream.
//!
//! The notification service wraps every batch of engine events into a
//! subscription data message:
//!
//! ```text
//! {"payload":{"data":{"engineEvents":[{"serviceName":"rb","eventType":"PROCESS_STARTED"}]}},"id":"1","type":"data"}
//! ```
//!
//! Event fields appear in the order of the query's selection set. Expected
//! messages are rendered with [`render`], the same function the in-memory
//! platform uses to produce them, so expectation and wire share one code path.

use serde::{Deserialize, Serialize, ser::SerializeMap};

use crate::{EngineEvent, Error, Result, SelectionSet};

/// Operation id the service assigns to the first subscription on a connection.
pub const MESSAGE_ID: &str = "1";

/// Message type of subscription data frames.
pub const DATA_TYPE: &str = "data";

#[derive(Serialize)]
struct DataMessage<'a> {
    payload: DataPayload<'a>,
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Serialize)]
struct DataPayload<'a> {
    data: EngineEventsData<'a>,
}

#[derive(Serialize)]
struct EngineEventsData<'a> {
    #[serde(rename = "engineEvents")]
    engine_events: Vec<Selected<'a>>,
}

struct Selected<'a> {
    event: &'a EngineEvent,
    selection: &'a SelectionSet,
}

impl Serialize for Selected<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.selection.len()))?;
        for field in self.selection.fields() {
            map.serialize_entry(field.wire_name(), &self.event.get(*field))?;
        }
        map.end()
    }
}

/// Renders events into the canonical data message for `selection`.
///
/// Fields are written in selection order; a selected field the event does
/// not carry is written as `null`, as the service does.
pub fn render(selection: &SelectionSet, events: &[EngineEvent]) -> Result<String> {
    let message = DataMessage {
        payload: DataPayload {
            data: EngineEventsData {
                engine_events: events
                    .iter()
                    .map(|event| Selected { event, selection })
                    .collect(),
            },
        },
        id: MESSAGE_ID,
        kind: DATA_TYPE,
    };
    Ok(serde_json::to_string(&message)?)
}

#[derive(Deserialize)]
struct IncomingMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<IncomingPayload>,
}

#[derive(Deserialize)]
struct IncomingPayload {
    #[serde(default)]
    data: Option<IncomingData>,
}

#[derive(Deserialize)]
struct IncomingData {
    #[serde(rename = "engineEvents", default)]
    engine_events: Vec<EngineEvent>,
}

/// Reads the engine events out of a data message.
///
/// # Errors
///
/// Returns [`Error::Wire`] if the text is not JSON, and
/// [`Error::MalformedMessage`] if it is not a data message.
pub fn parse(text: &str) -> Result<Vec<EngineEvent>> {
    let message: IncomingMessage = serde_json::from_str(text)?;
    if message.kind != DATA_TYPE {
        return Err(Error::MalformedMessage(format!(
            "expected a '{DATA_TYPE}' message, got '{}'",
            message.kind
        )));
    }
    message
        .payload
        .and_then(|p| p.data)
        .map(|d| d.engine_events)
        .ok_or_else(|| Error::MalformedMessage("data message without engineEvents".into()))
}

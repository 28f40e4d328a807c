use crate::{ExpectedMessage, wire};

/// How a received message is compared with an expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum Comparison {
    /// Exact text equality with the canonical rendering.
    ///
    /// Sensitive to field order: a stream produced for a query selecting
    /// `[eventType, serviceName]` does not match expectations rendered for
    /// `[serviceName, eventType]`.
    #[default]
    Literal,
    /// Parse the received message and compare the selected field values,
    /// event by event. Field order and whitespace do not matter.
    Structural,
}

impl Comparison {
    pub fn matches(&self, expected: &ExpectedMessage, received: &str) -> bool {
        match self {
            Comparison::Literal => expected.text() == received,
            Comparison::Structural => {
                let Ok(events) = wire::parse(received) else {
                    return false;
                };
                let fields = expected.selection().fields();
                events.len() == expected.events().len()
                    && events
                        .iter()
                        .zip(expected.events())
                        .all(|(got, want)| got.project(fields) == want.project(fields))
            }
        }
    }
}

use std::fmt;

use crate::{EngineEvent, Result, SelectionSet, wire};

/// A data message the stream is expected to deliver.
///
/// Rendered once, at construction, with the selection set of the query the
/// subscription was opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedMessage {
    selection: SelectionSet,
    events: Vec<EngineEvent>,
    text: String,
}

impl ExpectedMessage {
    pub fn new(
        selection: &SelectionSet,
        events: impl IntoIterator<Item = EngineEvent>,
    ) -> Result<Self> {
        let events: Vec<EngineEvent> = events.into_iter().collect();
        let text = wire::render(selection, &events)?;
        Ok(Self {
            selection: selection.clone(),
            events,
            text,
        })
    }

    /// The canonical wire text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }
}

impl fmt::Display for ExpectedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

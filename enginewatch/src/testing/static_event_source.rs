use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::{AuditQuery, EngineEvent, EventSource, TransportError, testing::lock};

type Response = Result<Vec<EngineEvent>, TransportError>;

#[derive(Debug, Default)]
struct Responses {
    pending: VecDeque<Response>,
    last: Option<Response>,
    queries: Vec<AuditQuery>,
}

/// An [`EventSource`] that answers polls from a scripted list.
///
/// Each fetch takes the next scripted response; once the list runs out the
/// last one repeats. With nothing scripted every fetch returns no events.
#[derive(Debug, Clone, Default)]
pub struct StaticEventSource {
    responses: Arc<Mutex<Responses>>,
}

impl StaticEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_return(self, events: Vec<EngineEvent>) -> Self {
        lock(&self.responses).pending.push_back(Ok(events));
        self
    }

    pub fn then_fail(self, error: TransportError) -> Self {
        lock(&self.responses).pending.push_back(Err(error));
        self
    }

    /// Queries received so far, one per fetch.
    pub fn queries(&self) -> Vec<AuditQuery> {
        lock(&self.responses).queries.clone()
    }
}

impl EventSource for StaticEventSource {
    async fn fetch_events(&self, query: &AuditQuery) -> Result<Vec<EngineEvent>, TransportError> {
        let mut responses = lock(&self.responses);
        responses.queries.push(query.clone());
        if let Some(next) = responses.pending.pop_front() {
            responses.last = Some(next);
        }
        responses.last.clone().unwrap_or_else(|| Ok(Vec::new()))
    }
}

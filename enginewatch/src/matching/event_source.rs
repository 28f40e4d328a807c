use std::future::Future;

use crate::{EngineEvent, TransportError};

/// Which recorded events to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuditQuery {
    pub entity_id: String,
    pub event_type: Option<String>,
}

impl AuditQuery {
    /// All events recorded for an entity.
    pub fn entity(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            event_type: None,
        }
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }
}

/// Queryable history of engine events, such as the audit service.
///
/// Called repeatedly by [`poll_until_found`](crate::poll_until_found).
/// Implementations may return the whole history each time; only membership
/// is checked.
pub trait EventSource: Send + Sync {
    fn fetch_events(
        &self,
        query: &AuditQuery,
    ) -> impl Future<Output = Result<Vec<EngineEvent>, TransportError>> + Send;
}

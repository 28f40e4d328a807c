use std::fmt::{self, Write};

use serde_json::{Map, Value, json};

use crate::EngineEventField;

/// The ordered list of fields a subscription asks for.
///
/// Order matters: the notification service emits fields in the order they
/// were selected, and literal comparison of data messages depends on it.
/// Duplicates are dropped, keeping the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectionSet(Vec<EngineEventField>);

impl SelectionSet {
    pub fn new(fields: impl IntoIterator<Item = EngineEventField>) -> Self {
        let mut selected = Vec::new();
        for field in fields {
            if !selected.contains(&field) {
                selected.push(field);
            }
        }
        Self(selected)
    }

    pub fn fields(&self) -> &[EngineEventField] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for SelectionSet {
    fn default() -> Self {
        SelectionSet::new([EngineEventField::ServiceName, EngineEventField::EventType])
    }
}

/// A request for a live `engineEvents` subscription.
///
/// Builds the GraphQL subscription document and its variables from the
/// selection set and filters, and carries the bearer token the transport
/// authenticates with.
///
/// # Example
///
/// ```rust
/// use enginewatch::{EngineEventField, SelectionSet, SubscriptionRequest};
///
/// let request = SubscriptionRequest::engine_events("rb", ["PROCESS_STARTED", "PROCESS_COMPLETED"])
///     .with_selection(SelectionSet::new([EngineEventField::ServiceName, EngineEventField::EventType]))
///     .with_bearer_token("token");
///
/// assert!(request.query().contains("engineEvents(serviceName: [$serviceName], eventType: $eventTypes)"));
/// ```
#[derive(Clone)]
pub struct SubscriptionRequest {
    service_name: String,
    event_types: Vec<String>,
    process_definition_key: Option<String>,
    selection: SelectionSet,
    bearer_token: String,
}

impl SubscriptionRequest {
    pub fn engine_events<I, S>(service_name: impl Into<String>, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            service_name: service_name.into(),
            event_types: event_types.into_iter().map(Into::into).collect(),
            process_definition_key: None,
            selection: SelectionSet::default(),
            bearer_token: String::new(),
        }
    }

    pub fn with_selection(mut self, selection: SelectionSet) -> Self {
        self.selection = selection;
        self
    }

    /// Restrict the subscription to one process definition.
    pub fn with_process_definition_key(mut self, key: impl Into<String>) -> Self {
        self.process_definition_key = Some(key.into());
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = token.into();
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn event_types(&self) -> &[String] {
        &self.event_types
    }

    pub fn process_definition_key(&self) -> Option<&str> {
        self.process_definition_key.as_deref()
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }

    /// Renders the GraphQL subscription document.
    pub fn query(&self) -> String {
        let mut params = String::from("$serviceName: String!, $eventTypes: [EngineEventType!]");
        let mut args = String::from("serviceName: [$serviceName], eventType: $eventTypes");
        if self.process_definition_key.is_some() {
            params.push_str(", $processDefinitionKey: String!");
            args.push_str(", processDefinitionKey: [$processDefinitionKey]");
        }

        let mut query = String::new();
        // Writing to a String cannot fail.
        let _ = writeln!(query, "subscription({params}) {{");
        let _ = writeln!(query, "  engineEvents({args}) {{");
        for field in self.selection.fields() {
            let _ = writeln!(query, "    {}", field.wire_name());
        }
        query.push_str("  }\n}");
        query
    }

    /// Returns the variables sent alongside the query.
    pub fn variables(&self) -> Map<String, Value> {
        let mut variables = Map::new();
        variables.insert("serviceName".into(), json!(self.service_name));
        variables.insert("eventTypes".into(), json!(self.event_types));
        if let Some(key) = &self.process_definition_key {
            variables.insert("processDefinitionKey".into(), json!(key));
        }
        variables
    }
}

impl fmt::Debug for SubscriptionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRequest")
            .field("service_name", &self.service_name)
            .field("event_types", &self.event_types)
            .field("process_definition_key", &self.process_definition_key)
            .field("selection", &self.selection)
            .field("bearer_token", &"<redacted>")
            .finish()
    }
}

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex},
};

use futures_util::StreamExt;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    AuditQuery, EngineEvent, EventSource, Frame, OpenedStream, ProcessInstance, ProcessQuery,
    ProcessRuntime, ProcessStatus, ReceiveMessage, StartMessage, SubscriptionRequest, Transport,
    TransportError, VariableInstance, Variables, testing::lock, wire,
};

/// What a deployed process does when it runs.
///
/// A bare definition completes as soon as it starts. A definition can be
/// started by a message, wait for a message or a signal before completing,
/// and throw a signal when it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDefinition {
    key: String,
    start_message: Option<String>,
    waits_for: Option<Wait>,
    throws_signal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Wait {
    Message(String),
    Signal(String),
}

impl ProcessDefinition {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            start_message: None,
            waits_for: None,
            throws_signal: None,
        }
    }

    pub fn started_by_message(mut self, name: impl Into<String>) -> Self {
        self.start_message = Some(name.into());
        self
    }

    pub fn waiting_for_message(mut self, name: impl Into<String>) -> Self {
        self.waits_for = Some(Wait::Message(name.into()));
        self
    }

    pub fn waiting_for_signal(mut self, name: impl Into<String>) -> Self {
        self.waits_for = Some(Wait::Signal(name.into()));
        self
    }

    pub fn throwing_signal(mut self, name: impl Into<String>) -> Self {
        self.throws_signal = Some(name.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

struct Instance {
    record: ProcessInstance,
    variables: Variables,
}

struct Subscriber {
    id: u64,
    request: SubscriptionRequest,
    sender: UnboundedSender<Result<Frame, TransportError>>,
}

#[derive(Default)]
struct Platform {
    service_name: String,
    definitions: BTreeMap<String, ProcessDefinition>,
    instances: BTreeMap<String, Instance>,
    audit: Vec<EngineEvent>,
    subscribers: Vec<Subscriber>,
    last_id: u64,
    silent: bool,
    open_failure: Option<TransportError>,
    cancel_calls: usize,
}

impl Platform {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn event(&self, instance: &ProcessInstance, event_type: &str) -> EngineEvent {
        EngineEvent::new()
            .service_name(self.service_name.clone())
            .process_definition_key(instance.process_definition_key.clone())
            .event_type(event_type)
            .entity_id(instance.id.clone())
            .process_instance_id(instance.id.clone())
    }

    /// Record in the audit history and push to every interested subscriber.
    fn publish(&mut self, event: EngineEvent) {
        self.subscribers.retain(|subscriber| {
            if !wants(&subscriber.request, &event) {
                return true;
            }
            match wire::render(subscriber.request.selection(), std::slice::from_ref(&event)) {
                Ok(message) => subscriber.sender.send(Ok(Frame::Data(message))).is_ok(),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to render engine event");
                    true
                }
            }
        });
        self.audit.push(event);
    }

    fn start(
        &mut self,
        definition: ProcessDefinition,
        business_key: Option<String>,
        variables: &Variables,
    ) -> ProcessInstance {
        let id = format!("proc-{}", self.next_id());
        let mut record = ProcessInstance {
            id: id.clone(),
            process_definition_key: definition.key.clone(),
            business_key,
            status: ProcessStatus::Created,
        };
        self.publish(self.event(&record, "PROCESS_CREATED"));
        record.status = ProcessStatus::Running;
        self.publish(self.event(&record, "PROCESS_STARTED"));
        for name in variables.keys() {
            let event = self.event(&record, "VARIABLE_CREATED").entity_id(name.clone());
            self.publish(event);
        }

        if let Some(signal) = &definition.throws_signal {
            let event = self.event(&record, "SIGNAL_SENT").entity_id(signal.clone());
            self.publish(event);
            self.deliver_signal(signal);
        }

        match &definition.waits_for {
            Some(Wait::Message(name)) => {
                let event = self.event(&record, "MESSAGE_WAITING").entity_id(name.clone());
                self.publish(event);
            }
            Some(Wait::Signal(_)) => {}
            None => {
                record.status = ProcessStatus::Completed;
                self.publish(self.event(&record, "PROCESS_COMPLETED"));
            }
        }

        self.instances.insert(
            id,
            Instance {
                record: record.clone(),
                variables: variables.clone(),
            },
        );
        record
    }

    fn waiting_for(&self, wait: &Wait) -> Vec<String> {
        self.instances
            .values()
            .filter(|instance| instance.record.status == ProcessStatus::Running)
            .filter(|instance| {
                self.definitions
                    .get(&instance.record.process_definition_key)
                    .is_some_and(|d| d.waits_for.as_ref() == Some(wait))
            })
            .map(|instance| instance.record.id.clone())
            .collect()
    }

    fn deliver_signal(&mut self, signal: &str) {
        for id in self.waiting_for(&Wait::Signal(signal.to_owned())) {
            self.resume(&id, "SIGNAL_RECEIVED", signal);
        }
    }

    /// Complete a waiting instance after the event it waited for.
    fn resume(&mut self, id: &str, event_type: &str, entity: &str) {
        let Some(instance) = self.instances.get_mut(id) else {
            return;
        };
        instance.record.status = ProcessStatus::Completed;
        let record = instance.record.clone();
        let event = self.event(&record, event_type).entity_id(entity.to_owned());
        self.publish(event);
        self.publish(self.event(&record, "PROCESS_COMPLETED"));
    }
}

fn wants(request: &SubscriptionRequest, event: &EngineEvent) -> bool {
    let service = event.service_name.as_deref() == Some(request.service_name());
    let event_type = request.event_types().is_empty()
        || event
            .event_type
            .as_deref()
            .is_some_and(|t| request.event_types().iter().any(|wanted| wanted == t));
    let definition = request
        .process_definition_key()
        .is_none_or(|key| event.process_definition_key.as_deref() == Some(key));
    service && event_type && definition
}

/// An in-memory process platform.
///
/// Acts as the notification [`Transport`], the [`ProcessRuntime`], the
/// [`ProcessQuery`] service and the audit [`EventSource`] at once. Engine
/// events produced by a trigger are pushed to matching subscriptions in the
/// order they occur, one data message per event, rendered for each
/// subscription's selection set. Streams are acknowledged as soon as they
/// open. Clones share the same platform.
#[derive(Clone)]
pub struct InMemoryPlatform {
    platform: Arc<Mutex<Platform>>,
}

impl InMemoryPlatform {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            platform: Arc::new(Mutex::new(Platform {
                service_name: service_name.into(),
                ..Platform::default()
            })),
        }
    }

    pub fn with_definition(self, definition: ProcessDefinition) -> Self {
        self.deploy(definition);
        self
    }

    pub fn deploy(&self, definition: ProcessDefinition) {
        lock(&self.platform)
            .definitions
            .insert(definition.key.clone(), definition);
    }

    /// Open streams without acknowledging them; they confirm on the first
    /// data message instead.
    pub fn without_ack(self) -> Self {
        lock(&self.platform).silent = true;
        self
    }

    /// Make the next stream open fail with `error`.
    pub fn fail_next_open(&self, error: TransportError) {
        lock(&self.platform).open_failure = Some(error);
    }

    /// Publish an arbitrary event as if the engine emitted it.
    pub fn emit(&self, event: EngineEvent) {
        lock(&self.platform).publish(event);
    }

    pub fn service_name(&self) -> String {
        lock(&self.platform).service_name.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.platform).subscribers.len()
    }

    pub fn cancel_count(&self) -> usize {
        lock(&self.platform).cancel_calls
    }

    /// The whole audit history, in emission order.
    pub fn audit_events(&self) -> Vec<EngineEvent> {
        lock(&self.platform).audit.clone()
    }
}

impl Transport for InMemoryPlatform {
    async fn open_stream(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<OpenedStream, TransportError> {
        let (sender, receiver) = unbounded_channel();
        let id = {
            let mut platform = lock(&self.platform);
            if let Some(e) = platform.open_failure.take() {
                return Err(e);
            }
            if !platform.silent {
                let _ = sender.send(Ok(Frame::Ack));
            }
            let id = platform.next_id();
            platform.subscribers.push(Subscriber {
                id,
                request: request.clone(),
                sender,
            });
            id
        };

        let platform = self.platform.clone();
        Ok(OpenedStream::new(
            UnboundedReceiverStream::new(receiver).boxed(),
            move || {
                let mut platform = lock(&platform);
                platform.cancel_calls += 1;
                platform.subscribers.retain(|s| s.id != id);
                Ok(())
            },
        ))
    }
}

impl ProcessRuntime for InMemoryPlatform {
    async fn start_process(
        &self,
        process_definition_key: &str,
        variables: &Variables,
    ) -> Result<ProcessInstance, TransportError> {
        let mut platform = lock(&self.platform);
        let definition = platform
            .definitions
            .get(process_definition_key)
            .cloned()
            .ok_or_else(|| {
                TransportError::Rejected(format!(
                    "unknown process definition '{process_definition_key}'"
                ))
            })?;
        Ok(platform.start(definition, None, variables))
    }

    async fn start_message(&self, message: &StartMessage) -> Result<ProcessInstance, TransportError> {
        let mut platform = lock(&self.platform);
        let definition = platform
            .definitions
            .values()
            .find(|d| d.start_message.as_deref() == Some(message.name.as_str()))
            .cloned()
            .ok_or_else(|| {
                TransportError::Rejected(format!("no process starts on message '{}'", message.name))
            })?;
        Ok(platform.start(definition, message.business_key.clone(), &Variables::new()))
    }

    async fn receive_message(&self, message: &ReceiveMessage) -> Result<(), TransportError> {
        let mut platform = lock(&self.platform);
        let correlated = platform
            .waiting_for(&Wait::Message(message.name.clone()))
            .into_iter()
            .find(|id| {
                message.correlation_key.is_none()
                    || platform.instances.get(id).and_then(|i| i.record.business_key.as_ref())
                        == message.correlation_key.as_ref()
            })
            .ok_or_else(|| {
                TransportError::Rejected(format!(
                    "no process waiting for message '{}'",
                    message.name
                ))
            })?;
        platform.resume(&correlated, "MESSAGE_RECEIVED", &message.name);
        Ok(())
    }

    async fn set_variables(
        &self,
        process_instance_id: &str,
        variables: &Variables,
    ) -> Result<(), TransportError> {
        let mut platform = lock(&self.platform);
        let instance = platform
            .instances
            .get_mut(process_instance_id)
            .ok_or_else(|| unknown_instance(process_instance_id))?;
        let record = instance.record.clone();
        let mut changes = Vec::new();
        for (name, value) in variables {
            let event_type = match instance.variables.insert(name.clone(), value.clone()) {
                Some(_) => "VARIABLE_UPDATED",
                None => "VARIABLE_CREATED",
            };
            changes.push((event_type, name.clone()));
        }
        for (event_type, name) in changes {
            let event = platform.event(&record, event_type).entity_id(name);
            platform.publish(event);
        }
        Ok(())
    }
}

impl ProcessQuery for InMemoryPlatform {
    async fn process_instance(&self, id: &str) -> Result<ProcessInstance, TransportError> {
        lock(&self.platform)
            .instances
            .get(id)
            .map(|instance| instance.record.clone())
            .ok_or_else(|| unknown_instance(id))
    }

    async fn process_instances_by_definition_key(
        &self,
        process_definition_key: &str,
    ) -> Result<Vec<ProcessInstance>, TransportError> {
        Ok(lock(&self.platform)
            .instances
            .values()
            .filter(|instance| instance.record.process_definition_key == process_definition_key)
            .map(|instance| instance.record.clone())
            .collect())
    }

    async fn variables(
        &self,
        process_instance_id: &str,
    ) -> Result<Vec<VariableInstance>, TransportError> {
        lock(&self.platform)
            .instances
            .get(process_instance_id)
            .map(|instance| {
                instance
                    .variables
                    .iter()
                    .map(|(name, value)| VariableInstance::new(name.clone(), value.clone()))
                    .collect()
            })
            .ok_or_else(|| unknown_instance(process_instance_id))
    }
}

impl EventSource for InMemoryPlatform {
    async fn fetch_events(&self, query: &AuditQuery) -> Result<Vec<EngineEvent>, TransportError> {
        let entity = Some(query.entity_id.as_str());
        Ok(lock(&self.platform)
            .audit
            .iter()
            .filter(|e| e.entity_id.as_deref() == entity || e.process_instance_id.as_deref() == entity)
            .filter(|e| {
                query
                    .event_type
                    .as_deref()
                    .is_none_or(|t| e.event_type.as_deref() == Some(t))
            })
            .cloned()
            .collect())
    }
}

fn unknown_instance(id: &str) -> TransportError {
    TransportError::Rejected(format!("unknown process instance '{id}'"))
}

impl fmt::Debug for InMemoryPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let platform = lock(&self.platform);
        f.debug_struct("InMemoryPlatform")
            .field("service_name", &platform.service_name)
            .field("definitions", &platform.definitions.len())
            .field("instances", &platform.instances.len())
            .field("audit", &platform.audit.len())
            .field("subscribers", &platform.subscribers.len())
            .finish()
    }
}

//! Collaborators that make the platform emit events.
//!
//! Triggers are plain request/response calls. The harness only decides when
//! they run: a trigger that the stream is meant to observe goes through
//! [`Subscription::trigger`](crate::Subscription::trigger), so it fires only
//! after the subscription is confirmed and released.

use std::{fmt, future::Future};

use crate::{TransportError, VariableInstance, Variables};

/// Status of a process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStatus {
    Created,
    Running,
    Suspended,
    Cancelled,
    Completed,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessStatus::Created => "CREATED",
            ProcessStatus::Running => "RUNNING",
            ProcessStatus::Suspended => "SUSPENDED",
            ProcessStatus::Cancelled => "CANCELLED",
            ProcessStatus::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInstance {
    pub id: String,
    pub process_definition_key: String,
    pub business_key: Option<String>,
    pub status: ProcessStatus,
}

/// A message that starts a process, correlated by business key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartMessage {
    pub name: String,
    pub business_key: Option<String>,
}

impl StartMessage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            business_key: None,
        }
    }

    pub fn with_business_key(mut self, key: impl Into<String>) -> Self {
        self.business_key = Some(key.into());
        self
    }
}

/// A message delivered to a waiting process, correlated by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveMessage {
    pub name: String,
    pub correlation_key: Option<String>,
}

impl ReceiveMessage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            correlation_key: None,
        }
    }

    pub fn with_correlation_key(mut self, key: impl Into<String>) -> Self {
        self.correlation_key = Some(key.into());
        self
    }
}

/// Runtime side of the platform: starts processes and delivers messages.
///
/// Methods return futures but can be implemented as `async fn` directly.
pub trait ProcessRuntime: Send + Sync {
    fn start_process(
        &self,
        process_definition_key: &str,
        variables: &Variables,
    ) -> impl Future<Output = Result<ProcessInstance, TransportError>> + Send;

    fn start_message(
        &self,
        message: &StartMessage,
    ) -> impl Future<Output = Result<ProcessInstance, TransportError>> + Send;

    fn receive_message(
        &self,
        message: &ReceiveMessage,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn set_variables(
        &self,
        process_instance_id: &str,
        variables: &Variables,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Query side of the platform.
pub trait ProcessQuery: Send + Sync {
    fn process_instance(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ProcessInstance, TransportError>> + Send;

    fn process_instances_by_definition_key(
        &self,
        process_definition_key: &str,
    ) -> impl Future<Output = Result<Vec<ProcessInstance>, TransportError>> + Send;

    fn variables(
        &self,
        process_instance_id: &str,
    ) -> impl Future<Output = Result<Vec<VariableInstance>, TransportError>> + Send;
}

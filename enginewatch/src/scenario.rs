//! Per-scenario state for notification stories.
//!
//! A [`ScenarioContext`] carries everything one scenario's steps share: the
//! timeouts, named values generated along the way, the current subscription
//! with its verifier and the messages it is expected to deliver, the current
//! process instance and a recorded process count. Steps run one after another
//! against `&mut ScenarioContext`; nothing is shared between scenarios.
//!
//! Dropping the context cancels its subscription.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use uuid::Uuid;

use crate::{
    AuditQuery, EngineEvent, Error, EventSource, ExpectedMessage, MatchReport, PollReport,
    ProcessInstance, ProcessQuery, ProcessRuntime, ProcessStatus, ReceiveMessage, Result,
    SelectionSet, StartMessage, StreamVerifier, Subscription, SubscriptionController,
    SubscriptionRequest, Transport, VariableKind, VariableValue, Variables, WatchConfig,
    poll_until_found,
};

/// Default budget for confirmation and verification, in seconds.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 6;

/// Default grace period after confirmation, in seconds.
pub const DEFAULT_SUBSCRIPTION_TIMEOUT_SECS: u64 = 3;

/// The platform services a scenario drives: runtime, query and audit.
pub trait Platform: ProcessRuntime + ProcessQuery + EventSource {}

impl<P: ProcessRuntime + ProcessQuery + EventSource> Platform for P {}

/// Typed state shared by the steps of one scenario.
pub struct ScenarioContext<T: Transport, P: Platform> {
    transport: Arc<T>,
    platform: Arc<P>,
    config: WatchConfig,
    service_name: String,
    bearer_token: String,
    selection: SelectionSet,
    session_timeout: Duration,
    subscription_timeout: Duration,
    values: HashMap<String, String>,
    subscription: Option<Subscription>,
    verifier: Option<StreamVerifier>,
    expected: Vec<ExpectedMessage>,
    process_instance: Option<ProcessInstance>,
    process_count: Option<usize>,
}

impl<T: Transport, P: Platform> ScenarioContext<T, P> {
    pub fn new(transport: Arc<T>, platform: Arc<P>, service_name: impl Into<String>) -> Self {
        Self {
            transport,
            platform,
            config: WatchConfig::default(),
            service_name: service_name.into(),
            bearer_token: String::new(),
            selection: SelectionSet::default(),
            session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
            subscription_timeout: Duration::from_secs(DEFAULT_SUBSCRIPTION_TIMEOUT_SECS),
            values: HashMap::new(),
            subscription: None,
            verifier: None,
            expected: Vec::new(),
            process_instance: None,
            process_count: None,
        }
    }

    /// Base configuration; the scenario timeouts override its budgets.
    pub fn with_config(mut self, config: WatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = token.into();
        self
    }

    pub fn with_selection(mut self, selection: SelectionSet) -> Self {
        self.selection = selection;
        self
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    pub fn subscription_timeout(&self) -> Duration {
        self.subscription_timeout
    }

    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    pub fn process_instance(&self) -> Option<&ProcessInstance> {
        self.process_instance.as_ref()
    }

    /// Number of expected messages queued and not yet verified.
    pub fn pending_expectations(&self) -> usize {
        self.expected.len()
    }

    /// Budget for confirmation and verification. Negative values count as zero.
    pub fn set_session_timeout(&mut self, seconds: i64) {
        self.session_timeout = seconds_or_zero(seconds);
    }

    /// Grace period between confirmation and trigger release. Negative values
    /// count as zero.
    pub fn set_subscription_timeout(&mut self, seconds: i64) {
        self.subscription_timeout = seconds_or_zero(seconds);
    }

    /// Store a fresh random value under `name` and return it.
    pub fn generate_value(&mut self, name: &str) -> &str {
        let value = Uuid::new_v4().to_string();
        self.values.insert(name.to_owned(), value);
        &self.values[name]
    }

    pub fn value(&self, name: &str) -> Result<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownValue(name.to_owned()))
    }

    /// Subscribe to a comma-separated list of event types and wait until the
    /// subscription is confirmed and released.
    ///
    /// Replaces (and cancels) any previous subscription.
    pub async fn subscribe_to(&mut self, event_types: &str) -> Result {
        self.drop_subscription();

        let config = self
            .config
            .clone()
            .with_grace_period(self.subscription_timeout)
            .with_confirmation_timeout(self.session_timeout)
            .with_match_timeout(self.session_timeout);
        let controller = SubscriptionController::from_shared(self.transport.clone(), config);

        let request = SubscriptionRequest::engine_events(&self.service_name, split(event_types))
            .with_selection(self.selection.clone())
            .with_bearer_token(&self.bearer_token);
        let subscription = controller.subscribe(request);
        subscription.confirm().await?;

        self.verifier = Some(subscription.verifier());
        self.subscription = Some(subscription);
        Ok(())
    }

    pub async fn start_process(&mut self, process_definition_key: &str) -> Result<&ProcessInstance> {
        self.start_process_with(process_definition_key, Variables::new())
            .await
    }

    pub async fn start_process_with(
        &mut self,
        process_definition_key: &str,
        variables: Variables,
    ) -> Result<&ProcessInstance> {
        let platform = self.platform.clone();
        let instance = self
            .fire(|| async move {
                platform
                    .start_process(process_definition_key, &variables)
                    .await
            })
            .await?;
        Ok(self.process_instance.insert(instance))
    }

    /// Start a process by message, using the named value as business key.
    pub async fn send_start_message(
        &mut self,
        message_name: &str,
        business_key_value: &str,
    ) -> Result<&ProcessInstance> {
        let message =
            StartMessage::new(message_name).with_business_key(self.value(business_key_value)?);
        let platform = self.platform.clone();
        let instance = self
            .fire(|| async move { platform.start_message(&message).await })
            .await?;
        Ok(self.process_instance.insert(instance))
    }

    /// Deliver a message, using the named value as correlation key.
    pub async fn send_message(&mut self, message_name: &str, correlation_key_value: &str) -> Result {
        let message = ReceiveMessage::new(message_name)
            .with_correlation_key(self.value(correlation_key_value)?);
        let platform = self.platform.clone();
        self.fire(|| async move { platform.receive_message(&message).await })
            .await
    }

    /// Create or overwrite variables on the current process instance.
    pub async fn set_variables(&mut self, variables: Variables) -> Result {
        let instance_id = self
            .process_instance
            .as_ref()
            .ok_or(Error::MissingContext("process instance"))?
            .id
            .clone();
        let platform = self.platform.clone();
        self.fire(|| async move { platform.set_variables(&instance_id, &variables).await })
            .await
    }

    /// Runs a trigger, gated on the current subscription when there is one.
    async fn fire<F, Fut, R>(&self, action: F) -> Result<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<R, crate::TransportError>>,
    {
        match &self.subscription {
            Some(subscription) => subscription.trigger_when_ready(action).await,
            None => action().await.map_err(Error::trigger),
        }
    }

    /// Queue one expected data message carrying the comma-separated event
    /// types, in order.
    pub fn expect_payload(&mut self, event_types: &str) -> Result {
        let events = split(event_types).map(|event_type| {
            EngineEvent::new()
                .service_name(&self.service_name)
                .event_type(event_type)
        });
        let message = ExpectedMessage::new(&self.selection, events)?;
        self.expected.push(message);
        Ok(())
    }

    /// Verify the queued messages arrived in order and the stream then
    /// completed, within the session timeout.
    pub async fn verify_all_notifications(&mut self) -> Result<MatchReport> {
        let verifier = self
            .verifier
            .as_mut()
            .ok_or(Error::MissingContext("subscription"))?;
        let expected = std::mem::take(&mut self.expected);
        verifier
            .expect_next(expected)
            .then_complete()
            .within(self.session_timeout)
            .await
    }

    /// Cancel the current subscription.
    pub fn complete_subscription(&mut self) -> Result {
        let subscription = self
            .subscription
            .as_ref()
            .ok_or(Error::MissingContext("subscription"))?;
        subscription.cancel();
        Ok(())
    }

    /// Check the current process instance completed. Cancels the
    /// subscription if it did not.
    pub async fn verify_process_completed(&mut self) -> Result {
        let outcome = self.check_process_completed().await;
        if outcome.is_err() {
            if let Some(subscription) = &self.subscription {
                subscription.cancel();
            }
        }
        outcome
    }

    async fn check_process_completed(&self) -> Result {
        let instance = self
            .process_instance
            .as_ref()
            .ok_or(Error::MissingContext("process instance"))?;
        let current = self.platform.process_instance(&instance.id).await?;
        if current.status != ProcessStatus::Completed {
            return Err(Error::ProcessStatus {
                id: current.id,
                expected: ProcessStatus::Completed.to_string(),
                found: current.status.to_string(),
            });
        }
        Ok(())
    }

    /// Poll the audit history of the current process instance until an
    /// event of `event_type` shows up.
    ///
    /// The target entity defaults to the process instance itself. Negative
    /// timeouts count as zero.
    pub async fn expect_audit_event(
        &self,
        event_type: &str,
        entity_id: Option<&str>,
        timeout_seconds: i64,
    ) -> Result<PollReport> {
        let instance = self
            .process_instance
            .as_ref()
            .ok_or(Error::MissingContext("process instance"))?;
        let target = EngineEvent::new()
            .event_type(event_type)
            .entity_id(entity_id.unwrap_or(instance.id.as_str()))
            .process_instance_id(&instance.id);
        let query = AuditQuery::entity(&instance.id).with_event_type(event_type);

        poll_until_found(self.platform.as_ref(), query, target)
            .every(self.config.poll_interval())
            .within(seconds_or_zero(timeout_seconds))
            .await
    }

    /// Check variables of the current process instance by name, kind and
    /// value. Kinds use the platform names (`"string"`, `"integer"`, ...).
    pub async fn verify_variables(&self, expected: &[(&str, &str, &str)]) -> Result {
        let instance = self
            .process_instance
            .as_ref()
            .ok_or(Error::MissingContext("process instance"))?;
        let actual = self.platform.variables(&instance.id).await?;

        for (name, kind, value) in expected {
            let kind: VariableKind = kind.parse()?;
            let want = VariableValue::parse(kind, value)?;
            let found = actual.iter().find(|variable| variable.name == *name);
            match found {
                Some(variable) if variable.value == want => {}
                Some(variable) => {
                    return Err(Error::VariableMismatch {
                        name: (*name).to_owned(),
                        expected: format!("{kind} {want}"),
                        found: format!("{} {}", variable.kind(), variable.value),
                    });
                }
                None => {
                    return Err(Error::VariableMismatch {
                        name: (*name).to_owned(),
                        expected: format!("{kind} {want}"),
                        found: "nothing".into(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Remember how many instances of a process definition exist now.
    pub async fn record_process_count(&mut self, process_definition_key: &str) -> Result<usize> {
        let count = self.count_processes(process_definition_key).await?;
        self.process_count = Some(count);
        Ok(count)
    }

    /// Check the instance count grew since it was last recorded, and record
    /// the new count.
    pub async fn verify_process_count_increased(
        &mut self,
        process_definition_key: &str,
    ) -> Result<usize> {
        let before = self
            .process_count
            .ok_or(Error::MissingContext("recorded process count"))?;
        let after = self.count_processes(process_definition_key).await?;
        if after <= before {
            return Err(Error::ProcessCountUnchanged {
                key: process_definition_key.to_owned(),
                before,
                after,
            });
        }
        self.process_count = Some(after);
        Ok(after)
    }

    async fn count_processes(&self, process_definition_key: &str) -> Result<usize> {
        Ok(self
            .platform
            .process_instances_by_definition_key(process_definition_key)
            .await?
            .len())
    }

    fn drop_subscription(&mut self) {
        self.verifier = None;
        self.expected.clear();
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }
}

impl<T: Transport, P: Platform> fmt::Debug for ScenarioContext<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioContext")
            .field("service_name", &self.service_name)
            .field("session_timeout", &self.session_timeout)
            .field("subscription_timeout", &self.subscription_timeout)
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .field("subscription", &self.subscription)
            .field("expected", &self.expected.len())
            .field("process_instance", &self.process_instance)
            .field("process_count", &self.process_count)
            .finish_non_exhaustive()
    }
}

fn seconds_or_zero(seconds: i64) -> Duration {
    Duration::from_secs(seconds.max(0).unsigned_abs())
}

fn split(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|item| !item.is_empty())
}

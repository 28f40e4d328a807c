//! Notification and audit stories, run against the in-memory platform.
//!
//! Run with: cargo test --features test-harness --test notifications

use std::sync::Arc;

use cucumber::{World, given, then, when};
use enginewatch::{
    ProcessInstance, ProcessQuery, ProcessRuntime, ProcessStatus, ScenarioContext, VariableKind,
    VariableValue, Variables,
    testing::{InMemoryPlatform, ProcessDefinition},
};

const SERVICE_NAME: &str = "rb";

#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct NotificationWorld {
    platform: InMemoryPlatform,
    context: ScenarioContext<InMemoryPlatform, InMemoryPlatform>,

    /// Variables collected for the next process start
    variables: Variables,

    /// Instance started outside the scenario context (signal throwers)
    thrown: Option<ProcessInstance>,
}

impl NotificationWorld {
    fn new() -> Self {
        let platform = InMemoryPlatform::new(SERVICE_NAME)
            .with_definition(ProcessDefinition::new("SimpleProcess"))
            .with_definition(
                ProcessDefinition::new("MessageProcess")
                    .started_by_message("startMessage")
                    .waiting_for_message("boundaryMessage"),
            )
            .with_definition(ProcessDefinition::new("SignalCatch").waiting_for_signal("Test"))
            .with_definition(ProcessDefinition::new("SignalThrow").throwing_signal("Test"));
        let shared = Arc::new(platform.clone());
        Self {
            context: ScenarioContext::new(shared.clone(), shared, SERVICE_NAME),
            platform,
            variables: Variables::new(),
            thrown: None,
        }
    }
}

// --- Given steps ---

#[given("services are started")]
fn services_are_started(world: &mut NotificationWorld) {
    assert_eq!(world.platform.service_name(), SERVICE_NAME);
}

#[given(expr = "generated random value for session variable called {word}")]
fn generated_random_value(world: &mut NotificationWorld, name: String) {
    world.context.generate_value(&name);
}

#[given(expr = "session timeout of {int} seconds")]
fn session_timeout(world: &mut NotificationWorld, seconds: i64) {
    world.context.set_session_timeout(seconds);
}

#[given(expr = "subscription timeout of {int} seconds")]
fn subscription_timeout(world: &mut NotificationWorld, seconds: i64) {
    world.context.set_subscription_timeout(seconds);
}

#[given(expr = "the user provides a(n) {word} variable named {word} with value {word}")]
fn provides_variable(world: &mut NotificationWorld, kind: String, name: String, value: String) {
    let kind: VariableKind = kind.parse().expect("known variable kind");
    let value = VariableValue::parse(kind, &value).expect("valid variable value");
    world.variables.insert(name, value);
}

// --- When steps ---

#[when(regex = r"^the user subscribes to (\S+) notifications$")]
async fn subscribes(world: &mut NotificationWorld, event_types: String) {
    world
        .context
        .subscribe_to(&event_types)
        .await
        .expect("subscription confirmed");
}

#[when(expr = "the user starts a process {word}")]
async fn starts_process(world: &mut NotificationWorld, key: String) {
    world.context.start_process(&key).await.expect("process started");
}

#[when(expr = "the user starts an instance of process called {word} with the provided variables")]
async fn starts_process_with_variables(world: &mut NotificationWorld, key: String) {
    let variables = std::mem::take(&mut world.variables);
    world
        .context
        .start_process_with(&key, variables)
        .await
        .expect("process started");
}

#[when(
    expr = "the user sends a start message named {word} with businessKey value from session variable called {word}"
)]
async fn sends_start_message(world: &mut NotificationWorld, message: String, variable: String) {
    world
        .context
        .send_start_message(&message, &variable)
        .await
        .expect("start message sent");
}

#[when(
    expr = "the user sends a message named {word} with correlationKey value of session variable called {word}"
)]
async fn sends_message(world: &mut NotificationWorld, message: String, variable: String) {
    world
        .context
        .send_message(&message, &variable)
        .await
        .expect("message sent");
}

#[when("the user starts a process with intermediate catch signal")]
async fn starts_catching_process(world: &mut NotificationWorld) {
    world
        .context
        .start_process("SignalCatch")
        .await
        .expect("catching process started");
}

#[when("the user starts a process with intermediate throw signal")]
async fn starts_throwing_process(world: &mut NotificationWorld) {
    let instance = world
        .platform
        .start_process("SignalThrow", &Variables::new())
        .await
        .expect("throwing process started");
    world.thrown = Some(instance);
}

#[when(expr = "the user sets a(n) {word} instance variable {word} to {word}")]
async fn sets_instance_variable(world: &mut NotificationWorld, kind: String, name: String, value: String) {
    let kind: VariableKind = kind.parse().expect("known variable kind");
    let value = VariableValue::parse(kind, &value).expect("valid variable value");
    let mut variables = Variables::new();
    variables.insert(name, value);
    world
        .context
        .set_variables(variables)
        .await
        .expect("variables set");
}

// --- Then steps ---

#[then("verify subscription started")]
fn verify_subscription_started(world: &mut NotificationWorld) {
    let subscription = world.context.subscription().expect("a subscription");
    assert!(subscription.is_ready());
}

#[then("verify process instance started response")]
fn verify_process_instance_started(world: &mut NotificationWorld) {
    assert!(world.context.process_instance().is_some());
}

#[then(regex = r"^the payload with (\S+) notifications is expected$")]
fn payload_expected(world: &mut NotificationWorld, event_types: String) {
    world
        .context
        .expect_payload(&event_types)
        .expect("expected message rendered");
}

#[then("verify the status of the process is completed")]
async fn verify_process_completed(world: &mut NotificationWorld) {
    world
        .context
        .verify_process_completed()
        .await
        .expect("process completed");
}

#[then("the process catching a signal is completed")]
async fn verify_catcher_completed(world: &mut NotificationWorld) {
    world
        .context
        .verify_process_completed()
        .await
        .expect("catching process completed");
}

#[then("the process throwing a signal is completed")]
async fn verify_thrower_completed(world: &mut NotificationWorld) {
    let thrown = world.thrown.as_ref().expect("a throwing process");
    let current = world
        .platform
        .process_instance(&thrown.id)
        .await
        .expect("process instance");
    assert_eq!(current.status, ProcessStatus::Completed);
}

#[then("the user completes the subscription")]
fn completes_subscription(world: &mut NotificationWorld) {
    world
        .context
        .complete_subscription()
        .expect("a subscription to complete");
}

#[then("verify all expected notifications are received")]
async fn verify_all_notifications(world: &mut NotificationWorld) {
    world
        .context
        .verify_all_notifications()
        .await
        .expect("all notifications received");
}

#[then(expr = "{word} events are emitted for the message {string} and timeout {int} seconds")]
async fn message_events_emitted(
    world: &mut NotificationWorld,
    event_type: String,
    message: String,
    seconds: i64,
) {
    world
        .context
        .expect_audit_event(&event_type, Some(&message), seconds)
        .await
        .expect("audit event found");
}

#[then(expr = "the SIGNAL_RECEIVED event was caught up by the catching process within {int} seconds")]
async fn signal_received(world: &mut NotificationWorld, seconds: i64) {
    world
        .context
        .expect_audit_event("SIGNAL_RECEIVED", Some("Test"), seconds)
        .await
        .expect("signal received");
}

#[then(expr = "the process instance has a(n) {word} variable named {word} with value {word}")]
async fn has_variable(world: &mut NotificationWorld, kind: String, name: String, value: String) {
    world
        .context
        .verify_variables(&[(name.as_str(), kind.as_str(), value.as_str())])
        .await
        .expect("variable matches");
}

#[then(regex = r"^the process variable (\S+) is (created|updated) within (\d+) seconds$")]
async fn variable_event_recorded(
    world: &mut NotificationWorld,
    name: String,
    change: String,
    seconds: i64,
) {
    let event_type = format!("VARIABLE_{}", change.to_uppercase());
    world
        .context
        .expect_audit_event(&event_type, Some(&name), seconds)
        .await
        .expect("variable event found");
}

#[then(expr = "check number of processes with processDefinitionKey {word}")]
async fn record_process_count(world: &mut NotificationWorld, key: String) {
    world
        .context
        .record_process_count(&key)
        .await
        .expect("process count");
}

#[then(expr = "check number of processes with processDefinitionKey {word} increased")]
async fn process_count_increased(world: &mut NotificationWorld, key: String) {
    world
        .context
        .verify_process_count_increased(&key)
        .await
        .expect("process count increased");
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    NotificationWorld::cucumber()
        .fail_on_skipped()
        .run_and_exit("tests/features")
        .await;
}

//! Notification Stream Example
//!
//! Walks through one notification story by hand, against the in-memory
//! platform from the `test-harness` feature:
//!
//! - **Subscribe**: open a subscription for two event types
//! - **Trigger**: start a process only once the subscription is live
//! - **Ordered match**: check the data messages arrived in order
//! - **Polling match**: find an event in the audit history
//!
//! Run with: `RUST_LOG=debug cargo run --example notifications --features test-harness`

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use enginewatch::{
    AuditQuery, EngineEvent, ExpectedMessage, ProcessRuntime, Result, SelectionSet,
    SubscriptionController, SubscriptionId, SubscriptionRequest, Variables, WatchConfig,
    observing::Observer,
    poll_until_found,
    testing::{InMemoryPlatform, ProcessDefinition},
};

/// Counts the messages every subscription buffered.
#[derive(Default)]
struct MessageCounter(AtomicUsize);

impl Observer for MessageCounter {
    fn on_message(&self, id: &SubscriptionId, payload: &str) {
        let seen = self.0.fetch_add(1, Ordering::Relaxed) + 1;
        println!("[{id}] #{seen} {payload}");
    }
}

#[tokio::main]
async fn main() -> Result {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let platform = InMemoryPlatform::new("rb")
        .with_definition(ProcessDefinition::new("SimpleProcess"));

    // A short grace period keeps the demo snappy.
    let config = WatchConfig::default().with_grace_period(Duration::from_millis(250));
    let controller = SubscriptionController::new(platform.clone(), config)
        .with_observer(MessageCounter::default());

    let request =
        SubscriptionRequest::engine_events("rb", ["PROCESS_STARTED", "PROCESS_COMPLETED"]);
    println!("{}", request.query());

    let subscription = controller.subscribe(request);
    let mut verifier = subscription.verifier();

    let variables = Variables::new();
    let instance = subscription
        .trigger(Duration::from_secs(6), || {
            platform.start_process("SimpleProcess", &variables)
        })
        .await?;
    println!("started {} ({})", instance.id, instance.status);

    let selection = SelectionSet::default();
    let event = |event_type: &str| EngineEvent::new().service_name("rb").event_type(event_type);
    let report = verifier
        .expect_next([
            ExpectedMessage::new(&selection, [event("PROCESS_STARTED")])?,
            ExpectedMessage::new(&selection, [event("PROCESS_COMPLETED")])?,
        ])
        .cancel_on_finish()
        .await?;
    println!("matched {} messages in {:?}", report.matched, report.elapsed);

    let target = EngineEvent::new()
        .event_type("PROCESS_COMPLETED")
        .entity_id(&instance.id);
    let found = poll_until_found(&platform, AuditQuery::entity(&instance.id), target)
        .every(Duration::from_millis(100))
        .within(Duration::from_secs(2))
        .await?;
    println!("found {:?} after {} poll(s)", found.found.event_type, found.polls);

    println!("final state: {}", subscription.state());
    Ok(())
}

use std::{
    fmt,
    future::{Future, IntoFuture},
    pin::Pin,
    time::Duration,
};

use tokio::time::{Instant, sleep_until, timeout_at};

use super::deadline_after;
use crate::{AuditQuery, EngineEvent, Error, EventSource, Result, WatchConfig};

/// Outcome of a successful polling match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub polls: usize,
    pub elapsed: Duration,
    /// The fetched event that satisfied the target.
    pub found: EngineEvent,
}

/// Poll `source` until an event satisfying `target` shows up.
///
/// The first fetch happens immediately, the following ones on a fixed
/// interval measured from the start. Fetch failures are logged and retried.
/// Defaults to the [`WatchConfig`] defaults (500 ms, 5 s).
///
/// # Example
///
/// ```rust,ignore
/// let target = EngineEvent::new()
///     .event_type("SIGNAL_RECEIVED")
///     .entity_id(&process_id);
///
/// poll_until_found(&audit, AuditQuery::entity(&process_id), target)
///     .every(Duration::from_millis(500))
///     .within(Duration::from_secs(5))
///     .await?;
/// ```
pub fn poll_until_found<S: EventSource>(
    source: &S,
    query: AuditQuery,
    target: EngineEvent,
) -> PollingMatch<'_, S> {
    let defaults = WatchConfig::default();
    PollingMatch {
        source,
        query,
        target,
        interval: defaults.poll_interval(),
        timeout: defaults.poll_timeout(),
    }
}

/// A polling match builder. Created by [`poll_until_found`].
pub struct PollingMatch<'a, S: EventSource> {
    source: &'a S,
    query: AuditQuery,
    target: EngineEvent,
    interval: Duration,
    timeout: Duration,
}

impl<'a, S: EventSource> PollingMatch<'a, S> {
    /// Delay between two fetches. Raised to at least one millisecond.
    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn within(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Take interval and timeout from `config`.
    pub fn configured(self, config: &WatchConfig) -> Self {
        self.every(config.poll_interval())
            .within(config.poll_timeout())
    }

    async fn run(self) -> Result<PollReport> {
        let started = Instant::now();
        let deadline = deadline_after(started, self.timeout);
        let mut polls = 0usize;
        let mut last_fetched: Vec<EngineEvent> = Vec::new();

        loop {
            polls += 1;
            match timeout_at(deadline, self.source.fetch_events(&self.query)).await {
                Ok(Ok(events)) => {
                    if let Some(found) = events.iter().find(|e| e.satisfies(&self.target)) {
                        tracing::debug!(
                            target_event = %self.target,
                            polls,
                            "audit event found"
                        );
                        return Ok(PollReport {
                            polls,
                            elapsed: started.elapsed(),
                            found: found.clone(),
                        });
                    }
                    last_fetched = events;
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, polls, "audit fetch failed, retrying");
                }
                Err(_) => break,
            }

            let next_poll = u32::try_from(polls)
                .ok()
                .and_then(|n| self.interval.checked_mul(n))
                .map_or(deadline, |wait| deadline_after(started, wait));
            if next_poll >= deadline {
                sleep_until(deadline).await;
                break;
            }
            sleep_until(next_poll).await;
        }

        Err(Error::PollTimeout {
            target: self.target.to_string(),
            timeout: self.timeout,
            polls,
            fetched: last_fetched.iter().map(ToString::to_string).collect(),
        })
    }
}

impl<'a, S: EventSource> IntoFuture for PollingMatch<'a, S> {
    type Output = Result<PollReport>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}

impl<S: EventSource> fmt::Debug for PollingMatch<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingMatch")
            .field("query", &self.query)
            .field("target", &self.target)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::{TransportError, testing::StaticEventSource};

    fn signal_received() -> EngineEvent {
        EngineEvent::new()
            .event_type("SIGNAL_RECEIVED")
            .entity_id("proc-123")
            .process_instance_id("proc-123")
    }

    fn target() -> EngineEvent {
        EngineEvent::new()
            .event_type("SIGNAL_RECEIVED")
            .entity_id("proc-123")
    }

    #[tokio::test(start_paused = true)]
    async fn found_on_third_poll() {
        let source = StaticEventSource::new()
            .then_return(vec![])
            .then_return(vec![])
            .then_return(vec![signal_received()]);

        let started = Instant::now();
        let report = poll_until_found(&source, AuditQuery::entity("proc-123"), target())
            .every(Duration::from_millis(500))
            .within(Duration::from_secs(5))
            .await
            .expect("found");

        assert_eq!(report.polls, 3);
        assert_eq!(report.found, signal_received());
        assert!(started.elapsed() <= Duration::from_millis(1500));
        assert_eq!(source.queries()[0], AuditQuery::entity("proc-123"));
    }

    #[tokio::test(start_paused = true)]
    async fn never_found_fails_at_timeout_boundary() {
        let source = StaticEventSource::new()
            .then_return(vec![EngineEvent::new().event_type("PROCESS_STARTED").entity_id("proc-123")]);

        let started = Instant::now();
        let err = poll_until_found(&source, AuditQuery::entity("proc-123"), target())
            .every(Duration::from_millis(500))
            .within(Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(started.elapsed(), Duration::from_secs(5));
        match err {
            Error::PollTimeout { polls, fetched, .. } => {
                assert_eq!(polls, 10);
                assert_eq!(fetched.len(), 1);
                assert!(fetched.0[0].contains("PROCESS_STARTED"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_budget_keeps_polling() {
        let source = StaticEventSource::new()
            .then_return(vec![])
            .then_return(vec![signal_received()]);

        let report = poll_until_found(&source, AuditQuery::entity("proc-123"), target())
            .every(Duration::from_secs(1))
            .within(Duration::MAX)
            .await
            .expect("found");
        assert_eq!(report.polls, 2);
        assert_eq!(report.elapsed, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_past_the_budget_waits_out_the_budget() {
        let source = StaticEventSource::new().then_return(vec![]);

        let started = Instant::now();
        let err = poll_until_found(&source, AuditQuery::entity("proc-123"), target())
            .every(Duration::MAX)
            .within(Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert!(matches!(err, Error::PollTimeout { polls: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failures_are_retried() {
        let source = StaticEventSource::new()
            .then_fail(TransportError::Connect("audit unavailable".into()))
            .then_return(vec![signal_received()]);

        let report = poll_until_found(&source, AuditQuery::entity("proc-123"), target())
            .await
            .expect("found after retry");
        assert_eq!(report.polls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn superset_of_target_fields_matches() {
        let source = StaticEventSource::new().then_return(vec![
            signal_received().process_definition_key("SignalCatchEventProcess"),
        ]);
        let report = poll_until_found(&source, AuditQuery::entity("proc-123"), target())
            .await
            .expect("found");
        assert_eq!(report.polls, 1);
        assert_eq!(report.elapsed, Duration::ZERO);
    }
}

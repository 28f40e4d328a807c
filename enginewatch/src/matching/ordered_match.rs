use std::{
    fmt,
    future::{Future, IntoFuture},
    pin::Pin,
    time::Duration,
};

use tokio::time::{Instant, timeout_at};

use super::deadline_after;
use crate::{
    BufferSignal, Comparison, Error, ExpectedMessage, Listing, Result, StreamVerifier,
};

/// Outcome of a successful ordered match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchReport {
    /// Number of messages matched.
    pub matched: usize,
    pub elapsed: Duration,
}

/// An ordered match builder.
///
/// Created by [`StreamVerifier::expect_next`]. Awaiting it consumes the next
/// messages from the buffer and compares them with the expected ones in
/// order. It fails at the first mismatching message, when the stream ends or
/// errors first, or when the budget runs out. Running out of budget always
/// cancels the subscription.
pub struct OrderedMatch<'a> {
    verifier: &'a mut StreamVerifier,
    expected: Vec<ExpectedMessage>,
    timeout: Duration,
    comparison: Comparison,
    then_complete: bool,
    cancel_on_finish: bool,
}

impl<'a> OrderedMatch<'a> {
    pub(crate) fn new(
        verifier: &'a mut StreamVerifier,
        expected: Vec<ExpectedMessage>,
        timeout: Duration,
        comparison: Comparison,
    ) -> Self {
        Self {
            verifier,
            expected,
            timeout,
            comparison,
            then_complete: false,
            cancel_on_finish: false,
        }
    }

    /// Override the configured match timeout.
    pub fn within(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the configured comparison.
    pub fn comparing(mut self, comparison: Comparison) -> Self {
        self.comparison = comparison;
        self
    }

    /// After the expected messages, also require the stream to complete
    /// without delivering anything else.
    pub fn then_complete(mut self) -> Self {
        self.then_complete = true;
        self
    }

    /// Cancel the subscription once the match finishes, pass or fail.
    pub fn cancel_on_finish(mut self) -> Self {
        self.cancel_on_finish = true;
        self
    }

    async fn run(self) -> Result<MatchReport> {
        let OrderedMatch {
            verifier,
            expected,
            timeout,
            comparison,
            then_complete,
            cancel_on_finish,
        } = self;

        let started = Instant::now();
        let deadline = deadline_after(started, timeout);
        let start = verifier.received.len();

        let outcome = verify(verifier, &expected, comparison, then_complete, deadline).await;
        let outcome = outcome.map_err(|failure| {
            let received = || verifier.received[start..].iter().map(|m| m.to_string()).collect();
            match failure {
                Failure::Timeout => Error::MatchTimeout {
                    timeout,
                    expected: listing(&expected, then_complete),
                    received: received(),
                },
                Failure::Completed => Error::StreamCompleted {
                    expected: listing(&expected, false),
                    received: received(),
                },
                Failure::Error(e) => e,
            }
        });

        if cancel_on_finish || outcome.as_ref().is_err_and(Error::is_timeout) {
            verifier.shared.cancel();
        }

        outcome.map(|matched| MatchReport {
            matched,
            elapsed: started.elapsed(),
        })
    }
}

enum Failure {
    Timeout,
    Completed,
    Error(Error),
}

async fn verify(
    verifier: &mut StreamVerifier,
    expected: &[ExpectedMessage],
    comparison: Comparison,
    then_complete: bool,
    deadline: Instant,
) -> std::result::Result<usize, Failure> {
    for (index, want) in expected.iter().enumerate() {
        let signal = timeout_at(deadline, verifier.replay.next())
            .await
            .map_err(|_| Failure::Timeout)?;
        match signal {
            Some(BufferSignal::Message(got)) => {
                verifier.received.push(got.clone());
                if !comparison.matches(want, &got) {
                    return Err(Failure::Error(Error::SequenceMismatch {
                        index,
                        expected: want.text().to_owned(),
                        received: got.to_string(),
                    }));
                }
            }
            Some(BufferSignal::Failed(cause)) => {
                return Err(Failure::Error(Error::StreamError {
                    subscription: verifier.shared.id,
                    cause,
                }));
            }
            Some(BufferSignal::Complete) | None => return Err(Failure::Completed),
        }
    }

    if then_complete {
        let signal = timeout_at(deadline, verifier.replay.next())
            .await
            .map_err(|_| Failure::Timeout)?;
        match signal {
            Some(BufferSignal::Complete) | None => {}
            Some(BufferSignal::Message(got)) => {
                verifier.received.push(got.clone());
                return Err(Failure::Error(Error::UnexpectedMessage(got.to_string())));
            }
            Some(BufferSignal::Failed(cause)) => {
                return Err(Failure::Error(Error::StreamError {
                    subscription: verifier.shared.id,
                    cause,
                }));
            }
        }
    }

    Ok(expected.len())
}

fn listing(expected: &[ExpectedMessage], then_complete: bool) -> Listing {
    let mut listing: Listing = expected.iter().map(ExpectedMessage::text).collect();
    if then_complete {
        listing.0.push("<complete>".into());
    }
    listing
}

impl<'a> IntoFuture for OrderedMatch<'a> {
    type Output = Result<MatchReport>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}

impl fmt::Debug for OrderedMatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedMatch")
            .field("verifier", &self.verifier)
            .field("expected", &self.expected.len())
            .field("timeout", &self.timeout)
            .field("comparison", &self.comparison)
            .field("then_complete", &self.then_complete)
            .field("cancel_on_finish", &self.cancel_on_finish)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use crate::{
        EngineEvent, EngineEventField, Error, ExpectedMessage, SelectionSet, Subscription,
        SubscriptionController, SubscriptionRequest, SubscriptionState, TransportError,
        WatchConfig,
        testing::{ScriptedTransport, StreamScript},
    };

    fn event(kind: &str) -> EngineEvent {
        EngineEvent::new().service_name("rb").event_type(kind)
    }

    fn expected(kind: &str) -> ExpectedMessage {
        ExpectedMessage::new(&SelectionSet::default(), [event(kind)]).expect("render")
    }

    fn subscribe() -> (ScriptedTransport, StreamScript, Subscription) {
        let transport = ScriptedTransport::new();
        let stream = transport.next_stream();
        let controller = SubscriptionController::new(
            transport.clone(),
            WatchConfig::default().with_grace_period(Duration::ZERO),
        );
        let subscription = controller.subscribe(SubscriptionRequest::engine_events(
            "rb",
            ["PROCESS_STARTED", "PROCESS_COMPLETED"],
        ));
        (transport, stream, subscription)
    }

    #[tokio::test(start_paused = true)]
    async fn matches_prefix_of_recorded_messages() {
        let (_transport, stream, subscription) = subscribe();
        for kind in ["A", "B", "C"] {
            stream.data(expected(kind).text());
        }

        let mut verifier = subscription.verifier();
        let report = verifier
            .expect_next([expected("A"), expected("B")])
            .await
            .expect("prefix matches");
        assert_eq!(report.matched, 2);
        assert_eq!(verifier.position(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_expectations_continue_in_order() {
        let (_transport, stream, subscription) = subscribe();
        let mut verifier = subscription.verifier();

        stream.data(expected("PROCESS_STARTED").text());
        verifier
            .expect_next([expected("PROCESS_STARTED")])
            .await
            .expect("started");

        stream.data(expected("PROCESS_COMPLETED").text());
        verifier
            .expect_next([expected("PROCESS_COMPLETED")])
            .cancel_on_finish()
            .await
            .expect("completed");

        assert_eq!(subscription.state(), SubscriptionState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_budget_still_matches() {
        let (_transport, stream, subscription) = subscribe();
        stream.data(expected("PROCESS_STARTED").text());
        stream.close();

        let report = subscription
            .verifier()
            .expect_next([expected("PROCESS_STARTED")])
            .then_complete()
            .within(Duration::MAX)
            .await
            .expect("matched");
        assert_eq!(report.matched, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn mismatch_reports_first_differing_index() {
        let (_transport, stream, subscription) = subscribe();
        for kind in ["A", "X", "C"] {
            stream.data(expected(kind).text());
        }

        let err = subscription
            .verifier()
            .expect_next([expected("A"), expected("B"), expected("C")])
            .await
            .unwrap_err();
        match err {
            Error::SequenceMismatch {
                index,
                expected: want,
                received,
            } => {
                assert_eq!(index, 1);
                assert!(want.contains("\"B\""));
                assert!(received.contains("\"X\""));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_lists_expected_and_received_and_cancels() {
        let (_transport, stream, subscription) = subscribe();
        stream.data(expected("PROCESS_STARTED").text());

        let started = Instant::now();
        let err = subscription
            .verifier()
            .expect_next([expected("PROCESS_STARTED"), expected("PROCESS_COMPLETED")])
            .within(Duration::from_secs(6))
            .await
            .unwrap_err();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_millis(6100));
        match &err {
            Error::MatchTimeout {
                expected: want,
                received,
                ..
            } => {
                assert_eq!(want.len(), 2);
                assert_eq!(received.len(), 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(subscription.state(), SubscriptionState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_error_resolves_match_immediately() {
        let (_transport, stream, subscription) = subscribe();
        stream.ack();
        stream.error(TransportError::Protocol("reset".into()));

        let started = Instant::now();
        let err = subscription
            .verifier()
            .expect_next([expected("PROCESS_STARTED")])
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(matches!(err, Error::StreamError { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn match_against_history_survives_later_cancel() {
        let (_transport, stream, subscription) = subscribe();
        stream.data(expected("PROCESS_STARTED").text());
        tokio::time::sleep(Duration::from_millis(1)).await;
        subscription.cancel();

        let mut verifier = subscription.verifier();
        verifier
            .expect_next([expected("PROCESS_STARTED")])
            .await
            .expect("buffered history still matches");
        verifier.expect_complete().await.expect("completed by cancel");
    }

    #[tokio::test(start_paused = true)]
    async fn stream_end_before_expected_fails_fast() {
        let (_transport, stream, subscription) = subscribe();
        stream.data(expected("PROCESS_STARTED").text());
        stream.close();

        let err = subscription
            .verifier()
            .expect_next([expected("PROCESS_STARTED"), expected("PROCESS_COMPLETED")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StreamCompleted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_trailing_message_fails_completion() {
        let (_transport, stream, subscription) = subscribe();
        stream.data(expected("PROCESS_STARTED").text());
        stream.data(expected("PROCESS_STARTED").text());
        stream.close();

        let err = subscription
            .verifier()
            .expect_next([expected("PROCESS_STARTED")])
            .then_complete()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedMessage(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn field_order_mismatch_needs_structural_comparison() {
        let (_transport, stream, subscription) = subscribe();
        let reversed = ExpectedMessage::new(
            &SelectionSet::new([EngineEventField::EventType, EngineEventField::ServiceName]),
            [event("PROCESS_STARTED")],
        )
        .expect("render");
        stream.data(reversed.text());
        stream.data(reversed.text());

        let mut verifier = subscription.verifier();
        let err = verifier
            .expect_next([expected("PROCESS_STARTED")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SequenceMismatch { index: 0, .. }));

        verifier
            .expect_next([expected("PROCESS_STARTED")])
            .comparing(crate::Comparison::Structural)
            .await
            .expect("structural comparison ignores order");
    }
}

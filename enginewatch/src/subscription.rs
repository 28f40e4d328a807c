use std::{fmt, future::Future, sync::Arc, time::Duration};

use tokio::time::Instant;

use crate::{
    Error, ReplayBuffer, Result, StreamVerifier, SubscriptionId, SubscriptionState,
    TransportError, WatchConfig,
    internal::{Lifecycle, Shared},
};

/// Live handle to one engine-event subscription.
///
/// Created by [`SubscriptionController::subscribe`](crate::SubscriptionController::subscribe)
/// in the `Unconfirmed` state. The listener task confirms it on the first
/// frame and releases it for triggers once the grace period has passed.
///
/// Dropping the handle cancels the subscription, so every exit path of a
/// scenario (success, failed assertion or panic) tears the stream down.
/// Verifiers obtained from [`verifier`](Self::verifier) keep reading the
/// buffered history after that.
pub struct Subscription {
    shared: Arc<Shared>,
    config: WatchConfig,
}

impl Subscription {
    pub(crate) fn new(shared: Arc<Shared>, config: WatchConfig) -> Self {
        Self { shared, config }
    }

    pub fn id(&self) -> SubscriptionId {
        self.shared.id
    }

    pub fn state(&self) -> SubscriptionState {
        self.shared.state()
    }

    /// The buffer this subscription records into.
    pub fn buffer(&self) -> &ReplayBuffer {
        &self.shared.buffer
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Confirmed, released and not terminal: a trigger may fire now.
    pub fn is_ready(&self) -> bool {
        let lifecycle = self.shared.snapshot();
        lifecycle.released && !lifecycle.state.is_terminal()
    }

    /// The upstream cause if the subscription errored.
    pub fn fault(&self) -> Option<TransportError> {
        self.shared.snapshot().fault
    }

    /// Wait until the subscription is confirmed and released.
    ///
    /// Resolves as soon as the outcome is known: an upstream error or a
    /// cancel ends the wait immediately. A zero timeout checks the current
    /// state once and does not wait.
    ///
    /// # Errors
    ///
    /// - [`Error::ConfirmationTimeout`] if the budget runs out; the
    ///   subscription is cancelled before returning.
    /// - [`Error::StreamError`] if the transport failed first.
    /// - [`Error::Cancelled`] if the subscription was cancelled first.
    pub async fn confirm_within(&self, timeout: Duration) -> Result {
        let started = Instant::now();
        let mut lifecycle = self.shared.lifecycle.subscribe();

        let settled = tokio::time::timeout(timeout, async {
            lifecycle
                .wait_for(Lifecycle::is_settled)
                .await
                .map(|l| l.clone())
        })
        .await;

        match settled {
            Ok(Ok(lifecycle)) => self.outcome(lifecycle),
            Ok(Err(_)) => Err(Error::Cancelled(self.id())),
            Err(_) => {
                self.shared.cancel();
                Err(Error::ConfirmationTimeout {
                    subscription: self.id(),
                    timeout,
                    elapsed: started.elapsed(),
                })
            }
        }
    }

    /// [`confirm_within`](Self::confirm_within) the configured
    /// [`confirmation_timeout`](WatchConfig::confirmation_timeout).
    pub async fn confirm(&self) -> Result {
        self.confirm_within(self.config.confirmation_timeout()).await
    }

    /// Same as [`confirm_within`](Self::confirm_within), reporting only
    /// whether the subscription went live.
    pub async fn await_confirmation(&self, timeout: Duration) -> bool {
        self.confirm_within(timeout).await.is_ok()
    }

    fn outcome(&self, lifecycle: Lifecycle) -> Result {
        match lifecycle.state {
            SubscriptionState::Errored => Err(Error::StreamError {
                subscription: self.id(),
                cause: lifecycle
                    .fault
                    .unwrap_or(TransportError::ClosedBeforeConfirmation),
            }),
            SubscriptionState::Cancelled => Err(Error::Cancelled(self.id())),
            SubscriptionState::Unconfirmed | SubscriptionState::Confirmed => Ok(()),
        }
    }

    /// Cancel the subscription.
    ///
    /// Safe to call any number of times, before or after confirmation.
    /// Returns `true` if this call did the cancelling. Failures to cancel
    /// the transport stream are logged and never returned.
    ///
    /// Cancelling is best-effort with respect to frames in flight: those the
    /// transport delivered before the listener saw the cancel are still
    /// recorded, later ones are not. Nothing already buffered is removed.
    /// The buffer completes once the listener has stopped.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    /// A verifier reading this subscription's buffer from the start.
    pub fn verifier(&self) -> StreamVerifier {
        StreamVerifier::new(self.shared.clone(), &self.config)
    }

    /// Run `action` once the subscription is confirmed and released.
    ///
    /// If confirmation fails the action is never called and the
    /// confirmation error is returned, naming the subscription.
    ///
    /// # Errors
    ///
    /// Any error of [`confirm_within`](Self::confirm_within), or
    /// [`Error::Trigger`] wrapping the action's own failure.
    pub async fn trigger<F, Fut, R, E>(&self, timeout: Duration, action: F) -> Result<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.confirm_within(timeout).await?;
        action().await.map_err(Error::trigger)
    }

    /// [`trigger`](Self::trigger) with the configured confirmation timeout.
    pub async fn trigger_when_ready<F, Fut, R, E>(&self, action: F) -> Result<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.trigger(self.config.confirmation_timeout(), action).await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shared.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("buffered", &self.shared.buffer.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::{
        BufferSignal, SubscriptionController, SubscriptionRequest, observing::Observer,
        testing::ScriptedTransport,
    };

    const GRACE: Duration = Duration::from_secs(3);

    fn controller(transport: &ScriptedTransport) -> SubscriptionController<ScriptedTransport> {
        SubscriptionController::new(
            transport.clone(),
            WatchConfig::default().with_grace_period(GRACE),
        )
    }

    fn request() -> SubscriptionRequest {
        SubscriptionRequest::engine_events("rb", ["PROCESS_STARTED", "PROCESS_COMPLETED"])
            .with_bearer_token("token")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[derive(Default)]
    struct Counts {
        cancelled: AtomicUsize,
        cancel_failed: AtomicUsize,
        errors: AtomicUsize,
    }

    struct CountingObserver(Arc<Counts>);

    impl Observer for CountingObserver {
        fn on_cancelled(&self, _id: &SubscriptionId) {
            self.0.cancelled.fetch_add(1, Ordering::SeqCst);
        }

        fn on_cancel_failed(&self, _id: &SubscriptionId, _error: &TransportError) {
            self.0.cancel_failed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _id: &SubscriptionId, _error: &TransportError) {
            self.0.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ack_confirms_and_grace_period_releases() {
        let transport = ScriptedTransport::new();
        let stream = transport.next_stream();
        let subscription = controller(&transport).subscribe(request());
        assert_eq!(subscription.state(), SubscriptionState::Unconfirmed);

        stream.ack();
        settle().await;
        assert_eq!(subscription.state(), SubscriptionState::Confirmed);
        assert!(!subscription.is_ready());

        let started = Instant::now();
        subscription
            .confirm_within(Duration::from_secs(6))
            .await
            .expect("confirmed");
        assert!(started.elapsed() >= GRACE - Duration::from_millis(1));
        assert!(subscription.is_ready());
        assert_eq!(transport.requests()[0].bearer_token(), "token");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_without_confirmation_returns_false_immediately() {
        let transport = ScriptedTransport::new();
        let _stream = transport.next_stream();
        let subscription = controller(&transport).subscribe(request());

        let started = Instant::now();
        assert!(!subscription.await_confirmation(Duration::ZERO).await);
        assert!(started.elapsed() < Duration::from_millis(1));
        assert_eq!(subscription.state(), SubscriptionState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_timeout_names_subscription_and_cancels() {
        let transport = ScriptedTransport::new();
        let _stream = transport.next_stream();
        let subscription = controller(&transport).subscribe(request());

        let err = subscription
            .confirm_within(Duration::from_secs(6))
            .await
            .unwrap_err();
        match err {
            Error::ConfirmationTimeout {
                subscription: id,
                timeout,
                elapsed,
            } => {
                assert_eq!(id, subscription.id());
                assert_eq!(timeout, Duration::from_secs(6));
                assert!(elapsed >= timeout);
            }
            other => panic!("unexpected error {other:?}"),
        }
        settle().await;
        assert_eq!(subscription.state(), SubscriptionState::Cancelled);
        assert_eq!(transport.cancel_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn error_before_confirmation_resolves_immediately() {
        let transport = ScriptedTransport::new();
        let stream = transport.next_stream();
        let subscription = controller(&transport).subscribe(request());

        stream.error(TransportError::Protocol("unauthorized".into()));
        let started = Instant::now();
        let err = subscription
            .confirm_within(Duration::from_secs(6))
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(matches!(
            err,
            Error::StreamError { cause: TransportError::Protocol(_), .. }
        ));
        assert_eq!(subscription.state(), SubscriptionState::Errored);
    }

    #[tokio::test(start_paused = true)]
    async fn error_during_grace_period_cancels_release() {
        let transport = ScriptedTransport::new();
        let stream = transport.next_stream();
        let subscription = controller(&transport).subscribe(request());

        stream.ack();
        settle().await;
        stream.error(TransportError::Protocol("reset".into()));

        let err = subscription
            .confirm_within(Duration::from_secs(6))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StreamError { .. }));
        assert!(!subscription.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_open_moves_to_errored() {
        let transport = ScriptedTransport::new();
        transport.fail_next_open(TransportError::Connect("refused".into()));
        let subscription = controller(&transport).subscribe(request());

        assert!(!subscription.await_confirmation(Duration::from_secs(6)).await);
        assert_eq!(subscription.state(), SubscriptionState::Errored);
        assert!(matches!(subscription.fault(), Some(TransportError::Connect(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_closed_before_confirmation_is_an_error() {
        let transport = ScriptedTransport::new();
        let stream = transport.next_stream();
        let subscription = controller(&transport).subscribe(request());

        stream.close();
        let err = subscription
            .confirm_within(Duration::from_secs(6))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::StreamError { cause: TransportError::ClosedBeforeConfirmation, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn data_frames_are_buffered_in_arrival_order() {
        let transport = ScriptedTransport::new();
        let stream = transport.next_stream();
        let subscription = controller(&transport).subscribe(request());

        for payload in ["one", "two", "three"] {
            stream.data(payload);
        }
        stream.close();
        settle().await;

        assert_eq!(subscription.state(), SubscriptionState::Confirmed);
        let mut replay = subscription.buffer().attach();
        for payload in ["one", "two", "three"] {
            assert_eq!(replay.next().await, Some(BufferSignal::Message(payload.into())));
        }
        assert_eq!(replay.next().await, Some(BufferSignal::Complete));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent_and_notifies_once() {
        let transport = ScriptedTransport::new();
        let stream = transport.next_stream();
        let counts = Arc::new(Counts::default());
        let subscription = controller(&transport)
            .with_observer(CountingObserver(counts.clone()))
            .subscribe(request());

        stream.ack();
        settle().await;
        assert!(subscription.cancel());
        assert!(!subscription.cancel());
        settle().await;

        assert_eq!(subscription.state(), SubscriptionState::Cancelled);
        assert_eq!(counts.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(counts.errors.load(Ordering::SeqCst), 0);
        assert_eq!(transport.cancel_count(), 1);
        assert!(subscription.buffer().is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_confirmation_is_safe() {
        let transport = ScriptedTransport::new();
        let _stream = transport.next_stream();
        let subscription = controller(&transport).subscribe(request());

        assert!(subscription.cancel());
        let err = subscription
            .confirm_within(Duration::from_secs(6))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_failure_is_logged_not_returned() {
        let transport = ScriptedTransport::new();
        transport.fail_cancels(TransportError::Cancel("connection gone".into()));
        let stream = transport.next_stream();
        let counts = Arc::new(Counts::default());
        let subscription = controller(&transport)
            .with_observer(CountingObserver(counts.clone()))
            .subscribe(request());

        stream.ack();
        settle().await;
        assert!(subscription.cancel());
        settle().await;

        assert_eq!(counts.cancel_failed.load(Ordering::SeqCst), 1);
        assert_eq!(subscription.state(), SubscriptionState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_keeps_delivered_frames_and_drops_later_ones() {
        let transport = ScriptedTransport::new();
        let stream = transport.next_stream();
        let subscription = controller(&transport).subscribe(request());

        stream.data("kept");
        settle().await;
        stream.data("in flight");
        subscription.cancel();
        assert!(!subscription.buffer().is_terminal());

        settle().await;
        stream.data("late");
        settle().await;

        assert!(subscription.buffer().is_terminal());
        assert_eq!(
            subscription.buffer().snapshot(),
            vec![Arc::<str>::from("kept"), Arc::from("in flight")]
        );
        assert_eq!(transport.cancel_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_cancels() {
        let transport = ScriptedTransport::new();
        let stream = transport.next_stream();
        let subscription = controller(&transport).subscribe(request());
        stream.ack();
        settle().await;

        let buffer = subscription.buffer().clone();
        drop(subscription);
        settle().await;

        assert!(buffer.is_terminal());
        assert_eq!(transport.cancel_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_runs_only_after_release() {
        let transport = ScriptedTransport::new();
        let stream = transport.next_stream();
        let subscription = controller(&transport).subscribe(request());
        stream.ack();

        let started = Instant::now();
        let value = subscription
            .trigger(Duration::from_secs(6), || async {
                Ok::<_, TransportError>(started.elapsed())
            })
            .await
            .expect("trigger ran");
        assert!(value >= GRACE - Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_is_skipped_when_confirmation_fails() {
        let transport = ScriptedTransport::new();
        let _stream = transport.next_stream();
        let subscription = controller(&transport).subscribe(request());
        let ran = AtomicUsize::new(0);

        let err = subscription
            .trigger(Duration::from_secs(1), || async {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TransportError>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ConfirmationTimeout { .. }));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn confirm_uses_configured_budget() {
        let transport = ScriptedTransport::new();
        let _stream = transport.next_stream();
        let config = WatchConfig::default().with_confirmation_timeout(Duration::from_secs(2));
        let subscription = SubscriptionController::new(transport.clone(), config).subscribe(request());

        let started = Instant::now();
        let err = subscription.confirm().await.unwrap_err();

        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert!(matches!(
            err,
            Error::ConfirmationTimeout { timeout, .. } if timeout == Duration::from_secs(2)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_when_ready_waits_for_release_within_configured_budget() {
        let transport = ScriptedTransport::new();
        let stream = transport.next_stream();
        let config = WatchConfig::default()
            .with_grace_period(GRACE)
            .with_confirmation_timeout(Duration::from_secs(1));
        let subscription = SubscriptionController::new(transport.clone(), config).subscribe(request());
        stream.ack();

        let err = subscription
            .trigger_when_ready(|| async { Ok::<_, TransportError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfirmationTimeout { .. }));

        let transport = ScriptedTransport::new();
        let stream = transport.next_stream();
        let subscription = controller(&transport).subscribe(request());
        stream.ack();
        let started = Instant::now();
        let elapsed = subscription
            .trigger_when_ready(|| async { Ok::<_, TransportError>(started.elapsed()) })
            .await
            .expect("trigger ran");
        assert!(elapsed >= GRACE - Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_failure_is_wrapped() {
        let transport = ScriptedTransport::new();
        let stream = transport.next_stream();
        let subscription = controller(&transport).subscribe(request());
        stream.ack();

        let err = subscription
            .trigger(Duration::from_secs(6), || async {
                Err::<(), _>(TransportError::Rejected("unknown process".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Trigger(_)));
        assert!(err.to_string().contains("unknown process"));
    }
}

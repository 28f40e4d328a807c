use std::{fmt, sync::Arc, time::Duration};

use crate::{
    Comparison, ExpectedMessage, OrderedMatch, Replay, SubscriptionId, WatchConfig,
    internal::Shared,
};

/// Ordered matcher over one subscription's buffer.
///
/// Reads the buffer from the first recorded message. Each
/// [`expect_next`](Self::expect_next) continues where the previous one
/// stopped, so a scenario can assert `PROCESS_STARTED` and later
/// `PROCESS_COMPLETED` against the same stream.
///
/// # Example
///
/// ```rust,ignore
/// let mut verifier = subscription.verifier();
/// verifier.expect_next([started]).await?;
/// verifier
///     .expect_next([completed])
///     .within(Duration::from_secs(6))
///     .cancel_on_finish()
///     .await?;
/// ```
pub struct StreamVerifier {
    pub(super) replay: Replay,
    pub(super) shared: Arc<Shared>,
    pub(super) received: Vec<Arc<str>>,
    match_timeout: Duration,
    comparison: Comparison,
}

impl StreamVerifier {
    pub(crate) fn new(shared: Arc<Shared>, config: &WatchConfig) -> Self {
        Self {
            replay: shared.buffer.attach(),
            shared,
            received: Vec::new(),
            match_timeout: config.match_timeout(),
            comparison: config.comparison(),
        }
    }

    /// Expect the next messages to equal `expected`, in order.
    ///
    /// Uses the configured match timeout and comparison unless overridden on
    /// the returned builder.
    pub fn expect_next(
        &mut self,
        expected: impl IntoIterator<Item = ExpectedMessage>,
    ) -> OrderedMatch<'_> {
        let timeout = self.match_timeout;
        let comparison = self.comparison;
        OrderedMatch::new(self, expected.into_iter().collect(), timeout, comparison)
    }

    /// Expect the stream to finish with no further messages.
    pub fn expect_complete(&mut self) -> OrderedMatch<'_> {
        self.expect_next([]).then_complete()
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.shared.id
    }

    /// Number of messages consumed so far.
    pub fn position(&self) -> usize {
        self.received.len()
    }

    /// Messages consumed so far, in order.
    pub fn received(&self) -> &[Arc<str>] {
        &self.received
    }

    /// Cancel the underlying subscription.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }
}

impl fmt::Debug for StreamVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamVerifier")
            .field("subscription", &self.shared.id)
            .field("position", &self.received.len())
            .field("match_timeout", &self.match_timeout)
            .field("comparison", &self.comparison)
            .finish()
    }
}

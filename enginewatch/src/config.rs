use std::time::Duration;

use crate::{Comparison, ReplayCapacity};

/// Timing and matching configuration for subscriptions and verifiers.
///
/// The defaults mirror the budgets the notification stories were written
/// against. Use the builder methods to adjust them, or [`Default`] as is.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use enginewatch::WatchConfig;
///
/// let config = WatchConfig::default()
///     .with_grace_period(Duration::from_millis(100))   // Release triggers sooner
///     .with_match_timeout(Duration::from_secs(10));     // Slower environment
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Delay between confirmation and the release of dependent triggers.
    /// Gives the platform time to register the subscriber before it emits.
    /// Default: 3s
    grace_period: Duration,

    /// How long to wait for a subscription to go live.
    /// Default: 6s
    confirmation_timeout: Duration,

    /// Overall budget for an ordered match.
    /// Default: 6s
    match_timeout: Duration,

    /// Delay between two polls of the audit source.
    /// Default: 500ms
    poll_interval: Duration,

    /// Overall budget for a polling match.
    /// Default: 5s
    poll_timeout: Duration,

    /// How many payloads each subscription buffer keeps.
    /// Default: unbounded
    replay_capacity: ReplayCapacity,

    /// How received messages are compared with expected ones.
    /// Default: literal
    comparison: Comparison,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            grace_period: Duration::from_secs(3),
            confirmation_timeout: Duration::from_secs(6),
            match_timeout: Duration::from_secs(6),
            poll_interval: Duration::from_millis(500),
            poll_timeout: Duration::from_secs(5),
            replay_capacity: ReplayCapacity::Unbounded,
            comparison: Comparison::Literal,
        }
    }
}

impl WatchConfig {
    /// Set the delay between confirmation and trigger release.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }

    pub fn with_match_timeout(mut self, timeout: Duration) -> Self {
        self.match_timeout = timeout;
        self
    }

    pub fn match_timeout(&self) -> Duration {
        self.match_timeout
    }

    /// Set the delay between audit polls.
    ///
    /// A zero interval is raised to one millisecond so polling never spins.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval.max(Duration::from_millis(1))
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    pub fn with_replay_capacity(mut self, capacity: ReplayCapacity) -> Self {
        self.replay_capacity = capacity;
        self
    }

    pub fn replay_capacity(&self) -> ReplayCapacity {
        self.replay_capacity
    }

    /// Set how verifiers compare received messages.
    ///
    /// [`Comparison::Literal`] compares the exact text and is sensitive to
    /// field order. [`Comparison::Structural`] compares field values.
    pub fn with_comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = comparison;
        self
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }
}

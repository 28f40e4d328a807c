//! Assertions over what a subscription delivered.
//!
//! Two modes, matching the two ways notifications are checked:
//!
//! - **Ordered match** ([`StreamVerifier`]): the next N messages on the live
//!   stream must equal N expected data messages, in order, within a budget.
//! - **Polling match** ([`poll_until_found`]): an [`EventSource`] is fetched
//!   on a fixed interval until a target event shows up in the recorded
//!   history of an entity, or the budget runs out.
//!
//! Expected messages are rendered with [`wire::render`](crate::wire::render),
//! so the expectation and the wire share one serializer.

use std::time::Duration;

use tokio::time::Instant;

mod comparison;
mod event_source;
mod expected_message;
mod ordered_match;
mod polling_match;
mod stream_verifier;

pub use comparison::Comparison;
pub use event_source::{AuditQuery, EventSource};
pub use expected_message::ExpectedMessage;
pub use ordered_match::{MatchReport, OrderedMatch};
pub use polling_match::{PollReport, PollingMatch, poll_until_found};
pub use stream_verifier::StreamVerifier;

/// Stand-in deadline for budgets too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + budget`, saturating to a deadline decades away.
pub(crate) fn deadline_after(start: Instant, budget: Duration) -> Instant {
    start
        .checked_add(budget)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

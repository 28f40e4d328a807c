use std::fmt;

/// Confirmation state of a [`Subscription`](crate::Subscription).
///
/// Moves from `Unconfirmed` to `Confirmed` on the first frame, and from
/// either to `Cancelled` or `Errored`. Both of those are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubscriptionState {
    #[default]
    Unconfirmed,
    Confirmed,
    Cancelled,
    Errored,
}

impl SubscriptionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionState::Cancelled | SubscriptionState::Errored)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubscriptionState::Unconfirmed => "unconfirmed",
            SubscriptionState::Confirmed => "confirmed",
            SubscriptionState::Cancelled => "cancelled",
            SubscriptionState::Errored => "errored",
        };
        f.write_str(name)
    }
}

use crate::{SubscriptionState, TransportError};

/// Lifecycle snapshot published on a subscription's watch channel.
#[derive(Debug, Clone, Default)]
pub(crate) struct Lifecycle {
    pub state: SubscriptionState,
    /// Grace period elapsed after confirmation; triggers may fire.
    pub released: bool,
    /// The upstream cause once the state is `Errored`.
    pub fault: Option<TransportError>,
}

impl Lifecycle {
    /// Nothing more will change for a confirmation waiter.
    pub fn is_settled(&self) -> bool {
        self.released || self.state.is_terminal()
    }
}

use std::{fmt, hash};
use uuid::Uuid;

/// Identifier assigned to every subscription when it is issued.
///
/// Appears in log fields and in every error that concerns the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, hash::Hash)]
pub struct SubscriptionId(u128);

impl SubscriptionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().as_u128())
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    /// First eight hex digits, enough to tell concurrent subscriptions apart
    /// in log output.
    pub fn short(&self) -> ShortId {
        ShortId((self.0 >> 96) as u32)
    }
}

/// Abbreviated display form of a [`SubscriptionId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortId(u32);

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl From<u128> for SubscriptionId {
    fn from(value: u128) -> Self {
        SubscriptionId(value)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_u128(self.0))
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        SubscriptionId::new()
    }
}

use std::{fmt, sync::Arc, time::Duration};

use crate::{SubscriptionId, VariableKind};

/// The single error type for all enginewatch operations.
///
/// Every fallible API returns `enginewatch::Result<T>` (alias for
/// `Result<T, enginewatch::Error>`). Failures reported by external
/// collaborators arrive as [`TransportError`] and are wrapped into the
/// variant that names the subscription or assertion they broke.
///
/// Cancellation failures never show up here: they are logged and dropped.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("subscription {subscription} not confirmed within {timeout:?} (waited {elapsed:?})")]
    ConfirmationTimeout {
        subscription: SubscriptionId,
        timeout: Duration,
        elapsed: Duration,
    },

    #[error("subscription {subscription} failed: {cause}")]
    StreamError {
        subscription: SubscriptionId,
        #[source]
        cause: TransportError,
    },

    #[error("subscription {0} was cancelled")]
    Cancelled(SubscriptionId),

    #[error("expected messages not received within {timeout:?}: expected {expected}, received {received}")]
    MatchTimeout {
        timeout: Duration,
        expected: Listing,
        received: Listing,
    },

    #[error("message #{index} did not match: expected {expected}, received {received}")]
    SequenceMismatch {
        index: usize,
        expected: String,
        received: String,
    },

    #[error("stream completed before all messages arrived: expected {expected}, received {received}")]
    StreamCompleted { expected: Listing, received: Listing },

    #[error("unexpected message after the expected sequence: {0}")]
    UnexpectedMessage(String),

    #[error("event {target} not found within {timeout:?} after {polls} polls, last fetched {fetched}")]
    PollTimeout {
        target: String,
        timeout: Duration,
        polls: usize,
        fetched: Listing,
    },

    #[error("trigger action failed: {0}")]
    Trigger(#[source] Arc<dyn std::error::Error + Send + Sync>),

    #[error("wire encoding error: {0}")]
    Wire(#[source] Arc<serde_json::Error>),

    #[error("malformed notification message: {0}")]
    MalformedMessage(String),

    #[error("scenario has no {0}")]
    MissingContext(&'static str),

    #[error("no scenario value named '{0}'")]
    UnknownValue(String),

    #[error("unknown variable kind '{0}'")]
    UnknownVariableKind(String),

    #[error("'{value}' is not a valid {kind} value")]
    InvalidVariableValue { kind: VariableKind, value: String },

    #[error("variable '{name}' mismatch: expected {expected}, found {found}")]
    VariableMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("process instance {id} is {found}, expected {expected}")]
    ProcessStatus {
        id: String,
        expected: String,
        found: String,
    },

    #[error("expected more than {before} '{key}' process instances, found {after}")]
    ProcessCountUnchanged {
        key: String,
        before: usize,
        after: usize,
    },

    #[error("external collaborator failed: {0}")]
    External(#[source] TransportError),
}

impl Error {
    /// Wrap an error raised by a trigger action.
    pub fn trigger(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Trigger(Arc::new(e))
    }

    /// Returns `true` if this error is a timeout of any kind.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::ConfirmationTimeout { .. } | Error::MatchTimeout { .. } | Error::PollTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Wire(Arc::new(e))
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::External(e)
    }
}

/// Failure reported by a transport, audit source or process runtime.
///
/// Cloneable so one upstream fault can be handed to the subscription state,
/// the replay buffer and every waiter at once.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("stream closed before it was confirmed")]
    ClosedBeforeConfirmation,

    #[error("cancel failed: {0}")]
    Cancel(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

// Compared by rendered text, so wrapped `Other` causes compare by message.
impl PartialEq for TransportError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl TransportError {
    pub fn other(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        TransportError::Other(Arc::new(e))
    }
}

/// A list of rendered messages or events, printed as `[a, b, c]` in error text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing(pub Vec<String>);

impl Listing {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(item)?;
        }
        f.write_str("]")
    }
}

impl<S: Into<String>> FromIterator<S> for Listing {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Listing(iter.into_iter().map(Into::into).collect())
    }
}

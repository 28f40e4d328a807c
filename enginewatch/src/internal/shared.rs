use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    ReplayBuffer, SubscriptionId, SubscriptionState, TransportError, internal::Lifecycle,
    observing::ObserverSet,
};

/// State shared between a subscription handle, its listener task and its
/// verifiers.
///
/// The listener is the only writer of confirmation and release; terminal
/// transitions can come from either side and only the first one wins.
pub(crate) struct Shared {
    pub id: SubscriptionId,
    pub lifecycle: watch::Sender<Lifecycle>,
    pub buffer: ReplayBuffer,
    pub token: CancellationToken,
    pub observers: Arc<ObserverSet>,
    cancel_requested: AtomicBool,
}

impl Shared {
    pub fn new(id: SubscriptionId, buffer: ReplayBuffer, observers: Arc<ObserverSet>) -> Self {
        let (lifecycle, _) = watch::channel(Lifecycle::default());
        Self {
            id,
            lifecycle,
            buffer,
            token: CancellationToken::new(),
            observers,
            cancel_requested: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SubscriptionState {
        self.lifecycle.borrow().state
    }

    pub fn snapshot(&self) -> Lifecycle {
        self.lifecycle.borrow().clone()
    }

    /// Unconfirmed -> Confirmed. Returns `true` on the transition only.
    pub fn confirm(&self) -> bool {
        let confirmed = self.lifecycle.send_if_modified(|l| {
            if l.state != SubscriptionState::Unconfirmed {
                return false;
            }
            l.state = SubscriptionState::Confirmed;
            true
        });
        if confirmed {
            self.observers.notify(|o| o.on_confirmed(&self.id));
        }
        confirmed
    }

    pub fn release(&self) {
        let released = self.lifecycle.send_if_modified(|l| {
            if l.released || l.state != SubscriptionState::Confirmed {
                return false;
            }
            l.released = true;
            true
        });
        if released {
            self.observers.notify(|o| o.on_released(&self.id));
        }
    }

    pub fn record(&self, payload: String) {
        let payload: Arc<str> = payload.into();
        if self.buffer.record(payload.clone()) {
            self.observers.notify(|o| o.on_message(&self.id, &payload));
        }
    }

    /// Stream ended on its own.
    pub fn complete(&self) {
        if self.buffer.complete() {
            self.observers.notify(|o| o.on_completed(&self.id));
        }
    }

    /// Move to `Errored` unless already terminal, and fail the buffer.
    pub fn fail(&self, error: TransportError) {
        let failed = self.lifecycle.send_if_modified(|l| {
            if l.state.is_terminal() {
                return false;
            }
            l.state = SubscriptionState::Errored;
            l.fault = Some(error.clone());
            true
        });
        if failed {
            self.buffer.fail(error.clone());
            self.observers.notify(|o| o.on_error(&self.id, &error));
        }
    }

    /// Idempotent. Returns `true` on the first call only.
    ///
    /// Moves to `Cancelled` and signals the listener, which cancels the
    /// transport stream, records the frames already delivered to it and then
    /// closes the buffer.
    pub fn cancel(&self) -> bool {
        if self.cancel_requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        let cancelled = self.lifecycle.send_if_modified(|l| {
            if l.state.is_terminal() {
                return false;
            }
            l.state = SubscriptionState::Cancelled;
            true
        });
        self.token.cancel();
        if cancelled {
            self.observers.notify(|o| o.on_cancelled(&self.id));
        }
        true
    }

    /// Close the buffer after a cancel. Only the listener calls this.
    pub fn close(&self) {
        self.buffer.complete();
    }

    pub fn cancel_failed(&self, error: &TransportError) {
        self.observers.notify(|o| o.on_cancel_failed(&self.id, error));
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("id", &self.id)
            .field("lifecycle", &*self.lifecycle.borrow())
            .field("buffer", &self.buffer)
            .field("cancel_requested", &self.cancel_requested)
            .finish_non_exhaustive()
    }
}

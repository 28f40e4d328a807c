use crate::{SubscriptionId, SubscriptionRequest, TransportError};

/// Receives subscription lifecycle callbacks.
///
/// All methods have no-op defaults; override the ones you need. Callbacks run
/// inline on the listener task (or on the caller for [`on_cancelled`]), so
/// they should return quickly.
///
/// # Lifecycle
///
/// 1. **Subscribed** - the request was issued, the stream is opening
/// 2. **Confirmed** - the first frame arrived, the grace timer is armed
/// 3. **Released** - the grace period passed, triggers may fire
/// 4. **Message** - once per buffered data payload
/// 5. **Completed**, **Error** or **Cancelled** - the subscription is terminal
///
/// [`on_cancelled`]: Observer::on_cancelled
pub trait Observer: Send + Sync {
    fn on_subscribed(&self, id: &SubscriptionId, request: &SubscriptionRequest) {
        let _i = id;
        let _r = request;
    }

    /// Called when the first frame is observed on the stream.
    fn on_confirmed(&self, id: &SubscriptionId) {
        let _i = id;
    }

    /// Called when the grace period elapsed and dependent triggers are released.
    fn on_released(&self, id: &SubscriptionId) {
        let _i = id;
    }

    /// Called for every data payload, after it was recorded.
    fn on_message(&self, id: &SubscriptionId, payload: &str) {
        let _i = id;
        let _p = payload;
    }

    /// Called when the transport reports a failure.
    fn on_error(&self, id: &SubscriptionId, error: &TransportError) {
        let _i = id;
        let _e = error;
    }

    /// Called when the stream ended on its own.
    fn on_completed(&self, id: &SubscriptionId) {
        let _i = id;
    }

    /// Called once, on the first effective cancel.
    fn on_cancelled(&self, id: &SubscriptionId) {
        let _i = id;
    }

    /// Called when the transport could not cancel the stream.
    ///
    /// Cancel failures never surface as errors; this hook is the only place
    /// they are reported.
    fn on_cancel_failed(&self, id: &SubscriptionId, error: &TransportError) {
        let _i = id;
        let _e = error;
    }
}

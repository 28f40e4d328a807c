use crate::{SubscriptionId, SubscriptionRequest, TransportError, observing::Observer};

/// An observer that logs the subscription lifecycle to the `tracing` crate.
///
/// Log levels:
/// - `trace` - every buffered message (high volume)
/// - `debug` - subscribed, confirmed, released, completed
/// - `warn` - stream errors and cancel failures
/// - `info` - cancelled
///
/// Installed by default on every [`SubscriptionController`](crate::SubscriptionController).
#[derive(Debug, Default)]
pub struct Tracer;

impl Observer for Tracer {
    fn on_subscribed(&self, id: &SubscriptionId, request: &SubscriptionRequest) {
        tracing::debug!(
            subscription = %id.short(),
            service = %request.service_name(),
            event_types = ?request.event_types(),
            "subscription issued"
        );
    }

    fn on_confirmed(&self, id: &SubscriptionId) {
        tracing::debug!(subscription = %id.short(), "subscription confirmed");
    }

    fn on_released(&self, id: &SubscriptionId) {
        tracing::debug!(subscription = %id.short(), "subscription released");
    }

    fn on_message(&self, id: &SubscriptionId, payload: &str) {
        tracing::trace!(subscription = %id.short(), payload = %payload, "message buffered");
    }

    fn on_error(&self, id: &SubscriptionId, error: &TransportError) {
        tracing::warn!(subscription = %id.short(), error = %error, "subscription stream error");
    }

    fn on_completed(&self, id: &SubscriptionId) {
        tracing::debug!(subscription = %id.short(), "subscription stream completed");
    }

    fn on_cancelled(&self, id: &SubscriptionId) {
        tracing::info!(subscription = %id.short(), "subscription cancelled");
    }

    fn on_cancel_failed(&self, id: &SubscriptionId, error: &TransportError) {
        tracing::warn!(subscription = %id.short(), error = %error, "failed to cancel subscription");
    }
}

//! Lifecycle hooks for subscriptions.
//!
//! Every [`SubscriptionController`](crate::SubscriptionController) notifies a
//! set of [`Observer`]s as its subscriptions move through their lifecycle:
//! subscribed, confirmed, released, messages buffered, errors, completion and
//! cancellation. [`Tracer`] is installed by default and forwards each hook to
//! `tracing`.
//!
//! # Example
//!
//! ```rust
//! use enginewatch::{SubscriptionId, observing::Observer};
//!
//! struct MessageCounter(std::sync::atomic::AtomicUsize);
//!
//! impl Observer for MessageCounter {
//!     fn on_message(&self, _id: &SubscriptionId, _payload: &str) {
//!         self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!     }
//! }
//! ```
//!
//! An observer that panics is removed from the set and the panic is logged;
//! it never takes the listener task down with it.

mod observer;
mod observer_set;
mod tracer;

pub use observer::Observer;
pub(crate) use observer_set::ObserverSet;
pub use tracer::Tracer;

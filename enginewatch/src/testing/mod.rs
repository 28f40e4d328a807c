//! In-memory collaborators for exercising subscriptions without a platform.
//!
//! Enable with the `test-harness` feature:
//!
//! ```toml
//! [dev-dependencies]
//! enginewatch = { version = "0.1", features = ["test-harness"] }
//! ```
//!
//! - [`ScriptedTransport`] hands out streams whose frames the test pushes by
//!   hand through a [`StreamScript`].
//! - [`StaticEventSource`] answers audit polls from a scripted list.
//! - [`InMemoryPlatform`] deploys small process definitions, runs them when
//!   triggered, and publishes the resulting engine events both to open
//!   subscriptions (as canonical data messages) and to its audit history.
//!
//! # Example
//!
//! ```rust,ignore
//! let platform = InMemoryPlatform::new("rb")
//!     .with_definition(ProcessDefinition::new("SimpleProcess"));
//! let controller = SubscriptionController::new(platform.clone(), WatchConfig::default());
//!
//! let subscription = controller.subscribe(request);
//! subscription
//!     .trigger(Duration::from_secs(6), || platform.start_process("SimpleProcess", &Variables::new()))
//!     .await?;
//! ```
//!
//! # Warning
//!
//! **Do not use in production.** Streams use unbounded channels and the
//! platform keeps its whole history in memory.

mod in_memory_platform;
mod scripted_transport;
mod static_event_source;

pub use in_memory_platform::{InMemoryPlatform, ProcessDefinition};
pub use scripted_transport::{ScriptedTransport, StreamScript};
pub use static_event_source::StaticEventSource;

use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#![cfg_attr(docsrs, feature(doc_cfg))]
//! # Enginewatch
//!
//! Subscribe to the live `engineEvents` notification stream of a process
//! engine, buffer what it delivers, and assert on it.
//!
//! A notification story usually goes like this: open a subscription, wait
//! until the server confirms it (plus a grace period so the platform has
//! registered the subscriber), trigger something on the platform, then check
//! that the expected data messages arrived in order. Side effects that are not
//! pushed on the stream are checked by polling the audit history instead.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use enginewatch::*;
//!
//! let controller = SubscriptionController::new(transport, WatchConfig::default());
//! let request = SubscriptionRequest::engine_events("rb", ["PROCESS_STARTED", "PROCESS_COMPLETED"]);
//! let subscription = controller.subscribe(request);
//! let mut verifier = subscription.verifier();
//!
//! // Runs once the subscription is confirmed and the grace period is over.
//! subscription
//!     .trigger(Duration::from_secs(6), || runtime.start_process("SimpleProcess", &Variables::new()))
//!     .await?;
//!
//! let selection = SelectionSet::default();
//! let started = EngineEvent::new().service_name("rb").event_type("PROCESS_STARTED");
//! let completed = EngineEvent::new().service_name("rb").event_type("PROCESS_COMPLETED");
//! verifier
//!     .expect_next([
//!         ExpectedMessage::new(&selection, [started])?,
//!         ExpectedMessage::new(&selection, [completed])?,
//!     ])
//!     .cancel_on_finish()
//!     .await?;
//! ```
//!
//! ## Core Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Transport`] | Opens an authenticated stream for a [`SubscriptionRequest`] |
//! | [`SubscriptionController`] | Spawns one listener per subscription |
//! | [`Subscription`] | Handle to confirm, trigger after, and cancel a subscription |
//! | [`ReplayBuffer`] | Records every payload so late readers still see all of them |
//! | [`StreamVerifier`] | Ordered match of the next messages against expected ones |
//! | [`poll_until_found`] | Polling match against an [`EventSource`] |
//! | [`ScenarioContext`] | State shared by the steps of one notification scenario |
//!
//! ## Features
//!
//! - **`test-harness`** - In-memory platform and scripted transports for tests
//!   ([`testing`])
//!
//! [`WatchConfig`] implements `serde::Deserialize`, so budgets can be loaded
//! from a configuration file. Missing fields keep their defaults.

mod config;
mod engine_event;
mod error;
mod replay;
mod request;
mod scenario;
mod subscription;
mod subscription_controller;
mod subscription_id;
mod subscription_state;
mod transport;
mod trigger;
mod variables;

mod internal;

pub mod matching;
pub mod observing;
pub mod wire;

#[cfg(any(test, feature = "test-harness"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-harness")))]
pub mod testing;

pub use config::WatchConfig;
pub use engine_event::{EngineEvent, EngineEventField};
pub use error::{Error, Listing, TransportError};
pub use matching::{
    AuditQuery, Comparison, EventSource, ExpectedMessage, MatchReport, OrderedMatch, PollReport,
    PollingMatch, StreamVerifier, poll_until_found,
};
pub use replay::{BufferSignal, Replay, ReplayBuffer, ReplayCapacity};
pub use request::{SelectionSet, SubscriptionRequest};
pub use scenario::{
    DEFAULT_SESSION_TIMEOUT_SECS, DEFAULT_SUBSCRIPTION_TIMEOUT_SECS, Platform, ScenarioContext,
};
pub use subscription::Subscription;
pub use subscription_controller::SubscriptionController;
pub use subscription_id::{ShortId, SubscriptionId};
pub use subscription_state::SubscriptionState;
pub use transport::{CancelHandle, Frame, FrameStream, OpenedStream, Transport};
pub use trigger::{
    ProcessInstance, ProcessQuery, ProcessRuntime, ProcessStatus, ReceiveMessage, StartMessage,
};
pub use variables::{VariableInstance, VariableKind, VariableValue, Variables};

/// Convenience alias for `Result<T, enginewatch::Error>`.
pub type Result<T = ()> = std::result::Result<T, Error>;

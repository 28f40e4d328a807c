use std::{fmt, sync::Arc};

use crate::{
    ReplayBuffer, Subscription, SubscriptionId, SubscriptionRequest, Transport, WatchConfig,
    internal::{Shared, StreamListener},
    observing::{Observer, ObserverSet, Tracer},
};

/// Issues subscriptions over a [`Transport`] and owns their listener tasks.
///
/// Each call to [`subscribe`](Self::subscribe) spawns one listener task on
/// the current Tokio runtime and returns immediately with an unconfirmed
/// [`Subscription`]. The handshake proceeds in the background.
///
/// # Example
///
/// ```rust,ignore
/// let controller = SubscriptionController::new(transport, WatchConfig::default());
/// let subscription = controller.subscribe(request);
///
/// let instance = subscription
///     .trigger(Duration::from_secs(6), || runtime.start_process("SimpleProcess"))
///     .await?;
/// ```
pub struct SubscriptionController<T: Transport> {
    transport: Arc<T>,
    config: WatchConfig,
    observers: Arc<ObserverSet>,
}

impl<T: Transport> SubscriptionController<T> {
    /// Create a controller with the [`Tracer`] observer installed.
    pub fn new(transport: T, config: WatchConfig) -> Self {
        Self::from_shared(Arc::new(transport), config)
    }

    /// Like [`new`](Self::new), for a transport that is shared elsewhere.
    pub fn from_shared(transport: Arc<T>, config: WatchConfig) -> Self {
        Self {
            transport,
            config,
            observers: Arc::new(ObserverSet::new(vec![Box::new(Tracer)])),
        }
    }

    /// Add an observer for all subscriptions issued from now on.
    pub fn with_observer(self, observer: impl Observer + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Issue a subscription and start listening in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(&self, request: SubscriptionRequest) -> Subscription {
        let id = SubscriptionId::new();
        let buffer = ReplayBuffer::new(self.config.replay_capacity());
        let shared = Arc::new(Shared::new(id, buffer, self.observers.clone()));

        self.observers.notify(|o| o.on_subscribed(&id, &request));

        let listener = StreamListener {
            transport: self.transport.clone(),
            request,
            shared: shared.clone(),
            grace_period: self.config.grace_period(),
        };
        tokio::spawn(listener.run());

        Subscription::new(shared, self.config.clone())
    }
}

impl<T: Transport> fmt::Debug for SubscriptionController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionController")
            .field("config", &self.config)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

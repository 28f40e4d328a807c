mod lifecycle;
mod listener;
mod shared;

pub(crate) use lifecycle::Lifecycle;
pub(crate) use listener::StreamListener;
pub(crate) use shared::Shared;

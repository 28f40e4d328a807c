use std::future::Future;

use futures_util::stream::BoxStream;

use crate::{SubscriptionRequest, TransportError};

/// A frame delivered by the streaming transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// The server acknowledged the subscription.
    Ack,
    /// A data message, kept as the raw text the server sent.
    Data(String),
}

/// Lazy, non-restartable sequence of frames from one open stream.
pub type FrameStream = BoxStream<'static, Result<Frame, TransportError>>;

/// Stops delivery on an open stream.
///
/// Called at most once per stream. Failures are logged by the caller and
/// never escalated.
pub trait CancelHandle: Send + Sync + 'static {
    fn cancel(&self) -> Result<(), TransportError>;
}

impl<F> CancelHandle for F
where
    F: Fn() -> Result<(), TransportError> + Send + Sync + 'static,
{
    fn cancel(&self) -> Result<(), TransportError> {
        self()
    }
}

/// An authenticated stream opened by a [`Transport`].
pub struct OpenedStream {
    pub frames: FrameStream,
    pub cancel: Box<dyn CancelHandle>,
}

impl OpenedStream {
    pub fn new(frames: FrameStream, cancel: impl CancelHandle) -> Self {
        Self {
            frames,
            cancel: Box::new(cancel),
        }
    }
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream").finish_non_exhaustive()
    }
}

/// Client side of the subscription endpoint.
///
/// Implementations open an authenticated streaming connection for the given
/// request (query, variables and bearer token) and hand back the frame
/// sequence together with a way to cancel it. The first frame, whether an
/// explicit [`Frame::Ack`] or the first data message, marks the stream live.
///
/// Methods return futures but can be implemented as `async fn` directly.
pub trait Transport: Send + Sync + 'static {
    fn open_stream(
        &self,
        request: &SubscriptionRequest,
    ) -> impl Future<Output = Result<OpenedStream, TransportError>> + Send;
}

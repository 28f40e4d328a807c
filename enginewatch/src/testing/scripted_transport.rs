use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex},
};

use futures_util::StreamExt;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    Frame, OpenedStream, SubscriptionRequest, Transport, TransportError, testing::lock,
};

type FrameSender = UnboundedSender<Result<Frame, TransportError>>;
type FrameReceiver = UnboundedReceiver<Result<Frame, TransportError>>;

enum Scripted {
    Stream(FrameReceiver),
    OpenFailure(TransportError),
}

#[derive(Default)]
struct Script {
    pending: VecDeque<Scripted>,
    requests: Vec<SubscriptionRequest>,
    // Keeps unscripted streams open forever.
    idle: Vec<FrameSender>,
    cancel_calls: usize,
    cancel_failure: Option<TransportError>,
}

/// A [`Transport`] whose streams are driven by the test.
///
/// Every [`next_stream`](Self::next_stream) call queues one stream for the
/// next `open_stream`; the returned [`StreamScript`] pushes its frames.
/// Opening more streams than were scripted yields streams that stay silent.
/// Clones share the same script.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a stream for the next open and return its script.
    pub fn next_stream(&self) -> StreamScript {
        let (sender, receiver) = unbounded_channel();
        lock(&self.script)
            .pending
            .push_back(Scripted::Stream(receiver));
        StreamScript { sender }
    }

    /// Make the next open fail with `error`.
    pub fn fail_next_open(&self, error: TransportError) {
        lock(&self.script)
            .pending
            .push_back(Scripted::OpenFailure(error));
    }

    /// Make every cancel from now on fail with `error`.
    pub fn fail_cancels(&self, error: TransportError) {
        lock(&self.script).cancel_failure = Some(error);
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<SubscriptionRequest> {
        lock(&self.script).requests.clone()
    }

    /// How many times a stream cancel handle was called.
    pub fn cancel_count(&self) -> usize {
        lock(&self.script).cancel_calls
    }
}

impl Transport for ScriptedTransport {
    async fn open_stream(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<OpenedStream, TransportError> {
        let receiver = {
            let mut script = lock(&self.script);
            script.requests.push(request.clone());
            match script.pending.pop_front() {
                Some(Scripted::Stream(receiver)) => receiver,
                Some(Scripted::OpenFailure(e)) => return Err(e),
                None => {
                    let (sender, receiver) = unbounded_channel();
                    script.idle.push(sender);
                    receiver
                }
            }
        };

        let script = self.script.clone();
        Ok(OpenedStream::new(
            UnboundedReceiverStream::new(receiver).boxed(),
            move || {
                let mut script = lock(&script);
                script.cancel_calls += 1;
                match &script.cancel_failure {
                    Some(e) => Err(e.clone()),
                    None => Ok(()),
                }
            },
        ))
    }
}

impl fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let script = lock(&self.script);
        f.debug_struct("ScriptedTransport")
            .field("pending", &script.pending.len())
            .field("requests", &script.requests.len())
            .field("cancel_calls", &script.cancel_calls)
            .finish()
    }
}

/// Pushes frames into one scripted stream. Dropping it ends the stream.
#[derive(Debug)]
pub struct StreamScript {
    sender: FrameSender,
}

impl StreamScript {
    pub fn ack(&self) {
        let _ = self.sender.send(Ok(Frame::Ack));
    }

    pub fn data(&self, payload: impl Into<String>) {
        let _ = self.sender.send(Ok(Frame::Data(payload.into())));
    }

    pub fn error(&self, error: TransportError) {
        let _ = self.sender.send(Err(error));
    }

    /// End the stream.
    pub fn close(self) {}
}

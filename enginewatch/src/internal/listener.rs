use std::{pin::Pin, sync::Arc, time::Duration};

use futures_util::{FutureExt, StreamExt};
use tokio::{
    select,
    time::{Sleep, sleep},
};

use crate::{
    Frame, FrameStream, OpenedStream, SubscriptionRequest, SubscriptionState, Transport, TransportError,
    internal::Shared,
};

/// The task that drives one subscription's transport stream.
///
/// Opens the stream, confirms on the first frame, holds triggers back for
/// the grace period, and records every data frame into the buffer in
/// arrival order until the stream ends, fails or is cancelled.
pub(crate) struct StreamListener<T: Transport> {
    pub(crate) transport: Arc<T>,
    pub(crate) request: SubscriptionRequest,
    pub(crate) shared: Arc<Shared>,
    pub(crate) grace_period: Duration,
}

impl<T: Transport> StreamListener<T> {
    pub async fn run(self) {
        let opened = select! {
            biased;

            _ = self.shared.token.cancelled() => {
                self.shared.close();
                return;
            }
            opened = self.transport.open_stream(&self.request) => opened,
        };

        let OpenedStream { mut frames, cancel } = match opened {
            Ok(stream) => stream,
            Err(e) => {
                self.shared.fail(e);
                return;
            }
        };

        let mut grace: Option<Pin<Box<Sleep>>> = None;
        let mut stream_done = false;

        loop {
            select! {
                biased;

                _ = self.shared.token.cancelled() => {
                    if let Err(e) = cancel.cancel() {
                        self.shared.cancel_failed(&e);
                    }
                    if !stream_done {
                        self.drain_ready(&mut frames);
                    }
                    self.shared.close();
                    break;
                }

                _ = async {
                    if let Some(grace_sleep) = grace.as_mut() {
                        grace_sleep.as_mut().await;
                    }
                }, if grace.is_some() => {
                    let _ = grace.take();
                    self.shared.release();
                    if stream_done {
                        break;
                    }
                }

                frame = frames.next(), if !stream_done => match frame {
                    Some(Ok(frame)) => {
                        if self.shared.confirm() {
                            grace.replace(Box::pin(sleep(self.grace_period)));
                        }
                        if let Frame::Data(payload) = frame {
                            self.shared.record(payload);
                        }
                    }
                    Some(Err(e)) => {
                        self.shared.fail(e);
                        if let Err(e) = cancel.cancel() {
                            self.shared.cancel_failed(&e);
                        }
                        break;
                    }
                    None => {
                        stream_done = true;
                        if self.shared.state() == SubscriptionState::Unconfirmed {
                            self.shared.fail(TransportError::ClosedBeforeConfirmation);
                            break;
                        }
                        self.shared.complete();
                        if grace.is_none() {
                            break;
                        }
                    }
                },
            }
        }
    }

    /// Record the data frames the transport has already delivered, without
    /// waiting for more.
    fn drain_ready(&self, frames: &mut FrameStream) {
        while let Some(Some(frame)) = frames.next().now_or_never() {
            match frame {
                Ok(Frame::Data(payload)) => self.shared.record(payload),
                Ok(Frame::Ack) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "stream error after cancel ignored");
                    break;
                }
            }
        }
    }
}

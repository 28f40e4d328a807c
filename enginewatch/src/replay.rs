use std::{collections::VecDeque, fmt, sync::Arc};

use futures_util::stream::{self, Stream};
use tokio::sync::watch;

use crate::TransportError;

/// How many payloads a [`ReplayBuffer`] retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum ReplayCapacity {
    /// Keep the whole history.
    #[default]
    Unbounded,
    /// Keep only the most recent `n` payloads.
    ///
    /// A reader that falls behind skips ahead to the oldest retained payload.
    /// Zero is treated as one.
    Bounded(usize),
}

/// What a [`Replay`] reader observes, in record order.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferSignal {
    Message(Arc<str>),
    Complete,
    Failed(TransportError),
}

#[derive(Debug, Clone)]
enum Terminal {
    Complete,
    Failed(TransportError),
}

#[derive(Debug, Default)]
struct BufferState {
    items: VecDeque<Arc<str>>,
    evicted: usize,
    terminal: Option<Terminal>,
}

impl BufferState {
    fn recorded(&self) -> usize {
        self.evicted + self.items.len()
    }
}

/// Append-only, replay-capable store of raw stream payloads.
///
/// Every payload recorded is visible to readers attached before or after the
/// call, in record order. Completion (or failure) is terminal: later records
/// are ignored, the history stays readable, and each reader observes the
/// terminal signal exactly once, after everything recorded before it.
///
/// Recording never waits on readers. Clones share the same buffer.
///
/// # Example
///
/// ```rust
/// use enginewatch::{BufferSignal, ReplayBuffer};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let buffer = ReplayBuffer::default();
/// buffer.record("first");
/// buffer.complete();
///
/// let mut replay = buffer.attach();
/// assert_eq!(replay.next().await, Some(BufferSignal::Message("first".into())));
/// assert_eq!(replay.next().await, Some(BufferSignal::Complete));
/// assert_eq!(replay.next().await, None);
/// # }
/// ```
#[derive(Clone)]
pub struct ReplayBuffer {
    state: Arc<watch::Sender<BufferState>>,
    capacity: ReplayCapacity,
}

impl ReplayBuffer {
    pub fn new(capacity: ReplayCapacity) -> Self {
        let (tx, _rx) = watch::channel(BufferState::default());
        let capacity = match capacity {
            ReplayCapacity::Bounded(0) => ReplayCapacity::Bounded(1),
            other => other,
        };
        Self {
            state: Arc::new(tx),
            capacity,
        }
    }

    /// Append one payload. Returns `false` if the buffer is already terminal.
    pub fn record(&self, payload: impl Into<Arc<str>>) -> bool {
        let payload = payload.into();
        let capacity = self.capacity;
        self.state.send_if_modified(move |state| {
            if state.terminal.is_some() {
                return false;
            }
            state.items.push_back(payload);
            if let ReplayCapacity::Bounded(max) = capacity {
                while state.items.len() > max {
                    state.items.pop_front();
                    state.evicted += 1;
                }
            }
            true
        })
    }

    /// Mark the buffer complete. Returns `false` if it was already terminal.
    pub fn complete(&self) -> bool {
        self.terminate(Terminal::Complete)
    }

    /// Mark the buffer failed. Returns `false` if it was already terminal.
    pub fn fail(&self, error: TransportError) -> bool {
        self.terminate(Terminal::Failed(error))
    }

    fn terminate(&self, terminal: Terminal) -> bool {
        self.state.send_if_modified(move |state| {
            if state.terminal.is_some() {
                return false;
            }
            state.terminal = Some(terminal);
            true
        })
    }

    /// Attach a reader that starts at the oldest retained payload.
    pub fn attach(&self) -> Replay {
        Replay {
            receiver: self.state.subscribe(),
            cursor: 0,
            finished: false,
        }
    }

    /// Number of payloads recorded so far, including evicted ones.
    pub fn len(&self) -> usize {
        self.state.borrow().recorded()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_terminal(&self) -> bool {
        self.state.borrow().terminal.is_some()
    }

    /// Copy of the retained payloads.
    pub fn snapshot(&self) -> Vec<Arc<str>> {
        self.state.borrow().items.iter().cloned().collect()
    }

    pub fn capacity(&self) -> ReplayCapacity {
        self.capacity
    }
}

impl Default for ReplayBuffer {
    fn default() -> Self {
        ReplayBuffer::new(ReplayCapacity::Unbounded)
    }
}

impl fmt::Debug for ReplayBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ReplayBuffer")
            .field("recorded", &state.recorded())
            .field("retained", &state.items.len())
            .field("terminal", &state.terminal.is_some())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// A reader over a [`ReplayBuffer`].
///
/// Yields the recorded history, then live payloads as they arrive, then the
/// terminal signal once, then `None`.
pub struct Replay {
    receiver: watch::Receiver<BufferState>,
    cursor: usize,
    finished: bool,
}

impl Replay {
    /// Wait for the next signal.
    pub async fn next(&mut self) -> Option<BufferSignal> {
        if self.finished {
            return None;
        }
        loop {
            if let Some(signal) = self.take_next(true) {
                return Some(signal);
            }
            if self.receiver.changed().await.is_err() {
                // Every buffer handle is gone: what is left is all there will be.
                return Some(self.take_next(false).unwrap_or_else(|| {
                    self.finished = true;
                    BufferSignal::Complete
                }));
            }
        }
    }

    /// Returns the next signal if one is available without waiting.
    pub fn try_next(&mut self) -> Option<BufferSignal> {
        if self.finished {
            return None;
        }
        self.take_next(true)
    }

    /// Position of the next payload this reader will return.
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Adapt this reader into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = BufferSignal> + Send + 'static {
        stream::unfold(self, |mut replay| async move {
            replay.next().await.map(|signal| (signal, replay))
        })
    }

    fn take_next(&mut self, mark_seen: bool) -> Option<BufferSignal> {
        let state = if mark_seen {
            self.receiver.borrow_and_update()
        } else {
            self.receiver.borrow()
        };

        if self.cursor < state.evicted {
            tracing::warn!(
                skipped = state.evicted - self.cursor,
                "replay reader fell behind bounded buffer"
            );
            self.cursor = state.evicted;
        }

        if let Some(item) = state.items.get(self.cursor - state.evicted) {
            self.cursor += 1;
            return Some(BufferSignal::Message(item.clone()));
        }

        match &state.terminal {
            Some(Terminal::Complete) => {
                self.finished = true;
                Some(BufferSignal::Complete)
            }
            Some(Terminal::Failed(e)) => {
                self.finished = true;
                Some(BufferSignal::Failed(e.clone()))
            }
            None => None,
        }
    }
}

impl fmt::Debug for Replay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replay")
            .field("cursor", &self.cursor)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

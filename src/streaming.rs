//! Bridge from the synchronous observer to async consumers via channels.

use tokio::sync::mpsc;

use crate::errors::EdgeLmError;
use crate::io::{InferenceObserver, Responses};

/// Event emitted over the channel during streaming generation.
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    /// One decode step's released text (and scores, under external
    /// sampling).
    Chunk(Responses),
    Error(String),
    Done,
}

/// An [`InferenceObserver`] that forwards events into a tokio mpsc channel
/// so an async task can consume them while the decode loop runs on a
/// blocking thread. Unbounded because observer callbacks are synchronous
/// and must not block the loop.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<GenerationEvent>,
}

impl ChannelObserver {
    /// Create the observer and the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GenerationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl InferenceObserver for ChannelObserver {
    fn on_next(&mut self, responses: Responses) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.tx.send(GenerationEvent::Chunk(responses));
    }

    fn on_error(&mut self, error: &EdgeLmError) {
        let _ = self.tx.send(GenerationEvent::Error(error.to_string()));
    }

    fn on_done(&mut self) {
        let _ = self.tx.send(GenerationEvent::Done);
    }
}

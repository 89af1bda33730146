//! Bounded channels connecting pipeline stages.
//!
//! A stage reads from an [`Input`] and writes to an [`Output`]. Both are thin
//! wrappers over a fixed-capacity crossbeam channel: sends block while the
//! channel is full, receives block while it is empty, and dropping the last
//! `Output` closes the channel so readers see the end of the stream once the
//! buffered items are gone.

use crate::error::{FilterError, Result};
use crossbeam_channel::{Receiver, Sender};

/// Capacity of every channel the engine allocates between stages.
pub const CHANNEL_CAPACITY: usize = 1000;

/// Receiving end of a stage's input stream.
#[derive(Debug, Clone)]
pub struct Input {
    rx: Receiver<String>,
}

impl Input {
    /// Block until the next item arrives. Returns `None` once the channel
    /// is closed and empty.
    pub fn recv(&self) -> Option<String> {
        self.rx.recv().ok()
    }

    /// Iterate over items until the stream ends.
    pub fn iter(&self) -> crossbeam_channel::Iter<'_, String> {
        self.rx.iter()
    }

    /// Read and discard everything left in the stream, returning the number
    /// of items thrown away.
    pub fn drain(&self) -> usize {
        self.rx.iter().count()
    }
}

impl<'a> IntoIterator for &'a Input {
    type Item = String;
    type IntoIter = crossbeam_channel::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.rx.iter()
    }
}

/// Sending end of a stage's output stream.
#[derive(Debug, Clone)]
pub struct Output {
    tx: Sender<String>,
}

impl Output {
    /// Emit one item, blocking while the channel is full.
    pub fn send(&self, item: impl Into<String>) -> Result<()> {
        self.tx
            .send(item.into())
            .map_err(|_| FilterError::ChannelClosed)
    }
}

/// Allocate a bounded channel with the given capacity.
pub fn bounded(capacity: usize) -> (Output, Input) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (Output { tx }, Input { rx })
}

/// An input that is already closed and holds no items.
pub fn closed() -> Input {
    let (_, input) = bounded(0);
    input
}

use tokio::sync::mpsc;

use crate::engine::{SinkClosed, TokenSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCapacity {
    Bounded(usize),
    Unbounded,
}

impl Default for ChannelCapacity {
    fn default() -> Self {
        ChannelCapacity::Bounded(128)
    }
}

/// Producer side. Dropping it closes the channel.
pub enum FragmentSender {
    Bounded(mpsc::Sender<String>),
    Unbounded(mpsc::UnboundedSender<String>),
}

pub enum FragmentReceiver {
    Bounded(mpsc::Receiver<String>),
    Unbounded(mpsc::UnboundedReceiver<String>),
}

pub fn fragment_channel(capacity: ChannelCapacity) -> (FragmentSender, FragmentReceiver) {
    match capacity {
        ChannelCapacity::Bounded(n) => {
            let (tx, rx) = mpsc::channel(n.max(1));
            (FragmentSender::Bounded(tx), FragmentReceiver::Bounded(rx))
        }
        ChannelCapacity::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (FragmentSender::Unbounded(tx), FragmentReceiver::Unbounded(rx))
        }
    }
}

impl TokenSink for FragmentSender {
    /// Must be called from a blocking thread; waits while a bounded channel is full.
    fn send(&mut self, fragment: String) -> Result<(), SinkClosed> {
        match self {
            FragmentSender::Bounded(tx) => tx.blocking_send(fragment).map_err(|_| SinkClosed),
            FragmentSender::Unbounded(tx) => tx.send(fragment).map_err(|_| SinkClosed),
        }
    }
}

impl FragmentReceiver {
    /// Next fragment in production order, `None` once the sender is gone.
    pub async fn recv(&mut self) -> Option<String> {
        match self {
            FragmentReceiver::Bounded(rx) => rx.recv().await,
            FragmentReceiver::Unbounded(rx) => rx.recv().await,
        }
    }
}

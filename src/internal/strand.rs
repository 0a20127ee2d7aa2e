use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::Event;

/// Work executed on a channel's serialization point.
#[derive(Debug)]
pub(crate) enum Op {
    /// Pop and dispatch the oldest event of the channel's LocalBus.
    Dispatch,
    /// Frame and write an event to the transport.
    Write(Event),
}

/// Submission side of a channel's serialization point.
///
/// Operations run one at a time in submission order on the single task that
/// owns the receiver. Posting never blocks.
#[derive(Debug, Clone)]
pub(crate) struct Strand {
    sender: UnboundedSender<Op>,
}

impl Strand {
    pub fn new() -> (Strand, UnboundedReceiver<Op>) {
        let (sender, receiver) = unbounded_channel();
        (Strand { sender }, receiver)
    }

    /// Returns false once the executing task is gone.
    pub fn post(&self, op: Op) -> bool {
        self.sender.send(op).is_ok()
    }
}

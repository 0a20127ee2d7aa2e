use tokio::sync::mpsc::UnboundedSender;

use crate::{Event, SubscriberId};

/// The GlobalBus side of a subscriber's private queue.
#[derive(Debug, Clone)]
pub(crate) struct Inbox {
    pub id: SubscriberId,
    sender: UnboundedSender<Event>,
}

impl Inbox {
    pub fn new(id: SubscriberId, sender: UnboundedSender<Event>) -> Self {
        Self { id, sender }
    }

    /// Hands a copy to the subscriber; false if it no longer exists.
    pub fn push(&self, event: Event) -> bool {
        self.sender.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl PartialEq for Inbox {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Inbox {}

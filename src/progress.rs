/// Outcome of one [`Subscriber::process_events`](crate::Subscriber::process_events) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Nothing was queued.
    Idle,
    /// The head event had no handler and was dropped.
    Undeliverable,
    /// At least one handler isn't done; the same event stays at the head.
    Pending,
    /// Every handler finished; the event was removed from the queue.
    Done,
}

impl Progress {
    /// Whether the queue advanced (or had nothing to advance).
    pub fn is_settled(&self) -> bool {
        !matches!(self, Progress::Pending)
    }
}

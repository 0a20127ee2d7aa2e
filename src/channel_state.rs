use std::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};

/// Lifecycle of a [`Channel`](crate::Channel).
///
/// `Idle → Reading ⇄ Dispatching → Closed`; `Closed` is terminal and can be
/// entered from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ChannelState {
    #[default]
    Idle = 0,
    Reading = 1,
    Dispatching = 2,
    Closed = 3,
}

impl ChannelState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ChannelState::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ChannelState::Reading | ChannelState::Dispatching)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ChannelState::Closed)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Idle,
            1 => ChannelState::Reading,
            2 => ChannelState::Dispatching,
            _ => ChannelState::Closed,
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Idle => write!(f, "Idle"),
            ChannelState::Reading => write!(f, "Reading"),
            ChannelState::Dispatching => write!(f, "Dispatching"),
            ChannelState::Closed => write!(f, "Closed"),
        }
    }
}

/// Shared, lock-free holder of a [`ChannelState`].
#[derive(Debug, Default)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn load(&self) -> ChannelState {
        ChannelState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves between running states; never leaves `Closed`.
    pub fn transition(&self, to: ChannelState) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ChannelState::Closed as u8).then_some(to as u8)
            })
            .is_ok()
    }

    /// Enters `Closed`; returns whether this call did it.
    pub fn close(&self) -> bool {
        self.0.swap(ChannelState::Closed as u8, Ordering::AcqRel) != ChannelState::Closed as u8
    }
}

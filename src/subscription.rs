use std::fmt;

use crate::Uid;

/// Key under which handlers and subscribers are registered.
///
/// Kept apart from [`Uid`] so that "every event" is never confused with the
/// unassigned UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Subscription {
    /// Catch-all: matched by every event, after its uid-specific bindings.
    All,
    /// Matched by events carrying exactly this UID.
    Uid(Uid),
}

impl Subscription {
    /// Whether an event with `uid` is routed to this key.
    pub fn matches(&self, uid: Uid) -> bool {
        match self {
            Subscription::All => true,
            Subscription::Uid(own) => *own == uid,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Subscription::All)
    }

    /// Keys visited when routing an event, in dispatch order.
    pub(crate) fn route(uid: Uid) -> [Subscription; 2] {
        [Subscription::Uid(uid), Subscription::All]
    }
}

impl From<Uid> for Subscription {
    fn from(uid: Uid) -> Self {
        Subscription::Uid(uid)
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subscription::All => write!(f, "*"),
            Subscription::Uid(uid) => write!(f, "uid:{uid}"),
        }
    }
}

use std::fmt;

/// One-byte identifier of an event kind, carried in the first byte of every frame.
///
/// `Uid::UNASSIGNED` (0) marks an event that has no kind yet. It is *not* a
/// wildcard: subscribing to every event is expressed with
/// [`Subscription::All`](crate::Subscription::All).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Uid(u8);

impl Uid {
    pub const UNASSIGNED: Uid = Uid(0);

    #[inline]
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn is_unassigned(self) -> bool {
        self.0 == 0
    }
}

impl From<u8> for Uid {
    fn from(value: u8) -> Self {
        Uid(value)
    }
}

impl From<Uid> for u8 {
    fn from(uid: Uid) -> Self {
        uid.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Application-level naming of the UID space.
///
/// Implement this for a fieldless enum whose discriminants are the wire UIDs,
/// usually through `#[derive(EventKind)]`, which also provides
/// `From<Kind> for Uid` and `From<Kind> for Subscription`.
pub trait EventKind: Sized {
    /// The wire identifier of this kind.
    fn uid(&self) -> Uid;

    /// Human-readable name, used in logs.
    fn name(&self) -> &'static str;

    /// Maps a wire identifier back onto a kind, if it names one.
    fn from_uid(uid: Uid) -> Option<Self>;
}

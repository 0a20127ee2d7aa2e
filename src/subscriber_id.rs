use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`Subscriber`](crate::Subscriber) on the [`GlobalBus`](crate::GlobalBus).
///
/// Every subscriber draws a process-unique serial at creation, so two
/// subscribers with the same name remain distinct. Ids are cheap to clone and
/// show up in log fields and `unsubscribe` lookups.
#[derive(Debug, Clone)]
pub struct SubscriberId {
    serial: u64,
    name: Arc<str>,
}

impl SubscriberId {
    pub(crate) fn next(name: Arc<str>) -> Self {
        Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            name,
        }
    }

    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// The name the subscriber was created with.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for SubscriberId {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial
    }
}

impl Eq for SubscriberId {}

impl Hash for SubscriberId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serial.hash(state);
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.serial)
    }
}

use std::{collections::BTreeMap, fmt, ops, str::FromStr};

use bytes::Bytes;

use crate::Uid;

/// Per-event option bits, the second byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Options(u8);

impl Options {
    /// The body is an opaque payload, not property records.
    pub const NO_FORMAT: Options = Options(0x01);
    /// The body went through the compressor.
    pub const COMPRESSED: Options = Options(0x02);
    /// The event is meant for local consumers only.
    pub const IS_LOCAL: Options = Options(0x04);
    pub const BROADCAST: Options = Options(0x08);

    const KNOWN: u8 = 0x0f;

    pub const fn empty() -> Self {
        Options(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Keeps every bit, including ones this crate doesn't interpret.
    pub const fn from_bits(bits: u8) -> Self {
        Options(bits)
    }

    /// Bits outside the four named flags, as sent by the peer.
    pub const fn unknown_bits(self) -> u8 {
        self.0 & !Self::KNOWN
    }

    #[inline]
    pub fn contains(self, other: Options) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: Options) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: Options) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl ops::BitOr for Options {
    type Output = Options;
    fn bitor(self, rhs: Options) -> Options {
        Options(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for Options {
    fn bitor_assign(&mut self, rhs: Options) {
        self.insert(rhs);
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Options::NO_FORMAT, "NoFormat"),
            (Options::COMPRESSED, "Compressed"),
            (Options::IS_LOCAL, "IsLocal"),
            (Options::BROADCAST, "Broadcast"),
        ];
        let set: Vec<_> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        match (set.is_empty(), self.unknown_bits()) {
            (true, 0) => write!(f, "-"),
            (false, 0) => write!(f, "{}", set.join("|")),
            (true, extra) => write!(f, "{extra:#04x}"),
            (false, extra) => write!(f, "{}|{extra:#04x}", set.join("|")),
        }
    }
}

/// Status carried in the third byte of a frame.
///
/// Codes without a name here are application-defined and travel as
/// [`Feedback::Other`]. Converting from a byte always picks the named variant
/// when there is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Feedback {
    #[default]
    Unassigned,
    Ok,
    Error,
    InvalidRequest,
    SanityCheck,
    Other(u8),
}

impl From<u8> for Feedback {
    fn from(value: u8) -> Self {
        match value {
            0 => Feedback::Unassigned,
            1 => Feedback::Ok,
            2 => Feedback::Error,
            3 => Feedback::InvalidRequest,
            4 => Feedback::SanityCheck,
            other => Feedback::Other(other),
        }
    }
}

impl From<Feedback> for u8 {
    fn from(feedback: Feedback) -> Self {
        match feedback {
            Feedback::Unassigned => 0,
            Feedback::Ok => 1,
            Feedback::Error => 2,
            Feedback::InvalidRequest => 3,
            Feedback::SanityCheck => 4,
            Feedback::Other(code) => code,
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::Unassigned => write!(f, "Unassigned"),
            Feedback::Ok => write!(f, "Ok"),
            Feedback::Error => write!(f, "Error"),
            Feedback::InvalidRequest => write!(f, "InvalidRequest"),
            Feedback::SanityCheck => write!(f, "SanityCheck"),
            Feedback::Other(code) => write!(f, "Other({code})"),
        }
    }
}

/// A unit of communication: what a frame carries and what buses route.
///
/// Events are plain values. Every queue they pass through keeps its own copy,
/// so an event is cloned whenever more than one owner needs it.
///
/// `length`, `checksum` and `rawsize` are filled by the codec when a frame is
/// decoded and are left out of equality.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub uid: Uid,
    pub options: Options,
    pub feedback: Feedback,
    properties: BTreeMap<String, String>,
    payload: Bytes,
    length: u32,
    checksum: u32,
    rawsize: usize,
}

impl Event {
    pub fn new(uid: impl Into<Uid>) -> Self {
        Self {
            uid: uid.into(),
            ..Default::default()
        }
    }

    pub fn with_feedback(mut self, feedback: Feedback) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options |= options;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set_property(key, value);
        self
    }

    /// Turns the event into an opaque blob carrier (sets `NO_FORMAT`).
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self.options.insert(Options::NO_FORMAT);
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Parses a property value, e.g. `event.property_as::<i32>("hp")`.
    pub fn property_as<T: FromStr>(&self, key: &str) -> Option<Result<T, T::Err>> {
        self.property(key).map(str::parse)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl ToString) {
        self.properties.insert(key.into(), value.to_string());
    }

    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        self.properties.remove(key)
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn is_local(&self) -> bool {
        self.options.contains(Options::IS_LOCAL)
    }

    /// Body size on the wire, as read from the last decoded frame.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// CRC32 of the wire body, as read from the last decoded frame.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Bytes consumed from the stream to decode this event.
    pub fn rawsize(&self) -> usize {
        self.rawsize
    }

    /// Clears everything back to an unassigned, empty event.
    pub fn reset(&mut self) {
        *self = Event::default();
    }

    pub(crate) fn from_wire(
        uid: Uid,
        options: Options,
        feedback: Feedback,
        body: Body,
        framing: Framing,
    ) -> Self {
        let (properties, payload) = match body {
            Body::Properties(p) => (p, Bytes::new()),
            Body::Payload(b) => (BTreeMap::new(), b),
        };
        Self {
            uid,
            options,
            feedback,
            properties,
            payload,
            length: framing.length,
            checksum: framing.checksum,
            rawsize: framing.rawsize,
        }
    }
}

pub(crate) enum Body {
    Properties(BTreeMap<String, String>),
    Payload(Bytes),
}

pub(crate) struct Framing {
    pub length: u32,
    pub checksum: u32,
    pub rawsize: usize,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
            && self.options == other.options
            && self.feedback == other.feedback
            && self.properties == other.properties
            && self.payload == other.payload
    }
}

impl Eq for Event {}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event[uid={} options={} feedback={} length={} rawsize={}]",
            self.uid, self.options, self.feedback, self.length, self.rawsize
        )?;
        if self.options.contains(Options::NO_FORMAT) {
            write!(f, " payload={}B", self.payload.len())
        } else {
            for (key, value) in &self.properties {
                write!(f, " {key}={value:?}")?;
            }
            Ok(())
        }
    }
}

//! Wirebus - framed event transport and dispatch
//!
//! Events are small records (a one-byte UID, option flags, a feedback code and
//! either string properties or an opaque payload) exchanged over persistent
//! byte streams. Each [`Channel`] frames, checksums and validates them, then
//! hands inbound events to its [`LocalBus`]. A [`GlobalBus`] fans events out to
//! [`Subscriber`]s whose handlers may take several ticks to finish.
//!
//! See `demos/relay.rs`.

mod channel;
mod channel_state;
mod compressor;
mod config;
mod error;
mod event;
mod global_bus;
mod local_bus;
mod progress;
mod subscriber;
mod subscriber_id;
mod subscription;
mod uid;

pub mod codec;

mod internal;

pub use channel::{Channel, Transport};
pub use channel_state::ChannelState;
pub use codec::EventCodec;
pub use compressor::Compressor;
#[cfg(feature = "compression")]
pub use compressor::Deflate;
pub use config::{Config, Configurable, Configurator};
pub use error::Error;
pub use event::{Event, Feedback, Options};
pub use global_bus::GlobalBus;
pub use local_bus::{LocalBus, LocalHandler};
pub use progress::Progress;
pub use subscriber::{Handler, Subscriber};
pub use subscriber_id::SubscriberId;
pub use subscription::Subscription;
pub use uid::{EventKind, Uid};

#[cfg(feature = "macros")]
pub use wirebus_macros::EventKind;

pub type Result<T = ()> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::channel::Channel;
    pub use crate::error::Error as WirebusError;
    pub use crate::event::Event;
    pub use crate::global_bus::GlobalBus;
    pub use crate::local_bus::LocalBus;
    pub use crate::progress::Progress;
    pub use crate::subscriber::Subscriber;
    pub use crate::subscription::Subscription;
    pub use crate::uid::{EventKind, Uid};
}

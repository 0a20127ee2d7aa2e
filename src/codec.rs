//! Wire format of an event frame.
//!
//! ```text
//! [uid:1][options:1][feedback:1][length:4][body:length][crc32:4][footer:4]
//! ```
//!
//! Integers are big-endian. The footer is the literal `\r\n\r\n`. The frame
//! end is located through `length` and the footer is then checked at that
//! exact position, so bodies may contain the footer bytes themselves.
//!
//! A formatted body is a sequence of property records, each
//! `key 0x1F value 0x1E`. An unformatted (`NO_FORMAT`) body is opaque.
//! The checksum covers the body exactly as transmitted, i.e. after
//! compression.

use std::{collections::BTreeMap, fmt, sync::Arc};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    Config, Error, Event, Feedback, Options, Result, Uid,
    compressor::Compressor,
    event::{Body, Framing},
};

pub const HEADER_LEN: usize = 7;
pub const CHECKSUM_LEN: usize = 4;
pub const FOOTER: &[u8; 4] = b"\r\n\r\n";
pub const FOOTER_LEN: usize = FOOTER.len();

/// Separates a property key from its value.
pub const FIELD_SEPARATOR: u8 = 0x1f;
/// Terminates a property record.
pub const RECORD_SEPARATOR: u8 = 0x1e;

const TRAILER_LEN: usize = CHECKSUM_LEN + FOOTER_LEN;

/// Encodes and decodes event frames.
///
/// Holds no per-stream state: a frame is either complete in the buffer or
/// left untouched. Cloning is cheap; the compressor is shared.
#[derive(Clone)]
pub struct EventCodec {
    max_frame_size: usize,
    compressor: Option<Arc<dyn Compressor>>,
}

impl EventCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            compressor: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_frame_size)
    }

    pub fn with_compressor<C: Compressor>(mut self, compressor: C) -> Self {
        self.compressor = Some(Arc::new(compressor));
        self
    }

    pub fn with_shared_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Decodes the first frame of `src` without consuming anything.
    ///
    /// Returns `Ok(None)` while the frame is incomplete, or the event and
    /// the number of bytes it occupies.
    pub fn decode_frame(&self, src: &[u8]) -> Result<Option<(Event, usize)>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let uid = Uid::new(src[0]);
        let options = Options::from_bits(src[1]);
        let feedback = Feedback::from(src[2]);
        let length = u32::from_be_bytes([src[3], src[4], src[5], src[6]]);
        let body_len = length as usize;

        if body_len > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                size: body_len,
                max: self.max_frame_size,
            });
        }

        let total = HEADER_LEN + body_len + TRAILER_LEN;
        if src.len() < total {
            return Ok(None);
        }

        let body = &src[HEADER_LEN..HEADER_LEN + body_len];
        let trailer = &src[HEADER_LEN + body_len..total];
        if &trailer[CHECKSUM_LEN..] != FOOTER {
            return Err(Error::bad_format("footer not found where length places it"));
        }

        let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(Error::IntegrityViolation { expected, actual });
        }

        let inflated;
        let body = if options.contains(Options::COMPRESSED) {
            inflated = self
                .compressor()?
                .decompress(body, self.max_frame_size)
                .map_err(Error::Compression)?;
            &inflated[..]
        } else {
            body
        };

        let body = if options.contains(Options::NO_FORMAT) {
            Body::Payload(Bytes::copy_from_slice(body))
        } else {
            Body::Properties(parse_properties(body)?)
        };

        let framing = Framing {
            length,
            checksum: actual,
            rawsize: total,
        };
        Ok(Some((Event::from_wire(uid, options, feedback, body, framing), total)))
    }

    /// Appends the frame for `event` to `dst`.
    ///
    /// An event carries either properties or a payload, as selected by
    /// `NO_FORMAT`; holding the other kind as well is `BadFormat`.
    pub fn encode_frame(&self, event: &Event, dst: &mut BytesMut) -> Result<()> {
        let body = if event.options.contains(Options::NO_FORMAT) {
            if !event.properties().is_empty() {
                return Err(Error::bad_format("NO_FORMAT event also carries properties"));
            }
            event.payload().to_vec()
        } else {
            if !event.payload().is_empty() {
                return Err(Error::bad_format("payload on an event without NO_FORMAT"));
            }
            write_properties(event)?
        };

        let body = if event.options.contains(Options::COMPRESSED) {
            self.compressor()?.compress(&body).map_err(Error::Compression)?
        } else {
            body
        };

        if body.len() > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                size: body.len(),
                max: self.max_frame_size,
            });
        }
        let length = u32::try_from(body.len()).map_err(|_| Error::FrameTooLarge {
            size: body.len(),
            max: u32::MAX as usize,
        })?;

        dst.reserve(HEADER_LEN + body.len() + TRAILER_LEN);
        dst.put_u8(event.uid.get());
        dst.put_u8(event.options.bits());
        dst.put_u8(event.feedback.into());
        dst.put_u32(length);
        dst.put_slice(&body);
        dst.put_u32(crc32fast::hash(&body));
        dst.put_slice(FOOTER);
        Ok(())
    }

    fn frame_len_hint(&self, src: &[u8]) -> Option<usize> {
        (src.len() >= HEADER_LEN).then(|| {
            let length = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;
            HEADER_LEN + length + TRAILER_LEN
        })
    }

    fn compressor(&self) -> Result<&dyn Compressor> {
        self.compressor
            .as_deref()
            .ok_or_else(|| Error::bad_format("compressed body but no compressor is configured"))
    }
}

impl Default for EventCodec {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl fmt::Debug for EventCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCodec")
            .field("max_frame_size", &self.max_frame_size)
            .field("compressor", &self.compressor.is_some())
            .finish()
    }
}

impl Decoder for EventCodec {
    type Item = Event;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Event>> {
        match self.decode_frame(src)? {
            Some((event, consumed)) => {
                src.advance(consumed);
                Ok(Some(event))
            }
            None => {
                if let Some(needed) = self.frame_len_hint(src) {
                    src.reserve(needed.saturating_sub(src.len()));
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Event> for EventCodec {
    type Error = Error;

    fn encode(&mut self, event: Event, dst: &mut BytesMut) -> Result<()> {
        self.encode_frame(&event, dst)
    }
}

impl Encoder<&Event> for EventCodec {
    type Error = Error;

    fn encode(&mut self, event: &Event, dst: &mut BytesMut) -> Result<()> {
        self.encode_frame(event, dst)
    }
}

/// Encodes `event` with the default codec (no compressor).
pub fn encode(event: &Event) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    EventCodec::default().encode_frame(event, &mut buf)?;
    Ok(buf.freeze())
}

/// Decodes the first frame of `src` with the default codec (no compressor).
pub fn decode(src: &[u8]) -> Result<Option<(Event, usize)>> {
    EventCodec::default().decode_frame(src)
}

fn parse_properties(body: &[u8]) -> Result<BTreeMap<String, String>> {
    let mut properties = BTreeMap::new();
    let mut rest = body;
    while !rest.is_empty() {
        let end = rest
            .iter()
            .position(|b| *b == RECORD_SEPARATOR)
            .ok_or_else(|| Error::bad_format("unterminated property record"))?;
        let record = &rest[..end];
        rest = &rest[end + 1..];

        let split = record
            .iter()
            .position(|b| *b == FIELD_SEPARATOR)
            .ok_or_else(|| Error::bad_format("property record without a field separator"))?;
        let key = std::str::from_utf8(&record[..split])
            .map_err(|_| Error::bad_format("property key is not UTF-8"))?;
        let value = std::str::from_utf8(&record[split + 1..])
            .map_err(|_| Error::bad_format("property value is not UTF-8"))?;
        if key.is_empty() {
            return Err(Error::bad_format("empty property key"));
        }
        properties.insert(key.to_owned(), value.to_owned());
    }
    Ok(properties)
}

fn write_properties(event: &Event) -> Result<Vec<u8>> {
    let is_separator = |b: &u8| *b == FIELD_SEPARATOR || *b == RECORD_SEPARATOR;
    let mut body = Vec::new();
    for (key, value) in event.properties() {
        if key.is_empty() {
            return Err(Error::bad_format("empty property key"));
        }
        if key.as_bytes().iter().any(is_separator) || value.as_bytes().iter().any(is_separator) {
            return Err(Error::bad_format(format!(
                "property '{}' contains a separator byte",
                key.escape_debug()
            )));
        }
        body.extend_from_slice(key.as_bytes());
        body.push(FIELD_SEPARATOR);
        body.extend_from_slice(value.as_bytes());
        body.push(RECORD_SEPARATOR);
    }
    Ok(body)
}

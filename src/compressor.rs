use std::io;

/// Shrinks and restores event bodies carrying the `COMPRESSED` option.
///
/// Called synchronously from the codec, so implementations should be
/// CPU-bound and never block on I/O.
pub trait Compressor: Send + Sync + 'static {
    fn compress(&self, input: &[u8]) -> io::Result<Vec<u8>>;

    /// Restores `input`, failing if the output would exceed `limit` bytes.
    fn decompress(&self, input: &[u8], limit: usize) -> io::Result<Vec<u8>>;
}

#[cfg(feature = "compression")]
pub use deflate::Deflate;

#[cfg(feature = "compression")]
mod deflate {
    use std::io::{self, Read, Write};

    use flate2::{Compression, read::DeflateDecoder, write::DeflateEncoder};

    use super::Compressor;

    /// Raw deflate streams, via `flate2`.
    #[derive(Debug, Clone, Copy)]
    pub struct Deflate {
        level: Compression,
    }

    impl Deflate {
        /// `level` ranges from 0 (store) to 9 (smallest output).
        pub fn new(level: u32) -> Self {
            Self {
                level: Compression::new(level.min(9)),
            }
        }
    }

    impl Default for Deflate {
        fn default() -> Self {
            Self {
                level: Compression::fast(),
            }
        }
    }

    impl Compressor for Deflate {
        fn compress(&self, input: &[u8]) -> io::Result<Vec<u8>> {
            let mut encoder = DeflateEncoder::new(Vec::with_capacity(input.len() / 2), self.level);
            encoder.write_all(input)?;
            encoder.finish()
        }

        fn decompress(&self, input: &[u8], limit: usize) -> io::Result<Vec<u8>> {
            let mut out = Vec::new();
            let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
            DeflateDecoder::new(input).take(cap).read_to_end(&mut out)?;
            if out.len() > limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("inflated body exceeds {limit} bytes"),
                ));
            }
            Ok(out)
        }
    }

}

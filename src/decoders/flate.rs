//! FlateDecode (zlib/deflate).
//!
//! Decoding reads through a bounded reader so a decompression bomb stops at the
//! configured limit. Streams with a damaged zlib wrapper are retried as raw deflate.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// FlateDecode filter implementation.
pub struct FlateDecoder {
    max_output: usize,
}

impl FlateDecoder {
    /// Decoder that refuses to produce more than `max_output` bytes.
    pub fn with_limit(max_output: usize) -> Self {
        Self { max_output }
    }

    fn read_bounded<R: Read>(&self, reader: R, output: &mut Vec<u8>) -> std::io::Result<usize> {
        reader
            .take(self.max_output as u64 + 1)
            .read_to_end(output)
    }

    fn check_limit(&self, output: &[u8]) -> Result<()> {
        if output.len() > self.max_output {
            return Err(Error::ResourceLimit {
                what: "decoded stream size",
                limit: self.max_output,
            });
        }
        Ok(())
    }
}

impl Default for FlateDecoder {
    fn default() -> Self {
        Self::with_limit(crate::parser_config::DEFAULT_MAX_DECOMPRESSED_SIZE)
    }
}

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        match self.read_bounded(ZlibDecoder::new(input), &mut output) {
            Ok(_) => {
                self.check_limit(&output)?;
                Ok(output)
            },
            Err(e) if !output.is_empty() => {
                log::warn!(
                    "FlateDecode partial recovery: kept {} bytes before corruption: {}",
                    output.len(),
                    e
                );
                self.check_limit(&output)?;
                Ok(output)
            },
            Err(zlib_err) => {
                log::debug!("Zlib decode failed ({}), trying raw deflate", zlib_err);
                output.clear();
                match self.read_bounded(DeflateDecoder::new(input), &mut output) {
                    Ok(_) if !output.is_empty() => {
                        self.check_limit(&output)?;
                        Ok(output)
                    },
                    Err(_) if !output.is_empty() => {
                        log::warn!("Raw deflate partial recovery: {} bytes", output.len());
                        self.check_limit(&output)?;
                        Ok(output)
                    },
                    _ => Err(Error::Decode(format!("FlateDecode error: {}", zlib_err))),
                }
            },
        }
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

/// Compress `data` as a zlib stream, suitable for `/Filter /FlateDecode`.
pub fn flate_encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flate_round_trip() {
        let original = b"BT /F1 12 Tf (Hello) Tj ET";
        let compressed = flate_encode(original).unwrap();
        let decoded = FlateDecoder::default().decode(&compressed).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_flate_raw_deflate_fallback() {
        let compressed = flate_encode(b"raw deflate body").unwrap();
        // Strip the two-byte zlib header and the adler32 trailer.
        let raw = &compressed[2..compressed.len() - 4];
        let decoded = FlateDecoder::default().decode(raw).unwrap();
        assert_eq!(decoded, b"raw deflate body");
    }

    #[test]
    fn test_flate_garbage() {
        assert!(FlateDecoder::default().decode(b"\xFF\xFF\xFF\xFF").is_err());
    }

    #[test]
    fn test_flate_limit() {
        let compressed = flate_encode(&vec![7u8; 10_000]).unwrap();
        let result = FlateDecoder::with_limit(1000).decode(&compressed);
        assert!(matches!(result, Err(Error::ResourceLimit { .. })));
    }
}

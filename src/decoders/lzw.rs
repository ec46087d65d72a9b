//! LZWDecode.
//!
//! PDF LZW is MSB-first with 9 to 12 bit codes, clear code 256 and EOD 257. With
//! `/EarlyChange 1` (the default) the code width grows one code early, which is the
//! TIFF variant of the algorithm.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use weezl::{decode::Decoder, BitOrder, LzwStatus};

/// LZWDecode filter implementation.
pub struct LzwDecoder {
    /// Value of `/EarlyChange` (true when absent).
    pub early_change: bool,
}

impl Default for LzwDecoder {
    fn default() -> Self {
        Self { early_change: true }
    }
}

impl StreamDecoder for LzwDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = if self.early_change {
            Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
        } else {
            Decoder::new(BitOrder::Msb, 8)
        };

        let mut output = Vec::new();
        let result = decoder.into_vec(&mut output).decode(input);
        match result.status {
            Ok(LzwStatus::Ok) | Ok(LzwStatus::Done) | Ok(LzwStatus::NoProgress) => Ok(output),
            Err(e) if !output.is_empty() => {
                log::warn!("LZWDecode partial recovery: kept {} bytes: {:?}", output.len(), e);
                Ok(output)
            },
            Err(e) => Err(Error::Decode(format!("LZWDecode error: {:?}", e))),
        }
    }

    fn name(&self) -> &str {
        "LZWDecode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weezl::encode::Encoder;

    #[test]
    fn test_lzw_decode_early_change() {
        let original = b"TOBEORNOTTOBEORTOBEORNOT";
        let encoded = Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
            .encode(original)
            .unwrap();
        let decoded = LzwDecoder::default().decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_lzw_decode_without_early_change() {
        let original: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        let encoded = Encoder::new(BitOrder::Msb, 8).encode(&original).unwrap();
        let decoded = LzwDecoder {
            early_change: false,
        }
        .decode(&encoded)
        .unwrap();
        assert_eq!(decoded, original);
    }
}

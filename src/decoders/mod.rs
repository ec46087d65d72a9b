//! Stream filters.
//!
//! The engine decodes the general-purpose filters it needs to inspect or rewrite
//! stream content:
//! - FlateDecode (zlib/deflate)
//! - LZWDecode
//! - ASCIIHexDecode
//! - ASCII85Decode
//! - RunLengthDecode
//!
//! plus PNG and TIFF predictors. Image codecs (DCT, JPX, CCITT, JBIG2) are never
//! decoded: a pipeline stops in front of them and returns the still-encoded bytes.

use crate::error::{Error, Result};

mod ascii85;
mod ascii_hex;
mod flate;
mod lzw;
mod predictor;
mod runlength;

pub use ascii85::Ascii85Decoder;
pub(crate) use ascii_hex::hex_value;
pub use ascii_hex::AsciiHexDecoder;
pub use flate::{flate_encode, FlateDecoder};
pub use lzw::LzwDecoder;
pub use predictor::{decode_predictor, DecodeParams};
pub use runlength::RunLengthDecoder;

/// Filters whose payload is image data the engine passes through untouched.
pub const IMAGE_FILTERS: &[&str] = &[
    "DCTDecode",
    "JPXDecode",
    "CCITTFaxDecode",
    "JBIG2Decode",
    "DCT",
    "CCF",
];

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Filter name as it appears in a stream dictionary (e.g. "FlateDecode").
    fn name(&self) -> &str;
}

/// True if `filter` names an image codec.
pub fn is_image_filter(filter: &str) -> bool {
    IMAGE_FILTERS.contains(&filter)
}

fn decoder_for(
    filter: &str,
    params: Option<&DecodeParams>,
    max_size: usize,
) -> Result<Box<dyn StreamDecoder>> {
    let decoder: Box<dyn StreamDecoder> = match filter {
        "FlateDecode" | "Fl" => Box::new(FlateDecoder::with_limit(max_size)),
        "LZWDecode" | "LZW" => Box::new(LzwDecoder {
            early_change: params.map(|p| p.early_change).unwrap_or(true),
        }),
        "ASCIIHexDecode" | "AHx" => Box::new(AsciiHexDecoder),
        "ASCII85Decode" | "A85" => Box::new(Ascii85Decoder),
        "RunLengthDecode" | "RL" => Box::new(RunLengthDecoder),
        _ => return Err(Error::UnsupportedFilter(filter.to_string())),
    };
    Ok(decoder)
}

/// Decode stream data through a filter pipeline.
///
/// `params` holds one optional parameter set per filter; a predictor in a slot is
/// applied right after that filter. Decoding stops at the first image filter.
/// Output larger than `max_size` bytes is rejected with a resource-limit error.
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: &[Option<DecodeParams>],
    max_size: usize,
) -> Result<Vec<u8>> {
    let mut current = data.to_vec();

    for (index, filter) in filters.iter().enumerate() {
        if is_image_filter(filter) {
            log::debug!("Stopping filter pipeline at image codec {}", filter);
            break;
        }

        let slot = params.get(index).and_then(|p| p.as_ref());
        let decoder = decoder_for(filter, slot, max_size)?;
        current = decoder.decode(&current)?;

        if let Some(p) = slot {
            if p.predictor > 1 {
                current = decode_predictor(&current, p)?;
            }
        }

        if current.len() > max_size {
            return Err(Error::ResourceLimit {
                what: "decoded stream size",
                limit: max_size,
            });
        }
    }

    Ok(current)
}

/// Decode stream data without parameters, using the default size bound.
pub fn decode_stream(data: &[u8], filters: &[String]) -> Result<Vec<u8>> {
    decode_stream_with_params(
        data,
        filters,
        &[],
        crate::parser_config::DEFAULT_MAX_DECOMPRESSED_SIZE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_stream_no_filters() {
        let data = b"Hello, World!";
        assert_eq!(decode_stream(data, &[]).unwrap(), data);
    }

    #[test]
    fn test_decode_stream_unsupported_filter() {
        let filters = vec!["Crypt".to_string()];
        match decode_stream(b"test", &filters) {
            Err(Error::UnsupportedFilter(name)) => assert_eq!(name, "Crypt"),
            other => panic!("Expected UnsupportedFilter error, got {:?}", other),
        }
    }

    #[test]
    fn test_chained_filters() {
        let compressed = flate_encode(b"Hello").unwrap();
        let hex: String = compressed.iter().map(|b| format!("{:02X}", b)).collect();
        let filters = vec!["ASCIIHexDecode".to_string(), "FlateDecode".to_string()];
        assert_eq!(decode_stream(hex.as_bytes(), &filters).unwrap(), b"Hello");
    }

    #[test]
    fn test_image_filter_stops_pipeline() {
        let filters = vec!["ASCIIHexDecode".to_string(), "DCTDecode".to_string()];
        let out = decode_stream(b"FFD8FF>", &filters).unwrap();
        assert_eq!(out, vec![0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn test_size_limit() {
        let compressed = flate_encode(&vec![0u8; 4096]).unwrap();
        let filters = vec!["FlateDecode".to_string()];
        let result = decode_stream_with_params(&compressed, &filters, &[], 100);
        assert!(matches!(result, Err(Error::ResourceLimit { .. })));
    }

    #[test]
    fn test_predictor_applied_after_filter() {
        // Two rows of 3 bytes, PNG Up predictor on the second row.
        let raw = vec![2, 1, 2, 3, 2, 1, 1, 1];
        let compressed = flate_encode(&raw).unwrap();
        let params = DecodeParams {
            predictor: 12,
            columns: 3,
            ..DecodeParams::default()
        };
        let out = decode_stream_with_params(
            &compressed,
            &["FlateDecode".to_string()],
            &[Some(params)],
            1024,
        )
        .unwrap();
        assert_eq!(out, vec![1, 2, 3, 2, 3, 4]);
    }
}

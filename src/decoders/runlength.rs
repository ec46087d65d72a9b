//! RunLengthDecode: 0-127 copies n+1 literal bytes, 129-255 repeats the next byte
//! 257-n times, 128 ends the data.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// RunLengthDecode filter implementation.
pub struct RunLengthDecoder;

impl StreamDecoder for RunLengthDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut rest = input;

        while let Some((&length, tail)) = rest.split_first() {
            match length {
                0..=127 => {
                    let count = length as usize + 1;
                    let literal = tail.get(..count).ok_or_else(|| {
                        Error::Decode(format!(
                            "RunLengthDecode: literal run of {} bytes, {} available",
                            count,
                            tail.len()
                        ))
                    })?;
                    output.extend_from_slice(literal);
                    rest = &tail[count..];
                },
                128 => break,
                129..=255 => {
                    let (&byte, after) = tail.split_first().ok_or_else(|| {
                        Error::Decode("RunLengthDecode: missing byte for run".to_string())
                    })?;
                    output.resize(output.len() + 257 - length as usize, byte);
                    rest = after;
                },
            }
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "RunLengthDecode"
    }
}

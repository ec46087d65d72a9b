//! ASCII85Decode (base-85, `!`..`u`, `z` for four zero bytes, `~>` terminator).

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// ASCII85Decode filter implementation.
pub struct Ascii85Decoder;

impl StreamDecoder for Ascii85Decoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let body = input.strip_prefix(b"<~").unwrap_or(input);
        let mut output = Vec::with_capacity(body.len() * 4 / 5);
        let mut group = [0u8; 5];
        let mut count = 0usize;

        for &c in body {
            match c {
                b'~' => break,
                b'z' if count == 0 => output.extend_from_slice(&[0, 0, 0, 0]),
                b'z' => {
                    return Err(Error::Decode(
                        "ASCII85Decode: 'z' inside a group".to_string(),
                    ))
                },
                b'!'..=b'u' => {
                    group[count] = c - b'!';
                    count += 1;
                    if count == 5 {
                        output.extend_from_slice(&group_value(&group)?.to_be_bytes());
                        count = 0;
                    }
                },
                c if c.is_ascii_whitespace() => {},
                other => {
                    return Err(Error::Decode(format!(
                        "ASCII85Decode: invalid character 0x{:02X}",
                        other
                    )))
                },
            }
        }

        if count == 1 {
            return Err(Error::Decode("ASCII85Decode: dangling final character".to_string()));
        }
        if count > 1 {
            // Pad the partial group with 'u' and keep count - 1 bytes.
            for slot in group.iter_mut().skip(count) {
                *slot = b'u' - b'!';
            }
            let bytes = group_value(&group)?.to_be_bytes();
            output.extend_from_slice(&bytes[..count - 1]);
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "ASCII85Decode"
    }
}

fn group_value(group: &[u8; 5]) -> Result<u32> {
    group
        .iter()
        .try_fold(0u32, |acc, &d| acc.checked_mul(85)?.checked_add(d as u32))
        .ok_or_else(|| Error::Decode("ASCII85Decode: group overflow".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii85_full_groups() {
        // "Man " encodes to "9jqo^"
        assert_eq!(Ascii85Decoder.decode(b"9jqo^~>").unwrap(), b"Man ");
    }

    #[test]
    fn test_ascii85_partial_group_and_z() {
        let out = Ascii85Decoder.decode(b"<~z9jqo^BlbD-BleB1DJ+*+F(f,q~>").unwrap();
        assert_eq!(&out[..4], &[0, 0, 0, 0]);
        assert_eq!(&out[4..], b"Man is distinguished");
    }

    #[test]
    fn test_ascii85_rejects_misplaced_z() {
        assert!(Ascii85Decoder.decode(b"9jz~>").is_err());
    }
}

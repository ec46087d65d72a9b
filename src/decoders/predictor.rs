//! PNG (10-15) and TIFF (2) predictors.
//!
//! Predictors are applied after a filter such as FlateDecode and store each sample
//! as a difference from its neighbours. Cross-reference streams almost always use
//! PNG Up (12).

use crate::error::{Error, Result};
use crate::object::Dict;

/// Decode parameters for one filter (`/DecodeParms`).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Samples per row
    pub columns: usize,
    /// Colour components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
    /// LZW `/EarlyChange` (default true)
    pub early_change: bool,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
            early_change: true,
        }
    }
}

impl DecodeParams {
    /// Read parameters from a `/DecodeParms` dictionary, defaulting missing keys.
    pub fn from_dict(dict: &Dict) -> Self {
        let int = |key: &str| dict.get(key).and_then(|o| o.as_integer());
        let defaults = Self::default();
        Self {
            predictor: int("Predictor").unwrap_or(defaults.predictor),
            columns: int("Columns")
                .filter(|c| *c > 0)
                .map(|c| c as usize)
                .unwrap_or(defaults.columns),
            colors: int("Colors")
                .filter(|c| *c > 0)
                .map(|c| c as usize)
                .unwrap_or(defaults.colors),
            bits_per_component: int("BitsPerComponent")
                .filter(|c| *c > 0)
                .map(|c| c as usize)
                .unwrap_or(defaults.bits_per_component),
            early_change: int("EarlyChange").map(|v| v != 0).unwrap_or(true),
        }
    }

    /// Bytes of sample data in one row.
    pub fn row_bytes(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    /// Bytes per complete pixel, never less than one.
    fn pixel_bytes(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Reverse the predictor named in `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff(data, params),
        10..=15 => decode_png(data, params),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

fn decode_tiff(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(Error::Decode(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    let row_len = params.row_bytes();
    let bpp = params.pixel_bytes();
    let mut out = data.to_vec();
    for row in out.chunks_mut(row_len) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    Ok(out)
}

fn decode_png(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.row_bytes();
    let bpp = params.pixel_bytes();
    let stride = row_len + 1;

    if data.len() % stride != 0 {
        log::warn!(
            "Predictor data length {} is not a multiple of row size {}, dropping tail",
            data.len(),
            stride
        );
    }

    let mut out: Vec<u8> = Vec::with_capacity(data.len() / stride * row_len);
    let mut previous = vec![0u8; row_len];

    for chunk in data.chunks_exact(stride) {
        let tag = chunk[0];
        let mut row = chunk[1..].to_vec();
        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = previous[i];
            let upper_left = if i >= bpp { previous[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, upper_left),
                other => {
                    return Err(Error::Decode(format!("Invalid PNG predictor tag: {}", other)))
                },
            };
            row[i] = row[i].wrapping_add(predicted);
        }
        out.extend_from_slice(&row);
        previous = row;
    }

    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

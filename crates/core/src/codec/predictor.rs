//! Predictors (`/Predictor` in `/DecodeParms`).
//!
//! Applied by the filter pipeline after FlateDecode or LZWDecode on decode,
//! and before them on encode. Predictor 2 is TIFF horizontal differencing,
//! 10..=15 are the PNG row filters. A short final row is processed as far
//! as it goes.

use crate::error::{PdfError, Result};
use crate::model::Dictionary;

const NAME: &str = "Predictor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictorKind {
    Tiff,
    /// PNG; the value is the `/Predictor` number (10..=15)
    Png(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predictor {
    pub kind: PredictorKind,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Predictor {
    /// Read predictor parameters. `None` when no prediction applies.
    pub fn from_params(params: Option<&Dictionary>) -> Result<Option<Self>> {
        let Some(params) = params else {
            return Ok(None);
        };
        let value = params.get_int("Predictor").unwrap_or(1);
        let kind = match value {
            1 => return Ok(None),
            2 => PredictorKind::Tiff,
            10..=15 => PredictorKind::Png(value as u8),
            other => {
                return Err(PdfError::decode(NAME, None, format!("unsupported predictor {other}")));
            }
        };
        let positive = |key: &str, default: i64| -> Result<usize> {
            let v = params.get_int(key).unwrap_or(default);
            usize::try_from(v)
                .ok()
                .filter(|&v| v > 0)
                .ok_or_else(|| PdfError::decode(NAME, None, format!("invalid /{key} {v}")))
        };
        let predictor = Self {
            kind,
            colors: positive("Colors", 1)?,
            bits_per_component: positive("BitsPerComponent", 8)?,
            columns: positive("Columns", 1)?,
        };
        predictor.row_bytes()?;
        if predictor.kind == PredictorKind::Tiff && !matches!(predictor.bits_per_component, 8 | 16) {
            return Err(PdfError::decode(
                NAME,
                None,
                format!(
                    "TIFF predictor with {} bits per component",
                    predictor.bits_per_component
                ),
            ));
        }
        Ok(Some(predictor))
    }

    /// Bits per pixel; fails when the parameters overflow.
    fn pixel_bits(&self) -> Result<usize> {
        self.colors
            .checked_mul(self.bits_per_component)
            .ok_or_else(|| PdfError::decode(NAME, None, "pixel width overflows"))
    }

    fn row_bytes(&self) -> Result<usize> {
        self.pixel_bits()?
            .checked_mul(self.columns)
            .map(|bits| bits.div_ceil(8).max(1))
            .ok_or_else(|| {
                PdfError::decode(NAME, None, format!("row of {} columns overflows", self.columns))
            })
    }

    /// Bytes per pixel, at least 1.
    fn bpp(&self) -> Result<usize> {
        Ok(self.pixel_bits()?.div_ceil(8).max(1))
    }

    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.kind {
            PredictorKind::Tiff => self.tiff(data, false),
            PredictorKind::Png(_) => self.png_decode(data),
        }
    }

    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.kind {
            PredictorKind::Tiff => self.tiff(data, true),
            PredictorKind::Png(value) => self.png_encode(data, png_row_filter(value)),
        }
    }

    fn png_decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let row_bytes = self.row_bytes()?;
        let bpp = self.bpp()?;
        let mut result = Vec::with_capacity(data.len());
        // A declared row longer than the data is never filled past the data.
        let mut prev_row = vec![0u8; row_bytes.min(data.len())];

        for chunk in data.chunks(row_bytes.saturating_add(1)) {
            let filter_type = chunk[0];
            let row_data = &chunk[1..];
            let mut current_row = vec![0u8; row_data.len()];

            for i in 0..row_data.len() {
                let left = if i >= bpp { current_row[i - bpp] } else { 0 };
                let above = prev_row[i];
                let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                let predicted = match filter_type {
                    1 => left,
                    2 => above,
                    3 => ((left as u16 + above as u16) / 2) as u8,
                    4 => paeth_predictor(left, above, upper_left),
                    _ => 0,
                };
                current_row[i] = row_data[i].wrapping_add(predicted);
            }
            if filter_type > 4 {
                tracing::trace!(filter_type, "unknown PNG row filter, row copied");
            }

            result.extend_from_slice(&current_row);
            prev_row[..current_row.len()].copy_from_slice(&current_row);
        }

        Ok(result)
    }

    fn png_encode(&self, data: &[u8], filter_type: u8) -> Result<Vec<u8>> {
        let row_bytes = self.row_bytes()?;
        let bpp = self.bpp()?;
        let mut result = Vec::with_capacity(data.len() + data.len() / row_bytes + 1);
        let mut prev_row = vec![0u8; row_bytes.min(data.len())];

        for row in data.chunks(row_bytes) {
            result.push(filter_type);
            for i in 0..row.len() {
                let left = if i >= bpp { row[i - bpp] } else { 0 };
                let above = prev_row[i];
                let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                let predicted = match filter_type {
                    1 => left,
                    2 => above,
                    3 => ((left as u16 + above as u16) / 2) as u8,
                    4 => paeth_predictor(left, above, upper_left),
                    _ => 0,
                };
                result.push(row[i].wrapping_sub(predicted));
            }
            prev_row[..row.len()].copy_from_slice(row);
        }

        Ok(result)
    }

    /// Horizontal differencing over components of 8 or 16 bits.
    fn tiff(&self, data: &[u8], encode: bool) -> Result<Vec<u8>> {
        let row_bytes = self.row_bytes()?;
        let mut result = data.to_vec();
        let wide = self.bits_per_component == 16;
        let stride = if wide { self.colors * 2 } else { self.colors };

        for row in result.chunks_mut(row_bytes) {
            if wide {
                let mut components: Vec<u16> = row
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                difference(&mut components, self.colors, encode);
                for (dst, c) in row.chunks_exact_mut(2).zip(components) {
                    dst.copy_from_slice(&c.to_be_bytes());
                }
            } else {
                difference(row, stride, encode);
            }
        }

        Ok(result)
    }
}

trait Wrapping: Copy {
    fn add(self, other: Self) -> Self;
    fn sub(self, other: Self) -> Self;
}

impl Wrapping for u8 {
    fn add(self, other: Self) -> Self {
        self.wrapping_add(other)
    }
    fn sub(self, other: Self) -> Self {
        self.wrapping_sub(other)
    }
}

impl Wrapping for u16 {
    fn add(self, other: Self) -> Self {
        self.wrapping_add(other)
    }
    fn sub(self, other: Self) -> Self {
        self.wrapping_sub(other)
    }
}

fn difference<T: Wrapping>(values: &mut [T], stride: usize, encode: bool) {
    if encode {
        for i in (stride..values.len()).rev() {
            values[i] = values[i].sub(values[i - stride]);
        }
    } else {
        for i in stride..values.len() {
            values[i] = values[i].add(values[i - stride]);
        }
    }
}

/// Row filter used when encoding with a given `/Predictor` value.
/// 15 ("optimum") picks Up for every row.
const fn png_row_filter(predictor: u8) -> u8 {
    match predictor {
        10 => 0,
        11 => 1,
        13 => 3,
        14 => 4,
        _ => 2,
    }
}

/// Paeth predictor function used in PNG filtering.
pub const fn paeth_predictor(left: u8, above: u8, upper_left: u8) -> u8 {
    let a = left as i32;
    let b = above as i32;
    let c = upper_left as i32;
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

use jp2::{BitDepth, GeneratedComponent, PaletteBox};

use crate::error::JpxError;
use crate::image::{Image, Photometric, PixelBuffer};

/// Normalized palette entry in [-0.5, 0.5).
///
/// Unsigned entries are offset by half the range, signed entries are taken
/// in two's complement.
pub fn entry_value(entry: u32, depth: BitDepth) -> f32 {
    let bits = depth.value().min(32) as u32;
    let range = 2f64.powi(bits as i32);
    let value = if depth.is_signed() {
        let shift = 64 - bits;
        ((entry as i64) << shift >> shift) as f64 / range
    } else {
        entry as f64 / range - 0.5
    };
    value as f32
}

pub fn entry_byte(value: f32) -> u8 {
    ((value + 0.5) * 255.0).round().max(0.0).min(255.0) as u8
}

/// Red, green and blue lookup tables of an indexed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteLut {
    red: Vec<u8>,
    green: Vec<u8>,
    blue: Vec<u8>,
}

impl PaletteLut {
    /// Tables from normalized values, one slice per channel.
    pub fn from_values(red: &[f32], green: &[f32], blue: &[f32]) -> PaletteLut {
        let bytes = |values: &[f32]| -> Vec<u8> { values.iter().map(|v| entry_byte(*v)).collect() };
        PaletteLut {
            red: bytes(red),
            green: bytes(green),
            blue: bytes(blue),
        }
    }

    /// Only a palette of exactly three columns describes RGB.
    pub fn from_palette_box(palette: &PaletteBox) -> Option<PaletteLut> {
        let columns = palette.generated_components();
        if columns.len() != 3 {
            return None;
        }
        let values = |column: &GeneratedComponent| -> Vec<f32> {
            column
                .values()
                .iter()
                .map(|entry| entry_value(*entry, column.bit_depth()))
                .collect()
        };
        Some(PaletteLut::from_values(
            &values(&columns[0]),
            &values(&columns[1]),
            &values(&columns[2]),
        ))
    }

    pub fn entries(&self) -> usize {
        self.red.len().min(self.green.len()).min(self.blue.len())
    }

    pub fn rgb(&self, index: usize) -> Option<[u8; 3]> {
        if index >= self.entries() {
            return None;
        }
        Some([self.red[index], self.green[index], self.blue[index]])
    }

    /// Replaces the indices in the first component of each pixel with RGB
    /// bytes. The result is an 8 bit RGB image without extra samples.
    pub fn expand(&self, image: &mut Image) -> Result<(), JpxError> {
        let stride = image.components.max(1) as usize;
        let indices: Vec<usize> = match &image.pixels {
            PixelBuffer::U8(samples) => samples.iter().step_by(stride).map(|i| *i as usize).collect(),
            PixelBuffer::U16(samples) => {
                samples.iter().step_by(stride).map(|i| *i as usize).collect()
            }
        };

        let mut expanded = Vec::with_capacity(indices.len() * 3);
        for index in indices {
            let rgb = self.rgb(index).ok_or_else(|| {
                JpxError::malformed(format!(
                    "palette index {} outside {} entries",
                    index,
                    self.entries()
                ))
            })?;
            expanded.extend_from_slice(&rgb);
        }

        image.pixels = PixelBuffer::U8(expanded);
        image.bits = 8;
        image.components = 3;
        image.extra_samples.clear();
        image.photometric = Photometric::Rgb;
        Ok(())
    }
}

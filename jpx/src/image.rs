use icc::ICCProfile;

use crate::error::JpxError;
use crate::metadata::{Exif, Iptc, Xmp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Photometric {
    MinIsBlack,
    Rgb,
    YCbCr,
    // CMYK
    Separated,
    Invalid,
}

/// Role of a component beyond the colour channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraSample {
    AssociatedAlpha,
    UnassociatedAlpha,
    Unspecified,
}

/// Interleaved, row-major samples.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl PixelBuffer {
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::U8(samples) => samples.len(),
            PixelBuffer::U16(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bits per sample of the container type.
    pub fn bits(&self) -> u8 {
        match self {
            PixelBuffer::U8(_) => 8,
            PixelBuffer::U16(_) => 16,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub bits: u8,
    pub components: u16,
    pub photometric: Photometric,
    pub extra_samples: Vec<ExtraSample>,
    pub icc: Option<ICCProfile>,
    pub xmp: Option<Xmp>,
    pub iptc: Option<Iptc>,
    pub exif: Option<Exif>,
    pub essentials: Option<String>,
    pub pixels: PixelBuffer,
}

impl Image {
    /// An image without colour profile or metadata. The buffer must hold
    /// exactly `width × height × components` samples.
    pub fn new(
        width: u32,
        height: u32,
        components: u16,
        photometric: Photometric,
        pixels: PixelBuffer,
    ) -> Result<Image, JpxError> {
        let expected = width as usize * height as usize * components as usize;
        if pixels.len() != expected {
            return Err(JpxError::InvalidSize {
                reason: format!(
                    "{} samples for {}x{} with {} components, expected {}",
                    pixels.len(),
                    width,
                    height,
                    components,
                    expected
                ),
            });
        }
        Ok(Image {
            width,
            height,
            bits: pixels.bits(),
            components,
            photometric,
            extra_samples: vec![],
            icc: None,
            xmp: None,
            iptc: None,
            exif: None,
            essentials: None,
            pixels,
        })
    }

    /// Number of colour channels, i.e. components minus extra samples.
    pub fn colour_channels(&self) -> u16 {
        self.components
            .saturating_sub(self.extra_samples.len() as u16)
    }

    /// Converts full range YCbCr (ITU-R BT.601) samples in the first three
    /// components to RGB. Does nothing unless the image is YCbCr.
    pub fn convert_ycc_to_rgb(&mut self) -> Result<(), JpxError> {
        if self.photometric != Photometric::YCbCr {
            return Ok(());
        }
        if self.components < 3 {
            return Err(JpxError::UnsupportedComponentCount {
                count: self.components,
            });
        }
        let stride = self.components as usize;
        match &mut self.pixels {
            PixelBuffer::U8(samples) => {
                for pixel in samples.chunks_exact_mut(stride) {
                    let rgb = ycc_to_rgb(
                        [pixel[0] as f32, pixel[1] as f32, pixel[2] as f32],
                        128.0,
                        255.0,
                    );
                    for (sample, value) in pixel.iter_mut().zip(rgb.iter()) {
                        *sample = *value as u8;
                    }
                }
            }
            PixelBuffer::U16(samples) => {
                for pixel in samples.chunks_exact_mut(stride) {
                    let rgb = ycc_to_rgb(
                        [pixel[0] as f32, pixel[1] as f32, pixel[2] as f32],
                        32768.0,
                        65535.0,
                    );
                    for (sample, value) in pixel.iter_mut().zip(rgb.iter()) {
                        *sample = *value as u16;
                    }
                }
            }
        }
        self.photometric = Photometric::Rgb;
        Ok(())
    }

    /// Resamples all components to exactly `width × height` with bilinear
    /// interpolation.
    pub fn scale(&mut self, width: u32, height: u32) -> Result<(), JpxError> {
        if width == 0 || height == 0 {
            return Err(JpxError::InvalidSize {
                reason: format!("cannot scale to {}x{}", width, height),
            });
        }
        if width == self.width && height == self.height {
            return Ok(());
        }
        let source = Geometry {
            width: self.width as usize,
            height: self.height as usize,
            components: self.components as usize,
        };
        let target = (width as usize, height as usize);
        self.pixels = match &self.pixels {
            PixelBuffer::U8(samples) => PixelBuffer::U8(resample(samples, &source, target, |v| {
                v.round().max(0.0).min(255.0) as u8
            })),
            PixelBuffer::U16(samples) => {
                PixelBuffer::U16(resample(samples, &source, target, |v| {
                    v.round().max(0.0).min(65535.0) as u16
                }))
            }
        };
        self.width = width;
        self.height = height;
        Ok(())
    }
}

fn ycc_to_rgb(ycc: [f32; 3], half: f32, max: f32) -> [f32; 3] {
    let y = ycc[0];
    let cb = ycc[1] - half;
    let cr = ycc[2] - half;
    let clamp = |v: f32| v.round().max(0.0).min(max);
    [
        clamp(y + 1.402 * cr),
        clamp(y - 0.344_136 * cb - 0.714_136 * cr),
        clamp(y + 1.772 * cb),
    ]
}

struct Geometry {
    width: usize,
    height: usize,
    components: usize,
}

// Sample positions are pixel centres, clamped to the source edges.
fn source_position(target: usize, scale: f32, limit: usize) -> (usize, usize, f32) {
    let position = ((target as f32 + 0.5) * scale - 0.5).max(0.0);
    let low = (position.floor() as usize).min(limit - 1);
    let high = (low + 1).min(limit - 1);
    (low, high, position - low as f32)
}

fn resample<T, F>(samples: &[T], source: &Geometry, target: (usize, usize), convert: F) -> Vec<T>
where
    T: Copy + Into<f32>,
    F: Fn(f32) -> T,
{
    let (width, height) = target;
    let x_scale = source.width as f32 / width as f32;
    let y_scale = source.height as f32 / height as f32;
    let at = |x: usize, y: usize, c: usize| -> f32 {
        samples[(y * source.width + x) * source.components + c].into()
    };

    let mut resampled = Vec::with_capacity(width * height * source.components);
    for y in 0..height {
        let (y0, y1, fy) = source_position(y, y_scale, source.height);
        for x in 0..width {
            let (x0, x1, fx) = source_position(x, x_scale, source.width);
            for c in 0..source.components {
                let top = at(x0, y0, c) * (1.0 - fx) + at(x1, y0, c) * fx;
                let bottom = at(x0, y1, c) * (1.0 - fx) + at(x1, y1, c) * fx;
                resampled.push(convert(top * (1.0 - fy) + bottom * fy));
            }
        }
    }
    resampled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_checked() {
        let result = Image::new(2, 2, 3, Photometric::Rgb, PixelBuffer::U8(vec![0; 11]));
        assert!(matches!(result, Err(JpxError::InvalidSize { .. })));
    }

    #[test]
    fn test_ycc_to_rgb() {
        let mut image = Image::new(
            2,
            1,
            3,
            Photometric::YCbCr,
            PixelBuffer::U8(vec![128, 128, 128, 76, 85, 255]),
        )
        .unwrap();
        image.convert_ycc_to_rgb().unwrap();
        assert_eq!(image.photometric, Photometric::Rgb);
        // neutral grey stays grey, (76, 85, 255) is red
        assert_eq!(image.pixels, PixelBuffer::U8(vec![128, 128, 128, 254, 0, 0]));
    }

    #[test]
    fn test_ycc_to_rgb_16bit_keeps_alpha() {
        let mut image = Image::new(
            1,
            1,
            4,
            Photometric::YCbCr,
            PixelBuffer::U16(vec![65535, 32768, 32768, 1234]),
        )
        .unwrap();
        image.convert_ycc_to_rgb().unwrap();
        assert_eq!(
            image.pixels,
            PixelBuffer::U16(vec![65535, 65535, 65535, 1234])
        );
    }

    #[test]
    fn test_rgb_untouched() {
        let mut image =
            Image::new(1, 1, 3, Photometric::Rgb, PixelBuffer::U8(vec![1, 2, 3])).unwrap();
        image.convert_ycc_to_rgb().unwrap();
        assert_eq!(image.pixels, PixelBuffer::U8(vec![1, 2, 3]));
    }

    #[test]
    fn test_scale_down() {
        let mut image = Image::new(
            4,
            2,
            1,
            Photometric::MinIsBlack,
            PixelBuffer::U8(vec![0, 0, 100, 100, 0, 0, 100, 100]),
        )
        .unwrap();
        image.scale(2, 1).unwrap();
        assert_eq!((image.width, image.height), (2, 1));
        assert_eq!(image.pixels, PixelBuffer::U8(vec![0, 100]));
    }

    #[test]
    fn test_scale_up_interpolates() {
        let mut image = Image::new(
            2,
            1,
            1,
            Photometric::MinIsBlack,
            PixelBuffer::U16(vec![0, 1000]),
        )
        .unwrap();
        image.scale(4, 1).unwrap();
        assert_eq!(image.pixels, PixelBuffer::U16(vec![0, 250, 750, 1000]));
    }

    #[test]
    fn test_scale_to_zero() {
        let mut image =
            Image::new(1, 1, 1, Photometric::MinIsBlack, PixelBuffer::U8(vec![0])).unwrap();
        assert!(matches!(
            image.scale(0, 1),
            Err(JpxError::InvalidSize { .. })
        ));
    }
}

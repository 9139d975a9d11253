use log::debug;

use crate::engine::{EngineError, StripeCompressor, StripeDecompressor};
use crate::error::JpxError;
use crate::image::PixelBuffer;

/// Sample width the decoded buffer is delivered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleWidth {
    Eight,
    /// 16 bit container, pulled at the given precision.
    Sixteen { precision: u8 },
}

impl SampleWidth {
    /// Forcing 8 bit output wins over every source depth.
    pub fn for_source(bits: u8, force_8bit: bool) -> Result<SampleWidth, JpxError> {
        if force_8bit {
            return Ok(SampleWidth::Eight);
        }
        match bits {
            8 => Ok(SampleWidth::Eight),
            12 | 16 => Ok(SampleWidth::Sixteen { precision: 16 }),
            bits => Err(JpxError::UnsupportedBitDepth { bits }),
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            SampleWidth::Eight => 8,
            SampleWidth::Sixteen { .. } => 16,
        }
    }
}

fn stalled(row: usize, height: usize) -> JpxError {
    JpxError::CodecEngineFailure(EngineError::new(format!(
        "no rows delivered at row {} of {}",
        row, height
    )))
}

fn overran(rows: usize, remaining: usize) -> JpxError {
    JpxError::CodecEngineFailure(EngineError::new(format!(
        "{} rows delivered with {} remaining",
        rows, remaining
    )))
}

/// Pulls every row of the decompressor into an owned buffer and finishes it.
///
/// On an unsupported source depth the decompressor is finished before the
/// error is returned. On an engine failure it is dropped.
pub fn pull(
    mut decompressor: Box<dyn StripeDecompressor>,
    components: u16,
    bits: u8,
    force_8bit: bool,
) -> Result<PixelBuffer, JpxError> {
    let width = match SampleWidth::for_source(bits, force_8bit) {
        Ok(width) => width,
        Err(error) => {
            decompressor.finish()?;
            return Err(error);
        }
    };

    let (columns, rows) = decompressor.dimensions();
    let row_samples = columns as usize * components as usize;
    let height = rows as usize;
    debug!(
        "pulling {}x{} with {} components at {} bits",
        columns,
        rows,
        components,
        width.bits()
    );

    let pixels = match width {
        SampleWidth::Eight => {
            let mut samples = vec![0u8; row_samples * height];
            let mut row = 0;
            while row < height {
                let delivered =
                    decompressor.pull_stripe_u8(&mut samples[row * row_samples..])?;
                if delivered == 0 {
                    return Err(stalled(row, height));
                }
                if delivered > height - row {
                    return Err(overran(delivered, height - row));
                }
                row += delivered;
            }
            PixelBuffer::U8(samples)
        }
        SampleWidth::Sixteen { precision } => {
            let mut samples = vec![0u16; row_samples * height];
            let mut row = 0;
            while row < height {
                let delivered = decompressor
                    .pull_stripe_u16(&mut samples[row * row_samples..], precision)?;
                if delivered == 0 {
                    return Err(stalled(row, height));
                }
                if delivered > height - row {
                    return Err(overran(delivered, height - row));
                }
                row += delivered;
            }
            PixelBuffer::U16(samples)
        }
    };

    decompressor.finish()?;
    Ok(pixels)
}

/// Pushes the buffer to the compressor in stripes of `stripe_height` rows.
pub fn push(
    compressor: &mut dyn StripeCompressor,
    pixels: &PixelBuffer,
    width: u32,
    components: u16,
    stripe_height: u32,
) -> Result<(), JpxError> {
    let row_samples = (width as usize * components as usize).max(1);
    let stripe_samples = row_samples * stripe_height.max(1) as usize;

    match pixels {
        PixelBuffer::U8(samples) => {
            for stripe in samples.chunks(stripe_samples) {
                compressor.push_stripe_u8(stripe, stripe.len() / row_samples)?;
            }
        }
        PixelBuffer::U16(samples) => {
            for stripe in samples.chunks(stripe_samples) {
                compressor.push_stripe_u16(stripe, stripe.len() / row_samples)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Rows {
        width: u32,
        height: u32,
        components: u16,
        stripe: usize,
        delivered: usize,
        finished: Rc<Cell<bool>>,
    }

    impl Rows {
        fn take(&mut self) -> usize {
            let rows = self.stripe.min(self.height as usize - self.delivered);
            self.delivered += rows;
            rows
        }
    }

    impl StripeDecompressor for Rows {
        fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn pull_stripe_u8(&mut self, samples: &mut [u8]) -> Result<usize, EngineError> {
            let first = self.delivered;
            let rows = self.take();
            let row_samples = self.width as usize * self.components as usize;
            for (i, sample) in samples[..rows * row_samples].iter_mut().enumerate() {
                *sample = (first + i / row_samples) as u8;
            }
            Ok(rows)
        }

        fn pull_stripe_u16(
            &mut self,
            samples: &mut [u16],
            precision: u8,
        ) -> Result<usize, EngineError> {
            let rows = self.take();
            let row_samples = self.width as usize * self.components as usize;
            for sample in samples[..rows * row_samples].iter_mut() {
                *sample = 1 << (precision - 1);
            }
            Ok(rows)
        }

        fn finish(self: Box<Self>) -> Result<(), EngineError> {
            self.finished.set(true);
            Ok(())
        }
    }

    fn rows(stripe: usize, finished: &Rc<Cell<bool>>) -> Box<Rows> {
        Box::new(Rows {
            width: 2,
            height: 5,
            components: 3,
            stripe,
            delivered: 0,
            finished: Rc::clone(finished),
        })
    }

    #[test]
    fn test_sample_width() {
        assert_eq!(SampleWidth::for_source(8, false).unwrap(), SampleWidth::Eight);
        assert_eq!(
            SampleWidth::for_source(12, false).unwrap(),
            SampleWidth::Sixteen { precision: 16 }
        );
        assert_eq!(SampleWidth::for_source(12, true).unwrap(), SampleWidth::Eight);
        assert_eq!(SampleWidth::for_source(10, true).unwrap(), SampleWidth::Eight);
        assert!(matches!(
            SampleWidth::for_source(10, false),
            Err(JpxError::UnsupportedBitDepth { bits: 10 })
        ));
    }

    #[test]
    fn test_pull_in_stripes() {
        let finished = Rc::new(Cell::new(false));
        let pixels = pull(rows(2, &finished), 3, 8, false).unwrap();
        assert!(finished.get());
        match pixels {
            PixelBuffer::U8(samples) => {
                assert_eq!(samples.len(), 30);
                assert_eq!(&samples[0..6], &[0; 6]);
                assert_eq!(&samples[24..30], &[4; 6]);
            }
            PixelBuffer::U16(_) => panic!("expected 8 bit samples"),
        }
    }

    #[test]
    fn test_pull_twelve_bits() {
        let finished = Rc::new(Cell::new(false));
        let pixels = pull(rows(5, &finished), 3, 12, false).unwrap();
        assert_eq!(pixels, PixelBuffer::U16(vec![0x8000; 30]));
    }

    #[test]
    fn test_unsupported_depth_finishes() {
        let finished = Rc::new(Cell::new(false));
        let result = pull(rows(5, &finished), 3, 10, false);
        assert!(matches!(result, Err(JpxError::UnsupportedBitDepth { bits: 10 })));
        assert!(finished.get());
    }

    #[test]
    fn test_stall_is_engine_failure() {
        let finished = Rc::new(Cell::new(false));
        let result = pull(rows(0, &finished), 3, 8, false);
        assert!(matches!(result, Err(JpxError::CodecEngineFailure(_))));
        assert!(!finished.get());
    }
}

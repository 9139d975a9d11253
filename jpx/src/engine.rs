//! Boundary to the wavelet codec engine.
//!
//! The engine decodes a codestream into stripes of interleaved samples and
//! encodes stripes into a codestream. Its failures arrive as [`EngineError`]
//! and leave the adapter as [`JpxError::CodecEngineFailure`].

use jpc::{CodingStyleMarkerSegment, ProgressionOrder, TransformationFilter};
use thiserror::Error;

use crate::error::JpxError;
use crate::geometry::Rect;
use crate::reporter::Reporter;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> EngineError {
        EngineError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeRestrictions {
    /// Region in full resolution pixels, `None` for the whole image.
    pub region: Option<Rect>,
    /// Number of discarded highest resolution levels.
    pub reduce: u8,
}

/// Stripe-oriented decompressor of one codestream.
///
/// Each pull fills whole rows of interleaved samples from the top of the
/// buffer and returns the number of rows delivered.
pub trait StripeDecompressor {
    /// Size of the decoded image after applying the restrictions.
    fn dimensions(&self) -> (u32, u32);

    /// Pulls samples converted to 8 bits.
    fn pull_stripe_u8(&mut self, samples: &mut [u8]) -> Result<usize, EngineError>;

    /// Pulls samples scaled to `precision` bits.
    fn pull_stripe_u16(&mut self, samples: &mut [u16], precision: u8)
        -> Result<usize, EngineError>;

    /// Releases the engine resources once all rows were pulled.
    fn finish(self: Box<Self>) -> Result<(), EngineError>;
}

/// Stripe-oriented compressor producing one codestream.
pub trait StripeCompressor {
    /// Worker threads the engine actually started.
    fn granted_threads(&self) -> usize;

    fn push_stripe_u8(&mut self, samples: &[u8], rows: usize) -> Result<(), EngineError>;

    fn push_stripe_u16(&mut self, samples: &[u16], rows: usize) -> Result<(), EngineError>;

    /// Completes the codestream and returns its bytes.
    fn finish(self: Box<Self>) -> Result<Vec<u8>, EngineError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeParameters {
    pub width: u32,
    pub height: u32,
    pub components: u16,
    pub bits: u8,
    pub profile: CompressionProfile,
    /// Requested worker threads, 0 for none.
    pub threads: usize,
}

pub trait CodecEngine {
    fn decode(
        &self,
        codestream: &[u8],
        restrictions: &DecodeRestrictions,
        reporter: &dyn Reporter,
    ) -> Result<Box<dyn StripeDecompressor>, EngineError>;

    fn encode(
        &self,
        parameters: &EncodeParameters,
        reporter: &dyn Reporter,
    ) -> Result<Box<dyn StripeCompressor>, EngineError>;
}

/// Coding parameters of the written codestream.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionProfile {
    /// Reversible 5-3 wavelet, irreversible 9-7 otherwise.
    pub reversible: bool,
    pub layers: u16,
    pub levels: u8,
    pub progression: ProgressionOrder,
    /// Precinct width and height in samples.
    pub precincts: (u32, u32),
    /// Code-block width and height in samples.
    pub code_blocks: (u32, u32),
    pub use_sop: bool,
}

impl Default for CompressionProfile {
    fn default() -> CompressionProfile {
        CompressionProfile {
            reversible: true,
            layers: 8,
            levels: 8,
            progression: ProgressionOrder::RLPCLP,
            precincts: (256, 256),
            code_blocks: (64, 64),
            use_sop: true,
        }
    }
}

fn exponent(value: u32) -> Option<u8> {
    if value.is_power_of_two() {
        Some(value.trailing_zeros() as u8)
    } else {
        None
    }
}

impl CompressionProfile {
    pub fn validate(&self) -> Result<(), JpxError> {
        let invalid = |reason: String| Err(JpxError::InvalidProfile { reason });

        if self.layers == 0 {
            return invalid("at least one quality layer is required".to_string());
        }
        if self.levels > 32 {
            return invalid(format!("{} decomposition levels exceed 32", self.levels));
        }
        let (precinct_width, precinct_height) = self.precincts;
        match (exponent(precinct_width), exponent(precinct_height)) {
            (Some(w), Some(h)) if w <= 15 && h <= 15 => {}
            _ => {
                return invalid(format!(
                    "precincts {}x{} are not powers of two up to 2^15",
                    precinct_width, precinct_height
                ))
            }
        }
        let (block_width, block_height) = self.code_blocks;
        match (exponent(block_width), exponent(block_height)) {
            (Some(w), Some(h)) if (2..=10).contains(&w) && (2..=10).contains(&h) && w + h <= 12 => {
            }
            _ => {
                return invalid(format!(
                    "code-blocks {}x{} must be powers of two from 4 to 1024 with at most 4096 samples",
                    block_width, block_height
                ))
            }
        }
        Ok(())
    }

    /// COD marker segment carrying this profile.
    pub fn coding_style(&self, components: u16) -> Result<CodingStyleMarkerSegment, JpxError> {
        self.validate()?;
        let precincts = (
            exponent(self.precincts.0).unwrap_or(15),
            exponent(self.precincts.1).unwrap_or(15),
        );
        let code_blocks = (
            exponent(self.code_blocks.0).unwrap_or(6),
            exponent(self.code_blocks.1).unwrap_or(6),
        );
        let transformation = if self.reversible {
            TransformationFilter::Reversible
        } else {
            TransformationFilter::Irreversible
        };
        Ok(CodingStyleMarkerSegment::new(
            self.progression,
            self.layers,
            components >= 3,
            self.levels,
            code_blocks,
            transformation,
            &[precincts],
            self.use_sop,
        ))
    }
}

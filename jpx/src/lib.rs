//! Reading and writing of JP2 and JPX files on top of an external wavelet
//! codec engine.
//!
//! The read path probes the source, scans its boxes and codestream main
//! header, resolves region and size into engine restrictions, resolves the
//! colour model, pulls the decoded stripes and post-processes palette and
//! YCbCr images. The write path composes the header and metadata boxes,
//! pushes the image to the engine in stripes and writes the file.

pub mod colour;
pub mod compose;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod image;
pub mod metadata;
pub mod palette;
pub mod read;
pub mod reporter;
pub mod scan;
pub mod signature;
pub mod stripe;
pub mod write;

pub use crate::engine::{
    CodecEngine, CompressionProfile, DecodeRestrictions, EncodeParameters, EngineError,
    StripeCompressor, StripeDecompressor,
};
pub use crate::error::{JpxError, Phase};
pub use crate::geometry::{Rect, RegionSpec, SizeSpec};
pub use crate::image::{ExtraSample, Image, Photometric, PixelBuffer};
pub use crate::metadata::{Exif, Iptc, MetadataKind, Xmp};
pub use crate::read::{dimensions, dimensions_file, read, read_file};
pub use crate::reporter::{LogReporter, Reporter};
pub use crate::signature::Signature;
pub use crate::write::{write, write_file};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOptions {
    pub region: RegionSpec,
    pub size: SizeSpec,
    /// Deliver 8 bit samples whatever the source depth.
    pub force_8bit: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    pub profile: CompressionProfile,
    /// Rows per pushed stripe, the whole image by default.
    pub stripe_height: Option<u32>,
    /// Worker threads to request instead of the available parallelism.
    pub threads: Option<usize>,
}

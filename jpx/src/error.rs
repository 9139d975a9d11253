use std::fmt;
use std::io;

use icc::ICCError;
use jp2::JP2Error;
use jpc::CodestreamError;
use thiserror::Error;

use crate::engine::EngineError;
use crate::metadata::MetadataKind;

/// Operation step an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Probe,
    Scan,
    Geometry,
    Decode,
    Colour,
    Transfer,
    Compose,
    Encode,
    Write,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Phase::Probe => "probe",
            Phase::Scan => "scan",
            Phase::Geometry => "geometry",
            Phase::Decode => "decode",
            Phase::Colour => "colour",
            Phase::Transfer => "transfer",
            Phase::Compose => "compose",
            Phase::Encode => "encode",
            Phase::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum JpxError {
    #[error("malformed container: {reason}")]
    MalformedContainer { reason: String },

    #[error("unsupported colour space {code}")]
    UnsupportedColourSpace { code: u32 },

    #[error("unsupported number of bits per sample {bits}")]
    UnsupportedBitDepth { bits: u8 },

    #[error("no meaningful photometric interpretation for {count} colour channels")]
    UnsupportedComponentCount { count: u16 },

    #[error("region {x},{y} {width}x{height} outside image of {image_width}x{image_height}")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("invalid size: {reason}")]
    InvalidSize { reason: String },

    #[error("invalid compression profile: {reason}")]
    InvalidProfile { reason: String },

    #[error("{kind} metadata could not be decoded: {reason}")]
    MetadataDecodeFailure { kind: MetadataKind, reason: String },

    #[error("codec engine failure: {0}")]
    CodecEngineFailure(#[from] EngineError),

    #[error("ICC profile: {0}")]
    Icc(#[from] ICCError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{phase} of {file}: {source}")]
    Context {
        source: Box<JpxError>,
        phase: Phase,
        file: String,
    },
}

impl JpxError {
    /// The error without any operation context.
    pub fn root(&self) -> &JpxError {
        match self {
            JpxError::Context { source, .. } => source.root(),
            error => error,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            JpxError::Context { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> JpxError {
        JpxError::MalformedContainer {
            reason: reason.into(),
        }
    }
}

impl From<JP2Error> for JpxError {
    fn from(error: JP2Error) -> JpxError {
        match error {
            JP2Error::Io(error) if error.kind() != io::ErrorKind::UnexpectedEof => {
                JpxError::Io(error)
            }
            error => JpxError::malformed(error.to_string()),
        }
    }
}

impl From<CodestreamError> for JpxError {
    fn from(error: CodestreamError) -> JpxError {
        match error {
            CodestreamError::Io(error) if error.kind() != io::ErrorKind::UnexpectedEof => {
                JpxError::Io(error)
            }
            error => JpxError::malformed(format!("codestream: {}", error)),
        }
    }
}

pub(crate) trait ResultExt<T> {
    /// Attaches the phase and file identifier, keeping the innermost context.
    fn context(self, phase: Phase, file: &str) -> Result<T, JpxError>;
}

impl<T, E: Into<JpxError>> ResultExt<T> for Result<T, E> {
    fn context(self, phase: Phase, file: &str) -> Result<T, JpxError> {
        self.map_err(|error| match error.into() {
            error @ JpxError::Context { .. } => error,
            error => JpxError::Context {
                source: Box::new(error),
                phase,
                file: file.to_string(),
            },
        })
    }
}

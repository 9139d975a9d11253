//! XMP, IPTC and EXIF blobs carried in UUID boxes, and the essentials record
//! carried in a codestream comment.

use std::fmt;
use std::str;

use jp2::{JP2File, UUIDBox};
use jpc::{CommentMarkerSegment, CommentRegistrationValue};
use log::debug;
use thiserror::Error;

use crate::error::JpxError;
use crate::image::Image;
use crate::reporter::Reporter;

// BE7ACFCB-97A9-42E8-9C71-999491E3AFAC
pub const XMP_UUID: [u8; 16] = [
    0xBE, 0x7A, 0xCF, 0xCB, 0x97, 0xA9, 0x42, 0xE8, 0x9C, 0x71, 0x99, 0x94, 0x91, 0xE3, 0xAF, 0xAC,
];

// 33C7A4D2-B81D-4723-A0BA-F1A3E097AD38
pub const IPTC_UUID: [u8; 16] = [
    0x33, 0xC7, 0xA4, 0xD2, 0xB8, 0x1D, 0x47, 0x23, 0xA0, 0xBA, 0xF1, 0xA3, 0xE0, 0x97, 0xAD, 0x38,
];

pub const EXIF_UUID: [u8; 16] = *b"JpgTiffExif->JP2";

pub const ESSENTIALS_PREFIX: &str = "SIPI:";

const IPTC_TAG_MARKER: u8 = 0x1C;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("packet is not valid UTF-8")]
    NotUtf8,

    #[error("dataset at offset {offset} is malformed")]
    IptcDataset { offset: usize },

    #[error("missing TIFF byte order header")]
    ExifHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    Xmp,
    Iptc,
    Exif,
}

impl MetadataKind {
    pub fn uuid(&self) -> [u8; 16] {
        match self {
            MetadataKind::Xmp => XMP_UUID,
            MetadataKind::Iptc => IPTC_UUID,
            MetadataKind::Exif => EXIF_UUID,
        }
    }

    pub fn from_uuid(uuid: &[u8; 16]) -> Option<MetadataKind> {
        match *uuid {
            XMP_UUID => Some(MetadataKind::Xmp),
            IPTC_UUID => Some(MetadataKind::Iptc),
            EXIF_UUID => Some(MetadataKind::Exif),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            MetadataKind::Xmp => "XMP",
            MetadataKind::Iptc => "IPTC",
            MetadataKind::Exif => "EXIF",
        };
        f.write_str(name)
    }
}

/// XMP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Xmp {
    packet: String,
}

impl Xmp {
    pub fn from_bytes(bytes: &[u8]) -> Result<Xmp, MetadataError> {
        let packet = str::from_utf8(bytes).map_err(|_| MetadataError::NotUtf8)?;
        Ok(Xmp {
            packet: packet.to_string(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.packet.as_bytes()
    }

    pub fn packet(&self) -> &str {
        &self.packet
    }

    pub fn is_empty(&self) -> bool {
        self.packet.is_empty()
    }
}

/// IPTC-IIM datasets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iptc {
    data: Vec<u8>,
}

impl Iptc {
    /// Each dataset is a 0x1C tag marker, record and dataset numbers and a
    /// 2 byte length, or an extended length when its high bit is set.
    pub fn from_bytes(bytes: &[u8]) -> Result<Iptc, MetadataError> {
        let mut offset = 0;
        while offset < bytes.len() {
            let malformed = MetadataError::IptcDataset { offset };
            if bytes[offset] != IPTC_TAG_MARKER || offset + 5 > bytes.len() {
                return Err(malformed);
            }
            let length = u16::from_be_bytes([bytes[offset + 3], bytes[offset + 4]]) as usize;
            let mut start = offset + 5;
            let data_length = if length & 0x8000 != 0 {
                let count = length & 0x7FFF;
                if count == 0 || count > 4 || start + count > bytes.len() {
                    return Err(malformed);
                }
                let extended = bytes[start..start + count]
                    .iter()
                    .fold(0usize, |value, byte| (value << 8) | *byte as usize);
                start += count;
                extended
            } else {
                length
            };
            if start + data_length > bytes.len() {
                return Err(malformed);
            }
            offset = start + data_length;
        }
        Ok(Iptc {
            data: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// EXIF data as a TIFF structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exif {
    data: Vec<u8>,
}

impl Exif {
    /// The data must open with a TIFF header, optionally preceded by the
    /// `Exif\0\0` APP1 identifier.
    pub fn from_bytes(bytes: &[u8]) -> Result<Exif, MetadataError> {
        let tiff = bytes.strip_prefix(b"Exif\0\0").unwrap_or(bytes);
        if !tiff.starts_with(b"II*\0") && !tiff.starts_with(b"MM\0*") {
            return Err(MetadataError::ExifHeader);
        }
        Ok(Exif {
            data: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug, Default)]
pub struct Metadata {
    pub xmp: Option<Xmp>,
    pub iptc: Option<Iptc>,
    pub exif: Option<Exif>,
}

/// Builds metadata handles from the UUID boxes with known tags. Payloads
/// that cannot be decoded are reported and skipped; a later decodable
/// payload of the same kind replaces an earlier one.
pub fn extract(uuid_boxes: &[UUIDBox], reporter: &dyn Reporter) -> Metadata {
    let mut metadata = Metadata::default();
    for uuid_box in uuid_boxes {
        let kind = match MetadataKind::from_uuid(uuid_box.uuid()) {
            Some(kind) => kind,
            None => {
                debug!("Skipping UUID box {:02X?}", uuid_box.uuid());
                continue;
            }
        };
        let bytes = uuid_box.data();
        let result = match kind {
            MetadataKind::Xmp => Xmp::from_bytes(bytes).map(|xmp| {
                replace(&mut metadata.xmp, xmp, kind);
            }),
            MetadataKind::Iptc => Iptc::from_bytes(bytes).map(|iptc| {
                replace(&mut metadata.iptc, iptc, kind);
            }),
            MetadataKind::Exif => Exif::from_bytes(bytes).map(|exif| {
                replace(&mut metadata.exif, exif, kind);
            }),
        };
        if let Err(error) = result {
            let failure = JpxError::MetadataDecodeFailure {
                kind,
                reason: error.to_string(),
            };
            reporter.warning(&failure.to_string());
        }
    }
    metadata
}

fn replace<T>(slot: &mut Option<T>, value: T, kind: MetadataKind) {
    if slot.replace(value).is_some() {
        debug!("Replacing earlier {} box", kind);
    }
}

/// Appends a UUID box for each metadata handle of the image, in the order
/// IPTC, EXIF, XMP. An empty XMP packet is not written.
pub fn embed(file: &mut JP2File, image: &Image) {
    if let Some(iptc) = &image.iptc {
        file.push_uuid_box(UUIDBox::new(IPTC_UUID, iptc.as_bytes().to_vec()));
    }
    if let Some(exif) = &image.exif {
        file.push_uuid_box(UUIDBox::new(EXIF_UUID, exif.as_bytes().to_vec()));
    }
    if let Some(xmp) = &image.xmp {
        if !xmp.is_empty() {
            file.push_uuid_box(UUIDBox::new(XMP_UUID, xmp.as_bytes().to_vec()));
        }
    }
}

/// The record of the first comment carrying the essentials prefix.
pub fn essentials(comments: &[CommentMarkerSegment]) -> Option<String> {
    comments.iter().find_map(|comment| {
        comment
            .comment()
            .strip_prefix(ESSENTIALS_PREFIX.as_bytes())
            .map(|record| String::from_utf8_lossy(record).into_owned())
    })
}

pub fn essentials_comment(record: &str) -> CommentMarkerSegment {
    let comment = format!("{}{}", ESSENTIALS_PREFIX, record);
    CommentMarkerSegment::new(CommentRegistrationValue::Latin, comment.as_bytes())
}

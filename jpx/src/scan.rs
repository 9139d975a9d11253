use std::io;

use jp2::{decode_jp2, HeaderSuperBox, JBox, JP2File};
use jpc::{decode_jpc, ContiguousCodestream};
use log::{debug, info};

use crate::error::JpxError;
use crate::metadata::{self, Metadata};
use crate::reporter::Reporter;
use crate::signature::Signature;

/// Structure of a source located by [`scan`].
#[derive(Debug)]
pub struct Scan {
    /// Container boxes, `None` for a bare codestream.
    file: Option<JP2File>,
    metadata: Metadata,
    codestream: ContiguousCodestream,
    codestream_offset: u64,
    codestream_length: u64,
}

impl Scan {
    pub fn header(&self) -> Option<&HeaderSuperBox> {
        self.file.as_ref().and_then(|file| file.header_box().as_ref())
    }

    pub fn file(&self) -> Option<&JP2File> {
        self.file.as_ref()
    }

    pub fn is_jpx(&self) -> bool {
        self.file
            .as_ref()
            .map_or(false, |file| file.file_type_box().is_jpx())
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn take_metadata(&mut self) -> Metadata {
        std::mem::take(&mut self.metadata)
    }

    pub fn codestream(&self) -> &ContiguousCodestream {
        &self.codestream
    }

    /// Position and length of the codestream in the source.
    pub fn codestream_range(&self) -> (u64, u64) {
        (self.codestream_offset, self.codestream_length)
    }

    pub fn width(&self) -> u32 {
        self.codestream
            .header()
            .image_and_tile_size_marker_segment()
            .width()
    }

    pub fn height(&self) -> u32 {
        self.codestream
            .header()
            .image_and_tile_size_marker_segment()
            .height()
    }

    pub fn components(&self) -> u16 {
        self.codestream
            .header()
            .image_and_tile_size_marker_segment()
            .no_components()
    }

    /// Precision of the first component.
    pub fn bits(&self) -> Result<u8, JpxError> {
        Ok(self
            .codestream
            .header()
            .image_and_tile_size_marker_segment()
            .precision(0)?)
    }

    /// Number of decomposition levels, when the main header has a COD segment.
    pub fn levels(&self) -> Option<u8> {
        self.codestream
            .header()
            .coding_style_marker_segment()
            .map(|cod| cod.coding_style_parameters().no_decomposition_levels())
    }

    pub fn essentials(&self) -> Option<String> {
        metadata::essentials(self.codestream.header().comment_marker_segments())
    }

    /// Reads the codestream bytes from the scanned source.
    pub fn read_codestream<R: io::Read + io::Seek>(
        &self,
        reader: &mut R,
    ) -> Result<Vec<u8>, JpxError> {
        reader.seek(io::SeekFrom::Start(self.codestream_offset))?;
        let mut codestream = vec![0; self.codestream_length as usize];
        reader.read_exact(&mut codestream).map_err(|error| {
            if error.kind() == io::ErrorKind::UnexpectedEof {
                JpxError::malformed("codestream ends early")
            } else {
                JpxError::Io(error)
            }
        })?;
        Ok(codestream)
    }
}

/// Locates the codestream of a source classified as `signature` and decodes
/// its main header. Container sources also yield their boxes and metadata.
pub fn scan<R: io::Read + io::Seek>(
    reader: &mut R,
    signature: Signature,
    reporter: &dyn Reporter,
) -> Result<Scan, JpxError> {
    let start = reader.stream_position()?;

    let (file, codestream_offset, codestream_length) = match signature {
        Signature::Container => {
            let file = decode_jp2(reader)?;
            let (offset, length) = match file.contiguous_codestreams_boxes().first() {
                Some(codestream) => (codestream.offset(), codestream.length()),
                None => return Err(JpxError::malformed("no codestream box")),
            };
            if file.contiguous_codestreams_boxes().len() > 1 {
                debug!(
                    "Using the first of {} codestreams",
                    file.contiguous_codestreams_boxes().len()
                );
            }
            (Some(file), offset, length)
        }
        Signature::Codestream => {
            let end = reader.seek(io::SeekFrom::End(0))?;
            (None, start, end - start)
        }
    };

    reader.seek(io::SeekFrom::Start(codestream_offset))?;
    let codestream = decode_jpc(reader)?;
    if codestream.header_length() > codestream_length {
        return Err(JpxError::malformed(format!(
            "codestream main header of {} bytes exceeds its {} byte box",
            codestream.header_length(),
            codestream_length
        )));
    }
    info!(
        "Codestream at {} with {} bytes",
        codestream_offset, codestream_length
    );

    let metadata = match &file {
        Some(file) => metadata::extract(file.uuid_boxes(), reporter),
        None => Metadata::default(),
    };

    let scan = Scan {
        file,
        metadata,
        codestream,
        codestream_offset,
        codestream_length,
    };

    if let Some(header) = scan.header() {
        let image_header = &header.image_header_box;
        if image_header.width() != scan.width()
            || image_header.height() != scan.height()
            || image_header.components_num() != scan.components()
        {
            reporter.warning(&format!(
                "image header {}x{} with {} components disagrees with codestream {}x{} with {}",
                image_header.width(),
                image_header.height(),
                image_header.components_num(),
                scan.width(),
                scan.height(),
                scan.components()
            ));
        }
    }

    Ok(scan)
}

use log::{debug, info, warn};
use std::fmt;
use std::io;
use std::str;
use thiserror::Error;

fn box_type_name(box_type: &BoxType) -> String {
    String::from_utf8_lossy(box_type).into_owned()
}

#[derive(Debug, Error)]
pub enum JP2Error {
    #[error("invalid signature {signature:?} at offset {offset}")]
    InvalidSignature { signature: [u8; 4], offset: u64 },

    #[error("invalid brand {:?} at offset {offset}", box_type_name(.brand))]
    InvalidBrand { brand: [u8; 4], offset: u64 },

    #[error("neither 'jp2 ' nor 'jpx ' found in compatibility list '{}'", .compatibility_list.join(", "))]
    NotCompatible { compatibility_list: Vec<String> },

    #[error("unexpected box type {:?} at offset {offset}", box_type_name(.box_type))]
    BoxUnexpected { box_type: BoxType, offset: u64 },

    #[error("unexpected duplicate box type {:?} at offset {offset}", box_type_name(.box_type))]
    BoxDuplicate { box_type: BoxType, offset: u64 },

    #[error("malformed box type {:?} at offset {offset}", box_type_name(.box_type))]
    BoxMalformed { box_type: BoxType, offset: u64 },

    #[error("box type {:?} missing", box_type_name(.box_type))]
    BoxMissing { box_type: BoxType },

    #[error("unsupported reserved box length {length} at offset {offset}")]
    BoxLengthReserved { length: u64, offset: u64 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BoxType = [u8; 4];

// jP\040\040 (0x6A50 2020)
pub const BOX_TYPE_SIGNATURE: BoxType = [106, 80, 32, 32];
pub const BOX_TYPE_FILE_TYPE: BoxType = [102, 116, 121, 112];
pub const BOX_TYPE_HEADER: BoxType = [106, 112, 50, 104];
pub const BOX_TYPE_IMAGE_HEADER: BoxType = [105, 104, 100, 114];
pub const BOX_TYPE_BITS_PER_COMPONENT: BoxType = [98, 112, 99, 99];
pub const BOX_TYPE_COLOUR_SPECIFICATION: BoxType = [99, 111, 108, 114];
pub const BOX_TYPE_PALETTE: BoxType = [112, 99, 108, 114];
pub const BOX_TYPE_COMPONENT_MAPPING: BoxType = [99, 109, 97, 112];
pub const BOX_TYPE_CHANNEL_DEFINITION: BoxType = [99, 100, 101, 102];
pub const BOX_TYPE_RESOLUTION: BoxType = [114, 101, 115, 32];
pub const BOX_TYPE_CAPTURE_RESOLUTION: BoxType = [114, 101, 115, 99];
pub const BOX_TYPE_DEFAULT_DISPLAY_RESOLUTION: BoxType = [114, 101, 115, 100];
pub const BOX_TYPE_CONTIGUOUS_CODESTREAM: BoxType = [106, 112, 50, 99];
pub const BOX_TYPE_INTELLECTUAL_PROPERTY: BoxType = [106, 112, 50, 105];
pub const BOX_TYPE_XML: BoxType = [120, 109, 108, 32];
pub const BOX_TYPE_UUID: BoxType = [117, 117, 105, 100];
pub const BOX_TYPE_UUID_INFO: BoxType = [117, 105, 110, 102];
pub const BOX_TYPE_UUID_LIST: BoxType = [117, 108, 115, 116];
pub const BOX_TYPE_DATA_ENTRY_URL: BoxType = [117, 114, 108, 32];

// jp2\040 (0x6A70 3220)
pub const BRAND_JP2: [u8; 4] = [106, 112, 50, 32];

// jpx\040 (0x6A70 7820)
pub const BRAND_JPX: [u8; 4] = [106, 112, 120, 32];

// <CR><LF><0x87><LF> (0x0D0A 870A).
const SIGNATURE_MAGIC: [u8; 4] = [13, 10, 135, 10];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxTypes {
    Signature,
    FileType,
    Header,
    ImageHeader,
    BitsPerComponent,
    ColourSpecification,
    Palette,
    ComponentMapping,
    ChannelDefinition,
    Resolution,
    CaptureResolution,
    DefaultDisplayResolution,
    ContiguousCodestream,
    IntellectualProperty,
    Xml,
    Uuid,
    UUIDInfo,
    UUIDList,
    DataEntryURL,
    Unknown,
}

impl fmt::Display for BoxTypes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl BoxTypes {
    pub fn new(value: BoxType) -> BoxTypes {
        match value {
            BOX_TYPE_SIGNATURE => BoxTypes::Signature,
            BOX_TYPE_FILE_TYPE => BoxTypes::FileType,
            BOX_TYPE_HEADER => BoxTypes::Header,
            BOX_TYPE_IMAGE_HEADER => BoxTypes::ImageHeader,
            BOX_TYPE_BITS_PER_COMPONENT => BoxTypes::BitsPerComponent,
            BOX_TYPE_COLOUR_SPECIFICATION => BoxTypes::ColourSpecification,
            BOX_TYPE_PALETTE => BoxTypes::Palette,
            BOX_TYPE_COMPONENT_MAPPING => BoxTypes::ComponentMapping,
            BOX_TYPE_CHANNEL_DEFINITION => BoxTypes::ChannelDefinition,

            BOX_TYPE_RESOLUTION => BoxTypes::Resolution,
            BOX_TYPE_CAPTURE_RESOLUTION => BoxTypes::CaptureResolution,
            BOX_TYPE_DEFAULT_DISPLAY_RESOLUTION => BoxTypes::DefaultDisplayResolution,

            BOX_TYPE_CONTIGUOUS_CODESTREAM => BoxTypes::ContiguousCodestream,
            BOX_TYPE_INTELLECTUAL_PROPERTY => BoxTypes::IntellectualProperty,
            BOX_TYPE_XML => BoxTypes::Xml,

            BOX_TYPE_UUID => BoxTypes::Uuid,
            BOX_TYPE_UUID_INFO => BoxTypes::UUIDInfo,
            BOX_TYPE_UUID_LIST => BoxTypes::UUIDList,
            BOX_TYPE_DATA_ENTRY_URL => BoxTypes::DataEntryURL,
            _ => BoxTypes::Unknown,
        }
    }
}

/// JPEG 2000 box trait.
///
/// The building-block of the JP2 file format is called a box. All information
/// contained within a JP2 or JPX file is encapsulated in boxes, and some boxes
/// contain other boxes.
///
/// `length` is the length of the box contents and `offset` the stream
/// position of the first content byte, i.e. both exclude the box header.
///
/// For more information, see ISO/IEC 15444-1 / ITU T-800 Appendix I.4.
pub trait JBox {
    fn identifier(&self) -> BoxType;
    fn length(&self) -> u64;
    fn offset(&self) -> u64;

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error>;

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error>;

    /// Writes the box header followed by the contents.
    fn encode<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        let mut contents: Vec<u8> = Vec::new();
        self.encode_contents(&mut contents)?;
        encode_box_header(writer, self.identifier(), contents.len() as u64)?;
        writer.write_all(&contents)?;
        Ok(())
    }
}

/// JPEG 2000 Signature box.
///
/// The Signature box identifies that the format of this file was defined by the
/// JPEG 2000 Recommendation | International Standard. It shall be the first
/// box in the file and is a fixed 12-byte string with the value
/// 0x0000 000C 6A50 2020 0D0A 870A.
///
/// For more information, see ISO/IEC 15444-1 / ITU T-800 Appendix I.5.1.
#[derive(Debug, Default)]
pub struct SignatureBox {
    length: u64,
    offset: u64,
}

impl SignatureBox {
    pub fn signature(&self) -> [u8; 4] {
        SIGNATURE_MAGIC
    }
}

impl JBox for SignatureBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_SIGNATURE
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    // The contents of this box shall be the 4-byte character string ‘<CR><LF><0x87><LF>’ (0x0D0A 870A).
    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        let mut buffer: [u8; 4] = [0; 4];

        reader.read_exact(&mut buffer)?;

        if self.length != 4 || buffer != SIGNATURE_MAGIC {
            return Err(JP2Error::InvalidSignature {
                signature: buffer,
                offset: self.offset,
            });
        };

        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        writer.write_all(&SIGNATURE_MAGIC)?;
        Ok(())
    }
}

type CompatibilityList = Vec<[u8; 4]>;

/// File Type box.
///
/// Defines the standard which completely describes the file (the brand) and a
/// list of readers with which the file is compatible. This box shall
/// immediately follow the Signature box.
///
/// Both JP2 (`jp2 `) and JPX (`jpx `) brands are accepted, as long as the
/// compatibility list names either of them.
///
/// For more information, see ISO/IEC 15444-1 / ITU T-800 Appendix I.5.2.
#[derive(Debug, Default)]
pub struct FileTypeBox {
    length: u64,
    offset: u64,
    brand: [u8; 4],
    min_version: [u8; 4],
    compatibility_list: CompatibilityList,
}

impl FileTypeBox {
    pub fn new(brand: [u8; 4], compatibility_list: Vec<[u8; 4]>) -> FileTypeBox {
        FileTypeBox {
            length: 8 + 4 * compatibility_list.len() as u64,
            offset: 0,
            brand,
            min_version: [0; 4],
            compatibility_list,
        }
    }

    /// Brand.
    ///
    /// This field specifies the Recommendation | International Standard which
    /// completely defines this file.
    pub fn brand(&self) -> &str {
        str::from_utf8(&self.brand).unwrap_or("????")
    }

    pub fn is_jpx(&self) -> bool {
        self.brand == BRAND_JPX
    }

    /// Minor version.
    ///
    /// The value of this field shall be zero, however readers shall continue
    /// to parse and interpret this file even if it is not.
    pub fn min_version(&self) -> u32 {
        u32::from_be_bytes(self.min_version)
    }

    /// Compatibility list
    ///
    /// Each entry is a four byte string of ISO 646 characters naming a
    /// standard, or a profile of a standard, to which the file conforms.
    pub fn compatibility_list(&self) -> Vec<String> {
        self.compatibility_list
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect()
    }
}

impl JBox for FileTypeBox {
    // The type of the File Type Box shall be ‘ftyp’ (0x6674 7970).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_FILE_TYPE
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        if self.length < 8 || self.length % 4 != 0 {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_FILE_TYPE,
                offset: self.offset,
            });
        }

        reader.read_exact(&mut self.brand)?;
        if self.brand != BRAND_JP2 && self.brand != BRAND_JPX {
            return Err(JP2Error::InvalidBrand {
                brand: self.brand,
                offset: self.offset,
            });
        }

        reader.read_exact(&mut self.min_version)?;

        // The number of CL fields is determined by the length of this box
        let size = (self.length - 8) / 4;
        self.compatibility_list = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let mut buffer: [u8; 4] = [0; 4];
            reader.read_exact(&mut buffer)?;
            self.compatibility_list.push(buffer);
        }
        debug!(
            "Brand {:?} compatible with {:?}",
            self.brand(),
            self.compatibility_list()
        );

        if !self.compatibility_list.contains(&BRAND_JP2)
            && !self.compatibility_list.contains(&BRAND_JPX)
        {
            return Err(JP2Error::NotCompatible {
                compatibility_list: self.compatibility_list(),
            });
        }

        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        writer.write_all(&self.brand)?;
        writer.write_all(&self.min_version)?;
        for entry in &self.compatibility_list {
            writer.write_all(entry)?;
        }
        Ok(())
    }
}

// I.5.3
//
// JP2 Header Box
//
// The JP2 Header box contains generic information about the file, such as
// number of components, colourspace, and grid resolution. This box is a
// superbox which shall start with an Image Header box; the other boxes may
// follow in any order.
//
// Within a JP2 file, there shall be one and only one JP2 Header box.
#[derive(Debug, Default)]
pub struct HeaderSuperBox {
    length: u64,
    offset: u64,
    pub image_header_box: ImageHeaderBox,
    pub bits_per_component_box: Option<BitsPerComponentBox>,
    pub colour_specification_boxes: Vec<ColourSpecificationBox>,
    pub palette_box: Option<PaletteBox>,
    pub component_mapping_box: Option<ComponentMappingBox>,
    pub channel_definition_box: Option<ChannelDefinitionBox>,
    pub resolution_box: Option<ResolutionSuperBox>,
}

impl HeaderSuperBox {
    pub fn new(image_header_box: ImageHeaderBox) -> HeaderSuperBox {
        HeaderSuperBox {
            image_header_box,
            ..Default::default()
        }
    }
}

fn duplicate<T>(existing: &Option<T>, box_type: BoxType, offset: u64) -> Result<(), JP2Error> {
    if existing.is_some() {
        return Err(JP2Error::BoxDuplicate { box_type, offset });
    }
    Ok(())
}

impl JBox for HeaderSuperBox {
    // The type of the JP2 Header box shall be ‘jp2h’ (0x6A70 3268)
    fn identifier(&self) -> BoxType {
        BOX_TYPE_HEADER
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        let end = self.offset + self.length;

        let header = decode_box_header(reader, end)?.ok_or(JP2Error::BoxMissing {
            box_type: BOX_TYPE_IMAGE_HEADER,
        })?;
        if header.box_type != BOX_TYPE_IMAGE_HEADER {
            return Err(JP2Error::BoxUnexpected {
                box_type: header.box_type,
                offset: header.offset,
            });
        }
        self.image_header_box.length = header.box_length;
        self.image_header_box.offset = header.offset;
        decode_box(&mut self.image_header_box, reader)?;

        while let Some(BoxHeader {
            box_length,
            box_type,
            offset,
        }) = decode_box_header(reader, end)?
        {
            match BoxTypes::new(box_type) {
                BoxTypes::ImageHeader => {
                    // Instances of Image Header box in other places in the file shall be ignored.
                    warn!("ImageHeaderBox found in other place, ignoring");
                    reader.seek(io::SeekFrom::Start(offset + box_length))?;
                }
                BoxTypes::ColourSpecification => {
                    let mut colour_specification_box = ColourSpecificationBox {
                        length: box_length,
                        offset,
                        ..Default::default()
                    };
                    decode_box(&mut colour_specification_box, reader)?;
                    self.colour_specification_boxes
                        .push(colour_specification_box);
                }
                BoxTypes::BitsPerComponent => {
                    // There shall be one and only one Bits Per Component box inside a JP2 Header box.
                    duplicate(&self.bits_per_component_box, box_type, offset)?;
                    let mut bits_per_component_box = BitsPerComponentBox {
                        length: box_length,
                        offset,
                        bits_per_component: vec![
                            0;
                            self.image_header_box.components_num() as usize
                        ],
                    };
                    decode_box(&mut bits_per_component_box, reader)?;
                    self.bits_per_component_box = Some(bits_per_component_box);
                }
                BoxTypes::Palette => {
                    // There shall be at most one Palette box inside a JP2 Header box.
                    duplicate(&self.palette_box, box_type, offset)?;
                    let mut palette_box = PaletteBox {
                        length: box_length,
                        offset,
                        ..Default::default()
                    };
                    decode_box(&mut palette_box, reader)?;
                    self.palette_box = Some(palette_box);
                }
                BoxTypes::ComponentMapping => {
                    duplicate(&self.component_mapping_box, box_type, offset)?;
                    let mut component_mapping_box = ComponentMappingBox {
                        length: box_length,
                        offset,
                        mapping: vec![],
                    };
                    decode_box(&mut component_mapping_box, reader)?;
                    self.component_mapping_box = Some(component_mapping_box);
                }
                BoxTypes::ChannelDefinition => {
                    duplicate(&self.channel_definition_box, box_type, offset)?;
                    let mut channel_definition_box = ChannelDefinitionBox {
                        length: box_length,
                        offset,
                        ..Default::default()
                    };
                    decode_box(&mut channel_definition_box, reader)?;
                    self.channel_definition_box = Some(channel_definition_box);
                }
                BoxTypes::Resolution => {
                    duplicate(&self.resolution_box, box_type, offset)?;
                    let mut resolution_box = ResolutionSuperBox {
                        length: box_length,
                        offset,
                        ..Default::default()
                    };
                    decode_box(&mut resolution_box, reader)?;
                    self.resolution_box = Some(resolution_box);
                }
                _ => {
                    // Other boxes may be defined in other standards and may be
                    // ignored by conforming readers.
                    warn!(
                        "Unknown box type {:?} at {:?} in header, skipping",
                        box_type_name(&box_type),
                        offset
                    );
                    reader.seek(io::SeekFrom::Start(offset + box_length))?;
                }
            }
        }

        // There shall be at least one Colour Specification box
        // within the JP2 Header box.
        if self.colour_specification_boxes.is_empty() {
            warn!("HeaderSuperBox without ColourSpecificationBox");
        }

        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        self.image_header_box.encode(writer)?;
        if let Some(bits_per_component_box) = &self.bits_per_component_box {
            bits_per_component_box.encode(writer)?;
        }
        for colour_specification_box in &self.colour_specification_boxes {
            colour_specification_box.encode(writer)?;
        }
        if let Some(palette_box) = &self.palette_box {
            palette_box.encode(writer)?;
        }
        if let Some(component_mapping_box) = &self.component_mapping_box {
            component_mapping_box.encode(writer)?;
        }
        if let Some(channel_definition_box) = &self.channel_definition_box {
            channel_definition_box.encode(writer)?;
        }
        if let Some(resolution_box) = &self.resolution_box {
            resolution_box.encode(writer)?;
        }
        Ok(())
    }
}

pub const COMPRESSION_TYPE_WAVELET: u8 = 7;

// I.5.3.1
//
// Image Header box
//
// This box contains fixed length generic information about the image, such as
// the image size and number of components. Much of it is redundant with the
// SIZ marker segment of the first codestream.
#[derive(Debug, Default)]
pub struct ImageHeaderBox {
    length: u64,
    offset: u64,
    height: [u8; 4],
    width: [u8; 4],
    components_num: [u8; 2],
    components_bits: [u8; 1],
    compression_type: [u8; 1],
    colourspace_unknown: [u8; 1],
    intellectual_property: [u8; 1],
}

impl ImageHeaderBox {
    /// `bit_depth` is `None` when the components vary in bit depth, in which
    /// case a Bits Per Component box must accompany this box.
    pub fn new(
        height: u32,
        width: u32,
        components_num: u16,
        bit_depth: Option<BitDepth>,
    ) -> ImageHeaderBox {
        ImageHeaderBox {
            length: 14,
            offset: 0,
            height: height.to_be_bytes(),
            width: width.to_be_bytes(),
            components_num: components_num.to_be_bytes(),
            components_bits: [bit_depth.map(|depth| depth.to_byte()).unwrap_or(255)],
            compression_type: [COMPRESSION_TYPE_WAVELET],
            colourspace_unknown: [0],
            intellectual_property: [0],
        }
    }

    // Image area height, Ysiz – YOsiz of the codestream SIZ marker.
    pub fn height(&self) -> u32 {
        u32::from_be_bytes(self.height)
    }

    // Image area width, Xsiz – XOsiz of the codestream SIZ marker.
    pub fn width(&self) -> u32 {
        u32::from_be_bytes(self.width)
    }

    // Number of components, equal to Csiz of the codestream SIZ marker.
    pub fn components_num(&self) -> u16 {
        u16::from_be_bytes(self.components_num)
    }

    /// Bits per component.
    ///
    /// The low 7-bits of the value indicate the bit depth of the components
    /// minus one, the high-bit the signedness. `None` when the components vary
    /// in bit depth (255) and a Bits Per Component box carries the depths.
    pub fn bit_depth(&self) -> Option<BitDepth> {
        if self.components_bits[0] == 255 {
            None
        } else {
            Some(BitDepth::new(self.components_bits[0]))
        }
    }

    // Compression type, shall be 7.
    pub fn compression_type(&self) -> u8 {
        self.compression_type[0]
    }

    // Colourspace Unknown.
    //
    // 0 if the colourspace of the image is known and correctly specified in the
    // Colourspace Specification boxes, 1 if it is not known.
    pub fn colourspace_unknown(&self) -> u8 {
        self.colourspace_unknown[0]
    }

    // Intellectual Property, 1 if the file contains an IPR box.
    pub fn intellectual_property(&self) -> u8 {
        self.intellectual_property[0]
    }
}

impl JBox for ImageHeaderBox {
    // The type of the Image Header box shall be ‘ihdr’ (0x6968 6472)
    fn identifier(&self) -> BoxType {
        BOX_TYPE_IMAGE_HEADER
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        // The length of the Image Header box shall be 22 bytes, including the
        // box length and type fields.
        if self.length != 14 {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_IMAGE_HEADER,
                offset: self.offset,
            });
        }
        reader.read_exact(&mut self.height)?;
        reader.read_exact(&mut self.width)?;
        reader.read_exact(&mut self.components_num)?;
        reader.read_exact(&mut self.components_bits)?;
        reader.read_exact(&mut self.compression_type)?;
        reader.read_exact(&mut self.colourspace_unknown)?;
        reader.read_exact(&mut self.intellectual_property)?;

        if self.compression_type() != COMPRESSION_TYPE_WAVELET {
            warn!("Compression type {} unexpected", self.compression_type());
        }
        debug!(
            "Image {}x{} with {} components",
            self.width(),
            self.height(),
            self.components_num()
        );

        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        writer.write_all(&self.height)?;
        writer.write_all(&self.width)?;
        writer.write_all(&self.components_num)?;
        writer.write_all(&self.components_bits)?;
        writer.write_all(&self.compression_type)?;
        writer.write_all(&self.colourspace_unknown)?;
        writer.write_all(&self.intellectual_property)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Signed { value: u8 },
    Unsigned { value: u8 },
}

impl BitDepth {
    pub fn new(byte: u8) -> BitDepth {
        // The low 7-bits of the value indicate the bit depth minus one.
        let value = (byte & 0b0111_1111) + 1;

        // The high-bit indicates whether the component is signed or unsigned.
        if byte >> 7 == 1 {
            BitDepth::Signed { value }
        } else {
            BitDepth::Unsigned { value }
        }
    }

    pub fn value(&self) -> u8 {
        match &self {
            Self::Signed { value } => *value,
            Self::Unsigned { value } => *value,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Signed { .. })
    }

    pub fn to_byte(&self) -> u8 {
        match &self {
            Self::Signed { value } => 0x80 | (value.saturating_sub(1) & 0x7f),
            Self::Unsigned { value } => value.saturating_sub(1) & 0x7f,
        }
    }
}

// I.5.3.2
//
// The Bits Per Component box specifies the bit depth of each component, in
// codestream order, when they differ in sign or precision.
#[derive(Debug, Default)]
pub struct BitsPerComponentBox {
    length: u64,
    offset: u64,

    // The number of BP_Ci fields shall be the same as the value of the NC
    // field from the Image Header box.
    bits_per_component: Vec<u8>,
}

impl BitsPerComponentBox {
    pub fn new(bit_depths: &[BitDepth]) -> BitsPerComponentBox {
        BitsPerComponentBox {
            length: bit_depths.len() as u64,
            offset: 0,
            bits_per_component: bit_depths.iter().map(|depth| depth.to_byte()).collect(),
        }
    }

    pub fn bits_per_component(&self) -> Vec<BitDepth> {
        self.bits_per_component
            .iter()
            .map(|byte| BitDepth::new(*byte))
            .collect()
    }
}

impl JBox for BitsPerComponentBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_BITS_PER_COMPONENT
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        if self.length != self.bits_per_component.len() as u64 {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_BITS_PER_COMPONENT,
                offset: self.offset,
            });
        }
        reader.read_exact(&mut self.bits_per_component)?;
        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        writer.write_all(&self.bits_per_component)?;
        Ok(())
    }
}

const METHOD_ENUMERATED_COLOUR_SPACE: u8 = 1;
const METHOD_RESTRICTED_ICC_PROFILE: u8 = 2;
const METHOD_ANY_ICC_PROFILE: u8 = 3;
const METHOD_VENDOR_COLOUR: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourSpecificationMethods {
    EnumeratedColourSpace,
    RestrictedICCProfile,
    // JPX only
    AnyICCProfile,
    // JPX only, vendor UUID followed by vendor parameters
    VendorColourMethod,
    Reserved { value: u8 },
}

impl fmt::Display for ColourSpecificationMethods {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl ColourSpecificationMethods {
    pub fn new(value: u8) -> ColourSpecificationMethods {
        match value {
            METHOD_ENUMERATED_COLOUR_SPACE => ColourSpecificationMethods::EnumeratedColourSpace,
            METHOD_RESTRICTED_ICC_PROFILE => ColourSpecificationMethods::RestrictedICCProfile,
            METHOD_ANY_ICC_PROFILE => ColourSpecificationMethods::AnyICCProfile,
            METHOD_VENDOR_COLOUR => ColourSpecificationMethods::VendorColourMethod,
            value => ColourSpecificationMethods::Reserved { value },
        }
    }

    pub fn value(&self) -> u8 {
        match self {
            ColourSpecificationMethods::EnumeratedColourSpace => METHOD_ENUMERATED_COLOUR_SPACE,
            ColourSpecificationMethods::RestrictedICCProfile => METHOD_RESTRICTED_ICC_PROFILE,
            ColourSpecificationMethods::AnyICCProfile => METHOD_ANY_ICC_PROFILE,
            ColourSpecificationMethods::VendorColourMethod => METHOD_VENDOR_COLOUR,
            ColourSpecificationMethods::Reserved { value } => *value,
        }
    }
}

/// Enumerated colourspaces of ISO/IEC 15444-1 Table I.10 and
/// ISO/IEC 15444-2 Table M.25.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumeratedColourSpaces {
    BiLevel,
    YCbCr1,
    YCbCr2,
    YCbCr3,
    PhotoYCC,
    CMY,
    CMYK,
    YCCK,
    CIELab,
    BiLevel2,
    sRGB,
    Greyscale,
    sYCC,
    CIEJab,
    esRGB,
    ROMMRGB,
    YPbPr60,
    YPbPr50,
    esYCC,
    Reserved { value: u32 },
}

impl EnumeratedColourSpaces {
    pub fn new(value: u32) -> EnumeratedColourSpaces {
        match value {
            0 => EnumeratedColourSpaces::BiLevel,
            1 => EnumeratedColourSpaces::YCbCr1,
            3 => EnumeratedColourSpaces::YCbCr2,
            4 => EnumeratedColourSpaces::YCbCr3,
            9 => EnumeratedColourSpaces::PhotoYCC,
            11 => EnumeratedColourSpaces::CMY,
            12 => EnumeratedColourSpaces::CMYK,
            13 => EnumeratedColourSpaces::YCCK,
            14 => EnumeratedColourSpaces::CIELab,
            15 => EnumeratedColourSpaces::BiLevel2,
            16 => EnumeratedColourSpaces::sRGB,
            17 => EnumeratedColourSpaces::Greyscale,
            18 => EnumeratedColourSpaces::sYCC,
            19 => EnumeratedColourSpaces::CIEJab,
            20 => EnumeratedColourSpaces::esRGB,
            21 => EnumeratedColourSpaces::ROMMRGB,
            22 => EnumeratedColourSpaces::YPbPr60,
            23 => EnumeratedColourSpaces::YPbPr50,
            24 => EnumeratedColourSpaces::esYCC,
            value => EnumeratedColourSpaces::Reserved { value },
        }
    }

    pub fn value(&self) -> u32 {
        match self {
            EnumeratedColourSpaces::BiLevel => 0,
            EnumeratedColourSpaces::YCbCr1 => 1,
            EnumeratedColourSpaces::YCbCr2 => 3,
            EnumeratedColourSpaces::YCbCr3 => 4,
            EnumeratedColourSpaces::PhotoYCC => 9,
            EnumeratedColourSpaces::CMY => 11,
            EnumeratedColourSpaces::CMYK => 12,
            EnumeratedColourSpaces::YCCK => 13,
            EnumeratedColourSpaces::CIELab => 14,
            EnumeratedColourSpaces::BiLevel2 => 15,
            EnumeratedColourSpaces::sRGB => 16,
            EnumeratedColourSpaces::Greyscale => 17,
            EnumeratedColourSpaces::sYCC => 18,
            EnumeratedColourSpaces::CIEJab => 19,
            EnumeratedColourSpaces::esRGB => 20,
            EnumeratedColourSpaces::ROMMRGB => 21,
            EnumeratedColourSpaces::YPbPr60 => 22,
            EnumeratedColourSpaces::YPbPr50 => 23,
            EnumeratedColourSpaces::esYCC => 24,
            EnumeratedColourSpaces::Reserved { value } => *value,
        }
    }
}

// I.5.3.3
//
// Colour Specification box
//
// Each Colour Specification box defines one method by which an application can
// interpret the colourspace of the decompressed image data. A file may contain
// several; a conforming JP2 reader shall ignore all after the first.
#[derive(Debug, Default)]
pub struct ColourSpecificationBox {
    length: u64,
    offset: u64,
    method: [u8; 1],
    precedence: [u8; 1],
    colourspace_approximation: [u8; 1],
    enumerated_colour_space: [u8; 4],
    icc_profile: Vec<u8>,
}

impl ColourSpecificationBox {
    pub fn new_enumerated(colour_space: EnumeratedColourSpaces) -> ColourSpecificationBox {
        ColourSpecificationBox {
            length: 7,
            offset: 0,
            method: [METHOD_ENUMERATED_COLOUR_SPACE],
            precedence: [0],
            colourspace_approximation: [0],
            enumerated_colour_space: colour_space.value().to_be_bytes(),
            icc_profile: vec![],
        }
    }

    /// `method` is either the restricted (JP2) or any (JPX) ICC method.
    pub fn new_icc_profile(
        method: ColourSpecificationMethods,
        icc_profile: Vec<u8>,
    ) -> ColourSpecificationBox {
        ColourSpecificationBox {
            length: 3 + icc_profile.len() as u64,
            offset: 0,
            method: [method.value()],
            precedence: [0],
            colourspace_approximation: [0],
            enumerated_colour_space: [0; 4],
            icc_profile,
        }
    }

    // Specification method.
    pub fn method(&self) -> ColourSpecificationMethods {
        ColourSpecificationMethods::new(self.method[0])
    }

    // Precedence, reserved in JP2 and ignored by readers.
    pub fn precedence(&self) -> i8 {
        self.precedence[0] as i8
    }

    // Colourspace approximation, ignored by readers.
    pub fn colourspace_approximation(&self) -> u8 {
        self.colourspace_approximation[0]
    }

    /// Enumerated colourspace, present only for the enumerated method.
    pub fn enumerated_colour_space(&self) -> Option<EnumeratedColourSpaces> {
        match self.method() {
            ColourSpecificationMethods::EnumeratedColourSpace => Some(
                EnumeratedColourSpaces::new(u32::from_be_bytes(self.enumerated_colour_space)),
            ),
            _ => None,
        }
    }

    /// Embedded ICC profile, present only for the ICC methods.
    pub fn icc_profile(&self) -> Option<&[u8]> {
        match self.method() {
            ColourSpecificationMethods::RestrictedICCProfile
            | ColourSpecificationMethods::AnyICCProfile => Some(&self.icc_profile),
            _ => None,
        }
    }
}

impl JBox for ColourSpecificationBox {
    // The type of a Colour Specification box shall be ‘colr’ (0x636F 6C72).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_COLOUR_SPECIFICATION
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        if self.length < 3 {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_COLOUR_SPECIFICATION,
                offset: self.offset,
            });
        }
        reader.read_exact(&mut self.method)?;
        reader.read_exact(&mut self.precedence)?;
        reader.read_exact(&mut self.colourspace_approximation)?;

        debug!("Method {:?}", self.method());
        debug!("Precedence {:?}", self.precedence());
        debug!(
            "ColourSpace Approximation {:?}",
            self.colourspace_approximation()
        );

        match self.method() {
            // 1 - Enumerated Colourspace.
            //
            // The EnumCS field immediately follows the APPROX field. JPX may
            // append enumerated parameters, which are skipped.
            ColourSpecificationMethods::EnumeratedColourSpace => {
                if self.length < 7 {
                    return Err(JP2Error::BoxMalformed {
                        box_type: BOX_TYPE_COLOUR_SPECIFICATION,
                        offset: self.offset,
                    });
                }
                reader.read_exact(&mut self.enumerated_colour_space)?;
                debug!(
                    "Enumerated Colour Space {:?}",
                    self.enumerated_colour_space()
                );
            }

            // 2 - Restricted ICC profile, 3 - Any ICC profile.
            //
            // The PROFILE field immediately follows the APPROX field and is the
            // last field in the box.
            ColourSpecificationMethods::RestrictedICCProfile
            | ColourSpecificationMethods::AnyICCProfile => {
                self.icc_profile = vec![0; self.length as usize - 3];
                reader.read_exact(&mut self.icc_profile)?;
                debug!("ICC Profile of {} bytes", self.icc_profile.len());
            }

            // A conforming reader shall ignore the entire Colour Specification
            // box for any other method.
            ColourSpecificationMethods::VendorColourMethod
            | ColourSpecificationMethods::Reserved { .. } => {
                warn!("Colour specification method {} ignored", self.method());
            }
        }

        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        writer.write_all(&self.method)?;
        writer.write_all(&self.precedence)?;
        writer.write_all(&self.colourspace_approximation)?;
        match self.method() {
            ColourSpecificationMethods::EnumeratedColourSpace => {
                writer.write_all(&self.enumerated_colour_space)?;
            }
            _ => writer.write_all(&self.icc_profile)?,
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct GeneratedComponent {
    // B^i: bit depth of generated component i, low 7 bits depth minus one,
    // high bit signedness.
    bit_depth: [u8; 1],

    // C^ji: generated component value for entry j.
    //
    // Values narrower than a multiple of 8 bits are stored in the low-order
    // bits of the padded big endian value.
    values: Vec<u32>,
}

impl GeneratedComponent {
    pub fn new(bit_depth: BitDepth, values: Vec<u32>) -> GeneratedComponent {
        GeneratedComponent {
            bit_depth: [bit_depth.to_byte()],
            values,
        }
    }

    pub fn bit_depth(&self) -> BitDepth {
        BitDepth::new(self.bit_depth[0])
    }

    pub fn values(&self) -> &Vec<u32> {
        &self.values
    }

    fn entry_size(&self) -> usize {
        (self.bit_depth().value() as usize + 7) / 8
    }
}

/// Palette box.
///
/// The palette specified in this box is applied to a single component to
/// convert it into multiple components. If the JP2 Header box contains a
/// Palette box, it shall also contain a Component Mapping box.
///
/// See Part 1 Section I.5.3.4 for more information.
#[derive(Debug, Default)]
pub struct PaletteBox {
    length: u64,
    offset: u64,

    /// Number of entries in the table, 1 to 1024.
    num_entries: [u8; 2],

    /// Number of components created by the application of the palette.
    num_components: [u8; 1],

    generated_components: Vec<GeneratedComponent>,
}

impl PaletteBox {
    /// Every generated component must carry the same number of entries.
    pub fn new(generated_components: Vec<GeneratedComponent>) -> PaletteBox {
        let num_entries = generated_components
            .first()
            .map(|component| component.values.len())
            .unwrap_or(0) as u16;
        let entry_bytes: usize = generated_components
            .iter()
            .map(|component| component.entry_size())
            .sum();
        PaletteBox {
            length: 3
                + generated_components.len() as u64
                + num_entries as u64 * entry_bytes as u64,
            offset: 0,
            num_entries: num_entries.to_be_bytes(),
            num_components: [generated_components.len() as u8],
            generated_components,
        }
    }

    pub fn num_entries(&self) -> u16 {
        u16::from_be_bytes(self.num_entries)
    }

    pub fn num_components(&self) -> u8 {
        self.num_components[0]
    }

    pub fn generated_components(&self) -> &Vec<GeneratedComponent> {
        &self.generated_components
    }
}

impl JBox for PaletteBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_PALETTE
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        reader.read_exact(&mut self.num_entries)?;
        reader.read_exact(&mut self.num_components)?;

        let num_entries = self.num_entries() as usize;
        let mut generated_components = vec![
            GeneratedComponent {
                bit_depth: [0],
                values: Vec::with_capacity(num_entries),
            };
            self.num_components() as usize
        ];
        for generated_component in &mut generated_components {
            reader.read_exact(&mut generated_component.bit_depth)?;
            if generated_component.entry_size() > 4 {
                return Err(JP2Error::BoxMalformed {
                    box_type: BOX_TYPE_PALETTE,
                    offset: self.offset,
                });
            }
        }

        let entry_bytes: usize = generated_components
            .iter()
            .map(|component| component.entry_size())
            .sum();
        if 3 + generated_components.len() as u64 + (num_entries * entry_bytes) as u64
            > self.length
        {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_PALETTE,
                offset: self.offset,
            });
        }

        // Entries are stored entry by entry, each holding one value per
        // generated component.
        for _ in 0..num_entries {
            for generated_component in &mut generated_components {
                let mut entry: [u8; 4] = [0; 4];
                let size = generated_component.entry_size();
                reader.read_exact(&mut entry[4 - size..])?;
                generated_component.values.push(u32::from_be_bytes(entry));
            }
        }
        debug!(
            "Palette of {} entries for {} components",
            num_entries,
            generated_components.len()
        );
        self.generated_components = generated_components;

        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        writer.write_all(&self.num_entries)?;
        writer.write_all(&self.num_components)?;
        for generated_component in &self.generated_components {
            writer.write_all(&generated_component.bit_depth)?;
        }
        for j in 0..self.num_entries() as usize {
            for generated_component in &self.generated_components {
                let size = generated_component.entry_size();
                let value = generated_component.values.get(j).copied().unwrap_or(0);
                writer.write_all(&value.to_be_bytes()[4 - size..])?;
            }
        }
        Ok(())
    }
}

const COMPONENT_MAP_TYPE_DIRECT: u8 = 0;
const COMPONENT_MAP_TYPE_PALETTE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentMapType {
    // Direct use, the channel is created directly from an actual component.
    Direct,

    // Palette mapping, the channel is created by applying the palette column
    // PCOL^i to an actual component.
    Palette,

    // Reserved for ISO use
    Reserved { value: u8 },
}

impl ComponentMapType {
    fn new(value: u8) -> ComponentMapType {
        match value {
            COMPONENT_MAP_TYPE_DIRECT => ComponentMapType::Direct,
            COMPONENT_MAP_TYPE_PALETTE => ComponentMapType::Palette,
            value => ComponentMapType::Reserved { value },
        }
    }

    fn value(&self) -> u8 {
        match self {
            ComponentMapType::Direct => COMPONENT_MAP_TYPE_DIRECT,
            ComponentMapType::Palette => COMPONENT_MAP_TYPE_PALETTE,
            ComponentMapType::Reserved { value } => *value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentMap {
    // CMP^i: index of the codestream component mapped to this channel.
    component: [u8; 2],

    // MTYP^i
    mapping_type: [u8; 1],

    // PCOL^i: palette column used when MTYP^i is 1, otherwise 0.
    palette: [u8; 1],
}

impl ComponentMap {
    pub fn new(component: u16, mapping_type: ComponentMapType, palette: u8) -> ComponentMap {
        ComponentMap {
            component: component.to_be_bytes(),
            mapping_type: [mapping_type.value()],
            palette: [palette],
        }
    }

    pub fn component(&self) -> u16 {
        u16::from_be_bytes(self.component)
    }

    pub fn mapping_type(&self) -> ComponentMapType {
        ComponentMapType::new(self.mapping_type[0])
    }

    pub fn palette(&self) -> u8 {
        self.palette[0]
    }
}

/// Component Mapping Box.
///
/// Defines how image channels are identified from the actual components
/// decoded from the codestream. The number of channels is determined by the
/// length of the box.
///
/// See ISO/IEC 15444-1:2024 Section I.5.3.5.
#[derive(Debug, Default)]
pub struct ComponentMappingBox {
    length: u64,
    offset: u64,
    mapping: Vec<ComponentMap>,
}

impl ComponentMappingBox {
    pub fn new(mapping: Vec<ComponentMap>) -> ComponentMappingBox {
        ComponentMappingBox {
            length: 4 * mapping.len() as u64,
            offset: 0,
            mapping,
        }
    }

    pub fn component_map(&self) -> &Vec<ComponentMap> {
        &self.mapping
    }
}

impl JBox for ComponentMappingBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_COMPONENT_MAPPING
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        if self.length % 4 != 0 {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_COMPONENT_MAPPING,
                offset: self.offset,
            });
        }

        for _ in 0..self.length / 4 {
            let mut component_map = ComponentMap {
                component: [0; 2],
                mapping_type: [0; 1],
                palette: [0; 1],
            };
            reader.read_exact(&mut component_map.component)?;
            reader.read_exact(&mut component_map.mapping_type)?;
            reader.read_exact(&mut component_map.palette)?;

            self.mapping.push(component_map);
        }

        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        for component_map in &self.mapping {
            writer.write_all(&component_map.component)?;
            writer.write_all(&component_map.mapping_type)?;
            writer.write_all(&component_map.palette)?;
        }
        Ok(())
    }
}

const CHANNEL_TYPE_COLOUR_IMAGE_DATA: u16 = 0;
const CHANNEL_TYPE_OPACITY_DATA: u16 = 1;
const CHANNEL_TYPE_PREMULTIPLIED_OPACITY: u16 = 2;
const CHANNEL_TYPE_UNSPECIFIED: u16 = u16::MAX;

/// Association of a channel with the whole image.
pub const CHANNEL_ASSOCIATION_WHOLE_IMAGE: u16 = 0;

/// Channel not associated with any particular colour.
pub const CHANNEL_ASSOCIATION_UNSPECIFIED: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelTypes {
    ColourImageData,
    Opacity,
    PremultipliedOpacity,
    Reserved { value: u16 },
    Unspecified,
}

impl ChannelTypes {
    pub fn new(channel_type: u16) -> ChannelTypes {
        match channel_type {
            CHANNEL_TYPE_COLOUR_IMAGE_DATA => ChannelTypes::ColourImageData,
            CHANNEL_TYPE_OPACITY_DATA => ChannelTypes::Opacity,
            CHANNEL_TYPE_PREMULTIPLIED_OPACITY => ChannelTypes::PremultipliedOpacity,
            CHANNEL_TYPE_UNSPECIFIED => ChannelTypes::Unspecified,
            value => ChannelTypes::Reserved { value },
        }
    }

    pub fn value(&self) -> u16 {
        match self {
            ChannelTypes::ColourImageData => CHANNEL_TYPE_COLOUR_IMAGE_DATA,
            ChannelTypes::Opacity => CHANNEL_TYPE_OPACITY_DATA,
            ChannelTypes::PremultipliedOpacity => CHANNEL_TYPE_PREMULTIPLIED_OPACITY,
            ChannelTypes::Unspecified => CHANNEL_TYPE_UNSPECIFIED,
            ChannelTypes::Reserved { value } => *value,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Channel {
    // Cn^i: index of the channel, as defined by the Component Mapping box or
    // the codestream component when there is none.
    channel_index: [u8; 2],

    // Typ^i: meaning of the decompressed samples in this channel.
    channel_type: [u8; 2],

    // Asoc^i: index of the colour (plus one) this channel is associated with,
    // 0 for the whole image, 2^16 - 1 for no association.
    channel_association: [u8; 2],
}

impl Channel {
    pub fn new(channel_index: u16, channel_type: ChannelTypes, channel_association: u16) -> Channel {
        Channel {
            channel_index: channel_index.to_be_bytes(),
            channel_type: channel_type.value().to_be_bytes(),
            channel_association: channel_association.to_be_bytes(),
        }
    }

    pub fn channel_index(&self) -> u16 {
        u16::from_be_bytes(self.channel_index)
    }

    pub fn channel_type(&self) -> ChannelTypes {
        ChannelTypes::new(u16::from_be_bytes(self.channel_type))
    }

    pub fn channel_association(&self) -> u16 {
        u16::from_be_bytes(self.channel_association)
    }
}

// I.5.3.6
//
// Channel Definition Box
//
// The Channel Definition box specifies the meaning of the samples in each
// channel in the image: for each description the index of the channel, its
// type and its association with particular colours.
#[derive(Debug, Default)]
pub struct ChannelDefinitionBox {
    length: u64,
    offset: u64,
    channels: Vec<Channel>,
}

impl ChannelDefinitionBox {
    pub fn new(channels: Vec<Channel>) -> ChannelDefinitionBox {
        ChannelDefinitionBox {
            length: 2 + 6 * channels.len() as u64,
            offset: 0,
            channels,
        }
    }

    pub fn channels(&self) -> &Vec<Channel> {
        &self.channels
    }
}

impl JBox for ChannelDefinitionBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_CHANNEL_DEFINITION
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        // N: number of channel descriptions.
        let mut no_channel_descriptions: [u8; 2] = [0; 2];
        reader.read_exact(&mut no_channel_descriptions)?;

        let size = u16::from_be_bytes(no_channel_descriptions);
        if 2 + 6 * size as u64 > self.length {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_CHANNEL_DEFINITION,
                offset: self.offset,
            });
        }

        let mut channels: Vec<Channel> = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let mut channel = Channel::default();
            reader.read_exact(&mut channel.channel_index)?;
            reader.read_exact(&mut channel.channel_type)?;
            reader.read_exact(&mut channel.channel_association)?;

            debug!(
                "Found channel at index {:?} of type {:?} and association {:?}",
                channel.channel_index(),
                channel.channel_type(),
                channel.channel_association(),
            );

            channels.push(channel);
        }

        self.channels = channels;

        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        writer.write_all(&(self.channels.len() as u16).to_be_bytes())?;
        for channel in &self.channels {
            writer.write_all(&channel.channel_index)?;
            writer.write_all(&channel.channel_type)?;
            writer.write_all(&channel.channel_association)?;
        }
        Ok(())
    }
}

// I.5.3.7.1 and I.5.3.7.2
//
// Capture Resolution and Default Display Resolution boxes share one layout:
// a vertical and a horizontal grid resolution in points per metre, each
// expressed as numerator / denominator * 10^exponent.
#[derive(Debug, Default)]
pub struct ResolutionBox {
    box_type: BoxType,
    length: u64,
    offset: u64,
    vertical_numerator: [u8; 2],
    vertical_denominator: [u8; 2],
    horizontal_numerator: [u8; 2],
    horizontal_denominator: [u8; 2],
    vertical_exponent: [u8; 1],
    horizontal_exponent: [u8; 1],
}

impl ResolutionBox {
    /// `vertical` and `horizontal` are (numerator, denominator, exponent).
    pub fn new(box_type: BoxType, vertical: (u16, u16, i8), horizontal: (u16, u16, i8)) -> ResolutionBox {
        ResolutionBox {
            box_type,
            length: 10,
            offset: 0,
            vertical_numerator: vertical.0.to_be_bytes(),
            vertical_denominator: vertical.1.to_be_bytes(),
            horizontal_numerator: horizontal.0.to_be_bytes(),
            horizontal_denominator: horizontal.1.to_be_bytes(),
            vertical_exponent: [vertical.2 as u8],
            horizontal_exponent: [horizontal.2 as u8],
        }
    }

    fn resolution(numerator: [u8; 2], denominator: [u8; 2], exponent: [u8; 1]) -> f64 {
        let denominator = u16::from_be_bytes(denominator);
        if denominator == 0 {
            return 0.0;
        }
        u16::from_be_bytes(numerator) as f64 / denominator as f64
            * 10_f64.powi(exponent[0] as i8 as i32)
    }

    /// Vertical grid resolution in points per metre.
    pub fn vertical_resolution(&self) -> f64 {
        ResolutionBox::resolution(
            self.vertical_numerator,
            self.vertical_denominator,
            self.vertical_exponent,
        )
    }

    /// Horizontal grid resolution in points per metre.
    pub fn horizontal_resolution(&self) -> f64 {
        ResolutionBox::resolution(
            self.horizontal_numerator,
            self.horizontal_denominator,
            self.horizontal_exponent,
        )
    }
}

impl JBox for ResolutionBox {
    fn identifier(&self) -> BoxType {
        self.box_type
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        if self.length != 10 {
            return Err(JP2Error::BoxMalformed {
                box_type: self.box_type,
                offset: self.offset,
            });
        }
        reader.read_exact(&mut self.vertical_numerator)?;
        reader.read_exact(&mut self.vertical_denominator)?;
        reader.read_exact(&mut self.horizontal_numerator)?;
        reader.read_exact(&mut self.horizontal_denominator)?;
        reader.read_exact(&mut self.vertical_exponent)?;
        reader.read_exact(&mut self.horizontal_exponent)?;
        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        writer.write_all(&self.vertical_numerator)?;
        writer.write_all(&self.vertical_denominator)?;
        writer.write_all(&self.horizontal_numerator)?;
        writer.write_all(&self.horizontal_denominator)?;
        writer.write_all(&self.vertical_exponent)?;
        writer.write_all(&self.horizontal_exponent)?;
        Ok(())
    }
}

// I.5.3.7
//
// Resolution box (superbox)
//
// This box specifies the capture and default display grid resolutions of this
// image. If present it shall contain either a Capture Resolution box, or a
// Default Display Resolution box, or both.
#[derive(Debug, Default)]
pub struct ResolutionSuperBox {
    length: u64,
    offset: u64,
    capture_resolution_box: Option<ResolutionBox>,
    default_display_resolution_box: Option<ResolutionBox>,
}

impl ResolutionSuperBox {
    pub fn new(
        capture_resolution_box: Option<ResolutionBox>,
        default_display_resolution_box: Option<ResolutionBox>,
    ) -> ResolutionSuperBox {
        ResolutionSuperBox {
            capture_resolution_box,
            default_display_resolution_box,
            ..Default::default()
        }
    }

    pub fn capture_resolution_box(&self) -> &Option<ResolutionBox> {
        &self.capture_resolution_box
    }

    pub fn default_display_resolution_box(&self) -> &Option<ResolutionBox> {
        &self.default_display_resolution_box
    }
}

impl JBox for ResolutionSuperBox {
    // The type of a Resolution box shall be ‘res\040’ (0x7265 7320).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_RESOLUTION
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        let end = self.offset + self.length;
        while let Some(BoxHeader {
            box_length,
            box_type,
            offset,
        }) = decode_box_header(reader, end)?
        {
            let slot = match BoxTypes::new(box_type) {
                BoxTypes::CaptureResolution => &mut self.capture_resolution_box,
                BoxTypes::DefaultDisplayResolution => &mut self.default_display_resolution_box,
                _ => {
                    warn!(
                        "Unknown box type {:?} in resolution box, skipping",
                        box_type_name(&box_type)
                    );
                    reader.seek(io::SeekFrom::Start(offset + box_length))?;
                    continue;
                }
            };
            duplicate(slot, box_type, offset)?;
            let mut resolution_box = ResolutionBox {
                box_type,
                length: box_length,
                offset,
                ..Default::default()
            };
            decode_box(&mut resolution_box, reader)?;
            *slot = Some(resolution_box);
        }

        if self.capture_resolution_box.is_none() && self.default_display_resolution_box.is_none() {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_RESOLUTION,
                offset: self.offset,
            });
        }

        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        if let Some(capture_resolution_box) = &self.capture_resolution_box {
            capture_resolution_box.encode(writer)?;
        }
        if let Some(default_display_resolution_box) = &self.default_display_resolution_box {
            default_display_resolution_box.encode(writer)?;
        }
        Ok(())
    }
}

/// Intellectual Property box.
///
/// Carries intellectual property rights information. The format of its
/// contents is reserved in ISO/IEC 15444-1 and XML in ISO/IEC 15444-2.
#[derive(Debug, Default)]
pub struct IntellectualPropertyBox {
    length: u64,
    offset: u64,
    data: Vec<u8>,
}

impl IntellectualPropertyBox {
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl JBox for IntellectualPropertyBox {
    // The type of the Intellectual Property Box shall be ‘jp2i’ (0x6A70 3269).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_INTELLECTUAL_PROPERTY
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        self.data = vec![0; self.length as usize];
        reader.read_exact(&mut self.data)?;
        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        writer.write_all(&self.data)?;
        Ok(())
    }
}

/// XML box
///
/// Vendor specific information in XML format. There may be multiple XML boxes
/// anywhere in the file except before the File Type box.
///
/// See ISO/IEC 15444-1:2024 Section I.7.1 for more details on this box.
#[derive(Debug, Default)]
pub struct XMLBox {
    length: u64,
    offset: u64,
    xml: Vec<u8>,
}

impl XMLBox {
    pub fn new(xml: Vec<u8>) -> XMLBox {
        XMLBox {
            length: xml.len() as u64,
            offset: 0,
            xml,
        }
    }

    /// Get the XML body as a UTF-8 string, replacing invalid sequences.
    pub fn format(&self) -> String {
        String::from_utf8_lossy(&self.xml).into_owned()
    }
}

impl JBox for XMLBox {
    // The type of an XML box is ‘xml\040’ (0x786D 6C20).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_XML
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        self.xml = vec![0; self.length as usize];
        reader.read_exact(&mut self.xml)?;
        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        writer.write_all(&self.xml)?;
        Ok(())
    }
}

/// UUID box.
///
/// Vendor specific information identified by a 16-byte UUID. There may be
/// multiple UUID boxes anywhere in the file except before the File Type box.
///
/// See ISO/IEC 15444-1:2024 Section I.7.2 for more details on this box.
#[derive(Debug, Default)]
pub struct UUIDBox {
    length: u64,
    offset: u64,
    uuid: [u8; 16],
    data: Vec<u8>,
}

impl UUIDBox {
    pub fn new(uuid: [u8; 16], data: Vec<u8>) -> UUIDBox {
        UUIDBox {
            length: 16 + data.len() as u64,
            offset: 0,
            uuid,
            data,
        }
    }

    /// The UUID specifying the format of the vendor-specific DATA field.
    pub fn uuid(&self) -> &[u8; 16] {
        &self.uuid
    }

    /// The vendor-specific information.
    pub fn data(&self) -> &Vec<u8> {
        &self.data
    }
}

impl JBox for UUIDBox {
    // The type of a UUID box shall be ‘uuid’ (0x7575 6964).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_UUID
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        if self.length < self.uuid.len() as u64 {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_UUID,
                offset: self.offset,
            });
        }
        reader.read_exact(&mut self.uuid)?;
        self.data = vec![0; self.length as usize - self.uuid.len()];
        reader.read_exact(&mut self.data)?;

        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        writer.write_all(&self.uuid)?;
        writer.write_all(&self.data)?;
        Ok(())
    }
}

// I.7.3.1
//
// UUID List box
//
// This box contains a list of UUIDs.
#[derive(Debug, Default)]
pub struct UUIDListBox {
    length: u64,
    offset: u64,

    // ID^i, as many as NU
    ids: Vec<[u8; 16]>,
}

impl UUIDListBox {
    pub fn new(ids: Vec<[u8; 16]>) -> UUIDListBox {
        UUIDListBox {
            length: 2 + 16 * ids.len() as u64,
            offset: 0,
            ids,
        }
    }

    pub fn ids(&self) -> &Vec<[u8; 16]> {
        &self.ids
    }
}

impl JBox for UUIDListBox {
    // The type of a UUID List box shall be ‘ulst’ (0x756C 7374)
    fn identifier(&self) -> BoxType {
        BOX_TYPE_UUID_LIST
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        // NU: Number of UUIDs.
        let mut number_of_uuids: [u8; 2] = [0; 2];
        reader.read_exact(&mut number_of_uuids)?;

        let size = u16::from_be_bytes(number_of_uuids) as u64;
        if 2 + 16 * size > self.length {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_UUID_LIST,
                offset: self.offset,
            });
        }

        self.ids = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let mut buffer: [u8; 16] = [0; 16];
            reader.read_exact(&mut buffer)?;
            self.ids.push(buffer);
        }

        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        writer.write_all(&(self.ids.len() as u16).to_be_bytes())?;
        for id in &self.ids {
            writer.write_all(id)?;
        }
        Ok(())
    }
}

// I.7.3.2
//
// Data Entry URL box
//
// This box contains a URL which can be used by an application to acquire more
// information about the associated vendor-specific extensions.
#[derive(Debug, Default)]
pub struct DataEntryURLBox {
    length: u64,
    offset: u64,

    // VERS: Version number, shall be 0.
    version: [u8; 1],

    // FLAG: Flags, shall be 0.
    flags: [u8; 3],

    // LOC: null terminated UTF-8 URL.
    location: Vec<u8>,
}

impl DataEntryURLBox {
    pub fn new(location: &str) -> DataEntryURLBox {
        let mut bytes = location.as_bytes().to_vec();
        bytes.push(0);
        DataEntryURLBox {
            length: 4 + bytes.len() as u64,
            offset: 0,
            version: [0],
            flags: [0; 3],
            location: bytes,
        }
    }

    pub fn location(&self) -> Result<&str, str::Utf8Error> {
        let end = self
            .location
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(self.location.len());
        str::from_utf8(&self.location[..end])
    }
}

impl JBox for DataEntryURLBox {
    // The type of a Data Entry URL box shall be 'url\040' (0x7572 6C20).
    fn identifier(&self) -> BoxType {
        BOX_TYPE_DATA_ENTRY_URL
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        if self.length < 4 {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_DATA_ENTRY_URL,
                offset: self.offset,
            });
        }
        reader.read_exact(&mut self.version)?;
        reader.read_exact(&mut self.flags)?;

        self.location = vec![0; self.length as usize - 4];
        reader.read_exact(&mut self.location)?;

        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        writer.write_all(&self.version)?;
        writer.write_all(&self.flags)?;
        writer.write_all(&self.location)?;
        Ok(())
    }
}

// I.7.3
//
// UUID Info box (superbox)
//
// Provides, in a standard form, information about the vendor extensions in
// the file: a UUID List box and the Data Entry URL box where more can be
// learned about them. A file may contain zero or more UUID Info boxes.
#[derive(Debug, Default)]
pub struct UUIDInfoSuperBox {
    length: u64,
    offset: u64,
    uuid_list: Option<UUIDListBox>,
    data_entry_url: Option<DataEntryURLBox>,
}

impl UUIDInfoSuperBox {
    pub fn new(uuid_list: UUIDListBox, data_entry_url: DataEntryURLBox) -> UUIDInfoSuperBox {
        UUIDInfoSuperBox {
            uuid_list: Some(uuid_list),
            data_entry_url: Some(data_entry_url),
            ..Default::default()
        }
    }

    pub fn uuid_list(&self) -> &Option<UUIDListBox> {
        &self.uuid_list
    }

    pub fn data_entry_url(&self) -> &Option<DataEntryURLBox> {
        &self.data_entry_url
    }
}

impl JBox for UUIDInfoSuperBox {
    // The type of a UUID Info box shall be 'uinf' (0x7569 6E66)
    fn identifier(&self) -> BoxType {
        BOX_TYPE_UUID_INFO
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        let end = self.offset + self.length;
        while let Some(BoxHeader {
            box_length,
            box_type,
            offset,
        }) = decode_box_header(reader, end)?
        {
            match BoxTypes::new(box_type) {
                BoxTypes::UUIDList => {
                    duplicate(&self.uuid_list, box_type, offset)?;
                    let mut uuid_list_box = UUIDListBox {
                        length: box_length,
                        offset,
                        ..Default::default()
                    };
                    decode_box(&mut uuid_list_box, reader)?;
                    self.uuid_list = Some(uuid_list_box);
                }
                BoxTypes::DataEntryURL => {
                    duplicate(&self.data_entry_url, box_type, offset)?;
                    let mut data_entry_url_box = DataEntryURLBox {
                        length: box_length,
                        offset,
                        ..Default::default()
                    };
                    decode_box(&mut data_entry_url_box, reader)?;
                    self.data_entry_url = Some(data_entry_url_box);
                }
                _ => {
                    warn!(
                        "Unknown box type {:?} in UUID info box, skipping",
                        box_type_name(&box_type)
                    );
                    reader.seek(io::SeekFrom::Start(offset + box_length))?;
                }
            }
        }
        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        if let Some(uuid_list) = &self.uuid_list {
            uuid_list.encode(writer)?;
        }
        if let Some(data_entry_url) = &self.data_entry_url {
            data_entry_url.encode(writer)?;
        }
        Ok(())
    }
}

/// Contiguous Codestream box.
///
/// Contains a valid and complete JPEG 2000 codestream. Only the location of
/// the codestream is recorded when decoding; `new` carries the bytes to
/// encode.
#[derive(Debug, Default)]
pub struct ContiguousCodestreamBox {
    length: u64,
    offset: u64,
    codestream: Vec<u8>,
}

impl ContiguousCodestreamBox {
    pub fn new(codestream: Vec<u8>) -> ContiguousCodestreamBox {
        ContiguousCodestreamBox {
            length: codestream.len() as u64,
            offset: 0,
            codestream,
        }
    }
}

impl JBox for ContiguousCodestreamBox {
    // The type of a Contiguous Codestream box shall be ‘jp2c’
    fn identifier(&self) -> BoxType {
        BOX_TYPE_CONTIGUOUS_CODESTREAM
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        reader.seek(io::SeekFrom::Start(self.offset + self.length))?;
        Ok(())
    }

    fn encode_contents<W: io::Write>(&self, writer: &mut W) -> Result<(), JP2Error> {
        writer.write_all(&self.codestream)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct JP2File {
    length: u64,
    signature: SignatureBox,
    file_type: FileTypeBox,
    header: Option<HeaderSuperBox>,
    contiguous_codestreams: Vec<ContiguousCodestreamBox>,
    intellectual_property: Option<IntellectualPropertyBox>,
    xml: Vec<XMLBox>,
    uuid: Vec<UUIDBox>,
    uuid_info: Vec<UUIDInfoSuperBox>,
}

impl JP2File {
    /// A file to encode. Boxes are written in the order signature, file
    /// type, header, XML, UUID, UUID info and codestreams.
    pub fn new(file_type: FileTypeBox, header: HeaderSuperBox) -> JP2File {
        JP2File {
            file_type,
            header: Some(header),
            ..Default::default()
        }
    }

    pub fn length(&self) -> u64 {
        self.length
    }
    pub fn signature_box(&self) -> &SignatureBox {
        &self.signature
    }
    pub fn file_type_box(&self) -> &FileTypeBox {
        &self.file_type
    }
    pub fn header_box(&self) -> &Option<HeaderSuperBox> {
        &self.header
    }
    pub fn contiguous_codestreams_boxes(&self) -> &Vec<ContiguousCodestreamBox> {
        &self.contiguous_codestreams
    }

    /// Intellectual Property Box associated with this file.
    pub fn intellectual_property_box(&self) -> &Option<IntellectualPropertyBox> {
        &self.intellectual_property
    }

    pub fn xml_boxes(&self) -> &Vec<XMLBox> {
        &self.xml
    }
    pub fn uuid_boxes(&self) -> &Vec<UUIDBox> {
        &self.uuid
    }
    pub fn uuid_info_boxes(&self) -> &Vec<UUIDInfoSuperBox> {
        &self.uuid_info
    }

    pub fn push_xml_box(&mut self, xml_box: XMLBox) {
        self.xml.push(xml_box);
    }
    pub fn push_uuid_box(&mut self, uuid_box: UUIDBox) {
        self.uuid.push(uuid_box);
    }
    pub fn push_uuid_info_box(&mut self, uuid_info_box: UUIDInfoSuperBox) {
        self.uuid_info.push(uuid_info_box);
    }
    pub fn push_contiguous_codestream_box(&mut self, codestream_box: ContiguousCodestreamBox) {
        self.contiguous_codestreams.push(codestream_box);
    }
}

struct BoxHeader {
    // Length of the box contents, excluding LBox, TBox and XLBox.
    box_length: u64,

    // Box Type
    //
    // Boxes are generally referred to by an ISO 646 character string
    // translation of the 4-byte big endian integer value, with a space shown as
    // “\040”. All values of TBox not defined are reserved for ISO use.
    box_type: BoxType,

    // Stream position of the first content byte.
    offset: u64,
}

// Reads as much of buf as is available, returning the number of bytes read.
fn read_available<R: io::Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, io::Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Decodes the next box header, or returns `None` when `end` (the end of the
/// enclosing superbox, or of the stream for `u64::MAX`) is reached.
fn decode_box_header<R: io::Read + io::Seek>(
    reader: &mut R,
    end: u64,
) -> Result<Option<BoxHeader>, JP2Error> {
    let start = reader.stream_position()?;
    if start >= end {
        return Ok(None);
    }
    let stream_end = reader.seek(io::SeekFrom::End(0))?;
    reader.seek(io::SeekFrom::Start(start))?;
    let end = end.min(stream_end);

    let mut box_length: [u8; 4] = [0; 4];
    let mut box_type: BoxType = [0; 4];

    match read_available(reader, &mut box_length)? {
        0 => return Ok(None),
        4 => {}
        _ => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
    }
    reader.read_exact(&mut box_type)?;

    let box_length_value = u32::from_be_bytes(box_length) as u64;
    let contents_length = match box_length_value {
        // If the value of this field is 0, then the length of the box was not
        // known when the LBox field was written. In this case, this box
        // contains all bytes up to the end of the file.
        0 => end.saturating_sub(start + 8),

        // If the value of this field is 1, then the XLBox field shall exist
        // and the value of that field shall be the actual length of the box,
        // including the LBox, TBox and XLBox fields.
        1 => {
            let mut xl_length: [u8; 8] = [0; 8];
            reader.read_exact(&mut xl_length)?;
            let xl_length = u64::from_be_bytes(xl_length);
            if xl_length < 16 {
                return Err(JP2Error::BoxLengthReserved {
                    length: xl_length,
                    offset: start,
                });
            }
            xl_length - 16
        }

        // The values 2–7 are reserved for ISO use.
        2..=7 => {
            return Err(JP2Error::BoxLengthReserved {
                length: box_length_value,
                offset: start,
            });
        }

        // Subtract LBox and TBox from length
        length => length - 8,
    };

    let offset = reader.stream_position()?;
    if contents_length > end.saturating_sub(offset) {
        return Err(JP2Error::BoxMalformed { box_type, offset });
    }

    Ok(Some(BoxHeader {
        box_length: contents_length,
        box_type,
        offset,
    }))
}

/// Writes a box header for contents of `contents_length` bytes, using the
/// XLBox form when the length does not fit in LBox.
pub fn encode_box_header<W: io::Write>(
    writer: &mut W,
    box_type: BoxType,
    contents_length: u64,
) -> Result<(), JP2Error> {
    let box_length = contents_length + 8;
    if box_length <= u32::MAX as u64 {
        writer.write_all(&(box_length as u32).to_be_bytes())?;
        writer.write_all(&box_type)?;
    } else {
        writer.write_all(&1u32.to_be_bytes())?;
        writer.write_all(&box_type)?;
        writer.write_all(&(contents_length + 16).to_be_bytes())?;
    }
    Ok(())
}

// Decodes the contents of a box whose header has been read, leaving the
// reader at the end of the box.
fn decode_box<B: JBox, R: io::Read + io::Seek>(jbox: &mut B, reader: &mut R) -> Result<(), JP2Error> {
    let box_type = BoxTypes::new(jbox.identifier());
    info!("{}Box start at {:?}", box_type, jbox.offset());
    jbox.decode(reader)?;

    let end = jbox.offset() + jbox.length();
    let position = reader.stream_position()?;
    if position > end {
        return Err(JP2Error::BoxMalformed {
            box_type: jbox.identifier(),
            offset: jbox.offset(),
        });
    }
    if position < end {
        debug!("{}Box has {} trailing bytes", box_type, end - position);
        reader.seek(io::SeekFrom::Start(end))?;
    }
    info!("{}Box finish at {:?}", box_type, end);
    Ok(())
}

pub fn decode_jp2<R: io::Read + io::Seek>(reader: &mut R) -> Result<JP2File, JP2Error> {
    let mut file = JP2File::default();

    // The Signature box shall be the first box
    let header = decode_box_header(reader, u64::MAX)?.ok_or(JP2Error::BoxMissing {
        box_type: BOX_TYPE_SIGNATURE,
    })?;
    if header.box_type != BOX_TYPE_SIGNATURE {
        return Err(JP2Error::BoxUnexpected {
            box_type: header.box_type,
            offset: header.offset,
        });
    }
    file.signature.length = header.box_length;
    file.signature.offset = header.offset;
    decode_box(&mut file.signature, reader)?;

    // The File Type box shall immediately follow the Signature box
    let header = decode_box_header(reader, u64::MAX)?.ok_or(JP2Error::BoxMissing {
        box_type: BOX_TYPE_FILE_TYPE,
    })?;
    if header.box_type != BOX_TYPE_FILE_TYPE {
        return Err(JP2Error::BoxUnexpected {
            box_type: header.box_type,
            offset: header.offset,
        });
    }
    file.file_type.length = header.box_length;
    file.file_type.offset = header.offset;
    decode_box(&mut file.file_type, reader)?;

    while let Some(BoxHeader {
        box_length,
        box_type,
        offset,
    }) = decode_box_header(reader, u64::MAX)?
    {
        match BoxTypes::new(box_type) {
            BoxTypes::Header => {
                // The header box must be at the same level as the Signature
                // and File Type boxes
                duplicate(&file.header, box_type, offset)?;
                let mut header_box = HeaderSuperBox {
                    length: box_length,
                    offset,
                    ..Default::default()
                };
                decode_box(&mut header_box, reader)?;
                file.header = Some(header_box);
            }
            BoxTypes::IntellectualProperty => {
                let mut intellectual_property_box = IntellectualPropertyBox {
                    length: box_length,
                    offset,
                    ..Default::default()
                };
                decode_box(&mut intellectual_property_box, reader)?;
                file.intellectual_property = Some(intellectual_property_box);
            }
            BoxTypes::Xml => {
                let mut xml_box = XMLBox {
                    length: box_length,
                    offset,
                    ..Default::default()
                };
                decode_box(&mut xml_box, reader)?;
                file.xml.push(xml_box);
            }
            BoxTypes::Uuid => {
                // Too short to carry its UUID
                if box_length < 16 {
                    warn!("UUIDBox at {:?} has {} bytes, skipping", offset, box_length);
                    reader.seek(io::SeekFrom::Start(offset + box_length))?;
                    continue;
                }
                let mut uuid_box = UUIDBox {
                    length: box_length,
                    offset,
                    ..Default::default()
                };
                decode_box(&mut uuid_box, reader)?;
                file.uuid.push(uuid_box);
            }
            BoxTypes::UUIDInfo => {
                let mut uuid_info_box = UUIDInfoSuperBox {
                    length: box_length,
                    offset,
                    ..Default::default()
                };
                decode_box(&mut uuid_info_box, reader)?;
                file.uuid_info.push(uuid_info_box);
            }
            BoxTypes::ContiguousCodestream => {
                // The Header box shall fall before the Contiguous Codestream box
                if file.header.is_none() {
                    return Err(JP2Error::BoxUnexpected { box_type, offset });
                }

                let mut contiguous_codestream_box = ContiguousCodestreamBox {
                    length: box_length,
                    offset,
                    ..Default::default()
                };
                decode_box(&mut contiguous_codestream_box, reader)?;
                file.contiguous_codestreams.push(contiguous_codestream_box);
            }
            BoxTypes::Signature | BoxTypes::FileType => {
                return Err(JP2Error::BoxDuplicate { box_type, offset });
            }
            _ => {
                warn!(
                    "Unexpected box type {:?} at {:?}, skipping",
                    box_type_name(&box_type),
                    offset
                );
                reader.seek(io::SeekFrom::Start(offset + box_length))?;
            }
        }
    }

    if file.header.is_none() {
        return Err(JP2Error::BoxMissing {
            box_type: BOX_TYPE_HEADER,
        });
    }
    if file.contiguous_codestreams.is_empty() {
        return Err(JP2Error::BoxMissing {
            box_type: BOX_TYPE_CONTIGUOUS_CODESTREAM,
        });
    }

    file.length = reader.stream_position()?;

    Ok(file)
}

pub fn encode_jp2<W: io::Write>(writer: &mut W, file: &JP2File) -> Result<(), JP2Error> {
    file.signature.encode(writer)?;
    file.file_type.encode(writer)?;
    match &file.header {
        Some(header) => header.encode(writer)?,
        None => {
            return Err(JP2Error::BoxMissing {
                box_type: BOX_TYPE_HEADER,
            })
        }
    }
    if let Some(intellectual_property) = &file.intellectual_property {
        intellectual_property.encode(writer)?;
    }
    for xml_box in &file.xml {
        xml_box.encode(writer)?;
    }
    for uuid_box in &file.uuid {
        uuid_box.encode(writer)?;
    }
    for uuid_info_box in &file.uuid_info {
        uuid_info_box.encode(writer)?;
    }
    for codestream_box in &file.contiguous_codestreams {
        codestream_box.encode(writer)?;
    }
    Ok(())
}

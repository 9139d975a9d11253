use log::{debug, info, warn};
use std::io;
use std::io::prelude::*;
use std::str;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodestreamError {
    #[error("marker 0x{:02X}{:02X} error {error:?}", .marker[0], .marker[1])]
    MarkerError { marker: MarkerSymbol, error: String },

    #[error("missing marker 0x{:02X}{:02X}", .marker[0], .marker[1])]
    MarkerMissing { marker: MarkerSymbol },

    #[error("unexpected marker 0x{:02X}{:02X} at byte offset {offset}", .marker[0], .marker[1])]
    MarkerUnexpected { marker: MarkerSymbol, offset: u64 },

    #[error("component index {index} out of range for {no_components} components")]
    ComponentIndex { index: usize, no_components: u16 },

    #[error(
        "tile grid offset overflow: XOSiz = {image_horizontal_offset}, YOsiz = {image_vertical_offset}, XTOsiz = {tile_horizontal_offset}, YTOsiz = {tile_vertical_offset}"
    )]
    TileGridOffsetOverflow {
        tile_horizontal_offset: u32,
        tile_vertical_offset: u32,
        image_horizontal_offset: u32,
        image_vertical_offset: u32,
    },

    // XTsiz + XTOsiz > XOsiz
    // YTsiz + YTOsiz > YOsiz
    #[error(
        "tile size overflow: XOSiz = {image_horizontal_offset}, YOsiz = {image_vertical_offset}, XTOsiz = {tile_horizontal_offset}, YTOsiz = {tile_vertical_offset}, XTsize = {reference_tile_width}, YTsize = {reference_tile_height}"
    )]
    TileSizeOverflow {
        image_horizontal_offset: u32,
        image_vertical_offset: u32,
        tile_horizontal_offset: u32,
        tile_vertical_offset: u32,
        reference_tile_width: u32,
        reference_tile_height: u32,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type MarkerSymbol = [u8; 2];

// Delimiting markers and marker segments
pub const MARKER_SYMBOL_SOC: MarkerSymbol = [255, 79]; // Start of code stream
pub const MARKER_SYMBOL_SOT: MarkerSymbol = [255, 144]; // Start of tile-part
pub const MARKER_SYMBOL_SOD: MarkerSymbol = [255, 147]; // Start of data
pub const MARKER_SYMBOL_EOC: MarkerSymbol = [255, 217]; // End of codestream

// Fixed information marker segments
pub const MARKER_SYMBOL_SIZ: MarkerSymbol = [255, 81]; // Image and tile size

// Functional marker segments
pub const MARKER_SYMBOL_COD: MarkerSymbol = [255, 82]; // Coding style default
pub const MARKER_SYMBOL_QCD: MarkerSymbol = [255, 92]; // Quantization default

// Informational marker segments
pub const MARKER_SYMBOL_COM: MarkerSymbol = [255, 100]; // Comment

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionOrder {
    // 0000 0000 Layer-resolution level-component-position progression
    LRLCPP,

    // 0000 0001 Resolution level-layer-component-position progression
    RLLCPP,

    // 0000 0010 Resolution level-position-component-layer progression
    RLPCLP,

    // 0000 0011 Position-component-resolution level-layer progression
    PCRLLP,

    // 0000 0100 Component-position-resolution level-layer progression
    CPRLLP,

    // All other values reserved
    Reserved { value: u8 },
}

impl ProgressionOrder {
    pub fn new(value: u8) -> ProgressionOrder {
        match value {
            0b0000_0000 => ProgressionOrder::LRLCPP,
            0b0000_0001 => ProgressionOrder::RLLCPP,
            0b0000_0010 => ProgressionOrder::RLPCLP,
            0b0000_0011 => ProgressionOrder::PCRLLP,
            0b0000_0100 => ProgressionOrder::CPRLLP,
            _ => ProgressionOrder::Reserved { value },
        }
    }

    pub fn value(&self) -> u8 {
        match self {
            ProgressionOrder::LRLCPP => 0,
            ProgressionOrder::RLLCPP => 1,
            ProgressionOrder::RLPCLP => 2,
            ProgressionOrder::PCRLLP => 3,
            ProgressionOrder::CPRLLP => 4,
            ProgressionOrder::Reserved { value } => *value,
        }
    }
}

const TRANSFORMATION_FILTER_IRREVERSIBLE: u8 = 0;
const TRANSFORMATION_FILTER_REVERSIBLE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformationFilter {
    // 9-7 irreversible filter
    Irreversible,
    // 5-3 reversible filter
    Reversible,

    // All other values reserved
    Reserved { value: u8 },
}

impl TransformationFilter {
    pub fn new(value: u8) -> TransformationFilter {
        match value {
            TRANSFORMATION_FILTER_IRREVERSIBLE => TransformationFilter::Irreversible,
            TRANSFORMATION_FILTER_REVERSIBLE => TransformationFilter::Reversible,
            _ => TransformationFilter::Reserved { value },
        }
    }

    pub fn value(&self) -> u8 {
        match self {
            TransformationFilter::Irreversible => TRANSFORMATION_FILTER_IRREVERSIBLE,
            TransformationFilter::Reversible => TRANSFORMATION_FILTER_REVERSIBLE,
            TransformationFilter::Reserved { value } => *value,
        }
    }
}

// Scod flags, Table A.13
const CODING_STYLE_PRECINCTS_DEFINED: u8 = 0b0000_0001;
const CODING_STYLE_SOP: u8 = 0b0000_0010;
const CODING_STYLE_EPH: u8 = 0b0000_0100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodingStyleParametersPrecinctSize {
    value: u8,
}

impl CodingStyleParametersPrecinctSize {
    pub fn new(width_exponent: u8, height_exponent: u8) -> CodingStyleParametersPrecinctSize {
        CodingStyleParametersPrecinctSize {
            value: (height_exponent << 4) | (width_exponent & 0x0f),
        }
    }

    // 4 LSBs are the precinct width exponent, PPx = value
    pub fn width_exponent(&self) -> u8 {
        self.value & 0x0f
    }

    // 4 MSBs are the precinct height exponent PPy = value
    pub fn height_exponent(&self) -> u8 {
        self.value >> 4
    }
}

// A.12 – Coding style default parameter values
#[derive(Debug, Clone, Default)]
pub struct CodingStyleParameters {
    // Number of decomposition levels, N_L, Zero implies no transformation
    no_decomposition_levels: [u8; 1],

    // Code-block width exponent offset value, xcb
    code_block_width: [u8; 1],

    // Code-block height exponent offset value, ycb
    code_block_height: [u8; 1],

    // Style of the code-block coding passes
    code_block_style: [u8; 1],

    // Wavelet transformation used.
    transformation: [u8; 1],

    // If Scod = xxxx xxx0, this parameter is not present; otherwise
    // this indicates precinct width and height.
    precinct_size: Vec<u8>,
}

impl CodingStyleParameters {
    pub fn no_decomposition_levels(&self) -> u8 {
        self.no_decomposition_levels[0]
    }

    // A.18
    //
    // Code-block width and height exponent offset value xcb = value + 2 or ycb = value + 2.
    pub fn code_block_width(&self) -> u32 {
        1 << ((self.code_block_width[0] & 0b00001111) + 2)
    }

    pub fn code_block_height(&self) -> u32 {
        1 << ((self.code_block_height[0] & 0b00001111) + 2)
    }

    pub fn code_block_style(&self) -> u8 {
        self.code_block_style[0]
    }

    pub fn transformation(&self) -> TransformationFilter {
        TransformationFilter::new(self.transformation[0])
    }

    /// Precinct sizes per resolution level, starting with the N_L LL sub-band.
    /// Empty when the default precincts (PPx = PPy = 15) are used.
    pub fn precinct_sizes(&self) -> Vec<CodingStyleParametersPrecinctSize> {
        self.precinct_size
            .iter()
            .map(|value: &u8| CodingStyleParametersPrecinctSize { value: *value })
            .collect()
    }
}

// A.6.1
//
// Coding style default (COD)
//
// Function: Describes the coding style, number of decomposition levels,
// and layering that is the default used for compressing all components of
// an image (if in the main header) or a tile (if in the tile-part header).
#[derive(Debug, Clone, Default)]
pub struct CodingStyleMarkerSegment {
    offset: u64,

    length: u16,

    coding_style: [u8; 1],

    // Progression order
    progression_order: [u8; 1],

    // Number of layers
    no_layers: [u8; 2],

    // Multiple component transformation
    multiple_component_transformation: [u8; 1],

    coding_style_parameters: CodingStyleParameters,
}

impl CodingStyleMarkerSegment {
    /// Builds a COD segment. Code-block sizes are given as exponents (xcb, ycb),
    /// precincts as (PPx, PPy) per resolution level; an empty precinct list
    /// selects the default maximum precincts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        progression_order: ProgressionOrder,
        no_layers: u16,
        multiple_component_transformation: bool,
        no_decomposition_levels: u8,
        code_block_exponents: (u8, u8),
        transformation: TransformationFilter,
        precinct_exponents: &[(u8, u8)],
        use_sop: bool,
    ) -> CodingStyleMarkerSegment {
        let mut coding_style = 0;
        if !precinct_exponents.is_empty() {
            coding_style |= CODING_STYLE_PRECINCTS_DEFINED;
        }
        if use_sop {
            coding_style |= CODING_STYLE_SOP;
        }

        let precinct_size = if precinct_exponents.is_empty() {
            vec![]
        } else {
            (0..=no_decomposition_levels as usize)
                .map(|level| {
                    let (width, height) = precinct_exponents
                        [level.min(precinct_exponents.len() - 1)];
                    CodingStyleParametersPrecinctSize::new(width, height).value
                })
                .collect()
        };

        CodingStyleMarkerSegment {
            offset: 0,
            length: 12 + precinct_size.len() as u16,
            coding_style: [coding_style],
            progression_order: [progression_order.value()],
            no_layers: no_layers.to_be_bytes(),
            multiple_component_transformation: [multiple_component_transformation as u8],
            coding_style_parameters: CodingStyleParameters {
                no_decomposition_levels: [no_decomposition_levels],
                code_block_width: [code_block_exponents.0.saturating_sub(2)],
                code_block_height: [code_block_exponents.1.saturating_sub(2)],
                code_block_style: [0],
                transformation: [transformation.value()],
                precinct_size,
            },
        }
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn coding_style(&self) -> u8 {
        self.coding_style[0]
    }

    pub fn has_defined_precinct_size(&self) -> bool {
        self.coding_style[0] & CODING_STYLE_PRECINCTS_DEFINED != 0
    }

    pub fn uses_sop(&self) -> bool {
        self.coding_style[0] & CODING_STYLE_SOP != 0
    }

    pub fn uses_eph(&self) -> bool {
        self.coding_style[0] & CODING_STYLE_EPH != 0
    }

    pub fn progression_order(&self) -> ProgressionOrder {
        ProgressionOrder::new(self.progression_order[0])
    }

    pub fn no_layers(&self) -> u16 {
        u16::from_be_bytes(self.no_layers)
    }

    pub fn multiple_component_transformation(&self) -> bool {
        self.multiple_component_transformation[0] & 1 == 1
    }

    pub fn coding_style_parameters(&self) -> &CodingStyleParameters {
        &self.coding_style_parameters
    }

    pub fn encode<W: io::Write>(&self, writer: &mut W) -> Result<(), CodestreamError> {
        let parameters = &self.coding_style_parameters;
        writer.write_all(&MARKER_SYMBOL_COD)?;
        writer.write_all(&(12 + parameters.precinct_size.len() as u16).to_be_bytes())?;
        writer.write_all(&self.coding_style)?;
        writer.write_all(&self.progression_order)?;
        writer.write_all(&self.no_layers)?;
        writer.write_all(&self.multiple_component_transformation)?;
        writer.write_all(&parameters.no_decomposition_levels)?;
        writer.write_all(&parameters.code_block_width)?;
        writer.write_all(&parameters.code_block_height)?;
        writer.write_all(&parameters.code_block_style)?;
        writer.write_all(&parameters.transformation)?;
        writer.write_all(&parameters.precinct_size)?;
        Ok(())
    }
}

/// Precision, sign and sub-sampling of one image component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentSize {
    pub precision: u8,
    pub signed: bool,
    pub horizontal_separation: u8,
    pub vertical_separation: u8,
}

impl ComponentSize {
    pub fn new(precision: u8, signed: bool) -> ComponentSize {
        ComponentSize {
            precision,
            signed,
            horizontal_separation: 1,
            vertical_separation: 1,
        }
    }
}

// A.5.1
//
// Image and tile size (SIZ)
//
// Function: Provides information about the uncompressed image such as the
// width and height of the reference grid, the width and height of the tiles,
// the number of components, component bit depth, and the separation of
// component samples with respect to the reference grid.
#[derive(Debug, Clone, Default)]
pub struct ImageAndTileSizeMarkerSegment {
    offset: u64,
    length: u16,

    // Rsiz: Denotes capabilities that a decoder needs to properly decode the
    // codestream.
    decoder_capabilities: [u8; 2],

    // XSiz: Width of the reference grid.
    reference_grid_width: [u8; 4],

    // YSiz: Height of the reference grid.
    reference_grid_height: [u8; 4],

    // XOsiz: Horizontal offset from the origin of the reference grid to the
    // left side of the image area.
    image_horizontal_offset: [u8; 4],

    // YOsiz: Vertical offset from the origin of the reference grid to the top
    // side of the image area.
    image_vertical_offset: [u8; 4],

    // XTsiz: Width of one reference tile with respect to the reference grid
    reference_tile_width: [u8; 4],

    // YTsiz: Height of one reference tile with respect to the reference grid.
    reference_tile_height: [u8; 4],

    // XTOsiz: Horizontal offset from the origin of the reference grid to the
    // left side of the first tile.
    tile_horizontal_offset: [u8; 4],

    // YTOsiz: Vertical offset from the origin of the reference grid to the
    // top side of the first tile.
    tile_vertical_offset: [u8; 4],

    // Csiz: Number of components in the image.
    no_components: [u8; 2],

    // Ssiz: Precision (depth) in bits and sign of the ith component samples,
    // followed by XRsiz and YRsiz, the horizontal and vertical separation.
    //
    // There is one occurrence of these parameters for each component.
    components: Vec<[u8; 3]>,
}

impl ImageAndTileSizeMarkerSegment {
    /// Single-tile SIZ segment for an image anchored at the grid origin.
    pub fn new(width: u32, height: u32, components: &[ComponentSize]) -> ImageAndTileSizeMarkerSegment {
        ImageAndTileSizeMarkerSegment {
            offset: 0,
            length: 38 + 3 * components.len() as u16,
            decoder_capabilities: [0; 2],
            reference_grid_width: width.to_be_bytes(),
            reference_grid_height: height.to_be_bytes(),
            image_horizontal_offset: [0; 4],
            image_vertical_offset: [0; 4],
            reference_tile_width: width.to_be_bytes(),
            reference_tile_height: height.to_be_bytes(),
            tile_horizontal_offset: [0; 4],
            tile_vertical_offset: [0; 4],
            no_components: (components.len() as u16).to_be_bytes(),
            components: components
                .iter()
                .map(|component| {
                    let sign = if component.signed { 0x80 } else { 0 };
                    [
                        sign | (component.precision.saturating_sub(1) & 0x7f),
                        component.horizontal_separation,
                        component.vertical_separation,
                    ]
                })
                .collect(),
        }
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn decoder_capabilities(&self) -> u16 {
        u16::from_be_bytes(self.decoder_capabilities)
    }

    pub fn reference_grid_width(&self) -> u32 {
        u32::from_be_bytes(self.reference_grid_width)
    }
    pub fn reference_grid_height(&self) -> u32 {
        u32::from_be_bytes(self.reference_grid_height)
    }

    pub fn image_horizontal_offset(&self) -> u32 {
        u32::from_be_bytes(self.image_horizontal_offset)
    }
    pub fn image_vertical_offset(&self) -> u32 {
        u32::from_be_bytes(self.image_vertical_offset)
    }

    pub fn reference_tile_width(&self) -> u32 {
        u32::from_be_bytes(self.reference_tile_width)
    }
    pub fn reference_tile_height(&self) -> u32 {
        u32::from_be_bytes(self.reference_tile_height)
    }

    pub fn tile_horizontal_offset(&self) -> u32 {
        u32::from_be_bytes(self.tile_horizontal_offset)
    }
    pub fn tile_vertical_offset(&self) -> u32 {
        u32::from_be_bytes(self.tile_vertical_offset)
    }

    /// Width of the image area, Xsiz - XOsiz.
    pub fn width(&self) -> u32 {
        self.reference_grid_width() - self.image_horizontal_offset()
    }

    /// Height of the image area, Ysiz - YOsiz.
    pub fn height(&self) -> u32 {
        self.reference_grid_height() - self.image_vertical_offset()
    }

    pub fn no_components(&self) -> u16 {
        u16::from_be_bytes(self.no_components)
    }

    fn component(&self, i: usize) -> Result<&[u8; 3], CodestreamError> {
        self.components
            .get(i)
            .ok_or(CodestreamError::ComponentIndex {
                index: i,
                no_components: self.no_components(),
            })
    }

    // ISO/IEC 15444-1:2019 Table A.11, component bit depth is value + 1.
    pub fn precision(&self, i: usize) -> Result<u8, CodestreamError> {
        Ok((self.component(i)?[0] & 0x7f) + 1)
    }

    pub fn values_are_signed(&self, i: usize) -> Result<bool, CodestreamError> {
        Ok(self.component(i)?[0] & 0x80 == 0x80)
    }

    pub fn horizontal_separation(&self, i: usize) -> Result<u8, CodestreamError> {
        Ok(self.component(i)?[1])
    }

    pub fn vertical_separation(&self, i: usize) -> Result<u8, CodestreamError> {
        Ok(self.component(i)?[2])
    }

    pub fn encode<W: io::Write>(&self, writer: &mut W) -> Result<(), CodestreamError> {
        writer.write_all(&MARKER_SYMBOL_SIZ)?;
        writer.write_all(&(38 + 3 * self.components.len() as u16).to_be_bytes())?;
        writer.write_all(&self.decoder_capabilities)?;
        writer.write_all(&self.reference_grid_width)?;
        writer.write_all(&self.reference_grid_height)?;
        writer.write_all(&self.image_horizontal_offset)?;
        writer.write_all(&self.image_vertical_offset)?;
        writer.write_all(&self.reference_tile_width)?;
        writer.write_all(&self.reference_tile_height)?;
        writer.write_all(&self.tile_horizontal_offset)?;
        writer.write_all(&self.tile_vertical_offset)?;
        writer.write_all(&self.no_components)?;
        for component in &self.components {
            writer.write_all(component)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentRegistrationValue {
    // General use (binary values)
    Binary,

    // General use (ISO 8859-15:1999 (Latin) values)
    Latin,

    // All other values reserved
    Reserved { value: [u8; 2] },
}

impl CommentRegistrationValue {
    fn new(value: [u8; 2]) -> CommentRegistrationValue {
        match u16::from_be_bytes(value) {
            // See ISO/IEC 15444-1:2019 Table A.44
            0 => CommentRegistrationValue::Binary,
            1 => CommentRegistrationValue::Latin,
            _ => CommentRegistrationValue::Reserved { value },
        }
    }

    fn value(&self) -> [u8; 2] {
        match self {
            CommentRegistrationValue::Binary => [0, 0],
            CommentRegistrationValue::Latin => [0, 1],
            CommentRegistrationValue::Reserved { value } => *value,
        }
    }
}

// A.9.2
//
// Comment (COM)
//
// Allows unstructured data in the main and tile-part header.
#[derive(Debug, Clone, Default)]
pub struct CommentMarkerSegment {
    // RCom: Registration value of the marker segment
    registration_value: [u8; 2],

    // Ccomi: Byte of unstructured data
    comment: Vec<u8>,
}

impl CommentMarkerSegment {
    pub fn new(registration_value: CommentRegistrationValue, comment: &[u8]) -> CommentMarkerSegment {
        CommentMarkerSegment {
            registration_value: registration_value.value(),
            comment: comment.to_vec(),
        }
    }

    pub fn registration_value(&self) -> CommentRegistrationValue {
        CommentRegistrationValue::new(self.registration_value)
    }

    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    pub fn comment_utf8(&self) -> Result<&str, str::Utf8Error> {
        str::from_utf8(&self.comment)
    }

    pub fn encode<W: io::Write>(&self, writer: &mut W) -> Result<(), CodestreamError> {
        // Lcom covers itself, Rcom and at most 65531 comment bytes
        if self.comment.len() > u16::MAX as usize - 4 {
            return Err(CodestreamError::MarkerError {
                marker: MARKER_SYMBOL_COM,
                error: format!("comment of {} bytes is too long", self.comment.len()),
            });
        }
        writer.write_all(&MARKER_SYMBOL_COM)?;
        writer.write_all(&(4 + self.comment.len() as u16).to_be_bytes())?;
        writer.write_all(&self.registration_value)?;
        writer.write_all(&self.comment)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Header {
    // SIZ (Required)
    image_and_tile_size_marker_segment: ImageAndTileSizeMarkerSegment,

    // COD (Required)
    coding_style_marker_segment: Option<CodingStyleMarkerSegment>,

    // COM (Optional, repeatable)
    comment_marker_segments: Vec<CommentMarkerSegment>,

    // Marker segments read past by length only
    skipped_marker_segments: Vec<MarkerSymbol>,
}

impl Header {
    pub fn image_and_tile_size_marker_segment(&self) -> &ImageAndTileSizeMarkerSegment {
        &self.image_and_tile_size_marker_segment
    }

    pub fn coding_style_marker_segment(&self) -> Option<&CodingStyleMarkerSegment> {
        self.coding_style_marker_segment.as_ref()
    }

    pub fn comment_marker_segments(&self) -> &Vec<CommentMarkerSegment> {
        &self.comment_marker_segments
    }

    pub fn skipped_marker_segments(&self) -> &Vec<MarkerSymbol> {
        &self.skipped_marker_segments
    }
}

// A.3
//
// The codestream is a byte stream starting with the SOC marker followed by
// the main header. Only the main header is decoded; the tile-parts that follow
// the first SOT marker are left to the codec.
#[derive(Debug, Default)]
pub struct ContiguousCodestream {
    offset: u64,
    header_length: u64,
    header: Header,
}

impl ContiguousCodestream {
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Byte offset of the SOC marker in the source.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Length of SOC plus the main header, up to the first SOT marker.
    pub fn header_length(&self) -> u64 {
        self.header_length
    }

    // Length of marker segment in bytes (not including the marker).
    fn decode_length<R: io::Read + io::Seek>(
        &mut self,
        reader: &mut R,
        marker: MarkerSymbol,
        minimum: u16,
    ) -> Result<u16, CodestreamError> {
        let mut length: [u8; 2] = [0; 2];
        reader.read_exact(&mut length)?;
        let length = u16::from_be_bytes(length);
        if length < minimum {
            return Err(CodestreamError::MarkerError {
                marker,
                error: format!("segment length {} below minimum {}", length, minimum),
            });
        }
        Ok(length)
    }

    fn decode_siz<R: io::Read + io::Seek>(
        &mut self,
        reader: &mut R,
    ) -> Result<ImageAndTileSizeMarkerSegment, CodestreamError> {
        info!("SIZ start at byte offset {}", reader.stream_position()? - 2);
        let mut segment = ImageAndTileSizeMarkerSegment {
            offset: reader.stream_position()?,
            length: self.decode_length(reader, MARKER_SYMBOL_SIZ, 41)?,
            ..Default::default()
        };

        reader.read_exact(&mut segment.decoder_capabilities)?;
        reader.read_exact(&mut segment.reference_grid_width)?;
        reader.read_exact(&mut segment.reference_grid_height)?;
        reader.read_exact(&mut segment.image_horizontal_offset)?;
        reader.read_exact(&mut segment.image_vertical_offset)?;
        reader.read_exact(&mut segment.reference_tile_width)?;
        reader.read_exact(&mut segment.reference_tile_height)?;
        reader.read_exact(&mut segment.tile_horizontal_offset)?;
        reader.read_exact(&mut segment.tile_vertical_offset)?;
        reader.read_exact(&mut segment.no_components)?;

        let no_components = segment.no_components();
        if no_components == 0 || segment.length() as u32 != 38 + 3 * no_components as u32 {
            return Err(CodestreamError::MarkerError {
                marker: MARKER_SYMBOL_SIZ,
                error: format!(
                    "segment length {} does not match {} components",
                    segment.length(),
                    no_components
                ),
            });
        }

        segment.components = Vec::with_capacity(no_components as usize);
        for _ in 0..no_components {
            let mut component: [u8; 3] = [0; 3];
            reader.read_exact(&mut component)?;
            segment.components.push(component);
        }

        if segment.image_horizontal_offset() >= segment.reference_grid_width()
            || segment.image_vertical_offset() >= segment.reference_grid_height()
        {
            return Err(CodestreamError::MarkerError {
                marker: MARKER_SYMBOL_SIZ,
                error: "empty image area".to_string(),
            });
        }

        // The tile grid offsets (XTOsiz, YTOsiz) are constrained to be no
        // greater than the image area offsets. This is expressed by the
        // following ranges
        // 0 ≤ XTOsiz ≤ XOsiz
        // 0 ≤ YTOsiz ≤ YOsiz
        if segment.tile_horizontal_offset() > segment.image_horizontal_offset()
            || segment.tile_vertical_offset() > segment.image_vertical_offset()
        {
            return Err(CodestreamError::TileGridOffsetOverflow {
                tile_horizontal_offset: segment.tile_horizontal_offset(),
                image_horizontal_offset: segment.image_horizontal_offset(),
                tile_vertical_offset: segment.tile_vertical_offset(),
                image_vertical_offset: segment.image_vertical_offset(),
            });
        }

        // Also, the tile size plus the tile offset shall be greater than the image
        // area offset. This ensures that the first tile (tile 0) will contain at least
        // one reference grid point from the image area.
        if (segment.reference_tile_width() as u64 + segment.tile_horizontal_offset() as u64)
            <= segment.image_horizontal_offset() as u64
            || (segment.reference_tile_height() as u64 + segment.tile_vertical_offset() as u64)
                <= segment.image_vertical_offset() as u64
        {
            return Err(CodestreamError::TileSizeOverflow {
                reference_tile_width: segment.reference_tile_width(),
                tile_horizontal_offset: segment.tile_horizontal_offset(),
                image_horizontal_offset: segment.image_horizontal_offset(),
                reference_tile_height: segment.reference_tile_height(),
                tile_vertical_offset: segment.tile_vertical_offset(),
                image_vertical_offset: segment.image_vertical_offset(),
            });
        }
        debug!(
            "SIZ {}x{} with {} components",
            segment.width(),
            segment.height(),
            no_components
        );
        info!("SIZ end at byte offset {}", reader.stream_position()?);

        Ok(segment)
    }

    // A.6.1 - Coding style default (COD)
    fn decode_cod<R: io::Read + io::Seek>(
        &mut self,
        reader: &mut R,
    ) -> Result<CodingStyleMarkerSegment, CodestreamError> {
        info!("COD start at byte offset {}", reader.stream_position()? - 2);
        let mut segment = CodingStyleMarkerSegment {
            offset: reader.stream_position()?,
            length: self.decode_length(reader, MARKER_SYMBOL_COD, 12)?,
            ..Default::default()
        };

        reader.read_exact(&mut segment.coding_style)?;
        reader.read_exact(&mut segment.progression_order)?;
        reader.read_exact(&mut segment.no_layers)?;
        reader.read_exact(&mut segment.multiple_component_transformation)?;

        let parameters = &mut segment.coding_style_parameters;
        reader.read_exact(&mut parameters.no_decomposition_levels)?;
        reader.read_exact(&mut parameters.code_block_width)?;
        reader.read_exact(&mut parameters.code_block_height)?;
        reader.read_exact(&mut parameters.code_block_style)?;
        reader.read_exact(&mut parameters.transformation)?;

        let precinct_count = (segment.length - 12) as usize;
        if segment.coding_style[0] & CODING_STYLE_PRECINCTS_DEFINED != 0 {
            // The first parameter (8 bits) corresponds to the N_L LL sub-band.
            // Each successive parameter corresponds to each successive resolution level in order.
            if precinct_count != parameters.no_decomposition_levels() as usize + 1 {
                return Err(CodestreamError::MarkerError {
                    marker: MARKER_SYMBOL_COD,
                    error: format!(
                        "{} precinct sizes for {} decomposition levels",
                        precinct_count,
                        parameters.no_decomposition_levels()
                    ),
                });
            }
            parameters.precinct_size = vec![0; precinct_count];
            reader.read_exact(&mut parameters.precinct_size)?;
        } else if precinct_count > 0 {
            reader.seek(io::SeekFrom::Current(precinct_count as i64))?;
        }
        debug!(
            "COD {:?} with {} layers and {} levels",
            segment.progression_order(),
            segment.no_layers(),
            segment.coding_style_parameters.no_decomposition_levels()
        );
        info!("COD end at byte offset {}", reader.stream_position()?);

        Ok(segment)
    }

    fn decode_com<R: io::Read + io::Seek>(
        &mut self,
        reader: &mut R,
    ) -> Result<CommentMarkerSegment, CodestreamError> {
        info!("COM start at byte offset {}", reader.stream_position()? - 2);
        let mut segment = CommentMarkerSegment::default();

        let length = self.decode_length(reader, MARKER_SYMBOL_COM, 4)?;
        reader.read_exact(&mut segment.registration_value)?;

        segment.comment = vec![0; length as usize - 4];
        reader.read_exact(&mut segment.comment)?;
        info!("COM end at byte offset {}", reader.stream_position()?);

        Ok(segment)
    }

    fn skip_segment<R: io::Read + io::Seek>(
        &mut self,
        reader: &mut R,
        marker: MarkerSymbol,
    ) -> Result<(), CodestreamError> {
        let length = self.decode_length(reader, marker, 2)?;
        debug!(
            "skipping marker 0x{:02X}{:02X} segment of {} bytes",
            marker[0], marker[1], length
        );
        reader.seek(io::SeekFrom::Current(length as i64 - 2))?;
        Ok(())
    }

    // A.3 - Construction of the main header
    fn decode_main_header<R: io::Read + io::Seek>(
        &mut self,
        reader: &mut R,
    ) -> Result<Header, CodestreamError> {
        let mut header = Header::default();

        let mut marker_type: MarkerSymbol = [0; 2];

        // SOC (Required as the first marker)
        reader.read_exact(&mut marker_type)?;
        if marker_type != MARKER_SYMBOL_SOC {
            return Err(CodestreamError::MarkerUnexpected {
                marker: marker_type,
                offset: reader.stream_position()? - 2,
            });
        }
        info!("SOC start at byte offset {}", reader.stream_position()? - 2);

        // SIZ (Required as the second marker segment)
        reader.read_exact(&mut marker_type)?;
        if marker_type != MARKER_SYMBOL_SIZ {
            return Err(CodestreamError::MarkerUnexpected {
                marker: marker_type,
                offset: reader.stream_position()? - 2,
            });
        }

        header.image_and_tile_size_marker_segment = self.decode_siz(reader)?;

        loop {
            match reader.read_exact(&mut marker_type) {
                Ok(_) => match marker_type {
                    // COD (Required)
                    MARKER_SYMBOL_COD => {
                        header.coding_style_marker_segment = Some(self.decode_cod(reader)?);
                    }

                    // COM (Optional, repeatable)
                    MARKER_SYMBOL_COM => {
                        header.comment_marker_segments.push(self.decode_com(reader)?);
                    }

                    // SOT or EOC ends the main header
                    MARKER_SYMBOL_SOT | MARKER_SYMBOL_EOC => {
                        self.header_length = reader.stream_position()? - 2 - self.offset;
                        break;
                    }

                    MARKER_SYMBOL_SOC | MARKER_SYMBOL_SIZ | MARKER_SYMBOL_SOD => {
                        return Err(CodestreamError::MarkerUnexpected {
                            marker: marker_type,
                            offset: reader.stream_position()? - 2,
                        });
                    }

                    // QCD, QCC, COC, RGN, POC, PPM, TLM, PLM, CRG
                    [255, second] if second >= 0x40 => {
                        self.skip_segment(reader, marker_type)?;
                        header.skipped_marker_segments.push(marker_type);
                    }

                    _ => {
                        return Err(CodestreamError::MarkerUnexpected {
                            marker: marker_type,
                            offset: reader.stream_position()? - 2,
                        });
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(CodestreamError::MarkerMissing {
                        marker: MARKER_SYMBOL_SOT,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        if header.coding_style_marker_segment.is_none() {
            warn!("main header has no COD marker segment");
        }

        Ok(header)
    }
}

/// Decodes the main header of the codestream starting at the current reader
/// position.
pub fn decode_jpc<R: io::Read + io::Seek>(
    reader: &mut R,
) -> Result<ContiguousCodestream, CodestreamError> {
    let mut codestream = ContiguousCodestream {
        offset: reader.stream_position()?,
        ..Default::default()
    };
    codestream.header = codestream.decode_main_header(reader)?;
    Ok(codestream)
}

/// Returns a copy of `codestream` with `comment` placed in the main header
/// directly after the SIZ marker segment.
pub fn insert_comment(
    codestream: &[u8],
    comment: &CommentMarkerSegment,
) -> Result<Vec<u8>, CodestreamError> {
    if codestream.len() < 6 || codestream[0..2] != MARKER_SYMBOL_SOC {
        return Err(CodestreamError::MarkerMissing {
            marker: MARKER_SYMBOL_SOC,
        });
    }
    if codestream[2..4] != MARKER_SYMBOL_SIZ {
        return Err(CodestreamError::MarkerMissing {
            marker: MARKER_SYMBOL_SIZ,
        });
    }

    let siz_end = 4 + u16::from_be_bytes([codestream[4], codestream[5]]) as usize;
    if siz_end > codestream.len() {
        return Err(CodestreamError::MarkerError {
            marker: MARKER_SYMBOL_SIZ,
            error: "segment extends past the codestream".to_string(),
        });
    }

    let mut encoded: Vec<u8> = Vec::with_capacity(codestream.len() + comment.comment.len() + 6);
    encoded.extend_from_slice(&codestream[..siz_end]);
    comment.encode(&mut encoded)?;
    encoded.extend_from_slice(&codestream[siz_end..]);
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precinct_size_exponents() {
        let precinct = CodingStyleParametersPrecinctSize::new(8, 7);
        assert_eq!(precinct.width_exponent(), 8);
        assert_eq!(precinct.height_exponent(), 7);
    }

    #[test]
    fn test_progression_order_value() {
        for value in 0..=5 {
            assert_eq!(ProgressionOrder::new(value).value(), value);
        }
        assert_eq!(ProgressionOrder::new(2), ProgressionOrder::RLPCLP);
    }

    #[test]
    fn test_comment_too_long() {
        let comment = CommentMarkerSegment::new(CommentRegistrationValue::Binary, &[0; 65532]);
        let mut encoded = Vec::new();
        assert!(comment.encode(&mut encoded).is_err());
    }
}

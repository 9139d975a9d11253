use log::{debug, warn};
use std::io;
use std::str;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ICCError {
    #[error("profile of {length} bytes is shorter than the 128 byte header")]
    Truncated { length: usize },

    #[error("invalid profile file signature {signature:?} at offset 36")]
    InvalidSignature { signature: [u8; 4] },

    #[error("declared profile size {declared} does not match {actual} bytes")]
    SizeMismatch { declared: u32, actual: usize },

    #[error("tag {signature:?} at offset {offset} with size {size} exceeds the profile")]
    TagOutOfBounds {
        signature: [u8; 4],
        offset: u32,
        size: u32,
    },

    #[error("{profile_type:?} profile carries no embeddable data")]
    NoData { profile_type: PredefinedProfile },

    #[error(transparent)]
    Io(#[from] io::Error),
}

const HEADER_LENGTH: usize = 128;

// 'acsp' (0x61637370)
const PROFILE_FILE_SIGNATURE: [u8; 4] = [97, 99, 115, 112];

const COLOUR_SPACE_GRAY: [u8; 4] = *b"GRAY";
const COLOUR_SPACE_RGB: [u8; 4] = *b"RGB ";
const COLOUR_SPACE_CMYK: [u8; 4] = *b"CMYK";
const COLOUR_SPACE_YCBCR: [u8; 4] = *b"YCbr";

/// Profiles an image can carry without (or in addition to) raw profile data.
///
/// `Undefined` marks a profile whose type was never determined, `Unknown` one
/// constructed from bytes that does not match any preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredefinedProfile {
    Undefined,
    Unknown,
    SRgb,
    AdobeRgb,
    Rgb,
    CmykStandard,
    GrayD50,
    LumD65,
    RommGray,
}

/// Data colour space declared in bytes 16..20 of the profile header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourSpace {
    Gray,
    Rgb,
    Cmyk,
    YCbCr,
    Other { signature: [u8; 4] },
}

impl ColourSpace {
    fn new(signature: [u8; 4]) -> ColourSpace {
        match signature {
            COLOUR_SPACE_GRAY => ColourSpace::Gray,
            COLOUR_SPACE_RGB => ColourSpace::Rgb,
            COLOUR_SPACE_CMYK => ColourSpace::Cmyk,
            COLOUR_SPACE_YCBCR => ColourSpace::YCbCr,
            signature => ColourSpace::Other { signature },
        }
    }

    /// Number of colour channels described by this colour space, if fixed.
    pub fn channels(&self) -> Option<u16> {
        match self {
            ColourSpace::Gray => Some(1),
            ColourSpace::Rgb | ColourSpace::YCbCr => Some(3),
            ColourSpace::Cmyk => Some(4),
            ColourSpace::Other { .. } => None,
        }
    }
}

// Each tag signature in the tag table must be unique;
// a profile cannot contain more than one tag with the same signature.
#[derive(Debug, Clone)]
pub struct Tag {
    signature: [u8; 4],
    offset: [u8; 4], // uInt32Number
    size: [u8; 4],   // uInt32Number
}

impl Tag {
    // A four byte value registered with the ICC
    pub fn signature(&self) -> [u8; 4] {
        self.signature
    }

    // An address within an ICC profile, relative to byte zero of the file.
    pub fn offset(&self) -> u32 {
        u32::from_be_bytes(self.offset)
    }

    // The number of bytes in the tag data element.
    pub fn size(&self) -> u32 {
        u32::from_be_bytes(self.size)
    }
}

#[derive(Debug, Clone)]
pub struct Header {
    size: [u8; 4],
    version: [u8; 4],
    device_class: [u8; 4],
    colour_space: [u8; 4],
    connection_space: [u8; 4],
}

impl Header {
    pub fn size(&self) -> u32 {
        u32::from_be_bytes(self.size)
    }

    /// Major and minor version, e.g. (2, 1) or (4, 3).
    pub fn version(&self) -> (u8, u8) {
        (self.version[0], self.version[1] >> 4)
    }

    pub fn device_class(&self) -> &str {
        str::from_utf8(&self.device_class).unwrap_or("????")
    }

    pub fn colour_space(&self) -> ColourSpace {
        ColourSpace::new(self.colour_space)
    }

    pub fn connection_space(&self) -> &str {
        str::from_utf8(&self.connection_space).unwrap_or("????")
    }
}

#[derive(Debug, Clone)]
pub struct DecodedProfile {
    header: Header,
    tags: Vec<Tag>,
}

impl DecodedProfile {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn tags(&self) -> &Vec<Tag> {
        &self.tags
    }
}

/// Reads the 128 byte header and the tag table of the profile starting at the
/// current stream position. Tag data is bounds-checked but not interpreted.
pub fn decode_icc<R: io::Read + io::Seek>(reader: &mut R) -> Result<DecodedProfile, ICCError> {
    let icc_start_position = reader.stream_position()?;
    let available = reader.seek(io::SeekFrom::End(0))? - icc_start_position;
    reader.seek(io::SeekFrom::Start(icc_start_position))?;

    if available < HEADER_LENGTH as u64 + 4 {
        return Err(ICCError::Truncated {
            length: available as usize,
        });
    }

    let mut buffer: [u8; HEADER_LENGTH] = [0; HEADER_LENGTH];
    reader.read_exact(&mut buffer)?;

    let mut header = Header {
        size: [0; 4],
        version: [0; 4],
        device_class: [0; 4],
        colour_space: [0; 4],
        connection_space: [0; 4],
    };
    header.size.copy_from_slice(&buffer[0..4]);
    header.version.copy_from_slice(&buffer[8..12]);
    header.device_class.copy_from_slice(&buffer[12..16]);
    header.colour_space.copy_from_slice(&buffer[16..20]);
    header.connection_space.copy_from_slice(&buffer[20..24]);

    let mut signature: [u8; 4] = [0; 4];
    signature.copy_from_slice(&buffer[36..40]);
    if signature != PROFILE_FILE_SIGNATURE {
        return Err(ICCError::InvalidSignature { signature });
    }

    if header.size() as u64 > available {
        return Err(ICCError::SizeMismatch {
            declared: header.size(),
            actual: available as usize,
        });
    }

    let mut tag_count: [u8; 4] = [0; 4];
    reader.read_exact(&mut tag_count)?;

    let tag_table_size = u32::from_be_bytes(tag_count) as usize;
    if (HEADER_LENGTH + 4 + tag_table_size * 12) as u64 > header.size() as u64 {
        return Err(ICCError::SizeMismatch {
            declared: header.size(),
            actual: HEADER_LENGTH + 4 + tag_table_size * 12,
        });
    }

    let mut tags: Vec<Tag> = Vec::with_capacity(tag_table_size);
    for _ in 0..tag_table_size {
        let mut tag = Tag {
            signature: [0; 4],
            offset: [0; 4],
            size: [0; 4],
        };
        reader.read_exact(&mut tag.signature)?;
        reader.read_exact(&mut tag.offset)?;
        reader.read_exact(&mut tag.size)?;

        if tag.offset() as u64 + tag.size() as u64 > header.size() as u64 {
            return Err(ICCError::TagOutOfBounds {
                signature: tag.signature(),
                offset: tag.offset(),
                size: tag.size(),
            });
        }

        tags.push(tag);
    }

    if header.size() as u64 != available {
        warn!(
            "profile declares {} bytes but {} are available",
            header.size(),
            available
        );
    }
    debug!(
        "ICC profile class {} colour space {:?} with {} tags",
        header.device_class(),
        header.colour_space(),
        tags.len()
    );

    reader.seek(io::SeekFrom::Start(
        icc_start_position + header.size() as u64,
    ))?;

    Ok(DecodedProfile { header, tags })
}

/// CIE xy chromaticities of a white point and RGB primaries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chromaticities {
    pub white: [f32; 2],
    pub primaries: [f32; 6],
}

/// ICC profile handle.
///
/// A profile is either a preset known by type only, raw profile bytes
/// (validated on construction), or an RGB profile defined by chromaticities.
#[derive(Debug, Clone)]
pub struct ICCProfile {
    profile_type: PredefinedProfile,
    data: Option<Vec<u8>>,
    decoded: Option<DecodedProfile>,
    chromaticities: Option<Chromaticities>,
}

impl ICCProfile {
    pub fn from_preset(profile_type: PredefinedProfile) -> ICCProfile {
        ICCProfile {
            profile_type,
            data: None,
            decoded: None,
            chromaticities: None,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<ICCProfile, ICCError> {
        let mut cursor = io::Cursor::new(data);
        let decoded = decode_icc(&mut cursor)?;

        Ok(ICCProfile {
            profile_type: PredefinedProfile::Unknown,
            data: Some(data[..decoded.header().size() as usize].to_vec()),
            decoded: Some(decoded),
            chromaticities: None,
        })
    }

    pub fn from_chromaticities(white: [f32; 2], primaries: [f32; 6]) -> ICCProfile {
        ICCProfile {
            profile_type: PredefinedProfile::Rgb,
            data: None,
            decoded: None,
            chromaticities: Some(Chromaticities { white, primaries }),
        }
    }

    pub fn profile_type(&self) -> PredefinedProfile {
        self.profile_type
    }

    pub fn chromaticities(&self) -> Option<&Chromaticities> {
        self.chromaticities.as_ref()
    }

    /// Colour space of the profile, from the header when bytes are known and
    /// from the preset otherwise.
    pub fn colour_space(&self) -> Option<ColourSpace> {
        if let Some(decoded) = &self.decoded {
            return Some(decoded.header().colour_space());
        }
        match self.profile_type {
            PredefinedProfile::SRgb | PredefinedProfile::AdobeRgb | PredefinedProfile::Rgb => {
                Some(ColourSpace::Rgb)
            }
            PredefinedProfile::CmykStandard => Some(ColourSpace::Cmyk),
            PredefinedProfile::GrayD50 | PredefinedProfile::LumD65 | PredefinedProfile::RommGray => {
                Some(ColourSpace::Gray)
            }
            PredefinedProfile::Undefined | PredefinedProfile::Unknown => None,
        }
    }

    pub fn decoded(&self) -> Option<&DecodedProfile> {
        self.decoded.as_ref()
    }

    /// Serialized profile. Chromaticity-defined profiles and the AdobeRGB,
    /// RGB and GRAY D50 presets are synthesized as version 2 display
    /// profiles with a gamma 2.2 curve.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ICCError> {
        if let Some(data) = &self.data {
            return Ok(data.clone());
        }
        if let Some(chromaticities) = &self.chromaticities {
            return Ok(encode_matrix_profile(chromaticities, "Chromaticity RGB"));
        }
        match self.profile_type {
            PredefinedProfile::AdobeRgb => Ok(encode_matrix_profile(&ADOBE_RGB, "Adobe RGB (1998)")),
            PredefinedProfile::Rgb => Ok(encode_matrix_profile(&REC709_RGB, "RGB")),
            PredefinedProfile::GrayD50 => Ok(encode_gray_profile("Gray D50")),
            profile_type => Err(ICCError::NoData { profile_type }),
        }
    }
}

const ADOBE_RGB: Chromaticities = Chromaticities {
    white: [0.3127, 0.3290],
    primaries: [0.64, 0.33, 0.21, 0.71, 0.15, 0.06],
};

// Plain RGB preset without chromaticities
const REC709_RGB: Chromaticities = Chromaticities {
    white: [0.3127, 0.3290],
    primaries: [0.64, 0.33, 0.30, 0.60, 0.15, 0.06],
};

const D50: [f64; 3] = [0.9642, 1.0, 0.8249];

fn xy_to_xyz(x: f64, y: f64) -> [f64; 3] {
    [x / y, 1.0, (1.0 - x - y) / y]
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

// Solves m · s = w by Cramer's rule.
fn solve(m: &[[f64; 3]; 3], w: &[f64; 3]) -> [f64; 3] {
    let det = determinant(m);
    let mut s = [0.0; 3];
    for (column, value) in s.iter_mut().enumerate() {
        let mut replaced = *m;
        for row in 0..3 {
            replaced[row][column] = w[row];
        }
        *value = determinant(&replaced) / det;
    }
    s
}

fn s15_fixed16(value: f64) -> [u8; 4] {
    ((value * 65536.0).round() as i32).to_be_bytes()
}

fn xyz_tag(xyz: &[f64; 3]) -> Vec<u8> {
    let mut tag = b"XYZ \0\0\0\0".to_vec();
    for component in xyz {
        tag.extend_from_slice(&s15_fixed16(*component));
    }
    tag
}

// curv with a single u8Fixed8 gamma of 2.2
fn gamma_curve() -> Vec<u8> {
    vec![99, 117, 114, 118, 0, 0, 0, 0, 0, 0, 0, 1, 0x02, 0x33, 0, 0]
}

fn description_tag(text: &str) -> Vec<u8> {
    let mut tag = b"desc\0\0\0\0".to_vec();
    tag.extend_from_slice(&(text.len() as u32 + 1).to_be_bytes());
    tag.extend_from_slice(text.as_bytes());
    tag.push(0);
    // Unicode and ScriptCode parts left empty
    tag.extend_from_slice(&[0; 4 + 4 + 2 + 1 + 67]);
    tag
}

fn encode_matrix_profile(chromaticities: &Chromaticities, description: &str) -> Vec<u8> {
    let p = &chromaticities.primaries;
    let red = xy_to_xyz(p[0] as f64, p[1] as f64);
    let green = xy_to_xyz(p[2] as f64, p[3] as f64);
    let blue = xy_to_xyz(p[4] as f64, p[5] as f64);
    let white = xy_to_xyz(chromaticities.white[0] as f64, chromaticities.white[1] as f64);

    let matrix = [
        [red[0], green[0], blue[0]],
        [red[1], green[1], blue[1]],
        [red[2], green[2], blue[2]],
    ];
    let scale = solve(&matrix, &white);

    let scaled = |primary: &[f64; 3], s: f64| [primary[0] * s, primary[1] * s, primary[2] * s];

    encode_profile(
        COLOUR_SPACE_RGB,
        vec![
            (*b"desc", description_tag(description)),
            (*b"wtpt", xyz_tag(&white)),
            (*b"rXYZ", xyz_tag(&scaled(&red, scale[0]))),
            (*b"gXYZ", xyz_tag(&scaled(&green, scale[1]))),
            (*b"bXYZ", xyz_tag(&scaled(&blue, scale[2]))),
            (*b"rTRC", gamma_curve()),
            (*b"gTRC", gamma_curve()),
            (*b"bTRC", gamma_curve()),
        ],
    )
}

fn encode_gray_profile(description: &str) -> Vec<u8> {
    encode_profile(
        COLOUR_SPACE_GRAY,
        vec![
            (*b"desc", description_tag(description)),
            (*b"wtpt", xyz_tag(&D50)),
            (*b"kTRC", gamma_curve()),
        ],
    )
}

fn encode_profile(colour_space: [u8; 4], tags: Vec<([u8; 4], Vec<u8>)>) -> Vec<u8> {
    let mut table: Vec<u8> = Vec::new();
    let mut body: Vec<u8> = Vec::new();
    let data_start = HEADER_LENGTH + 4 + tags.len() * 12;
    for (signature, data) in &tags {
        table.extend_from_slice(signature);
        table.extend_from_slice(&((data_start + body.len()) as u32).to_be_bytes());
        table.extend_from_slice(&(data.len() as u32).to_be_bytes());
        body.extend_from_slice(data);
        // tag data is 4-byte aligned
        while body.len() % 4 != 0 {
            body.push(0);
        }
    }

    let size = data_start + body.len();
    let mut profile = vec![0u8; HEADER_LENGTH];
    profile[0..4].copy_from_slice(&(size as u32).to_be_bytes());
    profile[8..12].copy_from_slice(&[2, 0x10, 0, 0]);
    profile[12..16].copy_from_slice(b"mntr");
    profile[16..20].copy_from_slice(&colour_space);
    profile[20..24].copy_from_slice(b"XYZ ");
    profile[36..40].copy_from_slice(&PROFILE_FILE_SIGNATURE);
    profile[68..72].copy_from_slice(&s15_fixed16(D50[0]));
    profile[72..76].copy_from_slice(&s15_fixed16(D50[1]));
    profile[76..80].copy_from_slice(&s15_fixed16(D50[2]));

    profile.extend_from_slice(&(tags.len() as u32).to_be_bytes());
    profile.extend_from_slice(&table);
    profile.extend_from_slice(&body);
    profile
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_profile(colour_space: &[u8; 4]) -> Vec<u8> {
        let mut profile = vec![0u8; HEADER_LENGTH];
        profile[0..4].copy_from_slice(&(HEADER_LENGTH as u32 + 4).to_be_bytes());
        profile[12..16].copy_from_slice(b"mntr");
        profile[16..20].copy_from_slice(colour_space);
        profile[36..40].copy_from_slice(b"acsp");
        profile.extend_from_slice(&[0, 0, 0, 0]);
        profile
    }

    #[test]
    fn test_from_bytes_reads_colour_space() {
        let profile = ICCProfile::from_bytes(&minimal_profile(b"GRAY")).unwrap();
        assert_eq!(profile.profile_type(), PredefinedProfile::Unknown);
        assert_eq!(profile.colour_space(), Some(ColourSpace::Gray));
        assert_eq!(profile.to_bytes().unwrap(), minimal_profile(b"GRAY"));
    }

    #[test]
    fn test_from_bytes_rejects_bad_signature() {
        let mut data = minimal_profile(b"RGB ");
        data[36..40].copy_from_slice(b"nope");
        assert!(matches!(
            ICCProfile::from_bytes(&data),
            Err(ICCError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_from_bytes_rejects_truncated() {
        assert!(matches!(
            ICCProfile::from_bytes(&[0; 20]),
            Err(ICCError::Truncated { length: 20 })
        ));
    }

    #[test]
    fn test_tag_out_of_bounds() {
        let mut data = minimal_profile(b"RGB ");
        data.truncate(HEADER_LENGTH);
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(b"wtpt");
        data.extend_from_slice(&1000u32.to_be_bytes());
        data.extend_from_slice(&20u32.to_be_bytes());
        let size = data.len() as u32;
        data[0..4].copy_from_slice(&size.to_be_bytes());
        assert!(matches!(
            ICCProfile::from_bytes(&data),
            Err(ICCError::TagOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_preset_has_no_data() {
        let profile = ICCProfile::from_preset(PredefinedProfile::SRgb);
        assert_eq!(profile.colour_space(), Some(ColourSpace::Rgb));
        assert!(matches!(
            profile.to_bytes(),
            Err(ICCError::NoData {
                profile_type: PredefinedProfile::SRgb
            })
        ));
    }

    #[test]
    fn test_synthesized_presets() {
        for (preset, colour_space, tags) in [
            (PredefinedProfile::AdobeRgb, ColourSpace::Rgb, 8),
            (PredefinedProfile::Rgb, ColourSpace::Rgb, 8),
            (PredefinedProfile::GrayD50, ColourSpace::Gray, 3),
        ]
        .iter()
        {
            let bytes = ICCProfile::from_preset(*preset).to_bytes().unwrap();
            let decoded = ICCProfile::from_bytes(&bytes).unwrap();
            assert_eq!(decoded.colour_space(), Some(*colour_space));
            assert_eq!(decoded.decoded().unwrap().tags().len(), *tags);
            assert_eq!(decoded.to_bytes().unwrap(), bytes);
        }
    }

    #[test]
    fn test_adobe_rgb_differs_from_rgb() {
        let adobe = ICCProfile::from_preset(PredefinedProfile::AdobeRgb);
        let rgb = ICCProfile::from_preset(PredefinedProfile::Rgb);
        assert_ne!(adobe.to_bytes().unwrap(), rgb.to_bytes().unwrap());
    }

    #[test]
    fn test_chromaticity_profile_is_decodable() {
        let profile = ICCProfile::from_chromaticities(
            [0.3127, 0.3290],
            [0.630, 0.340, 0.310, 0.595, 0.155, 0.070],
        );
        let bytes = profile.to_bytes().unwrap();
        let decoded = ICCProfile::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.colour_space(), Some(ColourSpace::Rgb));
        assert_eq!(decoded.decoded().unwrap().tags().len(), 8);
        assert_eq!(decoded.decoded().unwrap().header().version(), (2, 1));
    }
}

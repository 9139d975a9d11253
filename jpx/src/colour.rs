use icc::{ColourSpace, ICCProfile, PredefinedProfile};
use jp2::{
    Channel, ChannelDefinitionBox, ChannelTypes, ColourSpecificationBox,
    ColourSpecificationMethods, EnumeratedColourSpaces, CHANNEL_ASSOCIATION_WHOLE_IMAGE,
};
use log::debug;

use crate::error::JpxError;
use crate::image::{ExtraSample, Image, Photometric};
use crate::reporter::Reporter;

// Vendor extension for ROMM gray, not in the enumerated table
const ENUMERATED_ROMM_GRAY: u32 = 100;

// ITU-R BT.709 white point and primaries of the YCbCr(2) and YCbCr(3) spaces
const YCC_WHITE: [f32; 2] = [0.3127, 0.3290];
const YCC_PRIMARIES: [f32; 6] = [0.630, 0.340, 0.310, 0.595, 0.155, 0.070];

/// Colour interpretation of a decoded codestream.
#[derive(Debug, Clone)]
pub struct ColourModel {
    pub photometric: Photometric,
    pub icc: Option<ICCProfile>,
    /// Number of colour channels, after any palette expansion.
    pub colours: u16,
    pub extra_samples: Vec<ExtraSample>,
}

fn enumerated(code: u32) -> Result<(Photometric, ICCProfile, u16), JpxError> {
    let preset = ICCProfile::from_preset;
    let model = match EnumeratedColourSpaces::new(code) {
        EnumeratedColourSpaces::sRGB => (Photometric::Rgb, preset(PredefinedProfile::SRgb), 3),
        EnumeratedColourSpaces::CMYK => (
            Photometric::Separated,
            preset(PredefinedProfile::CmykStandard),
            4,
        ),
        EnumeratedColourSpaces::YCbCr1 | EnumeratedColourSpaces::sYCC => {
            (Photometric::YCbCr, preset(PredefinedProfile::SRgb), 3)
        }
        EnumeratedColourSpaces::YCbCr2 | EnumeratedColourSpaces::YCbCr3 => (
            Photometric::YCbCr,
            ICCProfile::from_chromaticities(YCC_WHITE, YCC_PRIMARIES),
            3,
        ),
        EnumeratedColourSpaces::Greyscale => (
            Photometric::MinIsBlack,
            preset(PredefinedProfile::LumD65),
            1,
        ),
        EnumeratedColourSpaces::Reserved {
            value: ENUMERATED_ROMM_GRAY,
        } => (
            Photometric::MinIsBlack,
            preset(PredefinedProfile::RommGray),
            1,
        ),
        _ => return Err(JpxError::UnsupportedColourSpace { code }),
    };
    Ok(model)
}

fn embedded(bytes: &[u8]) -> Result<(Photometric, ICCProfile, Option<u16>), JpxError> {
    let profile = ICCProfile::from_bytes(bytes)
        .map_err(|error| JpxError::malformed(format!("embedded ICC profile: {}", error)))?;
    let colour_space = profile.colour_space();
    let photometric = match colour_space {
        Some(ColourSpace::Gray) => Photometric::MinIsBlack,
        _ => Photometric::Rgb,
    };
    Ok((photometric, profile, colour_space.and_then(|space| space.channels())))
}

fn photometric_for(colours: u16) -> Result<Photometric, JpxError> {
    match colours {
        1 => Ok(Photometric::MinIsBlack),
        3 => Ok(Photometric::Rgb),
        4 => Ok(Photometric::Separated),
        count => Err(JpxError::UnsupportedComponentCount { count }),
    }
}

/// Resolves the photometric interpretation, ICC profile and extra samples
/// of `components` codestream components.
///
/// `palette_columns` is the number of columns of the palette box, if any.
pub fn resolve_read(
    colour: Option<&ColourSpecificationBox>,
    channels: Option<&ChannelDefinitionBox>,
    palette_columns: Option<u16>,
    components: u16,
    reporter: &dyn Reporter,
) -> Result<ColourModel, JpxError> {
    let colour = match colour {
        Some(colour) => match colour.method() {
            ColourSpecificationMethods::EnumeratedColourSpace
            | ColourSpecificationMethods::RestrictedICCProfile
            | ColourSpecificationMethods::AnyICCProfile => Some(colour),
            method => {
                reporter.warning(&format!(
                    "colour specification method {} ignored",
                    method
                ));
                None
            }
        },
        None => None,
    };

    let mut photometric = None;
    let mut icc = None;
    let mut natural = None;
    if let Some(colour) = colour {
        if let Some(space) = colour.enumerated_colour_space() {
            let (p, profile, count) = enumerated(space.value())?;
            photometric = Some(p);
            icc = Some(profile);
            natural = Some(count);
        } else if let Some(bytes) = colour.icc_profile() {
            let (p, profile, count) = embedded(bytes)?;
            photometric = Some(p);
            icc = Some(profile);
            natural = count;
        }
    }

    let defined_colours = channels.map(|channels| {
        channels
            .channels()
            .iter()
            .filter(|channel| channel.channel_type() == ChannelTypes::ColourImageData)
            .count() as u16
    });
    let colours = defined_colours
        .filter(|count| *count > 0)
        .or(palette_columns)
        .or(natural)
        .unwrap_or(components);

    let photometric = match photometric {
        Some(photometric) => photometric,
        None => photometric_for(colours)?,
    };

    let mut opacity: Vec<ChannelTypes> = channels
        .map(|channels| {
            let mut extra: Vec<&Channel> = channels
                .channels()
                .iter()
                .filter(|channel| channel.channel_type() != ChannelTypes::ColourImageData)
                .collect();
            extra.sort_by_key(|channel| channel.channel_index());
            extra.iter().map(|channel| channel.channel_type()).collect()
        })
        .unwrap_or_default();
    let extra_count = components.saturating_sub(colours) as usize;
    opacity.resize(extra_count, ChannelTypes::PremultipliedOpacity);
    let extra_samples = opacity
        .iter()
        .map(|channel_type| match channel_type {
            ChannelTypes::Opacity => ExtraSample::UnassociatedAlpha,
            _ => ExtraSample::AssociatedAlpha,
        })
        .collect();

    debug!(
        "{:?} with {} colours of {} components",
        photometric, colours, components
    );
    Ok(ColourModel {
        photometric,
        icc,
        colours,
        extra_samples,
    })
}

/// Colour boxes describing an image in a written file.
#[derive(Debug)]
pub struct WriteColour {
    pub colour: ColourSpecificationBox,
    pub channels: ChannelDefinitionBox,
    /// The colour box needs the JPX brand.
    pub jpx: bool,
}

pub fn resolve_write(image: &Image) -> Result<WriteColour, JpxError> {
    let colours = image.colour_channels();
    let (colour, jpx) = match &image.icc {
        Some(profile) => match profile.profile_type() {
            PredefinedProfile::SRgb => (
                ColourSpecificationBox::new_enumerated(EnumeratedColourSpaces::sRGB),
                false,
            ),
            PredefinedProfile::CmykStandard => (
                ColourSpecificationBox::new_enumerated(EnumeratedColourSpaces::CMYK),
                false,
            ),
            PredefinedProfile::LumD65 | PredefinedProfile::RommGray => (
                ColourSpecificationBox::new_enumerated(EnumeratedColourSpaces::Greyscale),
                false,
            ),
            _ => {
                let bytes = profile.to_bytes()?;
                match profile.colour_space() {
                    Some(ColourSpace::Gray) | Some(ColourSpace::Rgb) => (
                        ColourSpecificationBox::new_icc_profile(
                            ColourSpecificationMethods::RestrictedICCProfile,
                            bytes,
                        ),
                        false,
                    ),
                    _ => (
                        ColourSpecificationBox::new_icc_profile(
                            ColourSpecificationMethods::AnyICCProfile,
                            bytes,
                        ),
                        true,
                    ),
                }
            }
        },
        None => {
            let space = match colours {
                1 => EnumeratedColourSpaces::Greyscale,
                3 => EnumeratedColourSpaces::sRGB,
                4 => EnumeratedColourSpaces::CMYK,
                count => return Err(JpxError::UnsupportedComponentCount { count }),
            };
            (ColourSpecificationBox::new_enumerated(space), false)
        }
    };

    let mut definitions: Vec<Channel> = (0..colours)
        .map(|i| Channel::new(i, ChannelTypes::ColourImageData, i + 1))
        .collect();
    for (j, extra) in image.extra_samples.iter().enumerate() {
        let channel_type = match extra {
            ExtraSample::AssociatedAlpha => ChannelTypes::PremultipliedOpacity,
            ExtraSample::UnassociatedAlpha | ExtraSample::Unspecified => ChannelTypes::Opacity,
        };
        definitions.push(Channel::new(
            colours + j as u16,
            channel_type,
            CHANNEL_ASSOCIATION_WHOLE_IMAGE,
        ));
    }

    Ok(WriteColour {
        colour,
        channels: ChannelDefinitionBox::new(definitions),
        jpx,
    })
}

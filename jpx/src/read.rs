use std::fs::File;
use std::io;
use std::path::Path;

use log::{debug, info};

use crate::colour::resolve_read;
use crate::engine::{CodecEngine, DecodeRestrictions};
use crate::error::{JpxError, Phase, ResultExt};
use crate::geometry;
use crate::image::Image;
use crate::palette::PaletteLut;
use crate::reporter::Reporter;
use crate::scan::scan;
use crate::signature::detect;
use crate::stripe;
use crate::ReadOptions;

const STREAM_NAME: &str = "<stream>";

/// Decodes a JP2, JPX or bare codestream source.
///
/// Returns `Ok(None)` when the source is not JPEG 2000.
pub fn read<R: io::Read + io::Seek>(
    reader: &mut R,
    options: &ReadOptions,
    engine: &dyn CodecEngine,
    reporter: &dyn Reporter,
) -> Result<Option<Image>, JpxError> {
    read_named(reader, STREAM_NAME, options, engine, reporter)
}

pub fn read_file<P: AsRef<Path>>(
    path: P,
    options: &ReadOptions,
    engine: &dyn CodecEngine,
    reporter: &dyn Reporter,
) -> Result<Option<Image>, JpxError> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let mut file = File::open(path).context(Phase::Probe, &name)?;
    read_named(&mut file, &name, options, engine, reporter)
}

fn read_named<R: io::Read + io::Seek>(
    reader: &mut R,
    name: &str,
    options: &ReadOptions,
    engine: &dyn CodecEngine,
    reporter: &dyn Reporter,
) -> Result<Option<Image>, JpxError> {
    let signature = match detect(reader).context(Phase::Probe, name)? {
        Some(signature) => signature,
        None => return Ok(None),
    };
    info!("Reading {} as {:?}", name, signature);

    let mut scanned = scan(reader, signature, reporter).context(Phase::Scan, name)?;

    let restrictions = geometry::resolve(
        scanned.width(),
        scanned.height(),
        &options.region,
        &options.size,
        scanned.levels(),
    )
    .context(Phase::Geometry, name)?;
    debug!("{:?}", restrictions);

    let components = scanned.components();
    let header = scanned.header();
    let palette = header
        .and_then(|header| header.palette_box.as_ref())
        .and_then(PaletteLut::from_palette_box);
    let model = resolve_read(
        header.and_then(|header| header.colour_specification_boxes.first()),
        header.and_then(|header| header.channel_definition_box.as_ref()),
        header
            .and_then(|header| header.palette_box.as_ref())
            .map(|palette| palette.num_components() as u16),
        components,
        reporter,
    )
    .context(Phase::Colour, name)?;

    let codestream = scanned
        .read_codestream(reader)
        .context(Phase::Decode, name)?;
    let decompressor = engine
        .decode(
            &codestream,
            &DecodeRestrictions {
                region: restrictions.region,
                reduce: restrictions.reduce,
            },
            reporter,
        )
        .context(Phase::Decode, name)?;
    drop(codestream);

    let (width, height) = decompressor.dimensions();
    let bits = scanned.bits().context(Phase::Transfer, name)?;
    let pixels = stripe::pull(decompressor, components, bits, options.force_8bit)
        .context(Phase::Transfer, name)?;
    let mut image = Image::new(width, height, components, model.photometric, pixels)
        .context(Phase::Transfer, name)?;
    image.extra_samples = model.extra_samples;

    if let Some(palette) = palette {
        palette.expand(&mut image).context(Phase::Colour, name)?;
    }
    image.convert_ycc_to_rgb().context(Phase::Colour, name)?;

    if !restrictions.reduce_only {
        image
            .scale(restrictions.width, restrictions.height)
            .context(Phase::Geometry, name)?;
    }

    image.icc = model.icc;
    image.essentials = scanned.essentials();
    let metadata = scanned.take_metadata();
    image.xmp = metadata.xmp;
    image.iptc = metadata.iptc;
    image.exif = metadata.exif;

    Ok(Some(image))
}

/// Full image size, from the container boxes and the codestream SIZ segment
/// only. Returns `Ok(None)` when the source is not JPEG 2000.
pub fn dimensions<R: io::Read + io::Seek>(
    reader: &mut R,
    reporter: &dyn Reporter,
) -> Result<Option<(u32, u32)>, JpxError> {
    dimensions_named(reader, STREAM_NAME, reporter)
}

pub fn dimensions_file<P: AsRef<Path>>(
    path: P,
    reporter: &dyn Reporter,
) -> Result<Option<(u32, u32)>, JpxError> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let mut file = File::open(path).context(Phase::Probe, &name)?;
    dimensions_named(&mut file, &name, reporter)
}

fn dimensions_named<R: io::Read + io::Seek>(
    reader: &mut R,
    name: &str,
    reporter: &dyn Reporter,
) -> Result<Option<(u32, u32)>, JpxError> {
    let signature = match detect(reader).context(Phase::Probe, name)? {
        Some(signature) => signature,
        None => return Ok(None),
    };
    let scanned = scan(reader, signature, reporter).context(Phase::Scan, name)?;
    Ok(Some((scanned.width(), scanned.height())))
}

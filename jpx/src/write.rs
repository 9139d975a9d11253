use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::thread;

use jp2::encode_jp2;
use log::{debug, info};

use crate::compose::{attach_codestream, compose};
use crate::engine::{CodecEngine, EncodeParameters};
use crate::error::{JpxError, Phase, ResultExt};
use crate::image::{Image, PixelBuffer};
use crate::reporter::Reporter;
use crate::stripe;
use crate::WriteOptions;

const SINK_NAME: &str = "<sink>";

/// Worker threads to request from the engine, 0 for none.
pub fn desired_threads() -> usize {
    match thread::available_parallelism() {
        Ok(threads) if threads.get() >= 2 => threads.get(),
        _ => 0,
    }
}

fn validate(image: &Image) -> Result<(), JpxError> {
    match (&image.pixels, image.bits) {
        (PixelBuffer::U8(_), 8) | (PixelBuffer::U16(_), 16) => {}
        (_, bits) => return Err(JpxError::UnsupportedBitDepth { bits }),
    }
    if image.width == 0 || image.height == 0 || image.components == 0 {
        return Err(JpxError::InvalidSize {
            reason: format!(
                "{}x{} with {} components",
                image.width, image.height, image.components
            ),
        });
    }
    let expected = image.width as usize * image.height as usize * image.components as usize;
    if image.pixels.len() != expected {
        return Err(JpxError::InvalidSize {
            reason: format!("{} samples, expected {}", image.pixels.len(), expected),
        });
    }
    Ok(())
}

/// Encodes the image as a JP2 (or JPX, when the colour profile requires it)
/// file into `sink`.
pub fn write<W: Write>(
    image: &Image,
    sink: W,
    options: &WriteOptions,
    engine: &dyn CodecEngine,
    reporter: &dyn Reporter,
) -> Result<(), JpxError> {
    write_named(image, || Ok(sink), SINK_NAME, options, engine, reporter)
}

pub fn write_file<P: AsRef<Path>>(
    image: &Image,
    path: P,
    options: &WriteOptions,
    engine: &dyn CodecEngine,
    reporter: &dyn Reporter,
) -> Result<(), JpxError> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let create = || File::create(path).map(io::BufWriter::new);
    write_named(image, create, &name, options, engine, reporter)
}

/// The sink is opened only once the codestream has been produced.
fn write_named<W: Write, F: FnOnce() -> io::Result<W>>(
    image: &Image,
    open: F,
    name: &str,
    options: &WriteOptions,
    engine: &dyn CodecEngine,
    reporter: &dyn Reporter,
) -> Result<(), JpxError> {
    options.profile.validate().context(Phase::Compose, name)?;
    validate(image).context(Phase::Compose, name)?;
    let mut file = compose(image).context(Phase::Compose, name)?;

    let threads = options.threads.unwrap_or_else(desired_threads);
    let parameters = EncodeParameters {
        width: image.width,
        height: image.height,
        components: image.components,
        bits: image.bits,
        profile: options.profile.clone(),
        threads,
    };
    info!(
        "Encoding {}x{} with {} components at {} bits to {}",
        image.width, image.height, image.components, image.bits, name
    );

    let mut compressor = engine
        .encode(&parameters, reporter)
        .context(Phase::Encode, name)?;
    let granted = compressor.granted_threads();
    if granted < threads {
        debug!("Engine started {} of {} requested threads", granted, threads);
    }
    let stripe_height = options.stripe_height.unwrap_or(image.height);
    stripe::push(
        compressor.as_mut(),
        &image.pixels,
        image.width,
        image.components,
        stripe_height,
    )
    .context(Phase::Encode, name)?;
    let codestream = compressor.finish().context(Phase::Encode, name)?;

    attach_codestream(&mut file, codestream, image.essentials.as_deref())
        .context(Phase::Compose, name)?;

    let mut sink = open().context(Phase::Write, name)?;
    encode_jp2(&mut sink, &file)
        .map_err(|error| match error {
            jp2::JP2Error::Io(error) => JpxError::Io(error),
            error => JpxError::from(error),
        })
        .context(Phase::Write, name)?;
    sink.flush().context(Phase::Write, name)?;
    Ok(())
}

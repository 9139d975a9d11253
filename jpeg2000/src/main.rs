use clap::{Parser, Subcommand, ValueEnum};
use std::error;
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;

use icc::ICCProfile;
use jp2::{ChannelTypes, ColourSpecificationBox};
use jpx::scan::{scan, Scan};
use jpx::signature::{detect, Signature};
use jpx::LogReporter;
use log::debug;

#[derive(Debug)]
enum JP2000Error {
    NotJpeg2000 { path: String },
    MetadataMissing { kind: Kind },
}

impl error::Error for JP2000Error {}
impl fmt::Display for JP2000Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotJpeg2000 { path } => write!(f, "{} is not a JPEG 2000 file", path),
            Self::MetadataMissing { kind } => write!(f, "no {:?} metadata", kind),
        }
    }
}

#[derive(Parser)]
#[clap(name = "jp2000")]
struct Opts {
    #[clap(subcommand)]
    subcommand: SubCommand,
}

#[derive(Subcommand)]
enum SubCommand {
    /// Detect the file format and print the image size
    Probe(Probe),

    /// Print the boxes, colour description and metadata of a file
    Info(Info),

    /// Write an embedded metadata blob to stdout
    Metadata(Metadata),
}

#[derive(Parser)]
struct Probe {
    /// Path to .jp2, .jpx or .j2c file
    path: String,
}

#[derive(Parser)]
struct Info {
    /// Path to .jp2, .jpx or .j2c file
    path: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Xmp,
    Iptc,
    Exif,
}

#[derive(Parser)]
struct Metadata {
    /// Path to .jp2 or .jpx file
    path: String,

    /// Kind of metadata to extract
    #[clap(short, long, value_enum)]
    kind: Kind,
}

fn open(path: &str) -> Result<(Signature, Scan), Box<dyn Error>> {
    let mut reader = BufReader::new(File::open(Path::new(path))?);
    let signature = match detect(&mut reader)? {
        Some(signature) => signature,
        None => {
            return Err(JP2000Error::NotJpeg2000 {
                path: path.to_owned(),
            }
            .into())
        }
    };
    debug!("{} detected as {:?}", path, signature);
    let scanned = scan(&mut reader, signature, &LogReporter)?;
    Ok((signature, scanned))
}

fn describe_colour(colour: &ColourSpecificationBox) -> String {
    if let Some(space) = colour.enumerated_colour_space() {
        return format!("enumerated {:?} ({})", space, space.value());
    }
    if let Some(bytes) = colour.icc_profile() {
        let space = match ICCProfile::from_bytes(bytes) {
            Ok(profile) => format!("{:?}", profile.colour_space()),
            Err(error) => format!("invalid: {}", error),
        };
        return format!(
            "ICC method {}, {} bytes, colour space {}",
            colour.method(),
            bytes.len(),
            space
        );
    }
    format!("method {} (ignored)", colour.method())
}

fn info(path: &str) -> Result<(), Box<dyn Error>> {
    let (signature, scanned) = open(path)?;
    let mut out = io::stdout();

    writeln!(out, "path: {}", path)?;
    match scanned.file() {
        Some(file) => {
            let file_type = file.file_type_box();
            writeln!(out, "format: container, brand {:?}", file_type.brand())?;
            writeln!(out, "compatibility: {:?}", file_type.compatibility_list())?;
        }
        None => writeln!(out, "format: {:?}", signature)?,
    }
    writeln!(out, "size: {}x{}", scanned.width(), scanned.height())?;
    writeln!(out, "components: {}", scanned.components())?;
    writeln!(out, "bits per component: {}", scanned.bits()?)?;
    if let Some(levels) = scanned.levels() {
        writeln!(out, "decomposition levels: {}", levels)?;
    }
    let (offset, length) = scanned.codestream_range();
    writeln!(out, "codestream: {} bytes at {}", length, offset)?;

    if let Some(header) = scanned.header() {
        for colour in &header.colour_specification_boxes {
            writeln!(out, "colour: {}", describe_colour(colour))?;
        }
        if let Some(palette) = &header.palette_box {
            writeln!(
                out,
                "palette: {} entries, {} columns",
                palette.num_entries(),
                palette.num_components()
            )?;
        }
        if let Some(channels) = &header.channel_definition_box {
            let colours = channels
                .channels()
                .iter()
                .filter(|channel| channel.channel_type() == ChannelTypes::ColourImageData)
                .count();
            writeln!(
                out,
                "channels: {} colour, {} other",
                colours,
                channels.channels().len() - colours
            )?;
        }
    }

    let metadata = scanned.metadata();
    let mut present = vec![];
    if metadata.xmp.is_some() {
        present.push("XMP");
    }
    if metadata.iptc.is_some() {
        present.push("IPTC");
    }
    if metadata.exif.is_some() {
        present.push("EXIF");
    }
    writeln!(out, "metadata: {}", present.join(", "))?;
    if let Some(essentials) = scanned.essentials() {
        writeln!(out, "essentials: {}", essentials)?;
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let opts: Opts = Opts::parse();

    match opts.subcommand {
        SubCommand::Probe(c) => {
            let signature = jpx::signature::detect_file(&c.path)?;
            match signature {
                Some(signature) => {
                    let size = jpx::dimensions_file(&c.path, &LogReporter)?;
                    match size {
                        Some((width, height)) => {
                            println!("{}: {:?} {}x{}", c.path, signature, width, height)
                        }
                        None => println!("{}: {:?}", c.path, signature),
                    }
                }
                None => println!("{}: not JPEG 2000", c.path),
            }
        }
        SubCommand::Info(c) => info(&c.path)?,
        SubCommand::Metadata(c) => {
            let (_, scanned) = open(&c.path)?;
            let metadata = scanned.metadata();
            let blob = match c.kind {
                Kind::Xmp => metadata.xmp.as_ref().map(|xmp| xmp.as_bytes()),
                Kind::Iptc => metadata.iptc.as_ref().map(|iptc| iptc.as_bytes()),
                Kind::Exif => metadata.exif.as_ref().map(|exif| exif.as_bytes()),
            };
            match blob {
                Some(bytes) => {
                    let mut out = io::stdout();
                    out.write_all(bytes)?;
                    out.flush()?;
                }
                None => return Err(JP2000Error::MetadataMissing { kind: c.kind }.into()),
            }
        }
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    match run() {
        Err(e) => Err(e.to_string().into()),
        Ok(_) => Ok(()),
    }
}

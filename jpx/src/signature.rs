use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const PROBE_LENGTH: usize = 48;

// COD marker following a SOC and a single component SIZ
const CODESTREAM_COD_OFFSET: usize = 45;
const CODESTREAM_COD: [u8; 2] = [0xFF, 0x52];

// SOC followed by SIZ
const CODESTREAM_START: [u8; 4] = [0xFF, 0x4F, 0xFF, 0x51];

// Signature box
const CONTAINER_START: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    /// A bare codestream without container boxes.
    Codestream,
    /// A JP2 or JPX file.
    Container,
}

pub fn detect_bytes(bytes: &[u8]) -> Option<Signature> {
    let probe = &bytes[..bytes.len().min(PROBE_LENGTH)];

    if probe.len() >= CODESTREAM_COD_OFFSET + 2
        && probe[CODESTREAM_COD_OFFSET..CODESTREAM_COD_OFFSET + 2] == CODESTREAM_COD
    {
        return Some(Signature::Codestream);
    }
    if probe.starts_with(&CODESTREAM_START) {
        return Some(Signature::Codestream);
    }
    if probe.starts_with(&CONTAINER_START) {
        return Some(Signature::Container);
    }
    None
}

/// Probes the leading bytes of the reader and restores its position.
pub fn detect<R: Read + io::Seek>(reader: &mut R) -> Result<Option<Signature>, io::Error> {
    let position = reader.stream_position()?;
    let mut probe = Vec::with_capacity(PROBE_LENGTH);
    reader
        .by_ref()
        .take(PROBE_LENGTH as u64)
        .read_to_end(&mut probe)?;
    reader.seek(io::SeekFrom::Start(position))?;
    Ok(detect_bytes(&probe))
}

pub fn detect_file<P: AsRef<Path>>(path: P) -> Result<Option<Signature>, io::Error> {
    let mut file = File::open(path)?;
    detect(&mut file)
}

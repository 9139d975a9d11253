#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::io::Cursor;
use std::rc::Rc;

use jp2::{
    encode_jp2, BitDepth, ContiguousCodestreamBox, FileTypeBox, HeaderSuperBox, ImageHeaderBox,
    JP2File, UUIDBox, BRAND_JP2,
};
use jpc::{
    decode_jpc, CodingStyleMarkerSegment, CommentMarkerSegment, ComponentSize,
    ImageAndTileSizeMarkerSegment, ProgressionOrder, TransformationFilter, MARKER_SYMBOL_EOC,
    MARKER_SYMBOL_SOC, MARKER_SYMBOL_SOD, MARKER_SYMBOL_SOT,
};
use jpx::{
    CodecEngine, DecodeRestrictions, EncodeParameters, EngineError, Reporter, StripeCompressor,
    StripeDecompressor,
};

// SOT segment including its marker
const SOT_LENGTH: usize = 12;

// Largest stripe delivered per pull
const STRIPE_ROWS: usize = 7;

/// Codestream whose single tile carries the raw samples, one byte per
/// sample up to 8 bits and two big endian bytes otherwise.
pub fn codestream(
    width: u32,
    height: u32,
    components: u16,
    bits: u8,
    levels: u8,
    comments: &[CommentMarkerSegment],
    samples: &[u16],
) -> Vec<u8> {
    assert_eq!(
        samples.len(),
        width as usize * height as usize * components as usize
    );
    let mut data = MARKER_SYMBOL_SOC.to_vec();
    let sizes = vec![ComponentSize::new(bits, false); components as usize];
    ImageAndTileSizeMarkerSegment::new(width, height, &sizes)
        .encode(&mut data)
        .unwrap();
    CodingStyleMarkerSegment::new(
        ProgressionOrder::RLPCLP,
        1,
        components >= 3,
        levels,
        (6, 6),
        TransformationFilter::Reversible,
        &[],
        false,
    )
    .encode(&mut data)
    .unwrap();
    for comment in comments {
        comment.encode(&mut data).unwrap();
    }
    append_tile(&mut data, bits, samples);
    data
}

fn append_tile(data: &mut Vec<u8>, bits: u8, samples: &[u16]) {
    let tile_length = SOT_LENGTH + 2 + samples.len() * if bits > 8 { 2 } else { 1 };
    data.extend_from_slice(&MARKER_SYMBOL_SOT);
    data.extend_from_slice(&[0, 10, 0, 0]);
    data.extend_from_slice(&(tile_length as u32).to_be_bytes());
    data.extend_from_slice(&[0, 1]);
    data.extend_from_slice(&MARKER_SYMBOL_SOD);
    for sample in samples {
        if bits > 8 {
            data.extend_from_slice(&sample.to_be_bytes());
        } else {
            data.push(*sample as u8);
        }
    }
    data.extend_from_slice(&MARKER_SYMBOL_EOC);
}

pub fn header(width: u32, height: u32, components: u16, bits: u8) -> HeaderSuperBox {
    HeaderSuperBox::new(ImageHeaderBox::new(
        height,
        width,
        components,
        Some(BitDepth::Unsigned { value: bits }),
    ))
}

pub fn container(
    header: HeaderSuperBox,
    uuid_boxes: Vec<UUIDBox>,
    codestream: Vec<u8>,
) -> Vec<u8> {
    let mut file = JP2File::new(FileTypeBox::new(BRAND_JP2, vec![BRAND_JP2]), header);
    for uuid_box in uuid_boxes {
        file.push_uuid_box(uuid_box);
    }
    file.push_contiguous_codestream_box(ContiguousCodestreamBox::new(codestream));
    let mut data = Vec::new();
    encode_jp2(&mut data, &file).unwrap();
    data
}

/// Samples of the tile of a codestream written by [`codestream`] or by the
/// stub compressor.
pub struct Tile {
    pub width: u32,
    pub height: u32,
    pub components: u16,
    pub bits: u8,
    pub samples: Vec<u16>,
}

pub fn decode_tile(data: &[u8]) -> Tile {
    let parsed = decode_jpc(&mut Cursor::new(data)).unwrap();
    let siz = parsed.header().image_and_tile_size_marker_segment();
    let (width, height, components) = (siz.width(), siz.height(), siz.no_components());
    let bits = siz.precision(0).unwrap();
    let count = width as usize * height as usize * components as usize;
    let start = parsed.header_length() as usize + SOT_LENGTH + 2;
    let samples = if bits > 8 {
        data[start..start + count * 2]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect()
    } else {
        data[start..start + count].iter().map(|s| *s as u16).collect()
    };
    Tile {
        width,
        height,
        components,
        bits,
        samples,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Normal,
    /// Delivers no rows after the first stripe.
    Stall,
    /// Fails to open the codestream.
    FailDecode,
    /// Fails the first pushed stripe.
    FailEncode,
}

/// Codec engine over [`Tile`] codestreams, recording every call.
pub struct StubEngine {
    pub behaviour: Behaviour,
    pub granted_threads: usize,
    pub decodes: RefCell<Vec<DecodeRestrictions>>,
    pub encodes: RefCell<Vec<EncodeParameters>>,
    pub pushed_rows: Rc<RefCell<Vec<usize>>>,
    pub finished: Rc<Cell<usize>>,
}

impl StubEngine {
    pub fn new() -> StubEngine {
        StubEngine::with(Behaviour::Normal)
    }

    pub fn with(behaviour: Behaviour) -> StubEngine {
        StubEngine {
            behaviour,
            granted_threads: 1,
            decodes: RefCell::new(vec![]),
            encodes: RefCell::new(vec![]),
            pushed_rows: Rc::new(RefCell::new(vec![])),
            finished: Rc::new(Cell::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.decodes.borrow().len() + self.encodes.borrow().len()
    }
}

struct StubDecompressor {
    tile: Tile,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    step: u32,
    row: usize,
    stall: bool,
    finished: Rc<Cell<usize>>,
}

impl StubDecompressor {
    fn sample(&self, column: u32, row: u32, component: u16) -> u16 {
        let x = self.x + column * self.step;
        let y = self.y + row * self.step;
        let index = (y as usize * self.tile.width as usize + x as usize)
            * self.tile.components as usize
            + component as usize;
        self.tile.samples[index]
    }

    fn stripe(&mut self) -> usize {
        if self.stall && self.row > 0 {
            return 0;
        }
        STRIPE_ROWS.min(self.height as usize - self.row)
    }

    fn fill<T>(&mut self, samples: &mut [T], convert: impl Fn(u16) -> T) -> usize {
        let rows = self.stripe();
        let mut i = 0;
        for row in self.row..self.row + rows {
            for column in 0..self.width {
                for component in 0..self.tile.components {
                    samples[i] = convert(self.sample(column, row as u32, component));
                    i += 1;
                }
            }
        }
        self.row += rows;
        rows
    }
}

impl StripeDecompressor for StubDecompressor {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn pull_stripe_u8(&mut self, samples: &mut [u8]) -> Result<usize, EngineError> {
        let bits = self.tile.bits as i32;
        Ok(self.fill(samples, |value| {
            if bits >= 8 {
                (value >> (bits - 8)) as u8
            } else {
                (value << (8 - bits)) as u8
            }
        }))
    }

    fn pull_stripe_u16(&mut self, samples: &mut [u16], precision: u8) -> Result<usize, EngineError> {
        let shift = precision as i32 - self.tile.bits as i32;
        Ok(self.fill(samples, |value| {
            if shift >= 0 {
                value << shift
            } else {
                value >> -shift
            }
        }))
    }

    fn finish(self: Box<Self>) -> Result<(), EngineError> {
        self.finished.set(self.finished.get() + 1);
        Ok(())
    }
}

struct StubCompressor {
    parameters: EncodeParameters,
    granted_threads: usize,
    fail: bool,
    samples: Vec<u16>,
    pushed_rows: Rc<RefCell<Vec<usize>>>,
    finished: Rc<Cell<usize>>,
}

impl StubCompressor {
    fn push(&mut self, samples: impl Iterator<Item = u16>, rows: usize) -> Result<(), EngineError> {
        if self.fail {
            return Err(EngineError::new("stripe rejected"));
        }
        self.samples.extend(samples);
        self.pushed_rows.borrow_mut().push(rows);
        Ok(())
    }
}

impl StripeCompressor for StubCompressor {
    fn granted_threads(&self) -> usize {
        self.granted_threads
    }

    fn push_stripe_u8(&mut self, samples: &[u8], rows: usize) -> Result<(), EngineError> {
        self.push(samples.iter().map(|s| *s as u16), rows)
    }

    fn push_stripe_u16(&mut self, samples: &[u16], rows: usize) -> Result<(), EngineError> {
        self.push(samples.iter().copied(), rows)
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, EngineError> {
        self.finished.set(self.finished.get() + 1);
        let parameters = &self.parameters;
        let mut data = MARKER_SYMBOL_SOC.to_vec();
        let sizes = vec![ComponentSize::new(parameters.bits, false); parameters.components as usize];
        ImageAndTileSizeMarkerSegment::new(parameters.width, parameters.height, &sizes)
            .encode(&mut data)
            .map_err(|error| EngineError::new(error.to_string()))?;
        parameters
            .profile
            .coding_style(parameters.components)
            .map_err(|error| EngineError::new(error.to_string()))?
            .encode(&mut data)
            .map_err(|error| EngineError::new(error.to_string()))?;
        append_tile(&mut data, parameters.bits, &self.samples);
        Ok(data)
    }
}

impl CodecEngine for StubEngine {
    fn decode(
        &self,
        codestream: &[u8],
        restrictions: &DecodeRestrictions,
        _reporter: &dyn Reporter,
    ) -> Result<Box<dyn StripeDecompressor>, EngineError> {
        self.decodes.borrow_mut().push(*restrictions);
        if self.behaviour == Behaviour::FailDecode {
            return Err(EngineError::new("corrupt tile"));
        }
        let tile = decode_tile(codestream);
        let (x, y, width, height) = match restrictions.region {
            Some(rect) => (rect.x, rect.y, rect.width, rect.height),
            None => (0, 0, tile.width, tile.height),
        };
        let step = 1u32 << restrictions.reduce;
        Ok(Box::new(StubDecompressor {
            tile,
            x,
            y,
            width: (width >> restrictions.reduce).max(1),
            height: (height >> restrictions.reduce).max(1),
            step,
            row: 0,
            stall: self.behaviour == Behaviour::Stall,
            finished: Rc::clone(&self.finished),
        }))
    }

    fn encode(
        &self,
        parameters: &EncodeParameters,
        _reporter: &dyn Reporter,
    ) -> Result<Box<dyn StripeCompressor>, EngineError> {
        self.encodes.borrow_mut().push(parameters.clone());
        Ok(Box::new(StubCompressor {
            parameters: parameters.clone(),
            granted_threads: self.granted_threads,
            fail: self.behaviour == Behaviour::FailEncode,
            samples: vec![],
            pushed_rows: Rc::clone(&self.pushed_rows),
            finished: Rc::clone(&self.finished),
        }))
    }
}

#[derive(Default)]
pub struct Recorder {
    pub warnings: RefCell<Vec<String>>,
    pub errors: RefCell<Vec<String>>,
}

impl Reporter for Recorder {
    fn warning(&self, message: &str) {
        self.warnings.borrow_mut().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.borrow_mut().push(message.to_string());
    }
}

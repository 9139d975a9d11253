//! Decode restrictions from a region of interest and a target size.

use crate::error::JpxError;

// Largest shift of a 32 bit dimension
const MAX_REDUCE: u8 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Rect {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegionSpec {
    Full,
    /// Rectangle in full resolution pixels.
    Crop(Rect),
    /// Largest centred square.
    Square,
    /// Rectangle in percent of the full size.
    Percent {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

impl Default for RegionSpec {
    fn default() -> RegionSpec {
        RegionSpec::Full
    }
}

impl RegionSpec {
    /// The crop rectangle in full resolution pixels, `None` for the full
    /// image. Rectangles are never clamped to the image.
    pub fn resolve(&self, width: u32, height: u32) -> Result<Option<Rect>, JpxError> {
        let rect = match *self {
            RegionSpec::Full => return Ok(None),
            RegionSpec::Crop(rect) => rect,
            RegionSpec::Square => {
                let side = width.min(height);
                Rect::new((width - side) / 2, (height - side) / 2, side, side)
            }
            RegionSpec::Percent {
                x,
                y,
                width: w,
                height: h,
            } => {
                let valid = |v: f32| v.is_finite() && (0.0..=100.0).contains(&v);
                let out_of_bounds = JpxError::RegionOutOfBounds {
                    x: 0,
                    y: 0,
                    width: 0,
                    height: 0,
                    image_width: width,
                    image_height: height,
                };
                if !(valid(x) && valid(y) && valid(w) && valid(h)) || x + w > 100.0 || y + h > 100.0
                {
                    return Err(out_of_bounds);
                }
                let pixels = |percent: f32, full: u32| (percent * full as f32 / 100.0).round() as u32;
                Rect::new(
                    pixels(x, width),
                    pixels(y, height),
                    pixels(w, width),
                    pixels(h, height),
                )
            }
        };

        let inside = rect.x as u64 + rect.width as u64 <= width as u64
            && rect.y as u64 + rect.height as u64 <= height as u64;
        if rect.width == 0 || rect.height == 0 || !inside {
            return Err(JpxError::RegionOutOfBounds {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                image_width: width,
                image_height: height,
            });
        }
        Ok(Some(rect))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeSpec {
    Full,
    Scaled { width: u32, height: u32 },
    /// Width, height keeps the aspect ratio.
    Width(u32),
    /// Height, width keeps the aspect ratio.
    Height(u32),
    Percent(f32),
    /// Fit inside a square keeping the aspect ratio.
    MaxDimension(u32),
    /// Explicit dyadic reduction level.
    Reduce(u8),
}

impl Default for SizeSpec {
    fn default() -> SizeSpec {
        SizeSpec::Full
    }
}

fn invalid(reason: String) -> JpxError {
    JpxError::InvalidSize { reason }
}

fn proportional(value: u32, numerator: u32, denominator: u32) -> u32 {
    ((value as f64 * numerator as f64 / denominator as f64).round() as u32).max(1)
}

/// Largest reduce level r with ⌊width/2^r⌋ ≥ target width and
/// ⌊height/2^r⌋ ≥ target height.
pub fn reduce_level(width: u32, height: u32, target_width: u32, target_height: u32) -> u8 {
    let mut reduce = 0;
    while reduce < MAX_REDUCE
        && (width >> (reduce + 1)) >= target_width
        && (height >> (reduce + 1)) >= target_height
    {
        reduce += 1;
    }
    reduce
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restrictions {
    pub region: Option<Rect>,
    pub reduce: u8,
    /// Exact output size.
    pub width: u32,
    pub height: u32,
    /// The dyadic reduction alone yields the output size.
    pub reduce_only: bool,
}

/// Resolves region and size against the full image size. `max_reduce` caps
/// the reduce level, usually at the decomposition levels of the codestream.
pub fn resolve(
    width: u32,
    height: u32,
    region: &RegionSpec,
    size: &SizeSpec,
    max_reduce: Option<u8>,
) -> Result<Restrictions, JpxError> {
    let crop = region.resolve(width, height)?;
    let (source_width, source_height) = match crop {
        Some(rect) => (rect.width, rect.height),
        None => (width, height),
    };

    let (target_width, target_height, requested_reduce) = match *size {
        SizeSpec::Full => (source_width, source_height, None),
        SizeSpec::Scaled { width, height } => (width, height, None),
        SizeSpec::Width(width) => {
            if width == 0 {
                return Err(invalid("zero width".to_string()));
            }
            (width, proportional(source_height, width, source_width), None)
        }
        SizeSpec::Height(height) => {
            if height == 0 {
                return Err(invalid("zero height".to_string()));
            }
            (proportional(source_width, height, source_height), height, None)
        }
        SizeSpec::Percent(percent) => {
            if !(percent.is_finite() && percent > 0.0) {
                return Err(invalid(format!("{} percent", percent)));
            }
            let scale = |v: u32| ((v as f64 * percent as f64 / 100.0).round() as u32).max(1);
            (scale(source_width), scale(source_height), None)
        }
        SizeSpec::MaxDimension(max) => {
            if max == 0 {
                return Err(invalid("zero maximum dimension".to_string()));
            }
            if source_width >= source_height {
                (max, proportional(source_height, max, source_width), None)
            } else {
                (proportional(source_width, max, source_height), max, None)
            }
        }
        SizeSpec::Reduce(reduce) => {
            let reduce = reduce.min(MAX_REDUCE);
            (
                (source_width >> reduce).max(1),
                (source_height >> reduce).max(1),
                Some(reduce),
            )
        }
    };
    if target_width == 0 || target_height == 0 {
        return Err(invalid(format!(
            "target {}x{} is empty",
            target_width, target_height
        )));
    }

    let mut reduce = requested_reduce
        .unwrap_or_else(|| reduce_level(source_width, source_height, target_width, target_height));
    if let Some(max_reduce) = max_reduce {
        reduce = reduce.min(max_reduce);
    }
    let reduce_only = (source_width >> reduce) == target_width
        && (source_height >> reduce) == target_height;

    Ok(Restrictions {
        region: crop,
        reduce,
        width: target_width,
        height: target_height,
        reduce_only,
    })
}

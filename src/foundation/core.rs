use crate::foundation::error::{TrainmapError, TrainmapResult};

pub use kurbo::{Affine, BezPath, Point, Rect};

/// Absolute 0-based frame index in animation order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

impl FrameIndex {
    /// 1-based frame number as shown to humans.
    pub fn display_number(self) -> u64 {
        self.0 + 1
    }
}

/// Delay between consecutive frames, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameInterval {
    millis: u32,
}

impl FrameInterval {
    /// Create a validated interval (`millis > 0`).
    pub fn from_millis(millis: u32) -> TrainmapResult<Self> {
        if millis == 0 {
            return Err(TrainmapError::invalid_argument(
                "frame interval must be > 0 ms",
            ));
        }
        Ok(Self { millis })
    }

    /// Interval in milliseconds.
    pub fn as_millis(self) -> u32 {
        self.millis
    }

    /// Playback rate as a rational `(num, den)` frames per second, reduced.
    pub fn fps_rational(self) -> (u32, u32) {
        let g = gcd(1000, self.millis);
        (1000 / g, self.millis / g)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Reject empty canvases and sizes the CPU rasterizer cannot address.
    pub fn validate(self) -> TrainmapResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(TrainmapError::invalid_argument(
                "canvas width/height must be non-zero",
            ));
        }
        if self.width > u32::from(u16::MAX) || self.height > u32::from(u16::MAX) {
            return Err(TrainmapError::invalid_argument(
                "canvas width/height must fit in u16",
            ));
        }
        Ok(())
    }

    pub fn aspect(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Straight-alpha RGBA8 color as written in configuration files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

pub(crate) fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = mul_div255_u16(px[0] as u16, a) as u8;
        px[1] = mul_div255_u16(px[1] as u16, a) as u8;
        px[2] = mul_div255_u16(px[2] as u16, a) as u8;
    }
}

/// Flatten RGBA8 over an opaque background so encoders without alpha see final colors.
pub(crate) fn flatten_to_opaque_rgba8(
    dst: &mut [u8],
    src: &[u8],
    src_is_premul: bool,
    bg_rgba: [u8; 4],
) -> TrainmapResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(TrainmapError::invalid_argument(
            "flatten_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let bg_r = bg_rgba[0] as u16;
    let bg_g = bg_rgba[1] as u16;
    let bg_b = bg_rgba[2] as u16;

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = s[3] as u16;
        if a == 255 {
            d.copy_from_slice(s);
            d[3] = 255;
            continue;
        }

        let inv = 255u16 - a;

        let (r, g, b) = if src_is_premul {
            (
                s[0] as u16 + mul_div255_u16(bg_r, inv),
                s[1] as u16 + mul_div255_u16(bg_g, inv),
                s[2] as u16 + mul_div255_u16(bg_b, inv),
            )
        } else {
            (
                mul_div255_u16(s[0] as u16, a) + mul_div255_u16(bg_r, inv),
                mul_div255_u16(s[1] as u16, a) + mul_div255_u16(bg_g, inv),
                mul_div255_u16(s[2] as u16, a) + mul_div255_u16(bg_b, inv),
            )
        };

        d[0] = r.min(255) as u8;
        d[1] = g.min(255) as u8;
        d[2] = b.min(255) as u8;
        d[3] = 255;
    }

    Ok(())
}

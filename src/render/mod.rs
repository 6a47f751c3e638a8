//! Frame rendering: viewport math, per-frame paint plans, and the CPU raster surface.

pub mod cpu;
pub mod plan;
pub mod scene;
pub mod text;
pub mod viewport;

pub use cpu::{DrawingSurface, FrameScope};
pub use plan::{DrawOp, FramePlan, HAlign, Layer, TextAnchor, VAlign};
pub use scene::{CityLabel, MapScene, SceneStyle, TextStyle};
pub use text::find_system_font;
pub use viewport::{Extent, Viewport};

/// One rendered frame.
///
/// `data` is tightly packed RGBA8, row-major, `width * height * 4` bytes. When `premultiplied`
/// is set the colour channels are already scaled by alpha.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

impl FrameRGBA {
    /// Pixel at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        let px = self.data.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

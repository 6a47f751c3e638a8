use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::foundation::core::{Rgba8, premultiply_rgba8_in_place};
use crate::foundation::error::TrainmapResult;

/// Raster image decoded once and shared between frames.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    /// Premultiplied RGBA8, row-major, tightly packed.
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl PreparedImage {
    /// Single-colour image, e.g. the default rectangular train marker.
    pub fn solid(width: u32, height: u32, color: Rgba8) -> Self {
        let mut px = color.to_array();
        premultiply_rgba8_in_place(&mut px);
        let rgba8_premul = px
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            rgba8_premul: Arc::new(rgba8_premul),
        }
    }
}

pub fn decode_image(bytes: &[u8]) -> TrainmapResult<PreparedImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(PreparedImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

pub fn load_image_file(path: &Path) -> TrainmapResult<PreparedImage> {
    let bytes = std::fs::read(path).with_context(|| format!("read image '{}'", path.display()))?;
    decode_image(&bytes)
}

//! XYZ ("slippy map") tile addressing over the Web Mercator square.

use crate::foundation::error::{TrainmapError, TrainmapResult};
use crate::geo::project::WEB_MERCATOR_HALF_WORLD_M;
use crate::render::viewport::Extent;

/// Edge length of one tile in pixels.
pub const TILE_SIZE_PX: u32 = 256;

/// Highest zoom level served by common raster providers.
pub const MAX_ZOOM: u8 = 19;

/// Upper bound on the tiles one frame may draw.
pub const MAX_TILES_PER_VIEW: u64 = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    /// Ground extent covered by this tile, in Web Mercator metres.
    pub fn extent(&self) -> Extent {
        let size = tile_span_m(self.z);
        let min_x = -WEB_MERCATOR_HALF_WORLD_M + f64::from(self.x) * size;
        let max_y = WEB_MERCATOR_HALF_WORLD_M - f64::from(self.y) * size;
        Extent {
            min_x,
            min_y: max_y - size,
            max_x: min_x + size,
            max_y,
        }
    }
}

/// Width of one tile at `z`, in metres.
pub fn tile_span_m(z: u8) -> f64 {
    2.0 * WEB_MERCATOR_HALF_WORLD_M / 2f64.powi(i32::from(z))
}

/// Smallest zoom whose native resolution is at least as fine as `meters_per_pixel`.
pub fn zoom_for_resolution(meters_per_pixel: f64, max_zoom: u8) -> u8 {
    if !meters_per_pixel.is_finite() || meters_per_pixel <= 0.0 {
        return max_zoom;
    }
    let world_px_at_z0 = f64::from(TILE_SIZE_PX);
    let z = (2.0 * WEB_MERCATOR_HALF_WORLD_M / (world_px_at_z0 * meters_per_pixel))
        .log2()
        .ceil();
    z.clamp(0.0, f64::from(max_zoom)) as u8
}

/// Inclusive column and row bounds of the tiles at `z` that touch `extent`.
fn tile_bounds(extent: &Extent, z: u8) -> ([f64; 2], [f64; 2]) {
    let last = 2f64.powi(i32::from(z)) - 1.0;
    let span = tile_span_m(z);
    let col = |x: f64| ((x + WEB_MERCATOR_HALF_WORLD_M) / span).floor().clamp(0.0, last);
    let row = |y: f64| ((WEB_MERCATOR_HALF_WORLD_M - y) / span).floor().clamp(0.0, last);
    (
        [col(extent.min_x), col(extent.max_x)],
        [row(extent.max_y), row(extent.min_y)],
    )
}

/// Number of tiles in the bounding block of `extent` at zoom `z`, saturating at `u64::MAX`.
pub fn tile_count(extent: &Extent, z: u8) -> u64 {
    let ([x0, x1], [y0, y1]) = tile_bounds(extent, z);
    let cols = (x1 - x0 + 1.0) as u64;
    let rows = (y1 - y0 + 1.0) as u64;
    cols.saturating_mul(rows)
}

/// Every tile at zoom `z` that overlaps `extent`, row-major from the north-west corner.
///
/// Fails when `z` is above [`MAX_ZOOM`] or the view needs more than [`MAX_TILES_PER_VIEW`] tiles.
pub fn tiles_covering(extent: &Extent, z: u8) -> TrainmapResult<Vec<TileId>> {
    if z > MAX_ZOOM {
        return Err(TrainmapError::render(format!(
            "tile zoom {z} exceeds {MAX_ZOOM}"
        )));
    }
    let count = tile_count(extent, z);
    if count > MAX_TILES_PER_VIEW {
        return Err(TrainmapError::render(format!(
            "view needs {count} tiles at zoom {z}, limit is {MAX_TILES_PER_VIEW}"
        )));
    }

    let ([x0, x1], [y0, y1]) = tile_bounds(extent, z);
    let mut out = Vec::with_capacity(count as usize);
    for y in y0 as u32..=y1 as u32 {
        for x in x0 as u32..=x1 as u32 {
            let id = TileId { z, x, y };
            if id.extent().intersects(extent) {
                out.push(id);
            }
        }
    }
    Ok(out)
}

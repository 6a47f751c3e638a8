//! Background map imagery.
//!
//! Providers hand the renderer decoded tiles positioned in Web Mercator; how they obtain them is
//! their own business. [`TileDirectory`] reads a prefetched XYZ tile tree from disk and
//! [`PlainBasemap`] paints a flat background with no imagery at all.

use crate::assets::PreparedImage;
use crate::foundation::core::Rgba8;
use crate::foundation::error::TrainmapResult;
use crate::render::viewport::{Extent, Viewport};

pub mod dir;
pub mod tiles;

pub use dir::TileDirectory;
pub use tiles::TileId;

/// One tile placed on the map.
#[derive(Clone, Debug)]
pub struct BasemapTile {
    pub id: TileId,
    /// Ground extent the image covers, in Web Mercator metres.
    pub extent: Extent,
    pub image: PreparedImage,
}

/// Source of basemap imagery for a viewport.
///
/// A failure here is fatal to the frame being rendered.
pub trait BasemapProvider {
    /// Colour painted under any tiles (and in place of them when there are none).
    fn background(&self) -> Rgba8;

    /// Tiles to draw for `viewport`, in paint order.
    fn tiles_for(&mut self, viewport: &Viewport) -> TrainmapResult<Vec<BasemapTile>>;

    /// Attribution text required by the imagery's licence, if any.
    fn attribution(&self) -> Option<&str> {
        None
    }
}

/// Flat background colour, no tiles.
#[derive(Clone, Copy, Debug)]
pub struct PlainBasemap {
    pub color: Rgba8,
}

impl Default for PlainBasemap {
    fn default() -> Self {
        // Close to the land colour of light "Positron"-style basemaps.
        Self {
            color: Rgba8::opaque(250, 250, 248),
        }
    }
}

impl BasemapProvider for PlainBasemap {
    fn background(&self) -> Rgba8 {
        self.color
    }

    fn tiles_for(&mut self, _viewport: &Viewport) -> TrainmapResult<Vec<BasemapTile>> {
        Ok(Vec::new())
    }
}

impl<T: BasemapProvider + ?Sized> BasemapProvider for Box<T> {
    fn background(&self) -> Rgba8 {
        (**self).background()
    }

    fn tiles_for(&mut self, viewport: &Viewport) -> TrainmapResult<Vec<BasemapTile>> {
        (**self).tiles_for(viewport)
    }

    fn attribution(&self) -> Option<&str> {
        (**self).attribution()
    }
}

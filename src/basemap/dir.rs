use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::assets::{PreparedImage, load_image_file};
use crate::basemap::tiles::{MAX_ZOOM, TileId, tiles_covering, zoom_for_resolution};
use crate::basemap::{BasemapProvider, BasemapTile};
use crate::foundation::core::Rgba8;
use crate::foundation::error::{TrainmapError, TrainmapResult};
use crate::render::viewport::Viewport;

/// Reads tiles from a local XYZ tree laid out as `{root}/{z}/{x}/{y}.{ext}`.
///
/// Decoded tiles are kept for the life of the provider, so an animation decodes each tile once.
/// A tile missing from disk is an error, not a hole in the map.
pub struct TileDirectory {
    root: PathBuf,
    extension: String,
    zoom: Option<u8>,
    background: Rgba8,
    attribution: Option<String>,
    cache: HashMap<TileId, PreparedImage>,
}

impl TileDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "png".to_string(),
            zoom: None,
            background: Rgba8::opaque(250, 250, 248),
            attribution: None,
            cache: HashMap::new(),
        }
    }

    /// Pin the zoom level instead of deriving it from the viewport resolution.
    pub fn with_zoom(mut self, zoom: Option<u8>) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_background(mut self, background: Rgba8) -> Self {
        self.background = background;
        self
    }

    pub fn with_attribution(mut self, attribution: Option<String>) -> Self {
        self.attribution = attribution;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tile_path(&self, id: TileId) -> PathBuf {
        self.root
            .join(id.z.to_string())
            .join(id.x.to_string())
            .join(format!("{}.{}", id.y, self.extension))
    }

    fn load(&mut self, id: TileId) -> TrainmapResult<PreparedImage> {
        if let Some(img) = self.cache.get(&id) {
            return Ok(img.clone());
        }

        let path = self.tile_path(id);
        if !path.is_file() {
            return Err(TrainmapError::render(format!(
                "basemap tile {}/{}/{} not found at '{}'",
                id.z,
                id.x,
                id.y,
                path.display()
            )));
        }
        let img = load_image_file(&path).map_err(|e| {
            TrainmapError::render(format!(
                "failed to decode basemap tile '{}': {e}",
                path.display()
            ))
        })?;
        tracing::debug!(z = id.z, x = id.x, y = id.y, "decoded basemap tile");
        self.cache.insert(id, img.clone());
        Ok(img)
    }
}

impl BasemapProvider for TileDirectory {
    fn background(&self) -> Rgba8 {
        self.background
    }

    fn tiles_for(&mut self, viewport: &Viewport) -> TrainmapResult<Vec<BasemapTile>> {
        let z = self
            .zoom
            .unwrap_or_else(|| zoom_for_resolution(viewport.meters_per_pixel(), MAX_ZOOM));
        tiles_covering(&viewport.extent(), z)?
            .into_iter()
            .map(|id| {
                Ok(BasemapTile {
                    id,
                    extent: id.extent(),
                    image: self.load(id)?,
                })
            })
            .collect()
    }

    fn attribution(&self) -> Option<&str> {
        self.attribution.as_deref()
    }
}

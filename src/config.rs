use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::basemap::tiles::{MAX_TILES_PER_VIEW, MAX_ZOOM, tile_count};
use crate::foundation::core::{Canvas, FrameInterval, Rgba8};
use crate::foundation::error::{TrainmapError, TrainmapResult};
use crate::geo::GeoPoint;
use crate::render::plan::{HAlign, TextAnchor, VAlign};
use crate::render::viewport::Extent;

/// A stop on the route, given in WGS84 degrees.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StationConfig {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
    /// Draw the name on the map.
    #[serde(default = "default_true")]
    pub label: bool,
    #[serde(default)]
    pub anchor: TextAnchor,
    /// Pixel nudge applied to the label (y down).
    #[serde(default)]
    pub offset_px: [f64; 2],
}

impl StationConfig {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::lon_lat(self.lon, self.lat)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BasemapConfig {
    /// No imagery, just a fill colour.
    Plain { color: Rgba8 },
    /// Prefetched XYZ tiles on disk.
    TileDir {
        root: PathBuf,
        #[serde(default)]
        zoom: Option<u8>,
        #[serde(default = "default_tile_extension")]
        extension: String,
        #[serde(default)]
        attribution: Option<String>,
        #[serde(default = "default_basemap_color")]
        background: Rgba8,
    },
}

fn default_tile_extension() -> String {
    "png".to_string()
}

fn default_basemap_color() -> Rgba8 {
    Rgba8::opaque(250, 250, 248)
}

impl Default for BasemapConfig {
    fn default() -> Self {
        Self::Plain {
            color: default_basemap_color(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouteStyleConfig {
    pub color: Rgba8,
    pub width_px: f64,
}

impl Default for RouteStyleConfig {
    fn default() -> Self {
        Self {
            color: Rgba8::opaque(128, 128, 128),
            width_px: 3.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkerConfig {
    /// Fill for the default rectangular marker; ignored when `icon` is set.
    pub color: Rgba8,
    pub width_px: f64,
    pub height_px: f64,
    /// PNG (or any format `image` decodes) drawn instead of the rectangle.
    pub icon: Option<PathBuf>,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            color: Rgba8::opaque(255, 0, 0),
            width_px: 10.0,
            height_px: 5.0,
            icon: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TextConfig {
    /// Font file; when unset a few common system locations are tried.
    pub font_path: Option<PathBuf>,
    pub label_size_px: f32,
    pub title_size_px: f32,
    pub color: Rgba8,
    /// `{from}`, `{to}`, `{frame}` and `{total}` are substituted. `None` disables the title.
    pub title: Option<String>,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            label_size_px: 16.0,
            title_size_px: 19.0,
            color: Rgba8::opaque(0, 0, 0),
            title: Some("Train from {from} to {to}\nFrame {frame}/{total}".to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Gif,
    Mp4,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> TrainmapResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("gif") => Ok(Self::Gif),
            Some("mp4") => Ok(Self::Mp4),
            _ => Err(TrainmapError::config(format!(
                "cannot infer output format from '{}' (expected .gif or .mp4)",
                path.display()
            ))),
        }
    }
}

/// Most frames a single run may render.
pub const MAX_FRAMES: u64 = 100_000;

/// Everything that drives one animation run.
///
/// Every field has a default, so a JSON file only needs the settings it changes.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnimationConfig {
    /// Route waypoints in travel order; at least two.
    pub stations: Vec<StationConfig>,
    pub frames: u64,
    pub interval_ms: u32,
    pub canvas: Canvas,
    /// Web Mercator extent to show. When unset it is derived from the stations.
    pub extent: Option<Extent>,
    /// Padding around the stations for a derived extent, as a fraction of the larger side.
    pub extent_padding: f64,
    pub basemap: BasemapConfig,
    pub route: RouteStyleConfig,
    pub marker: MarkerConfig,
    pub text: TextConfig,
    pub output: PathBuf,
    pub overwrite: bool,
    /// GIF quantizer speed, 1 (best) to 30 (fastest).
    pub gif_speed: i32,
    pub loop_forever: bool,
    /// Colour transparent pixels are flattened onto when encoding.
    pub background: Rgba8,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            stations: vec![
                StationConfig {
                    name: "Guangzhou".to_string(),
                    lon: 113.2644,
                    lat: 23.1291,
                    label: true,
                    anchor: TextAnchor {
                        h: HAlign::Right,
                        v: VAlign::Bottom,
                    },
                    offset_px: [-4.0, -4.0],
                },
                StationConfig {
                    name: "Shenzhen".to_string(),
                    lon: 114.0579,
                    lat: 22.5431,
                    label: true,
                    anchor: TextAnchor {
                        h: HAlign::Left,
                        v: VAlign::Top,
                    },
                    offset_px: [4.0, 4.0],
                },
            ],
            frames: 100,
            interval_ms: 100,
            canvas: Canvas {
                width: 1000,
                height: 800,
            },
            extent: Some(Extent {
                min_x: 1.258e7,
                min_y: 2.53e6,
                max_x: 1.273e7,
                max_y: 2.69e6,
            }),
            extent_padding: 0.15,
            basemap: BasemapConfig::default(),
            route: RouteStyleConfig::default(),
            marker: MarkerConfig::default(),
            text: TextConfig::default(),
            output: PathBuf::from("train_map_with_basemap.gif"),
            overwrite: true,
            gif_speed: 10,
            loop_forever: false,
            background: Rgba8::opaque(255, 255, 255),
        }
    }
}

impl AnimationConfig {
    /// Load a JSON file; relative paths inside it resolve against the file's directory.
    pub fn from_json_path(path: &Path) -> TrainmapResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let mut cfg = Self::from_json_str(&text)?;
        if let Some(base) = path.parent() {
            cfg.resolve_paths(base);
        }
        Ok(cfg)
    }

    pub fn from_json_str(text: &str) -> TrainmapResult<Self> {
        serde_json::from_str(text).map_err(|e| TrainmapError::config(format!("parse config: {e}")))
    }

    pub fn to_json_pretty(&self) -> TrainmapResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TrainmapError::config(format!("serialize config: {e}")))
    }

    /// Join relative asset paths onto `base`. Absolute paths are kept.
    pub fn resolve_paths(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(p) = self.text.font_path.as_mut() {
            join(p);
        }
        if let Some(p) = self.marker.icon.as_mut() {
            join(p);
        }
        if let BasemapConfig::TileDir { root, .. } = &mut self.basemap {
            join(root);
        }
    }

    pub fn interval(&self) -> TrainmapResult<FrameInterval> {
        FrameInterval::from_millis(self.interval_ms)
    }

    pub fn output_format(&self) -> TrainmapResult<OutputFormat> {
        OutputFormat::from_path(&self.output)
    }

    /// Title with the route endpoints filled in; frame placeholders are left for the renderer.
    pub fn title_template(&self) -> Option<String> {
        let from = self.stations.first().map(|s| s.name.as_str()).unwrap_or("");
        let to = self.stations.last().map(|s| s.name.as_str()).unwrap_or("");
        self.text
            .title
            .as_ref()
            .map(|t| t.replace("{from}", from).replace("{to}", to))
    }

    pub fn validate(&self) -> TrainmapResult<()> {
        if self.stations.len() < 2 {
            return Err(TrainmapError::invalid_argument(format!(
                "route needs at least 2 stations, got {}",
                self.stations.len()
            )));
        }
        for s in &self.stations {
            if !(s.lon.is_finite() && s.lat.is_finite())
                || s.lon.abs() > 180.0
                || s.lat.abs() > 90.0
            {
                return Err(TrainmapError::invalid_argument(format!(
                    "station '{}' has invalid coordinates ({}, {})",
                    s.name, s.lon, s.lat
                )));
            }
            if !(s.offset_px[0].is_finite() && s.offset_px[1].is_finite()) {
                return Err(TrainmapError::invalid_argument(format!(
                    "station '{}' label offset must be finite",
                    s.name
                )));
            }
        }
        if self.frames == 0 {
            return Err(TrainmapError::invalid_argument("frames must be >= 1"));
        }
        if self.frames > MAX_FRAMES {
            return Err(TrainmapError::invalid_argument(format!(
                "frames must be <= {MAX_FRAMES}, got {}",
                self.frames
            )));
        }
        self.interval()?;
        self.canvas.validate()?;
        if let Some(extent) = &self.extent {
            extent.validate()?;
        }
        if !(self.extent_padding.is_finite() && self.extent_padding >= 0.0) {
            return Err(TrainmapError::invalid_argument(
                "extent_padding must be finite and >= 0",
            ));
        }
        if !(self.route.width_px.is_finite() && self.route.width_px > 0.0) {
            return Err(TrainmapError::invalid_argument(
                "route.width_px must be finite and > 0",
            ));
        }
        if !(self.marker.width_px.is_finite()
            && self.marker.height_px.is_finite()
            && self.marker.width_px > 0.0
            && self.marker.height_px > 0.0)
        {
            return Err(TrainmapError::invalid_argument(
                "marker width_px/height_px must be finite and > 0",
            ));
        }
        for (what, size) in [
            ("label_size_px", self.text.label_size_px),
            ("title_size_px", self.text.title_size_px),
        ] {
            if !(size.is_finite() && size > 0.0) {
                return Err(TrainmapError::invalid_argument(format!(
                    "text.{what} must be finite and > 0"
                )));
            }
        }
        if !(1..=30).contains(&self.gif_speed) {
            return Err(TrainmapError::invalid_argument(
                "gif_speed must be in 1..=30",
            ));
        }
        if let BasemapConfig::TileDir { zoom: Some(z), .. } = &self.basemap {
            if *z > MAX_ZOOM {
                return Err(TrainmapError::invalid_argument(format!(
                    "basemap zoom {z} exceeds {MAX_ZOOM}"
                )));
            }
            if let Some(extent) = &self.extent {
                check_tile_budget(&extent.fit_aspect(self.canvas), *z)?;
            }
        }
        self.output_format()?;
        Ok(())
    }
}

/// Rejects a pinned tile zoom that would need too many tiles to cover `extent`.
pub(crate) fn check_tile_budget(extent: &Extent, zoom: u8) -> TrainmapResult<()> {
    let count = tile_count(extent, zoom);
    if count > MAX_TILES_PER_VIEW {
        return Err(TrainmapError::invalid_argument(format!(
            "basemap zoom {zoom} needs {count} tiles for this view, limit is {MAX_TILES_PER_VIEW}; \
             lower the zoom or leave it unset"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_guangzhou_shenzhen_run() {
        let cfg = AnimationConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.stations.len(), 2);
        assert_eq!(cfg.frames, 100);
        assert_eq!(cfg.interval_ms, 100);
        assert_eq!(cfg.output_format().unwrap(), OutputFormat::Gif);
        assert!(!cfg.loop_forever);
        assert_eq!(
            cfg.title_template().unwrap(),
            "Train from Guangzhou to Shenzhen\nFrame {frame}/{total}"
        );
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let cfg = AnimationConfig::from_json_str(
            r#"{ "frames": 12, "output": "out/run.mp4", "basemap": { "kind": "tile_dir", "root": "tiles" } }"#,
        )
        .unwrap();
        assert_eq!(cfg.frames, 12);
        assert_eq!(cfg.interval_ms, 100);
        assert_eq!(cfg.output_format().unwrap(), OutputFormat::Mp4);
        match &cfg.basemap {
            BasemapConfig::TileDir {
                root, extension, ..
            } => {
                assert_eq!(root, &PathBuf::from("tiles"));
                assert_eq!(extension, "png");
            }
            other => panic!("unexpected basemap {other:?}"),
        }
    }

    #[test]
    fn unknown_keys_are_config_errors() {
        let err = AnimationConfig::from_json_str(r#"{ "frame_count": 3 }"#).unwrap_err();
        assert!(matches!(err, TrainmapError::Config(_)));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = AnimationConfig::default();
        cfg.frames = 0;
        assert!(matches!(cfg.validate(), Err(TrainmapError::InvalidArgument(_))));

        let mut cfg = AnimationConfig::default();
        cfg.interval_ms = 0;
        assert!(matches!(cfg.validate(), Err(TrainmapError::InvalidArgument(_))));

        let mut cfg = AnimationConfig::default();
        cfg.stations.truncate(1);
        assert!(matches!(cfg.validate(), Err(TrainmapError::InvalidArgument(_))));

        let mut cfg = AnimationConfig::default();
        cfg.stations[0].lat = 91.0;
        assert!(matches!(cfg.validate(), Err(TrainmapError::InvalidArgument(_))));

        let mut cfg = AnimationConfig::default();
        cfg.output = PathBuf::from("anim.webm");
        assert!(matches!(cfg.validate(), Err(TrainmapError::Config(_))));
    }

    #[test]
    fn frame_count_is_capped() {
        let mut cfg = AnimationConfig::default();
        cfg.frames = MAX_FRAMES;
        cfg.validate().unwrap();
        cfg.frames = MAX_FRAMES + 1;
        assert!(matches!(cfg.validate(), Err(TrainmapError::InvalidArgument(_))));
        cfg.frames = u64::MAX;
        assert!(matches!(cfg.validate(), Err(TrainmapError::InvalidArgument(_))));
    }

    #[test]
    fn pinned_zoom_over_a_world_extent_is_rejected() {
        let tiles = |zoom| BasemapConfig::TileDir {
            root: PathBuf::from("tiles"),
            zoom: Some(zoom),
            extension: "png".to_string(),
            attribution: None,
            background: default_basemap_color(),
        };
        let mut cfg = AnimationConfig::default();
        cfg.extent = Some(Extent::new(-2e7, -2e7, 2e7, 2e7).unwrap());
        cfg.basemap = tiles(MAX_ZOOM);
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, TrainmapError::InvalidArgument(_)), "{err}");

        cfg.basemap = tiles(3);
        cfg.validate().unwrap();
    }

    #[test]
    fn relative_paths_resolve_against_the_config_dir() {
        let mut cfg = AnimationConfig::default();
        cfg.text.font_path = Some(PathBuf::from("fonts/a.ttf"));
        cfg.marker.icon = Some(PathBuf::from("/abs/train.png"));
        cfg.basemap = BasemapConfig::TileDir {
            root: PathBuf::from("tiles"),
            zoom: None,
            extension: "png".to_string(),
            attribution: None,
            background: default_basemap_color(),
        };
        cfg.resolve_paths(Path::new("conf"));
        assert_eq!(
            cfg.text.font_path.as_deref(),
            Some(Path::new("conf/fonts/a.ttf"))
        );
        assert_eq!(cfg.marker.icon.as_deref(), Some(Path::new("/abs/train.png")));
        assert!(matches!(
            &cfg.basemap,
            BasemapConfig::TileDir { root, .. } if root == Path::new("conf/tiles")
        ));
    }

    #[test]
    fn defaults_survive_a_json_round_trip() {
        let cfg = AnimationConfig::default();
        let back = AnimationConfig::from_json_str(&cfg.to_json_pretty().unwrap()).unwrap();
        assert_eq!(back, cfg);
    }
}

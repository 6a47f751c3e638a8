use std::path::PathBuf;

use crate::assets::{PreparedImage, load_image_file};
use crate::basemap::{BasemapProvider, PlainBasemap, TileDirectory};
use crate::config::{AnimationConfig, BasemapConfig, OutputFormat, check_tile_budget};
use crate::encode::{FfmpegSink, FrameSink, GifSink};
use crate::export::export_frames;
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{TrainmapError, TrainmapResult};
use crate::geo::{Crs, GeoPoint, Route, SampledPoint, project_points};
use crate::render::cpu::DrawingSurface;
use crate::render::plan::FramePlan;
use crate::render::scene::{CityLabel, MapScene, SceneStyle, TextStyle};
use crate::render::text::{TextLayoutEngine, find_system_font};
use crate::render::viewport::{Extent, Viewport};
use crate::render::FrameRGBA;

/// Smallest side of a derived extent, in metres.
const MIN_DERIVED_SPAN_M: f64 = 2_000.0;

/// A configured train animation, ready to render frame by frame or straight to a file.
pub struct TrainAnimation {
    config: AnimationConfig,
    route: Route,
    samples: Vec<SampledPoint>,
    scene: MapScene,
    basemap: Box<dyn BasemapProvider>,
    surface: DrawingSurface,
}

impl std::fmt::Debug for TrainAnimation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainAnimation")
            .field("frames", &self.config.frames)
            .field("route", &self.route)
            .field("viewport", self.scene.viewport())
            .field("text", &self.surface.has_text())
            .finish_non_exhaustive()
    }
}

impl TrainAnimation {
    #[tracing::instrument(skip(config), fields(frames = config.frames))]
    pub fn new(config: AnimationConfig) -> TrainmapResult<Self> {
        config.validate()?;

        let stops: Vec<GeoPoint> = config.stations.iter().map(|s| s.position()).collect();
        let route = Route::new(stops.clone())?;
        let frames = usize::try_from(config.frames)
            .map_err(|_| TrainmapError::invalid_argument("frame count does not fit in usize"))?;
        let samples = route.sample(frames)?;

        let extent = match config.extent {
            Some(e) => e,
            None => {
                let projected = project_points(&stops, Crs::WebMercator)?;
                Extent::around(&projected, config.extent_padding, MIN_DERIVED_SPAN_M)?
            }
        };
        let viewport = Viewport::fit(extent, config.canvas)?;
        if let BasemapConfig::TileDir { zoom: Some(z), .. } = &config.basemap {
            check_tile_budget(&viewport.extent(), *z)?;
        }

        let labels = config
            .stations
            .iter()
            .filter(|s| s.label)
            .map(|s| CityLabel {
                name: s.name.clone(),
                position: s.position(),
                anchor: s.anchor,
                offset_px: (s.offset_px[0], s.offset_px[1]),
            })
            .collect();

        let marker = match &config.marker.icon {
            Some(path) => load_image_file(path)?,
            // Twice the drawn size, scaled down at paint time.
            None => PreparedImage::solid(
                (config.marker.width_px * 2.0).ceil() as u32,
                (config.marker.height_px * 2.0).ceil() as u32,
                config.marker.color,
            ),
        };
        let text_style = |size_px| TextStyle {
            size_px,
            color: config.text.color,
        };
        let style = SceneStyle {
            route_color: config.route.color,
            route_width_px: config.route.width_px,
            marker,
            marker_size_px: (config.marker.width_px, config.marker.height_px),
            label: text_style(config.text.label_size_px),
            title: text_style(config.text.title_size_px),
            ..SceneStyle::default()
        };
        let scene = MapScene::new(&route, viewport, labels, style, config.frames)?
            .with_title(config.title_template());

        let basemap: Box<dyn BasemapProvider> = match &config.basemap {
            BasemapConfig::Plain { color } => Box::new(PlainBasemap { color: *color }),
            BasemapConfig::TileDir {
                root,
                zoom,
                extension,
                attribution,
                background,
            } => Box::new(
                TileDirectory::new(root)
                    .with_zoom(*zoom)
                    .with_extension(extension.clone())
                    .with_attribution(attribution.clone())
                    .with_background(*background),
            ),
        };

        let font = match &config.text.font_path {
            Some(path) => Some(TextLayoutEngine::from_path(path)?),
            None => match find_system_font() {
                Some(path) => match TextLayoutEngine::from_path(&path) {
                    Ok(engine) => Some(engine),
                    Err(e) => {
                        tracing::warn!(font = %path.display(), error = %e, "system font unusable");
                        None
                    }
                },
                None => None,
            },
        };
        match &font {
            Some(engine) => tracing::debug!(family = engine.family_name(), "font loaded"),
            None => tracing::warn!("no font available; labels and title will not be drawn"),
        }
        let surface = DrawingSurface::new(config.canvas)?.with_text(font);

        tracing::info!(
            length_m = route.haversine_length_m()?,
            mpp = viewport.meters_per_pixel(),
            "animation prepared"
        );

        Ok(Self {
            config,
            route,
            samples,
            scene,
            basemap,
            surface,
        })
    }

    pub fn config(&self) -> &AnimationConfig {
        &self.config
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Train position for every frame, in WGS84.
    pub fn samples(&self) -> &[SampledPoint] {
        &self.samples
    }

    pub fn scene(&self) -> &MapScene {
        &self.scene
    }

    pub fn frame_count(&self) -> u64 {
        self.config.frames
    }

    /// Whether labels and title can be drawn.
    pub fn has_text(&self) -> bool {
        self.surface.has_text()
    }

    fn sample(&self, index: FrameIndex) -> TrainmapResult<&SampledPoint> {
        usize::try_from(index.0)
            .ok()
            .and_then(|i| self.samples.get(i))
            .ok_or_else(|| {
                TrainmapError::invalid_argument(format!(
                    "frame {} out of range (animation has {} frames)",
                    index.0, self.config.frames
                ))
            })
    }

    pub fn plan_frame(&mut self, index: FrameIndex) -> TrainmapResult<FramePlan> {
        let sample = *self.sample(index)?;
        self.scene
            .plan_frame(index, &sample, self.basemap.as_mut())
    }

    #[tracing::instrument(skip(self))]
    pub fn render_frame(&mut self, index: FrameIndex) -> TrainmapResult<FrameRGBA> {
        let plan = self.plan_frame(index)?;
        self.surface.render(&plan)
    }

    /// Render every frame into `sink`.
    pub fn export_to(&mut self, sink: &mut dyn FrameSink) -> TrainmapResult<()> {
        let interval = self.config.interval()?;
        let (frames, canvas, background) =
            (self.config.frames, self.config.canvas, self.config.background);
        export_frames(
            frames,
            interval,
            canvas,
            background,
            |i| self.render_frame(i),
            sink,
        )
    }

    /// Render to the configured output path, choosing the encoder from its extension.
    pub fn render_to_file(&mut self) -> TrainmapResult<PathBuf> {
        let out = self.config.output.clone();
        let mut sink: Box<dyn FrameSink> = match self.config.output_format()? {
            OutputFormat::Gif => Box::new(
                GifSink::new(&out)
                    .with_overwrite(self.config.overwrite)
                    .with_speed(self.config.gif_speed)
                    .with_loop(self.config.loop_forever),
            ),
            OutputFormat::Mp4 => {
                Box::new(FfmpegSink::new(&out).with_overwrite(self.config.overwrite))
            }
        };
        self.export_to(sink.as_mut())?;
        Ok(out)
    }
}

#![forbid(unsafe_code)]
//! Animated maps of a train travelling along a route.
//!
//! The pipeline samples a [`geo::Route`] into one position per frame, projects everything into
//! Web Mercator, paints each frame bottom-up (basemap, route, marker, labels, title) on a CPU
//! raster surface, and streams the frames into a [`encode::FrameSink`] such as a GIF file.

pub mod assets;
pub mod basemap;
pub mod config;
pub mod encode;
pub mod export;
pub mod geo;
pub mod pipeline;
pub mod render;

mod foundation;

pub use assets::PreparedImage;
pub use basemap::{BasemapProvider, BasemapTile, PlainBasemap, TileDirectory};
pub use config::{AnimationConfig, BasemapConfig, OutputFormat, StationConfig};
pub use encode::{FfmpegSink, FrameSink, GifSink, InMemorySink, SinkConfig};
pub use export::export_frames;
pub use foundation::core::{Canvas, FrameIndex, FrameInterval, Rgba8};
pub use foundation::error::{TrainmapError, TrainmapResult};
pub use geo::{Crs, GeoPoint, Route, SampledPoint, project_point, project_points};
pub use pipeline::TrainAnimation;
pub use render::{DrawingSurface, Extent, FramePlan, FrameRGBA, Layer, MapScene, Viewport};

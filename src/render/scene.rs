use crate::assets::PreparedImage;
use crate::basemap::BasemapProvider;
use crate::foundation::core::{BezPath, FrameIndex, Point, Rect, Rgba8};
use crate::foundation::error::{TrainmapError, TrainmapResult};
use crate::geo::{GeoPoint, Route, SampledPoint, project_point};
use crate::render::plan::{DrawOp, FramePlan, HAlign, Layer, TextAnchor, VAlign};
use crate::render::viewport::Viewport;

/// A named place drawn as text next to its location.
#[derive(Clone, Debug, PartialEq)]
pub struct CityLabel {
    pub name: String,
    /// Location in any supported CRS; projected when a frame is planned.
    pub position: GeoPoint,
    pub anchor: TextAnchor,
    /// Nudge applied after projection, in pixels (y down).
    pub offset_px: (f64, f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextStyle {
    pub size_px: f32,
    pub color: Rgba8,
}

#[derive(Clone, Debug)]
pub struct SceneStyle {
    pub route_color: Rgba8,
    pub route_width_px: f64,
    pub marker: PreparedImage,
    /// Drawn marker size in pixels; independent of the image's own resolution.
    pub marker_size_px: (f64, f64),
    pub label: TextStyle,
    pub title: TextStyle,
    pub attribution: TextStyle,
}

impl Default for SceneStyle {
    fn default() -> Self {
        Self {
            route_color: Rgba8::opaque(128, 128, 128),
            route_width_px: 3.0,
            marker: PreparedImage::solid(20, 10, Rgba8::opaque(255, 0, 0)),
            marker_size_px: (10.0, 5.0),
            label: TextStyle {
                size_px: 16.0,
                color: Rgba8::opaque(0, 0, 0),
            },
            title: TextStyle {
                size_px: 19.0,
                color: Rgba8::opaque(0, 0, 0),
            },
            attribution: TextStyle {
                size_px: 10.0,
                color: Rgba8::new(0, 0, 0, 160),
            },
        }
    }
}

/// Static part of the animation: everything except the train position.
///
/// The route is projected into the viewport CRS once; labels keep their own coordinates and
/// are projected for every frame, the same way as the train.
#[derive(Clone, Debug)]
pub struct MapScene {
    viewport: Viewport,
    route_px: BezPath,
    labels: Vec<CityLabel>,
    title_template: Option<String>,
    total_frames: u64,
    style: SceneStyle,
}

impl MapScene {
    pub fn new(
        route: &Route,
        viewport: Viewport,
        labels: Vec<CityLabel>,
        style: SceneStyle,
        total_frames: u64,
    ) -> TrainmapResult<Self> {
        if total_frames == 0 {
            return Err(TrainmapError::invalid_argument(
                "scene needs at least one frame",
            ));
        }
        if !(style.route_width_px.is_finite() && style.route_width_px > 0.0) {
            return Err(TrainmapError::invalid_argument(
                "route width must be finite and > 0",
            ));
        }
        let (mw, mh) = style.marker_size_px;
        if !(mw.is_finite() && mh.is_finite() && mw > 0.0 && mh > 0.0) {
            return Err(TrainmapError::invalid_argument(
                "marker size must be finite and > 0",
            ));
        }
        if style.marker.width == 0 || style.marker.height == 0 {
            return Err(TrainmapError::invalid_argument("marker image is empty"));
        }

        let projected = route.to_crs(viewport.crs())?;
        let mut route_px = BezPath::new();
        for (i, p) in projected.points().iter().enumerate() {
            let px = viewport.to_pixel(p)?;
            if i == 0 {
                route_px.move_to(px);
            } else {
                route_px.line_to(px);
            }
        }

        Ok(Self {
            viewport,
            route_px,
            labels,
            title_template: None,
            total_frames,
            style,
        })
    }

    /// Title text; `{frame}` and `{total}` are substituted per frame.
    pub fn with_title(mut self, template: Option<String>) -> Self {
        self.title_template = template;
        self
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Route outline in pixel space.
    pub fn route_path(&self) -> &BezPath {
        &self.route_px
    }

    pub fn title_for(&self, frame: FrameIndex) -> Option<String> {
        self.title_template.as_ref().map(|t| {
            t.replace("{frame}", &frame.display_number().to_string())
                .replace("{total}", &self.total_frames.to_string())
        })
    }

    /// Pixel position of a point in any supported CRS.
    pub fn pixel_of(&self, point: &GeoPoint) -> TrainmapResult<Point> {
        let projected = project_point(point, self.viewport.crs())?;
        self.viewport.to_pixel(&projected)
    }

    /// Build the paint list for one frame: basemap, route, marker, labels, title.
    #[tracing::instrument(skip(self, sample, basemap), fields(fraction = sample.fraction))]
    pub fn plan_frame(
        &self,
        frame: FrameIndex,
        sample: &SampledPoint,
        basemap: &mut dyn BasemapProvider,
    ) -> TrainmapResult<FramePlan> {
        let canvas = self.viewport.canvas();
        let mut plan = FramePlan::new(frame, canvas);

        plan.push(DrawOp::Background {
            color: basemap.background(),
        })?;
        let affine = self.viewport.affine();
        for tile in basemap.tiles_for(&self.viewport)? {
            let top_left = affine * Point::new(tile.extent.min_x, tile.extent.max_y);
            let bottom_right = affine * Point::new(tile.extent.max_x, tile.extent.min_y);
            plan.push(DrawOp::Tile {
                id: tile.id,
                image: tile.image,
                dest: Rect::from_points(top_left, bottom_right),
            })?;
        }

        plan.push(DrawOp::RouteLine {
            path: self.route_px.clone(),
            color: self.style.route_color,
            width_px: self.style.route_width_px,
        })?;

        plan.push(DrawOp::Marker {
            image: self.style.marker.clone(),
            center: self.pixel_of(&sample.point)?,
            size: self.style.marker_size_px,
        })?;

        for label in &self.labels {
            let at = self.pixel_of(&label.position)?;
            plan.push(DrawOp::Text {
                layer: Layer::Labels,
                text: label.name.clone(),
                position: Point::new(at.x + label.offset_px.0, at.y + label.offset_px.1),
                anchor: label.anchor,
                size_px: self.style.label.size_px,
                color: self.style.label.color,
            })?;
        }
        if let Some(attribution) = basemap.attribution() {
            plan.push(DrawOp::Text {
                layer: Layer::Labels,
                text: attribution.to_string(),
                position: Point::new(f64::from(canvas.width) - 4.0, f64::from(canvas.height) - 4.0),
                anchor: TextAnchor {
                    h: HAlign::Right,
                    v: VAlign::Bottom,
                },
                size_px: self.style.attribution.size_px,
                color: self.style.attribution.color,
            })?;
        }

        if let Some(title) = self.title_for(frame) {
            plan.push(DrawOp::Text {
                layer: Layer::Title,
                text: title,
                position: Point::new(f64::from(canvas.width) / 2.0, 8.0),
                anchor: TextAnchor {
                    h: HAlign::Center,
                    v: VAlign::Top,
                },
                size_px: self.style.title.size_px,
                color: self.style.title.color,
            })?;
        }

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basemap::{BasemapTile, PlainBasemap, TileId};
    use crate::foundation::core::Canvas;
    use crate::render::viewport::Extent;

    fn scene(labels: Vec<CityLabel>) -> (MapScene, Route) {
        let route = Route::between(
            GeoPoint::lon_lat(113.2644, 23.1291),
            GeoPoint::lon_lat(114.0579, 22.5431),
        )
        .unwrap();
        let viewport = Viewport::fit(
            Extent::new(1.258e7, 2.53e6, 1.273e7, 2.69e6).unwrap(),
            Canvas {
                width: 200,
                height: 160,
            },
        )
        .unwrap();
        let s = MapScene::new(&route, viewport, labels, SceneStyle::default(), 100)
            .unwrap()
            .with_title(Some("Train\nFrame {frame}/{total}".to_string()));
        (s, route)
    }

    struct OneTile;

    impl BasemapProvider for OneTile {
        fn background(&self) -> Rgba8 {
            Rgba8::opaque(255, 255, 255)
        }

        fn tiles_for(&mut self, _viewport: &Viewport) -> TrainmapResult<Vec<BasemapTile>> {
            let id = TileId { z: 10, x: 834, y: 445 };
            Ok(vec![BasemapTile {
                id,
                extent: id.extent(),
                image: PreparedImage::solid(2, 2, Rgba8::opaque(0, 0, 255)),
            }])
        }

        fn attribution(&self) -> Option<&str> {
            Some("(c) test tiles")
        }
    }

    struct BrokenTiles;

    impl BasemapProvider for BrokenTiles {
        fn background(&self) -> Rgba8 {
            Rgba8::opaque(255, 255, 255)
        }

        fn tiles_for(&mut self, _viewport: &Viewport) -> TrainmapResult<Vec<BasemapTile>> {
            Err(TrainmapError::render("tile server unreachable"))
        }
    }

    #[test]
    fn plan_layers_are_basemap_route_marker_labels_title() {
        let labels = vec![CityLabel {
            name: "Guangzhou".to_string(),
            position: GeoPoint::lon_lat(113.2644, 23.1291),
            anchor: TextAnchor {
                h: HAlign::Right,
                v: VAlign::Bottom,
            },
            offset_px: (0.0, -4.0),
        }];
        let (scene, route) = scene(labels);
        let sample = route.sample(100).unwrap()[10];
        let plan = scene
            .plan_frame(FrameIndex(10), &sample, &mut OneTile)
            .unwrap();
        assert_eq!(
            plan.layers(),
            vec![
                Layer::Basemap,
                Layer::Route,
                Layer::Marker,
                Layer::Labels,
                Layer::Title
            ]
        );
        let title = plan
            .ops()
            .iter()
            .find_map(|op| match op {
                DrawOp::Text {
                    layer: Layer::Title,
                    text,
                    ..
                } => Some(text.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(title, "Train\nFrame 11/100");
        let texts = plan
            .ops()
            .iter()
            .filter(|op| matches!(op, DrawOp::Text { layer: Layer::Labels, .. }))
            .count();
        assert_eq!(texts, 2, "city label plus attribution");
    }

    #[test]
    fn marker_tracks_the_sample() {
        let (scene, route) = scene(Vec::new());
        let samples = route.sample(3).unwrap();
        let centers: Vec<Point> = samples
            .iter()
            .map(|s| {
                let plan = scene
                    .plan_frame(FrameIndex(s.index as u64), s, &mut PlainBasemap::default())
                    .unwrap();
                plan.ops()
                    .iter()
                    .find_map(|op| match op {
                        DrawOp::Marker { center, .. } => Some(*center),
                        _ => None,
                    })
                    .unwrap()
            })
            .collect();
        // Heading south-east: right and down on screen.
        assert!(centers[0].x < centers[1].x && centers[1].x < centers[2].x);
        assert!(centers[0].y < centers[1].y && centers[1].y < centers[2].y);
        let start = scene.pixel_of(&route.start()).unwrap();
        assert!((centers[0] - start).hypot() < 1e-9);
    }

    #[test]
    fn basemap_failure_is_fatal_for_the_frame() {
        let (scene, route) = scene(Vec::new());
        let sample = route.sample(1).unwrap()[0];
        let err = scene
            .plan_frame(FrameIndex(0), &sample, &mut BrokenTiles)
            .unwrap_err();
        assert!(matches!(err, TrainmapError::Render(_)));
    }

    #[test]
    fn unsupported_label_crs_fails_planning() {
        let labels = vec![CityLabel {
            name: "Somewhere".to_string(),
            position: GeoPoint::new(500_000.0, 2_500_000.0, crate::geo::Crs::Epsg(32650)),
            anchor: TextAnchor::default(),
            offset_px: (0.0, 0.0),
        }];
        let (scene, route) = scene(labels);
        let sample = route.sample(1).unwrap()[0];
        assert!(matches!(
            scene.plan_frame(FrameIndex(0), &sample, &mut PlainBasemap::default()),
            Err(TrainmapError::UnsupportedProjection(_))
        ));
    }

    #[test]
    fn zero_frames_is_invalid() {
        let route = Route::between(GeoPoint::lon_lat(0.0, 0.0), GeoPoint::lon_lat(1.0, 1.0))
            .unwrap();
        let viewport = Viewport::fit(
            Extent::new(0.0, 0.0, 200_000.0, 200_000.0).unwrap(),
            Canvas {
                width: 10,
                height: 10,
            },
        )
        .unwrap();
        assert!(matches!(
            MapScene::new(&route, viewport, Vec::new(), SceneStyle::default(), 0),
            Err(TrainmapError::InvalidArgument(_))
        ));
    }
}

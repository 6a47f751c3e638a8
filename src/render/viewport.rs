use crate::foundation::core::{Affine, Canvas, Point};
use crate::foundation::error::{TrainmapError, TrainmapResult};
use crate::geo::{Crs, GeoPoint};

/// Axis-aligned bounding box in projected (Web Mercator) metres.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> TrainmapResult<Self> {
        let e = Self {
            min_x,
            min_y,
            max_x,
            max_y,
        };
        e.validate()?;
        Ok(e)
    }

    pub fn validate(&self) -> TrainmapResult<()> {
        let all_finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(TrainmapError::invalid_argument(
                "extent bounds must be finite",
            ));
        }
        if self.max_x <= self.min_x || self.max_y <= self.min_y {
            return Err(TrainmapError::invalid_argument(
                "extent max must be greater than min on both axes",
            ));
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn intersects(&self, other: &Extent) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }

    /// Bounding box of `points` grown by `pad_frac` of the larger side on every edge.
    ///
    /// A degenerate box (single point) is padded by `min_span` metres instead.
    pub fn around(points: &[GeoPoint], pad_frac: f64, min_span: f64) -> TrainmapResult<Self> {
        let first = points
            .first()
            .ok_or_else(|| TrainmapError::invalid_argument("extent needs at least one point"))?;
        let mut e = Self {
            min_x: first.x(),
            min_y: first.y(),
            max_x: first.x(),
            max_y: first.y(),
        };
        for p in points {
            first.ensure_same_crs(p)?;
            e.min_x = e.min_x.min(p.x());
            e.min_y = e.min_y.min(p.y());
            e.max_x = e.max_x.max(p.x());
            e.max_y = e.max_y.max(p.y());
        }
        let pad = (e.width().max(e.height()) * pad_frac).max(min_span / 2.0);
        Self::new(e.min_x - pad, e.min_y - pad, e.max_x + pad, e.max_y + pad)
    }

    /// Grow the shorter axis so the extent has the same aspect ratio as `canvas`.
    pub fn fit_aspect(&self, canvas: Canvas) -> Self {
        let target = canvas.aspect();
        let (cx, cy) = self.center();
        let (mut w, mut h) = (self.width(), self.height());
        if w / h < target {
            w = h * target;
        } else {
            h = w / target;
        }
        Self {
            min_x: cx - w / 2.0,
            min_y: cy - h / 2.0,
            max_x: cx + w / 2.0,
            max_y: cy + h / 2.0,
        }
    }
}

/// Mapping from a projected extent onto canvas pixels (y grows downward).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    extent: Extent,
    canvas: Canvas,
    crs: Crs,
}

impl Viewport {
    /// Build a Web Mercator viewport, widening `extent` to the canvas aspect ratio so the map is
    /// never stretched.
    pub fn fit(extent: Extent, canvas: Canvas) -> TrainmapResult<Self> {
        extent.validate()?;
        canvas.validate()?;
        Ok(Self {
            extent: extent.fit_aspect(canvas),
            canvas,
            crs: Crs::WebMercator,
        })
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Ground metres covered by one pixel.
    pub fn meters_per_pixel(&self) -> f64 {
        self.extent.width() / f64::from(self.canvas.width)
    }

    /// Projected coordinates to pixel space.
    pub fn affine(&self) -> Affine {
        let sx = f64::from(self.canvas.width) / self.extent.width();
        let sy = f64::from(self.canvas.height) / self.extent.height();
        Affine::new([
            sx,
            0.0,
            0.0,
            -sy,
            -self.extent.min_x * sx,
            self.extent.max_y * sy,
        ])
    }

    pub fn to_pixel(&self, point: &GeoPoint) -> TrainmapResult<Point> {
        if point.crs() != self.crs {
            return Err(TrainmapError::invalid_argument(format!(
                "viewport is in {} but point is in {}; reproject first",
                self.crs,
                point.crs()
            )));
        }
        Ok(self.affine() * Point::new(point.x(), point.y()))
    }
}

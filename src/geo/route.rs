use crate::foundation::error::{TrainmapError, TrainmapResult};
use crate::geo::crs::Crs;
use crate::geo::point::GeoPoint;
use crate::geo::project::project_points;

/// An immutable polyline of two or more points sharing one CRS.
///
/// Lengths and distances are planar, measured in the route's own CRS units. For a WGS84 route
/// that means degrees, which is what evenly spaced animation samples are defined against.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    points: Vec<GeoPoint>,
    // cumulative[i] = distance from points[0] to points[i]
    cumulative: Vec<f64>,
}

/// A point taken from a [`Route`] at a normalized distance fraction.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct SampledPoint {
    /// Position in the sample sequence (also the frame index it drives).
    pub index: usize,
    /// Fraction of total route length, in `[0, 1]`.
    pub fraction: f64,
    pub point: GeoPoint,
}

impl Route {
    pub fn new(points: Vec<GeoPoint>) -> TrainmapResult<Self> {
        if points.len() < 2 {
            return Err(TrainmapError::invalid_argument(format!(
                "a route needs at least two points, got {}",
                points.len()
            )));
        }
        let first = points[0];
        let mut cumulative = Vec::with_capacity(points.len());
        cumulative.push(0.0);
        for (i, p) in points.iter().enumerate() {
            if !p.is_finite() {
                return Err(TrainmapError::invalid_argument(format!(
                    "route point {i} has non-finite coordinates"
                )));
            }
            first.ensure_same_crs(p)?;
            if i > 0 {
                let step = points[i - 1].planar_distance(p)?;
                cumulative.push(cumulative[i - 1] + step);
            }
        }
        Ok(Self { points, cumulative })
    }

    /// Straight two-point route.
    pub fn between(start: GeoPoint, end: GeoPoint) -> TrainmapResult<Self> {
        Self::new(vec![start, end])
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn crs(&self) -> Crs {
        self.points[0].crs()
    }

    pub fn start(&self) -> GeoPoint {
        self.points[0]
    }

    pub fn end(&self) -> GeoPoint {
        self.points[self.points.len() - 1]
    }

    /// Total planar length in CRS units.
    pub fn length(&self) -> f64 {
        self.cumulative[self.cumulative.len() - 1]
    }

    /// Great-circle length in metres; only defined for geographic routes.
    pub fn haversine_length_m(&self) -> TrainmapResult<f64> {
        self.points
            .windows(2)
            .map(|w| w[0].haversine_m(&w[1]))
            .sum()
    }

    /// Point at `distance` along the route, clamped to `[0, length]`.
    pub fn interpolate(&self, distance: f64) -> TrainmapResult<GeoPoint> {
        if distance.is_nan() {
            return Err(TrainmapError::invalid_argument(
                "interpolation distance must not be NaN",
            ));
        }
        let total = self.length();
        if total <= 0.0 || distance <= 0.0 {
            return Ok(self.start());
        }
        if distance >= total {
            return Ok(self.end());
        }

        // First vertex at or beyond `distance`; the vertex before it is strictly short of it,
        // so the segment has non-zero length.
        let seg_end = self.cumulative.partition_point(|&c| c < distance);
        let seg_start = seg_end - 1;
        let seg_len = self.cumulative[seg_end] - self.cumulative[seg_start];
        let t = (distance - self.cumulative[seg_start]) / seg_len;
        self.points[seg_start].lerp(&self.points[seg_end], t)
    }

    /// Point at `fraction` of the total length, clamped to `[0, 1]`.
    pub fn point_at_fraction(&self, fraction: f64) -> TrainmapResult<GeoPoint> {
        if fraction.is_nan() {
            return Err(TrainmapError::invalid_argument("fraction must not be NaN"));
        }
        self.interpolate(fraction.clamp(0.0, 1.0) * self.length())
    }

    /// `count` points evenly spaced by arc length, inclusive of both ends when `count >= 2`.
    ///
    /// `count == 1` yields only the start point.
    pub fn sample(&self, count: usize) -> TrainmapResult<Vec<SampledPoint>> {
        if count == 0 {
            return Err(TrainmapError::invalid_argument(
                "sample count must be a positive integer",
            ));
        }
        if count == 1 {
            return Ok(vec![SampledPoint {
                index: 0,
                fraction: 0.0,
                point: self.start(),
            }]);
        }

        let last = (count - 1) as f64;
        (0..count)
            .map(|index| {
                let fraction = index as f64 / last;
                // Pin the last sample so it is bit-exact with the end point.
                let point = if index == count - 1 {
                    self.end()
                } else {
                    self.point_at_fraction(fraction)?
                };
                Ok(SampledPoint {
                    index,
                    fraction,
                    point,
                })
            })
            .collect()
    }

    /// Reproject every vertex into `target`.
    pub fn to_crs(&self, target: Crs) -> TrainmapResult<Route> {
        Route::new(project_points(&self.points, target)?)
    }
}

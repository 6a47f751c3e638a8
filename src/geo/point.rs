use crate::foundation::error::{TrainmapError, TrainmapResult};
use crate::geo::crs::Crs;

/// Mean Earth radius used for great-circle distances, in metres.
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_008.8;

/// An immutable coordinate pair tagged with the CRS it is expressed in.
///
/// For geographic points `x` is longitude and `y` is latitude, both in degrees.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeoPoint {
    x: f64,
    y: f64,
    crs: Crs,
}

impl GeoPoint {
    pub fn new(x: f64, y: f64, crs: Crs) -> Self {
        Self { x, y, crs }
    }

    /// WGS84 point from longitude/latitude degrees.
    pub fn lon_lat(lon: f64, lat: f64) -> Self {
        Self::new(lon, lat, Crs::Wgs84)
    }

    /// Web Mercator point in metres.
    pub fn mercator(x: f64, y: f64) -> Self {
        Self::new(x, y, Crs::WebMercator)
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Fail with `InvalidArgument` unless `other` shares this point's CRS.
    pub fn ensure_same_crs(&self, other: &GeoPoint) -> TrainmapResult<()> {
        if self.crs != other.crs {
            return Err(TrainmapError::invalid_argument(format!(
                "cannot mix points in {} and {} without reprojection",
                self.crs, other.crs
            )));
        }
        Ok(())
    }

    /// Planar distance in CRS units.
    pub fn planar_distance(&self, other: &GeoPoint) -> TrainmapResult<f64> {
        self.ensure_same_crs(other)?;
        Ok((other.x - self.x).hypot(other.y - self.y))
    }

    /// Linear interpolation in CRS space; `t` is not clamped.
    pub fn lerp(&self, other: &GeoPoint, t: f64) -> TrainmapResult<GeoPoint> {
        self.ensure_same_crs(other)?;
        Ok(GeoPoint::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.crs,
        ))
    }

    /// Great-circle distance in metres between two WGS84 points.
    pub fn haversine_m(&self, other: &GeoPoint) -> TrainmapResult<f64> {
        self.ensure_same_crs(other)?;
        if !self.crs.is_geographic() {
            return Err(TrainmapError::invalid_argument(format!(
                "haversine distance needs geographic points, got {}",
                self.crs
            )));
        }
        let (lat1, lat2) = (self.y.to_radians(), other.y.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.x - self.x).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        Ok(2.0 * EARTH_MEAN_RADIUS_M * a.sqrt().asin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixing_crs_is_rejected() {
        let a = GeoPoint::lon_lat(0.0, 0.0);
        let b = GeoPoint::mercator(0.0, 0.0);
        assert!(matches!(
            a.planar_distance(&b),
            Err(TrainmapError::InvalidArgument(_))
        ));
        assert!(a.lerp(&b, 0.5).is_err());
    }

    #[test]
    fn lerp_hits_endpoints_and_midpoint() {
        let a = GeoPoint::mercator(0.0, 10.0);
        let b = GeoPoint::mercator(100.0, -10.0);
        assert_eq!(a.lerp(&b, 0.0).unwrap(), a);
        assert_eq!(a.lerp(&b, 1.0).unwrap(), b);
        assert_eq!(a.lerp(&b, 0.5).unwrap(), GeoPoint::mercator(50.0, 0.0));
    }

    #[test]
    fn haversine_guangzhou_shenzhen_is_about_105_km() {
        let gz = GeoPoint::lon_lat(113.2644, 23.1291);
        let sz = GeoPoint::lon_lat(114.0579, 22.5431);
        let d = gz.haversine_m(&sz).unwrap();
        assert!((95_000.0..115_000.0).contains(&d), "got {d}");
        assert!(GeoPoint::mercator(0.0, 0.0)
            .haversine_m(&GeoPoint::mercator(1.0, 1.0))
            .is_err());
    }
}

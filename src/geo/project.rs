use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use crate::foundation::error::{TrainmapError, TrainmapResult};
use crate::geo::crs::Crs;
use crate::geo::point::GeoPoint;

/// Sphere radius of the Web Mercator projection, in metres.
pub const WEB_MERCATOR_RADIUS_M: f64 = 6_378_137.0;

/// Latitude at which Web Mercator becomes square (tile pyramid bounds), in degrees.
pub const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Half the width of the Web Mercator world, in metres.
pub const WEB_MERCATOR_HALF_WORLD_M: f64 = std::f64::consts::PI * WEB_MERCATOR_RADIUS_M;

/// Reproject one point into `target`.
///
/// Projecting into the point's own CRS returns it unchanged.
pub fn project_point(point: &GeoPoint, target: Crs) -> TrainmapResult<GeoPoint> {
    let source = point.crs();
    if source == target {
        return Ok(*point);
    }
    source.ensure_supported()?;
    target.ensure_supported()?;
    if !point.is_finite() {
        return Err(TrainmapError::invalid_argument(format!(
            "cannot project non-finite coordinates ({}, {})",
            point.x(),
            point.y()
        )));
    }

    match (source, target) {
        (Crs::Wgs84, Crs::WebMercator) => {
            let (x, y) = lon_lat_to_mercator(point.x(), point.y())?;
            Ok(GeoPoint::mercator(x, y))
        }
        (Crs::WebMercator, Crs::Wgs84) => {
            let (lon, lat) = mercator_to_lon_lat(point.x(), point.y());
            Ok(GeoPoint::lon_lat(lon, lat))
        }
        (source, target) => Err(TrainmapError::unsupported_projection(format!(
            "no transform from {source} to {target}"
        ))),
    }
}

/// Reproject a homogeneous sequence, preserving count and order.
///
/// The whole call fails if the input mixes CRSs or any single point fails.
pub fn project_points(points: &[GeoPoint], target: Crs) -> TrainmapResult<Vec<GeoPoint>> {
    if let Some(first) = points.first() {
        for p in &points[1..] {
            first.ensure_same_crs(p)?;
        }
    }
    points.iter().map(|p| project_point(p, target)).collect()
}

fn lon_lat_to_mercator(lon: f64, lat: f64) -> TrainmapResult<(f64, f64)> {
    if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return Err(TrainmapError::invalid_argument(format!(
            "longitude/latitude out of range: ({lon}, {lat})"
        )));
    }
    let lat = lat.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
    let x = WEB_MERCATOR_RADIUS_M * lon.to_radians();
    let y = WEB_MERCATOR_RADIUS_M * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    Ok((x, y))
}

fn mercator_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / WEB_MERCATOR_RADIUS_M).to_degrees();
    let lat = (2.0 * (y / WEB_MERCATOR_RADIUS_M).exp().atan() - FRAC_PI_2).to_degrees();
    (lon, lat)
}

use std::fmt;
use std::str::FromStr;

use crate::foundation::error::{TrainmapError, TrainmapResult};

/// Coordinate reference system tag carried by every [`GeoPoint`](crate::GeoPoint).
///
/// Only WGS84 and Web Mercator have transforms; any other EPSG code can be named (so it can be
/// parsed from configuration and reported back) but projecting to or from it fails with
/// [`TrainmapError::UnsupportedProjection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Crs {
    /// `EPSG:4326`, longitude/latitude in degrees.
    Wgs84,
    /// `EPSG:3857`, spherical Web Mercator in metres.
    WebMercator,
    /// Any other EPSG code.
    Epsg(u32),
}

impl Crs {
    pub const WGS84_CODE: u32 = 4326;
    pub const WEB_MERCATOR_CODE: u32 = 3857;

    /// Map an EPSG code onto a known system where possible.
    ///
    /// `900913` and `3785` are legacy aliases of Web Mercator.
    pub fn from_epsg(code: u32) -> Self {
        match code {
            Self::WGS84_CODE => Self::Wgs84,
            Self::WEB_MERCATOR_CODE | 900913 | 3785 => Self::WebMercator,
            other => Self::Epsg(other),
        }
    }

    pub fn epsg(self) -> u32 {
        match self {
            Self::Wgs84 => Self::WGS84_CODE,
            Self::WebMercator => Self::WEB_MERCATOR_CODE,
            Self::Epsg(code) => code,
        }
    }

    pub fn is_geographic(self) -> bool {
        matches!(self, Self::Wgs84)
    }

    /// Fail unless a transform exists for this system.
    pub fn ensure_supported(self) -> TrainmapResult<()> {
        match self {
            Self::Wgs84 | Self::WebMercator => Ok(()),
            Self::Epsg(code) => Err(TrainmapError::unsupported_projection(format!(
                "no transform registered for EPSG:{code}"
            ))),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = TrainmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = match trimmed.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("epsg") => code,
            Some(_) => {
                return Err(TrainmapError::unsupported_projection(format!(
                    "unknown CRS authority in '{trimmed}'"
                )));
            }
            None => trimmed,
        };
        let code = digits.trim().parse::<u32>().map_err(|_| {
            TrainmapError::unsupported_projection(format!("unrecognized CRS '{trimmed}'"))
        })?;
        Ok(Self::from_epsg(code))
    }
}

impl serde::Serialize for Crs {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Crs {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

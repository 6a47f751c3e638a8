//! Geographic primitives: CRS tags, points, routes and reprojection.

pub mod crs;
pub mod point;
pub mod project;
pub mod route;

pub use crs::Crs;
pub use point::GeoPoint;
pub use project::{project_point, project_points};
pub use route::{Route, SampledPoint};

// src/geo/mod.rs
//! Geodesy helpers on a spherical Earth

pub mod geodesy;
pub mod point;
pub mod region;

pub use geodesy::{
    bearing, calculate_bearing_to_destination, circles_intersect, distance_km, distance_km_opt,
    format_distance, normalize_degrees, point_at_distance, rad_to_bearing, EARTH_RADIUS_KM,
    UNKNOWN_DISTANCE,
};
pub use point::GeoPoint;
pub use region::{midpoint, AccuracyCircle, BoundingBox, MidPoint, ViewRegion};

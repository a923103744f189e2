// src/geo/region.rs
//! Areas on the map: bounding boxes, midpoints, visible regions and accuracy circles

use super::geodesy::{distance_km, point_at_distance};
use super::point::GeoPoint;
use crate::fix::Fix;
use serde::Serialize;

/// Axis-aligned latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub min_longitude: f64,
    pub max_latitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Smallest box containing every point, or `None` for an empty iterator.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a GeoPoint>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Self {
            min_latitude: first.latitude(),
            min_longitude: first.longitude(),
            max_latitude: first.latitude(),
            max_longitude: first.longitude(),
        };
        for point in iter {
            bounds.min_latitude = bounds.min_latitude.min(point.latitude());
            bounds.min_longitude = bounds.min_longitude.min(point.longitude());
            bounds.max_latitude = bounds.max_latitude.max(point.latitude());
            bounds.max_longitude = bounds.max_longitude.max(point.longitude());
        }
        Some(bounds)
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::wrapped(
            (self.max_latitude + self.min_latitude) / 2.0,
            (self.max_longitude + self.min_longitude) / 2.0,
        )
    }

    pub fn latitude_span(&self) -> f64 {
        self.max_latitude - self.min_latitude
    }

    pub fn longitude_span(&self) -> f64 {
        self.max_longitude - self.min_longitude
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&point.latitude())
            && (self.min_longitude..=self.max_longitude).contains(&point.longitude())
    }
}

/// Centre between two points together with the span needed to show both.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MidPoint {
    pub midpoint: GeoPoint,
    pub bounds: BoundingBox,
}

impl MidPoint {
    /// Latitude and longitude spans a map has to zoom to so both points fit.
    pub fn zoom_span(&self) -> (f64, f64) {
        (self.bounds.latitude_span(), self.bounds.longitude_span())
    }
}

/// Midpoint of the box spanned by `p1` and `p2`.
pub fn midpoint(p1: &GeoPoint, p2: &GeoPoint) -> MidPoint {
    let bounds = BoundingBox {
        min_latitude: p1.latitude().min(p2.latitude()),
        min_longitude: p1.longitude().min(p2.longitude()),
        max_latitude: p1.latitude().max(p2.latitude()),
        max_longitude: p1.longitude().max(p2.longitude()),
    };
    MidPoint {
        midpoint: bounds.center(),
        bounds,
    }
}

/// The part of the map currently on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRegion {
    pub center: GeoPoint,
    pub latitude_span: f64,
    pub longitude_span: f64,
}

impl ViewRegion {
    pub fn new(center: GeoPoint, latitude_span: f64, longitude_span: f64) -> Self {
        Self {
            center,
            latitude_span,
            longitude_span,
        }
    }

    /// Whether a map following the user should pan to `user`.
    ///
    /// Pans only when the user has just left the visible area: farther from
    /// the centre than one of the half-spans but no farther than the larger
    /// one. A user that is far away was panned away from on purpose.
    pub fn should_recenter(&self, user: &GeoPoint) -> bool {
        let distance = distance_km(&self.center, user);
        let lat_edge = GeoPoint::wrapped(
            self.center.latitude() + self.latitude_span / 2.0,
            self.center.longitude(),
        );
        let lon_edge = GeoPoint::wrapped(
            self.center.latitude(),
            self.center.longitude() + self.longitude_span / 2.0,
        );
        let distance_lat = distance_km(&self.center, &lat_edge);
        let distance_lon = distance_km(&self.center, &lon_edge);
        let greater = distance_lat.max(distance_lon);

        distance <= greater && (distance > distance_lat || distance > distance_lon)
    }
}

/// Accuracy circle of a fix, described by its centre and a point on its
/// rim at the same latitude. Renderers project both and use the pixel
/// distance as the radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccuracyCircle {
    pub center: GeoPoint,
    pub edge: GeoPoint,
    pub radius_m: f64,
}

impl AccuracyCircle {
    pub fn new(center: GeoPoint, radius_m: f64) -> Self {
        Self {
            center,
            edge: point_at_distance(&center, radius_m),
            radius_m,
        }
    }

    pub fn from_fix(fix: &Fix) -> Self {
        Self::new(fix.point, fix.accuracy_m)
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        distance_km(&self.center, point) * 1000.0 <= self.radius_m
    }
}

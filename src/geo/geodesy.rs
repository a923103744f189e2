// src/geo/geodesy.rs
//! Spherical-earth bearing and distance calculations

use super::point::GeoPoint;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Returned by [`distance_km_opt`] when either point is missing.
/// Callers must treat any negative distance as "unknown".
pub const UNKNOWN_DISTANCE: f64 = -1.0;

const KM_PER_MILE: f64 = 1.609344;
const FEET_PER_MILE: f64 = 5280.0;

/// Initial bearing of the great-circle path from `from` to `to`,
/// in degrees clockwise from true north, within [0, 360).
///
/// Identical points yield 0 rather than an error.
pub fn bearing(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let lat1 = from.latitude().to_radians();
    let lat2 = to.latitude().to_radians();
    let delta_lon = (to.longitude() - from.longitude()).to_radians();
    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();
    rad_to_bearing(y.atan2(x))
}

/// Converts an angle in radians into a compass bearing in [0, 360).
pub fn rad_to_bearing(rad: f64) -> f64 {
    normalize_degrees(rad.to_degrees())
}

/// Wraps any angle in degrees into [0, 360).
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Great-circle distance in kilometers using the spherical law of cosines.
pub fn distance_km(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    // acos near 1 turns rounding noise into meters
    if p1 == p2 {
        return 0.0;
    }
    let lat1 = p1.latitude().to_radians();
    let lat2 = p2.latitude().to_radians();
    let delta_lon = (p2.longitude() - p1.longitude()).to_radians();
    let cos_angle = lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * delta_lon.cos();
    cos_angle.clamp(-1.0, 1.0).acos() * EARTH_RADIUS_KM
}

/// Like [`distance_km`], but accepts missing points and returns
/// [`UNKNOWN_DISTANCE`] when either one is absent.
pub fn distance_km_opt(p1: Option<&GeoPoint>, p2: Option<&GeoPoint>) -> f64 {
    match (p1, p2) {
        (Some(p1), Some(p2)) => distance_km(p1, p2),
        _ => UNKNOWN_DISTANCE,
    }
}

/// Returns a point `meters` east of `origin` on the same latitude.
///
/// Solves the law-of-cosines distance for the longitude delta with both
/// latitudes fixed:
///
/// `cos(Δλ) = (cos(d/R) - sin²φ) / cos²φ = 1 - 2·sin²(d/2R) / cos²φ`
///
/// Only meaningful for distances that are small relative to the Earth's
/// radius. At the poles there is no east, so the origin is returned.
pub fn point_at_distance(origin: &GeoPoint, meters: f64) -> GeoPoint {
    let lat = origin.latitude().to_radians();
    let cos_lat = lat.cos();
    if cos_lat.abs() < 1e-12 {
        return *origin;
    }

    let half_angle = meters.abs() / 1000.0 / EARTH_RADIUS_KM / 2.0;
    let cos_delta = 1.0 - 2.0 * half_angle.sin().powi(2) / (cos_lat * cos_lat);
    let delta_lon = cos_delta.clamp(-1.0, 1.0).acos();

    GeoPoint::wrapped(origin.latitude(), origin.longitude() + delta_lon.to_degrees())
}

/// True when two circles on the Earth's surface overlap by more than
/// `fudge_km`. All radii are in kilometers.
pub fn circles_intersect(
    center_a: &GeoPoint,
    radius_a_km: f64,
    center_b: &GeoPoint,
    radius_b_km: f64,
    fudge_km: f64,
) -> bool {
    radius_a_km + radius_b_km - fudge_km > distance_km(center_a, center_b)
}

/// Bearing a compass needle should show so that it points at `dest`
/// instead of north.
///
/// Without a user position or a destination the device bearing is returned
/// unchanged, so the needle keeps pointing north.
pub fn calculate_bearing_to_destination(
    user: Option<&GeoPoint>,
    dest: Option<&GeoPoint>,
    device_bearing: f64,
) -> f64 {
    match (user, dest) {
        (Some(user), Some(dest)) => {
            let heading = bearing(user, dest);
            normalize_degrees(360.0 - heading + device_bearing)
        }
        _ => device_bearing,
    }
}

/// Formats a distance given in kilometers for display.
///
/// Metric output switches to meters below one kilometer; imperial output
/// switches to feet below one mile.
pub fn format_distance(km: f64, metric: bool) -> String {
    if metric {
        if km < 1.0 {
            return format!("{} m", format_places(km * 1000.0, 2));
        }
        return format!("{} Km", format_places(km, 3));
    }

    let miles = km / KM_PER_MILE;
    if miles < 1.0 {
        return format!("{} ft", format_places(miles * FEET_PER_MILE, 2));
    }
    format!("{} mi", format_places(miles, 2))
}

/// Rounds to at most `places` decimals and drops trailing zeros.
fn format_places(value: f64, places: usize) -> String {
    let formatted = format!("{:.*}", places, value);
    if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        formatted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = point(0.0, 0.0);
        assert!((bearing(&origin, &point(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((bearing(&origin, &point(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((bearing(&origin, &point(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((bearing(&origin, &point(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_bearing_range_and_identical_points() {
        let points = [
            point(42.438878, -71.119277),
            point(-33.8688, 151.2093),
            point(89.9, 0.0),
            point(-89.9, 179.9),
            point(0.0, -180.0),
        ];
        for a in &points {
            for b in &points {
                let value = bearing(a, b);
                assert!(value.is_finite());
                assert!((0.0..360.0).contains(&value), "bearing {} out of range", value);
            }
            assert_eq!(bearing(a, a), 0.0);
        }
    }

    #[test]
    fn test_distance_known_value() {
        // Boston to New York is roughly 306 km
        let boston = point(42.3601, -71.0589);
        let new_york = point(40.7128, -74.0060);
        let km = distance_km(&boston, &new_york);
        assert!((km - 306.0).abs() < 3.0, "got {}", km);
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        for p in [point(42.438878, -71.119277), point(0.0, 0.0), point(-45.123456, 170.0)] {
            assert_eq!(distance_km(&p, &p), 0.0);
        }
    }

    #[test]
    fn test_distance_sentinel() {
        let p = point(10.0, 10.0);
        assert_eq!(distance_km_opt(None, Some(&p)), UNKNOWN_DISTANCE);
        assert_eq!(distance_km_opt(Some(&p), None), UNKNOWN_DISTANCE);
        assert_eq!(distance_km_opt(None, None), -1.0);
        assert_eq!(distance_km_opt(Some(&p), Some(&p)), 0.0);
    }

    #[test]
    fn test_point_at_distance_round_trip() {
        for lat in [0.0, 42.438878, -33.8688, 70.0] {
            let origin = point(lat, -71.119277);
            for meters in [50.0, 500.0, 5000.0] {
                let edge = point_at_distance(&origin, meters);
                assert_eq!(edge.latitude(), origin.latitude());
                let km = distance_km(&origin, &edge);
                let expected = meters / 1000.0;
                assert!(
                    ((km - expected) / expected).abs() < 0.01,
                    "lat {} meters {}: got {} km",
                    lat,
                    meters,
                    km
                );
            }
        }
    }

    #[test]
    fn test_point_at_distance_at_pole() {
        let pole = point(90.0, 0.0);
        assert_eq!(point_at_distance(&pole, 100.0), pole);
    }

    #[test]
    fn test_circles_intersect() {
        let a = point(42.0, -71.0);
        let b = point(42.0, -71.01); // about 0.83 km apart
        assert!(circles_intersect(&a, 0.5, &b, 0.5, 0.0));
        assert!(!circles_intersect(&a, 0.5, &b, 0.5, 0.2));
        assert!(!circles_intersect(&a, 0.1, &b, 0.1, 0.0));
    }

    #[test]
    fn test_bearing_to_destination_without_points() {
        let user = point(42.0, -71.0);
        assert_eq!(calculate_bearing_to_destination(None, Some(&user), 123.0), 123.0);
        assert_eq!(calculate_bearing_to_destination(Some(&user), None, 45.5), 45.5);
    }

    #[test]
    fn test_bearing_to_destination_wraps() {
        let user = point(0.0, 0.0);
        let east = point(0.0, 1.0);
        // heading 90, device bearing 0 -> 270
        assert!((calculate_bearing_to_destination(Some(&user), Some(&east), 0.0) - 270.0).abs() < 1e-9);
        // heading 90, device bearing 100 -> 370 wraps to 10
        assert!((calculate_bearing_to_destination(Some(&user), Some(&east), 100.0) - 10.0).abs() < 1e-9);
        let north = point(1.0, 0.0);
        // heading 0, device bearing 0 -> 360 wraps to 0
        assert_eq!(calculate_bearing_to_destination(Some(&user), Some(&north), 0.0), 0.0);
    }

    #[test]
    fn test_format_distance_metric() {
        assert_eq!(format_distance(0.5, true), "500 m");
        assert_eq!(format_distance(0.12345, true), "123.45 m");
        assert_eq!(format_distance(2.0, true), "2 Km");
        assert_eq!(format_distance(12.3456, true), "12.346 Km");
    }

    #[test]
    fn test_format_distance_imperial() {
        assert_eq!(format_distance(KM_PER_MILE * 2.5, false), "2.5 mi");
        assert_eq!(format_distance(KM_PER_MILE / 2.0, false), "2640 ft");
    }
}

// src/compass.rs
//! Compass built from accelerometer and magnetometer readings
//!
//! Readings are combined into a tilt-compensated azimuth, corrected for
//! magnetic declination and screen orientation, then smoothed on the unit
//! circle so the needle does not swing the long way round at north.

use crate::geo::{calculate_bearing_to_destination, normalize_degrees, rad_to_bearing, GeoPoint};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Standard gravity in m/s².
const GRAVITY_EARTH: f64 = 9.80665;
/// Below 10% of g the device is treated as falling and heading is undefined.
const FREE_FALL_GRAVITY_SQUARED: f64 = 0.01 * GRAVITY_EARTH * GRAVITY_EARTH;
/// Minimum |E x A| for a usable east vector (µT·m/s²).
const MIN_EAST_NORM: f64 = 0.1;
/// Roll, in degrees, beyond which a landscape device counts as turned the normal way.
const LANDSCAPE_ROLL_THRESHOLD: f64 = 25.0;

pub const DEFAULT_SMOOTHING: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorKind {
    Accelerometer,
    MagneticField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorAccuracy {
    Unreliable,
    Low,
    Medium,
    High,
}

/// One raw sample in device coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub kind: SensorKind,
    pub values: [f32; 3],
    pub accuracy: SensorAccuracy,
}

impl SensorReading {
    pub fn accelerometer(values: [f32; 3], accuracy: SensorAccuracy) -> Self {
        Self { kind: SensorKind::Accelerometer, values, accuracy }
    }

    pub fn magnetic_field(values: [f32; 3], accuracy: SensorAccuracy) -> Self {
        Self { kind: SensorKind::MagneticField, values, accuracy }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScreenOrientation {
    #[default]
    Portrait,
    Landscape,
}

/// Azimuth, pitch and roll in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub azimuth: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// Heading from a gravity and a geomagnetic vector, both in device
/// coordinates. `None` while falling or when the field is too weak or
/// parallel to gravity.
pub fn orientation_from_vectors(gravity: [f64; 3], geomagnetic: [f64; 3]) -> Option<Orientation> {
    let [mut ax, mut ay, mut az] = gravity;
    let norm_sq_a = ax * ax + ay * ay + az * az;
    if norm_sq_a < FREE_FALL_GRAVITY_SQUARED {
        return None;
    }

    let [ex, ey, ez] = geomagnetic;
    let mut hx = ey * az - ez * ay;
    let mut hy = ez * ax - ex * az;
    let mut hz = ex * ay - ey * ax;
    let norm_h = (hx * hx + hy * hy + hz * hz).sqrt();
    if norm_h < MIN_EAST_NORM {
        return None;
    }

    let inv_h = 1.0 / norm_h;
    hx *= inv_h;
    hy *= inv_h;
    hz *= inv_h;
    let inv_a = 1.0 / norm_sq_a.sqrt();
    ax *= inv_a;
    ay *= inv_a;
    az *= inv_a;
    let my = az * hx - ax * hz;

    Some(Orientation {
        azimuth: hy.atan2(my).to_degrees(),
        pitch: (-ay).clamp(-1.0, 1.0).asin().to_degrees(),
        roll: (-ax).atan2(az).to_degrees(),
    })
}

/// Exponential smoothing of bearings on the unit circle.
#[derive(Debug, Clone)]
pub struct BearingSmoother {
    alpha: f64,
    state: Option<(f64, f64)>,
}

impl BearingSmoother {
    /// `alpha` is the weight of each new sample, clamped to [0.01, 1].
    /// 1 disables smoothing.
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_finite() { alpha.clamp(0.01, 1.0) } else { 1.0 };
        Self { alpha, state: None }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn update(&mut self, bearing: f64) -> f64 {
        let rad = bearing.to_radians();
        let (sin, cos) = match self.state {
            None => (rad.sin(), rad.cos()),
            Some((sin, cos)) => (
                sin + self.alpha * (rad.sin() - sin),
                cos + self.alpha * (rad.cos() - cos),
            ),
        };
        self.state = Some((sin, cos));
        rad_to_bearing(sin.atan2(cos))
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

impl Default for BearingSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING)
    }
}

/// Receives smoothed bearings in degrees clockwise from north.
pub trait CompassListener: Send {
    fn on_compass_update(&mut self, bearing: f64);
}

impl<F> CompassListener for F
where
    F: FnMut(f64) + Send,
{
    fn on_compass_update(&mut self, bearing: f64) {
        self(bearing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassConfig {
    pub smoothing: f64,
    pub declination_deg: f64,
}

impl Default for CompassConfig {
    fn default() -> Self {
        Self {
            smoothing: DEFAULT_SMOOTHING,
            declination_deg: 0.0,
        }
    }
}

/// Compass sensor wrapper. Each instance owns its listener.
pub struct Compass {
    gravity: Option<[f64; 3]>,
    geomagnetic: Option<[f64; 3]>,
    declination: f64,
    screen: ScreenOrientation,
    smoother: BearingSmoother,
    listener: Option<Box<dyn CompassListener>>,
    bearing: Option<f64>,
    orientation: Option<Orientation>,
    location: Option<GeoPoint>,
    destination: Option<GeoPoint>,
}

impl Compass {
    pub fn new(config: &CompassConfig) -> Self {
        Self {
            gravity: None,
            geomagnetic: None,
            declination: config.declination_deg,
            screen: ScreenOrientation::Portrait,
            smoother: BearingSmoother::new(config.smoothing),
            listener: None,
            bearing: None,
            orientation: None,
            location: None,
            destination: None,
        }
    }

    /// Starts delivering bearings to `listener`. The first listener wins;
    /// returns false if one is already set.
    pub fn enable<L>(&mut self, listener: L) -> bool
    where
        L: CompassListener + 'static,
    {
        if self.listener.is_some() {
            return false;
        }
        self.listener = Some(Box::new(listener));
        true
    }

    /// Drops the listener and forgets sensor state.
    pub fn disable(&mut self) {
        self.listener = None;
        self.gravity = None;
        self.geomagnetic = None;
        self.smoother.reset();
    }

    pub fn is_enabled(&self) -> bool {
        self.listener.is_some()
    }

    /// Declination in degrees east, added to the magnetic azimuth.
    pub fn set_declination(&mut self, declination_deg: f64) {
        self.declination = declination_deg;
    }

    pub fn set_screen_orientation(&mut self, screen: ScreenOrientation) {
        self.screen = screen;
    }

    pub fn set_location(&mut self, location: Option<GeoPoint>) {
        self.location = location;
    }

    /// Point the needle at `destination` instead of north.
    pub fn set_destination(&mut self, destination: Option<GeoPoint>) {
        self.destination = destination;
    }

    pub fn destination(&self) -> Option<GeoPoint> {
        self.destination
    }

    /// Last smoothed device bearing.
    pub fn bearing(&self) -> Option<f64> {
        self.bearing
    }

    pub fn orientation(&self) -> Option<Orientation> {
        self.orientation
    }

    /// Rotation for a needle that points at the destination, or north when
    /// there is no destination or no location yet.
    pub fn needle_bearing(&self) -> f64 {
        calculate_bearing_to_destination(
            self.location.as_ref(),
            self.destination.as_ref(),
            self.bearing.unwrap_or(0.0),
        )
    }

    /// Feeds one raw reading. Returns the new bearing when one could be
    /// computed. Ignored while disabled or when the reading is unreliable.
    pub fn on_sensor_changed(&mut self, reading: &SensorReading) -> Option<f64> {
        if self.listener.is_none() {
            return None;
        }
        if reading.accuracy == SensorAccuracy::Unreliable {
            trace!(kind = ?reading.kind, "dropping unreliable reading");
            return None;
        }

        let values = reading.values.map(f64::from);
        match reading.kind {
            SensorKind::Accelerometer => self.gravity = Some(values),
            SensorKind::MagneticField => self.geomagnetic = Some(values),
        }

        let orientation = orientation_from_vectors(self.gravity?, self.geomagnetic?)?;
        self.orientation = Some(orientation);

        let mut azimuth = orientation.azimuth + self.declination;
        if self.screen == ScreenOrientation::Landscape {
            if orientation.roll >= LANDSCAPE_ROLL_THRESHOLD {
                azimuth -= 90.0;
            } else {
                azimuth += 90.0;
            }
        }

        let bearing = self.smoother.update(normalize_degrees(azimuth));
        self.bearing = Some(bearing);
        if let Some(listener) = self.listener.as_mut() {
            listener.on_compass_update(bearing);
        }
        Some(bearing)
    }
}

impl Default for Compass {
    fn default() -> Self {
        Self::new(&CompassConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const FLAT: [f32; 3] = [0.0, 0.0, 9.81];
    const NORTH_UP: [f32; 3] = [0.0, 22.0, -40.0];
    const NORTH_RIGHT: [f32; 3] = [22.0, 0.0, -40.0];

    fn unsmoothed() -> CompassConfig {
        CompassConfig { smoothing: 1.0, declination_deg: 0.0 }
    }

    fn feed(compass: &mut Compass, gravity: [f32; 3], field: [f32; 3]) -> Option<f64> {
        compass.on_sensor_changed(&SensorReading::accelerometer(gravity, SensorAccuracy::High));
        compass.on_sensor_changed(&SensorReading::magnetic_field(field, SensorAccuracy::High))
    }

    #[test]
    fn test_orientation_flat_device() {
        let north = orientation_from_vectors([0.0, 0.0, 9.81], [0.0, 22.0, -40.0]).unwrap();
        assert!(north.azimuth.abs() < 1e-9);
        assert!(north.pitch.abs() < 1e-9);
        assert!(north.roll.abs() < 1e-9);

        let west = orientation_from_vectors([0.0, 0.0, 9.81], [22.0, 0.0, -40.0]).unwrap();
        assert!((normalize_degrees(west.azimuth) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_orientation_undefined() {
        assert!(orientation_from_vectors([0.0, 0.0, 0.5], [0.0, 22.0, -40.0]).is_none());
        // field parallel to gravity has no horizontal component
        assert!(orientation_from_vectors([0.0, 0.0, 9.81], [0.0, 0.0, -40.0]).is_none());
    }

    #[test]
    fn test_smoother_wraps_through_north() {
        let mut smoother = BearingSmoother::new(0.5);
        assert!((smoother.update(350.0) - 350.0).abs() < 1e-9);
        let next = smoother.update(10.0);
        // halfway between 350 and 10 is north, not 180
        let off_north = next.min(360.0 - next);
        assert!(off_north < 1e-6, "smoothed to {}", next);
    }

    #[test]
    fn test_smoother_converges() {
        let mut smoother = BearingSmoother::new(0.25);
        smoother.update(0.0);
        let mut last = 0.0;
        for _ in 0..50 {
            last = smoother.update(90.0);
        }
        assert!((last - 90.0).abs() < 0.01);
        assert_eq!(BearingSmoother::new(5.0).alpha(), 1.0);
    }

    #[test]
    fn test_listener_receives_bearings() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut compass = Compass::new(&unsmoothed());
        assert!(compass.enable(move |bearing: f64| sink.lock().unwrap().push(bearing)));
        assert!(!compass.enable(|_: f64| {}));

        let bearing = feed(&mut compass, FLAT, NORTH_RIGHT).unwrap();
        assert!((bearing - 270.0).abs() < 1e-6);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_disabled_compass_ignores_readings() {
        let mut compass = Compass::new(&unsmoothed());
        assert!(feed(&mut compass, FLAT, NORTH_UP).is_none());

        compass.enable(|_: f64| {});
        compass.disable();
        assert!(!compass.is_enabled());
        assert!(feed(&mut compass, FLAT, NORTH_UP).is_none());
    }

    #[test]
    fn test_unreliable_readings_dropped() {
        let mut compass = Compass::new(&unsmoothed());
        compass.enable(|_: f64| {});
        compass.on_sensor_changed(&SensorReading::accelerometer(FLAT, SensorAccuracy::High));
        let result = compass
            .on_sensor_changed(&SensorReading::magnetic_field(NORTH_UP, SensorAccuracy::Unreliable));
        assert!(result.is_none());
        assert!(compass.bearing().is_none());
    }

    #[test]
    fn test_declination_and_landscape() {
        let mut compass = Compass::new(&CompassConfig { smoothing: 1.0, declination_deg: -14.5 });
        compass.enable(|_: f64| {});
        let bearing = feed(&mut compass, FLAT, NORTH_UP).unwrap();
        assert!((bearing - 345.5).abs() < 1e-6);

        compass.set_declination(0.0);
        compass.set_screen_orientation(ScreenOrientation::Landscape);
        // flat device has no roll, so landscape adds 90
        let bearing = feed(&mut compass, FLAT, NORTH_UP).unwrap();
        assert!((bearing - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_needle_points_at_destination() {
        let mut compass = Compass::new(&unsmoothed());
        compass.enable(|_: f64| {});
        feed(&mut compass, FLAT, NORTH_UP);
        assert!(compass.needle_bearing().abs() < 1e-6);

        compass.set_location(Some(GeoPoint::new(0.0, 0.0).unwrap()));
        compass.set_destination(Some(GeoPoint::new(0.0, 1.0).unwrap()));
        assert!((compass.needle_bearing() - 270.0).abs() < 1e-6);
    }
}

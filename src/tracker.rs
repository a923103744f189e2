// src/tracker.rs
//! User-location overlay state

use crate::arbiter::LocationListener;
use crate::compass::CompassListener;
use crate::fix::Fix;
use crate::geo::{calculate_bearing_to_destination, distance_km_opt, AccuracyCircle, GeoPoint, ViewRegion};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// What a renderer has to do after a fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerUpdate {
    pub circle: AccuracyCircle,
    /// Pan the map to the user.
    pub recenter: bool,
    pub first_fix: bool,
}

/// Everything a "you are here" overlay draws: the latest position with its
/// accuracy circle, the compass bearing and the destination needle.
#[derive(Debug, Clone)]
pub struct UserTracker {
    last_fix: Option<Fix>,
    circle: Option<AccuracyCircle>,
    bearing: Option<f64>,
    destination: Option<GeoPoint>,
    follow_user: bool,
    view: Option<ViewRegion>,
}

impl UserTracker {
    pub fn new() -> Self {
        Self {
            last_fix: None,
            circle: None,
            bearing: None,
            destination: None,
            follow_user: true,
            view: None,
        }
    }

    pub fn on_fix(&mut self, fix: &Fix) -> TrackerUpdate {
        let first_fix = self.last_fix.is_none();
        let circle = AccuracyCircle::from_fix(fix);

        let recenter = self.follow_user
            && match &self.view {
                Some(view) => first_fix || view.should_recenter(&fix.point),
                None => first_fix,
            };
        if recenter {
            if let Some(view) = self.view.as_mut() {
                view.center = fix.point;
            }
        }

        debug!(fix = %fix, first_fix, recenter, "tracker updated");
        self.last_fix = Some(fix.clone());
        self.circle = Some(circle);
        TrackerUpdate {
            circle,
            recenter,
            first_fix,
        }
    }

    pub fn set_bearing(&mut self, bearing: f64) {
        self.bearing = Some(bearing);
    }

    pub fn bearing(&self) -> Option<f64> {
        self.bearing
    }

    pub fn set_destination(&mut self, destination: Option<GeoPoint>) {
        self.destination = destination;
    }

    pub fn destination(&self) -> Option<GeoPoint> {
        self.destination
    }

    pub fn set_follow_user(&mut self, follow_user: bool) {
        self.follow_user = follow_user;
    }

    pub fn follows_user(&self) -> bool {
        self.follow_user
    }

    /// The visible map area, updated by the host whenever the user pans or zooms.
    pub fn set_view(&mut self, view: Option<ViewRegion>) {
        self.view = view;
    }

    pub fn view(&self) -> Option<ViewRegion> {
        self.view
    }

    pub fn last_fix(&self) -> Option<&Fix> {
        self.last_fix.as_ref()
    }

    pub fn location(&self) -> Option<GeoPoint> {
        self.last_fix.as_ref().map(|fix| fix.point)
    }

    pub fn accuracy_circle(&self) -> Option<AccuracyCircle> {
        self.circle
    }

    /// Kilometers to the destination, negative when either end is unknown.
    pub fn distance_to_destination_km(&self) -> f64 {
        distance_km_opt(self.location().as_ref(), self.destination.as_ref())
    }

    pub fn needle_bearing(&self) -> f64 {
        calculate_bearing_to_destination(
            self.location().as_ref(),
            self.destination.as_ref(),
            self.bearing.unwrap_or(0.0),
        )
    }

    /// Forgets the position; destination and follow mode stay.
    pub fn reset(&mut self) {
        self.last_fix = None;
        self.circle = None;
        self.bearing = None;
    }
}

impl Default for UserTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Feeds a shared tracker from the arbiter and the compass.
#[derive(Debug, Clone)]
pub struct TrackerListener(pub Arc<RwLock<UserTracker>>);

impl TrackerListener {
    pub fn new(tracker: Arc<RwLock<UserTracker>>) -> Self {
        Self(tracker)
    }
}

impl LocationListener for TrackerListener {
    fn on_fix_accepted(&mut self, fix: &Fix) {
        let mut tracker = self.0.write().unwrap_or_else(PoisonError::into_inner);
        tracker.on_fix(fix);
    }
}

impl CompassListener for TrackerListener {
    fn on_compass_update(&mut self, bearing: f64) {
        let mut tracker = self.0.write().unwrap_or_else(PoisonError::into_inner);
        tracker.set_bearing(bearing);
    }
}

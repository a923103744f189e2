// src/fix.rs
//! Position fixes delivered by providers

use crate::geo::GeoPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which provider slot a fix came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Higher accuracy provider that may be unavailable or erroring.
    Primary,
    /// Always-available, lower accuracy provider.
    Fallback,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Primary => write!(f, "primary"),
            Source::Fallback => write!(f, "fallback"),
        }
    }
}

/// A single position report with horizontal accuracy in meters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fix {
    pub point: GeoPoint,
    pub accuracy_m: f64,
    pub source: Source,
    pub timestamp: DateTime<Utc>,
}

impl Fix {
    /// Negative or non-finite accuracies are reported as 0.
    pub fn new(point: GeoPoint, accuracy_m: f64, source: Source, timestamp: DateTime<Utc>) -> Self {
        let accuracy_m = if accuracy_m.is_finite() { accuracy_m.max(0.0) } else { 0.0 };
        Self {
            point,
            accuracy_m,
            source,
            timestamp,
        }
    }

    /// Seconds since the fix was taken, by the wall clock.
    pub fn age_seconds(&self) -> i64 {
        Utc::now().signed_duration_since(self.timestamp).num_seconds()
    }

    /// Whether this fix is at least as accurate as `required_m`.
    pub fn meets_accuracy(&self, required_m: f64) -> bool {
        self.accuracy_m <= required_m
    }
}

impl fmt::Display for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} +- {:.0}m ({})", self.point, self.accuracy_m, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_is_never_negative() {
        let point = GeoPoint::new(1.0, 2.0).unwrap();
        let fix = Fix::new(point, -5.0, Source::Primary, Utc::now());
        assert_eq!(fix.accuracy_m, 0.0);
        let fix = Fix::new(point, f64::NAN, Source::Fallback, Utc::now());
        assert_eq!(fix.accuracy_m, 0.0);
    }

    #[test]
    fn test_meets_accuracy() {
        let point = GeoPoint::new(1.0, 2.0).unwrap();
        let fix = Fix::new(point, 50.0, Source::Fallback, Utc::now());
        assert!(fix.meets_accuracy(50.0));
        assert!(!fix.meets_accuracy(49.9));
        assert_eq!(fix.to_string(), "1.000000, 2.000000 +- 50m (fallback)");
    }

    #[test]
    fn test_age_seconds() {
        let point = GeoPoint::new(1.0, 2.0).unwrap();
        let stale = Fix::new(point, 10.0, Source::Primary, Utc::now() - chrono::Duration::seconds(30));
        assert!((30..35).contains(&stale.age_seconds()));

        let fresh = Fix::new(point, 10.0, Source::Primary, Utc::now());
        assert!(fresh.age_seconds() <= 1);
    }
}

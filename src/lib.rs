// src/lib.rs
//! Location Library
//!
//! Decides which position fix to trust when a high-accuracy primary
//! provider and an always-available fallback provider compete, and provides
//! the spherical geodesy and compass math needed to draw "you are here" and
//! "that way" on a map.

pub mod arbiter;
pub mod compass;
pub mod config;
pub mod error;
pub mod fix;
pub mod geo;
pub mod gps;
pub mod logging;
pub mod monitor;
pub mod provider;
pub mod tracker;

// Re-export main types for convenience
pub use arbiter::{Arbiter, ArbiterConfig, ArbiterHandle, ArbiterState, ArbiterUpdate, LocationListener};
pub use compass::{Compass, CompassListener};
pub use config::LocationConfig;
pub use error::{LocationError, Result};
pub use fix::{Fix, Source};
pub use geo::GeoPoint;
pub use monitor::{FallbackSource, LocationMonitor};
pub use provider::{PositionProvider, ProviderError, ProviderEvent, ProviderSink, ScriptedProvider};
pub use tracker::{TrackerListener, UserTracker};

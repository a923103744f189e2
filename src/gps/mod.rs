// src/gps/mod.rs
//! Real GPS receivers usable as fallback providers

pub mod gpsd;
pub mod nmea;

pub use gpsd::GpsdProvider;
pub use nmea::SerialNmeaProvider;

// src/error.rs
//! Error types for the location library

use std::fmt;

use crate::provider::ProviderError;

pub type Result<T> = std::result::Result<T, LocationError>;

#[derive(Debug)]
pub enum LocationError {
    Io(std::io::Error),
    Serial(tokio_serial::Error),
    Json(serde_json::Error),
    Connection(String),
    Parse(String),
    InvalidCoordinate { latitude: f64, longitude: f64 },
    Provider(ProviderError),
    Config(String),
    Other(String),
}

impl fmt::Display for LocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationError::Io(e) => write!(f, "IO error: {}", e),
            LocationError::Serial(e) => write!(f, "Serial error: {}", e),
            LocationError::Json(e) => write!(f, "JSON error: {}", e),
            LocationError::Connection(msg) => write!(f, "Connection error: {}", msg),
            LocationError::Parse(msg) => write!(f, "Parse error: {}", msg),
            LocationError::InvalidCoordinate { latitude, longitude } => write!(
                f,
                "Invalid coordinate: latitude {} longitude {} (expected [-90, 90] / [-180, 180])",
                latitude, longitude
            ),
            LocationError::Provider(e) => write!(f, "Provider error: {}", e),
            LocationError::Config(msg) => write!(f, "Config error: {}", msg),
            LocationError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for LocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LocationError::Io(e) => Some(e),
            LocationError::Serial(e) => Some(e),
            LocationError::Json(e) => Some(e),
            LocationError::Provider(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LocationError {
    fn from(error: std::io::Error) -> Self {
        LocationError::Io(error)
    }
}

impl From<tokio_serial::Error> for LocationError {
    fn from(error: tokio_serial::Error) -> Self {
        LocationError::Serial(error)
    }
}

impl From<serde_json::Error> for LocationError {
    fn from(error: serde_json::Error) -> Self {
        LocationError::Json(error)
    }
}

impl From<ProviderError> for LocationError {
    fn from(error: ProviderError) -> Self {
        LocationError::Provider(error)
    }
}

impl From<anyhow::Error> for LocationError {
    fn from(error: anyhow::Error) -> Self {
        LocationError::Other(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_coordinate_message() {
        let err = LocationError::InvalidCoordinate { latitude: 91.0, longitude: 0.0 };
        assert!(err.to_string().contains("latitude 91"));
    }

    #[test]
    fn test_provider_error_conversion() {
        let err: LocationError = ProviderError::Unauthorized("bad key".to_string()).into();
        assert!(matches!(err, LocationError::Provider(ProviderError::Unauthorized(_))));
        assert!(std::error::Error::source(&err).is_some());
    }
}

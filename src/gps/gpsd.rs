// src/gps/gpsd.rs
//! gpsd client used as a position provider

use crate::error::{LocationError, Result};
use crate::geo::GeoPoint;
use crate::provider::{PositionProvider, ProviderError, ProviderSink};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub const DEFAULT_GPSD_HOST: &str = "localhost";
pub const DEFAULT_GPSD_PORT: u16 = 2947;

/// Accuracy assumed when a TPV report carries no error estimate.
pub const DEFAULT_ACCURACY_M: f64 = 50.0;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct GpsdMessage {
    class: String,
    #[serde(flatten)]
    data: HashMap<String, serde_json::Value>,
}

/// What a single gpsd JSON line told us.
#[derive(Debug, Clone, PartialEq)]
pub enum GpsdReport {
    Fix {
        point: GeoPoint,
        accuracy_m: f64,
        time: Option<DateTime<Utc>>,
    },
    /// TPV without a 2D/3D position.
    NoFix,
    Version(String),
    Devices(Vec<String>),
    Ignored,
}

/// Connect to a gpsd daemon and return a stream reader
pub async fn connect_gpsd(host: &str, port: u16) -> Result<BufReader<TcpStream>> {
    let mut stream = TcpStream::connect(format!("{}:{}", host, port))
        .await
        .map_err(|e| LocationError::Connection(format!("Failed to connect to gpsd at {}:{}: {}", host, port, e)))?;

    // Send WATCH command to start receiving JSON data
    let watch_cmd = "?WATCH={\"enable\":true,\"json\":true}\n";
    stream
        .write_all(watch_cmd.as_bytes())
        .await
        .map_err(|e| LocationError::Connection(format!("Failed to send WATCH command: {}", e)))?;

    Ok(BufReader::new(stream))
}

/// Parse a single line of gpsd JSON data
pub fn parse_gpsd_json(line: &str) -> Result<GpsdReport> {
    let msg: GpsdMessage = serde_json::from_str(line)
        .map_err(|e| LocationError::Parse(format!("Failed to parse gpsd JSON: {}", e)))?;

    let report = match msg.class.as_str() {
        "TPV" => parse_tpv_message(&msg.data),
        "VERSION" => msg
            .data
            .get("release")
            .and_then(|v| v.as_str())
            .map(|release| GpsdReport::Version(release.to_string()))
            .unwrap_or(GpsdReport::Ignored),
        "DEVICES" => {
            let paths = msg
                .data
                .get("devices")
                .and_then(|v| v.as_array())
                .map(|devices| {
                    devices
                        .iter()
                        .filter_map(|d| d.get("path").and_then(|p| p.as_str()))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            GpsdReport::Devices(paths)
        }
        _ => GpsdReport::Ignored,
    };

    Ok(report)
}

/// Parse TPV (Time Position Velocity) message
fn parse_tpv_message(msg_data: &HashMap<String, serde_json::Value>) -> GpsdReport {
    let mode = msg_data.get("mode").and_then(|v| v.as_u64()).unwrap_or(0);
    if mode < 2 {
        return GpsdReport::NoFix;
    }

    let lat = msg_data.get("lat").and_then(|v| v.as_f64());
    let lon = msg_data.get("lon").and_then(|v| v.as_f64());
    let point = match (lat, lon) {
        (Some(lat), Some(lon)) => match GeoPoint::new(lat, lon) {
            Ok(point) => point,
            Err(_) => return GpsdReport::NoFix,
        },
        _ => return GpsdReport::NoFix,
    };

    // epx/epy are 95% longitude/latitude errors in meters
    let epx = msg_data.get("epx").and_then(|v| v.as_f64());
    let epy = msg_data.get("epy").and_then(|v| v.as_f64());
    let accuracy_m = match (epx, epy) {
        (Some(x), Some(y)) => x.max(y),
        (Some(e), None) | (None, Some(e)) => e,
        (None, None) => DEFAULT_ACCURACY_M,
    };

    let time = msg_data
        .get("time")
        .and_then(|v| v.as_str())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));

    GpsdReport::Fix { point, accuracy_m, time }
}

/// Forwards fixes from a gpsd JSON stream until it ends or the arbiter
/// stops listening.
pub async fn forward_reports<R>(reader: &mut R, sink: &ProviderSink) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_gpsd_json(line) {
            Ok(GpsdReport::Fix { point, accuracy_m, time }) => {
                let delivered = match time {
                    Some(time) => sink.fix_at(point, accuracy_m, time),
                    None => sink.fix(point, accuracy_m),
                };
                if !delivered {
                    return Ok(());
                }
            }
            Ok(GpsdReport::Version(release)) => info!("Connected to gpsd version: {}", release),
            Ok(GpsdReport::Devices(paths)) => debug!(?paths, "gpsd managing {} device(s)", paths.len()),
            Ok(GpsdReport::NoFix) | Ok(GpsdReport::Ignored) => {}
            Err(e) => warn!("{}", e),
        }
    }
}

/// Fallback provider reading TPV reports from gpsd. Reconnects after the
/// daemon goes away, reporting each outage as unavailable.
pub struct GpsdProvider {
    name: String,
    host: String,
    port: u16,
    task: Option<JoinHandle<()>>,
}

impl GpsdProvider {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            name: format!("gpsd {}:{}", host, port),
            host: host.to_string(),
            port,
            task: None,
        }
    }
}

impl PositionProvider for GpsdProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, sink: ProviderSink) -> Result<()> {
        self.stop();

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LocationError::Other(format!("{} needs a tokio runtime: {}", self.name, e)))?;
        let host = self.host.clone();
        let port = self.port;

        self.task = Some(runtime.spawn(async move {
            while !sink.is_closed() {
                let outage = match connect_gpsd(&host, port).await {
                    Ok(mut reader) => match forward_reports(&mut reader, &sink).await {
                        Ok(()) => "gpsd closed the connection".to_string(),
                        Err(e) => e.to_string(),
                    },
                    Err(e) => e.to_string(),
                };
                if !sink.error(ProviderError::Unavailable(outage)) {
                    break;
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }));

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for GpsdProvider {
    fn drop(&mut self) {
        self.stop();
    }
}

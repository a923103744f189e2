// src/gps/nmea.rs
//! NMEA sentence parsing and the serial-port provider

use crate::error::{LocationError, Result};
use crate::geo::GeoPoint;
use crate::provider::{PositionProvider, ProviderError, ProviderSink};
use std::time::Duration;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    task::JoinHandle,
};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, trace, warn};

/// User equivalent range error: meters of horizontal error per unit of HDOP.
pub const UERE_M: f64 = 5.0;

/// Accuracy assumed when a sentence carries no HDOP.
pub const DEFAULT_ACCURACY_M: f64 = 50.0;

pub const DEFAULT_BAUDRATE: u32 = 9600;

/// Pause between losing the receiver and opening it again.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// A position decoded from a GGA or RMC sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct NmeaFix {
    pub point: GeoPoint,
    /// 0 = invalid, 1 = GPS, 2 = DGPS, ...
    pub quality: u8,
    pub satellites: Option<u8>,
    pub hdop: Option<f64>,
    pub altitude: Option<f64>,
}

impl NmeaFix {
    pub fn accuracy_m(&self) -> f64 {
        match self.hdop {
            Some(hdop) if hdop > 0.0 => hdop * UERE_M,
            _ => DEFAULT_ACCURACY_M,
        }
    }
}

/// Sentence kinds this reader understands.
#[derive(Debug, Clone, PartialEq)]
pub enum NmeaSentence {
    Gga(Option<NmeaFix>),
    /// RMC with a position only when its status is `A`.
    Rmc(Option<NmeaFix>),
    Other,
}

/// Checks the `*hh` checksum. Sentences without one are accepted.
pub fn verify_checksum(line: &str) -> bool {
    let body = line.strip_prefix('$').unwrap_or(line);
    let Some((payload, checksum)) = body.split_once('*') else {
        return true;
    };
    let expected = match u8::from_str_radix(checksum.trim(), 16) {
        Ok(value) => value,
        Err(_) => return false,
    };
    payload.bytes().fold(0u8, |acc, b| acc ^ b) == expected
}

/// Parse a single NMEA sentence
pub fn parse_nmea_sentence(line: &str) -> NmeaSentence {
    if !verify_checksum(line) {
        trace!(line, "checksum mismatch");
        return NmeaSentence::Other;
    }
    let line = line.split('*').next().unwrap_or(line);
    let parts: Vec<&str> = line.split(',').collect();

    match parts.first().map(|talker| talker.get(3..).unwrap_or("")) {
        Some("GGA") => NmeaSentence::Gga(parse_gga(&parts)),
        Some("RMC") => NmeaSentence::Rmc(parse_rmc(&parts)),
        _ => NmeaSentence::Other,
    }
}

/// ddmm.mmmm plus hemisphere into signed degrees.
fn parse_coordinate(value: &str, hemisphere: &str, negative: &str) -> Option<f64> {
    if value.is_empty() || hemisphere.is_empty() {
        return None;
    }
    let raw = value.parse::<f64>().ok()?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let coordinate = degrees + minutes / 60.0;
    Some(if hemisphere == negative { -coordinate } else { coordinate })
}

fn parse_point(parts: &[&str], lat: usize) -> Option<GeoPoint> {
    let latitude = parse_coordinate(parts[lat], parts[lat + 1], "S")?;
    let longitude = parse_coordinate(parts[lat + 2], parts[lat + 3], "W")?;
    GeoPoint::new(latitude, longitude).ok()
}

/// GGA (fix data): time, lat, N/S, lon, E/W, quality, satellites, HDOP, altitude
fn parse_gga(parts: &[&str]) -> Option<NmeaFix> {
    if parts.len() < 10 {
        return None;
    }
    let quality = parts[6].parse::<u8>().ok()?;
    if quality == 0 {
        return None;
    }

    Some(NmeaFix {
        point: parse_point(parts, 2)?,
        quality,
        satellites: parts[7].parse().ok(),
        hdop: parts[8].parse().ok(),
        altitude: parts[9].parse().ok(),
    })
}

/// RMC (recommended minimum): time, status, lat, N/S, lon, E/W, ...
fn parse_rmc(parts: &[&str]) -> Option<NmeaFix> {
    if parts.len() < 7 || parts[2] != "A" {
        return None;
    }

    Some(NmeaFix {
        point: parse_point(parts, 3)?,
        quality: 1,
        satellites: None,
        hdop: None,
        altitude: None,
    })
}

/// Forwards fixes from an NMEA stream until it ends or the arbiter stops
/// listening. RMC positions are only used by receivers that never send GGA.
pub async fn forward_sentences<R>(reader: &mut R, sink: &ProviderSink) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let mut saw_gga = false;
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }

        let fix = match parse_nmea_sentence(line.trim()) {
            NmeaSentence::Gga(fix) => {
                saw_gga = true;
                fix
            }
            NmeaSentence::Rmc(fix) if !saw_gga => fix,
            _ => None,
        };

        if let Some(fix) = fix {
            if !sink.fix(fix.point, fix.accuracy_m()) {
                return Ok(());
            }
        }
    }
}

/// Forwards sentences from `reader`, then keeps calling `reopen` after each
/// outage until the sink closes. Every outage is reported as `Unavailable`.
pub async fn forward_with_reopen<R, O>(reader: R, mut reopen: O, sink: &ProviderSink, port: &str)
where
    R: AsyncBufRead + Unpin,
    O: FnMut() -> Result<R>,
{
    let mut next: Result<R> = Ok(reader);
    loop {
        let outage = match next {
            Ok(mut reader) => match forward_sentences(&mut reader, sink).await {
                Ok(()) if sink.is_closed() => return,
                Ok(()) => format!("serial port {} closed", port),
                Err(e) => {
                    warn!("Error reading from serial port {}: {}", port, e);
                    e.to_string()
                }
            },
            Err(e) => e.to_string(),
        };
        if !sink.error(ProviderError::Unavailable(outage)) {
            return;
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
        debug!("Reopening serial port {}", port);
        next = reopen();
    }
}

fn open_serial(port: &str, baudrate: u32) -> Result<BufReader<tokio_serial::SerialStream>> {
    let serial = tokio_serial::new(port, baudrate)
        .timeout(Duration::from_millis(1000))
        .open_native_async()
        .map_err(|e| LocationError::Connection(format!("Failed to open serial port {}: {}", port, e)))?;
    Ok(BufReader::new(serial))
}

/// Fallback provider reading NMEA 0183 from a serial GPS receiver.
pub struct SerialNmeaProvider {
    name: String,
    port: String,
    baudrate: u32,
    task: Option<JoinHandle<()>>,
}

impl SerialNmeaProvider {
    pub fn new(port: &str, baudrate: u32) -> Self {
        Self {
            name: format!("serial {}", port),
            port: port.to_string(),
            baudrate,
            task: None,
        }
    }
}

impl PositionProvider for SerialNmeaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, sink: ProviderSink) -> Result<()> {
        self.stop();

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LocationError::Other(format!("{} needs a tokio runtime: {}", self.name, e)))?;
        let _guard = runtime.enter();

        // the first open is synchronous so a missing port fails start()
        debug!("Connecting to GPS on {} at {} baud", self.port, self.baudrate);
        let reader = open_serial(&self.port, self.baudrate)?;

        let port = self.port.clone();
        let baudrate = self.baudrate;
        self.task = Some(runtime.spawn(async move {
            forward_with_reopen(reader, || open_serial(&port, baudrate), &sink, &port).await;
        }));

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SerialNmeaProvider {
    fn drop(&mut self) {
        self.stop();
    }
}

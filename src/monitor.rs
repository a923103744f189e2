// src/monitor.rs
//! Wiring providers and the arbiter together for hosts and the CLI

use crate::{
    arbiter::{Arbiter, ArbiterHandle, ArbiterUpdate, LocationListener},
    config::{FallbackConfig, LocationConfig},
    error::{LocationError, Result},
    fix::Fix,
    gps::{gpsd, nmea, GpsdProvider, SerialNmeaProvider},
    provider::PositionProvider,
};
use std::{future::Future, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Fallback receiver configuration
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackSource {
    Serial { port: String, baudrate: u32 },
    Gpsd { host: String, port: u16 },
}

impl FallbackSource {
    pub fn from_config(config: &FallbackConfig) -> Result<Self> {
        match config.source_type.as_str() {
            "serial" => {
                let port = config
                    .serial_port
                    .clone()
                    .ok_or_else(|| LocationError::Config("serial fallback needs serial_port".to_string()))?;
                Ok(FallbackSource::Serial {
                    port,
                    baudrate: config.serial_baudrate.unwrap_or(nmea::DEFAULT_BAUDRATE),
                })
            }
            "gpsd" => Ok(FallbackSource::Gpsd {
                host: config
                    .gpsd_host
                    .clone()
                    .unwrap_or_else(|| gpsd::DEFAULT_GPSD_HOST.to_string()),
                port: config.gpsd_port.unwrap_or(gpsd::DEFAULT_GPSD_PORT),
            }),
            other => Err(LocationError::Config(format!("unknown fallback source type: {}", other))),
        }
    }

    pub fn into_provider(self) -> Box<dyn PositionProvider> {
        match self {
            FallbackSource::Serial { port, baudrate } => Box::new(SerialNmeaProvider::new(&port, baudrate)),
            FallbackSource::Gpsd { host, port } => Box::new(GpsdProvider::new(&host, port)),
        }
    }
}

/// An arbiter plus the settings it was built from.
pub struct LocationMonitor {
    arbiter: Arbiter,
    config: LocationConfig,
}

impl LocationMonitor {
    /// Must be called from within a tokio runtime.
    pub fn new<P, F>(config: LocationConfig, primary: P, fallback: F) -> Result<Self>
    where
        P: PositionProvider + 'static,
        F: PositionProvider + 'static,
    {
        Ok(Self {
            arbiter: Arbiter::new(config.arbiter.clone(), primary, fallback)?,
            config,
        })
    }

    /// Uses the receiver named in `config.fallback` as fallback provider.
    pub fn from_config<P>(config: LocationConfig, primary: P) -> Result<Self>
    where
        P: PositionProvider + 'static,
    {
        let fallback = FallbackSource::from_config(&config.fallback)?;
        info!(?fallback, "using fallback source");
        Self::new(config, primary, fallback.into_provider())
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub fn config(&self) -> &LocationConfig {
        &self.config
    }

    pub fn into_arbiter(self) -> Arbiter {
        self.arbiter
    }

    /// Forwards fixes to `listener` until `shutdown` completes.
    pub async fn watch<L, S>(self, listener: L, shutdown: S) -> Result<()>
    where
        L: LocationListener + 'static,
        S: Future<Output = ()>,
    {
        let handle = ArbiterHandle::spawn(self.arbiter);
        if !handle.register_listener(listener).await? {
            return Err(LocationError::Other("a listener is already registered".to_string()));
        }
        handle.start()?;

        shutdown.await;
        debug!("watch shutting down");
        handle.shutdown().await
    }

    /// [`locate_once`](Self::locate_once) with the configured accuracy and run time.
    pub async fn locate(&mut self) -> Result<Option<Fix>> {
        let required = self.config.required_accuracy_m;
        let max_run_time = self.config.max_run_time();
        self.locate_once(required, max_run_time).await
    }

    /// Runs one session until a fix at least as accurate as
    /// `required_accuracy_m` arrives, or `max_run_time` passes. In the latter
    /// case the most accurate fix seen is returned, if any.
    pub async fn locate_once(&mut self, required_accuracy_m: f64, max_run_time: Duration) -> Result<Option<Fix>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        if !self.arbiter.register_listener(tx) {
            return Err(LocationError::Other("a listener is already registered".to_string()));
        }
        self.arbiter.start();

        let deadline = tokio::time::sleep(max_run_time);
        tokio::pin!(deadline);
        let mut best: Option<Fix> = None;

        let found = 'locate: loop {
            tokio::select! {
                _ = &mut deadline => {
                    debug!("locate ran out of time");
                    break 'locate best.take();
                }
                _ = self.arbiter.process_next() => {}
            }

            while let Ok(update) = rx.try_recv() {
                let ArbiterUpdate::FixAccepted(fix) = update else {
                    continue;
                };
                if fix.meets_accuracy(required_accuracy_m) {
                    break 'locate Some(fix);
                }
                if best.as_ref().map_or(true, |b| fix.accuracy_m < b.accuracy_m) {
                    best = Some(fix);
                }
            }
        };

        self.arbiter.stop();
        if let Some(fix) = &found {
            info!(fix = %fix, age_s = fix.age_seconds(), "located");
        }
        Ok(found)
    }
}

/// List available serial ports
pub fn list_serial_ports() -> Result<Vec<tokio_serial::SerialPortInfo>> {
    tokio_serial::available_ports()
        .map_err(|e| LocationError::Other(format!("Failed to list serial ports: {}", e)))
}

// src/main.rs
//! location-lib - replay failover scenarios and read real receivers from the command line

use anyhow::Context;
use clap::{Parser, Subcommand};
use location_lib::{
    config::LocationConfig,
    fix::Fix,
    geo::{self, GeoPoint},
    logging,
    monitor::{self, LocationMonitor},
    provider::{Scenario, ScriptedProvider},
    LocationListener,
};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Parser)]
#[command(name = "location-lib", version, about = "Location-source arbitration and geodesy tools")]
struct Cli {
    /// More output (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file instead of ~/.config/location-lib/config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay scripted primary and fallback providers
    Simulate {
        scenario: PathBuf,
        /// How long to run before stopping
        #[arg(long, default_value_t = 30_000)]
        duration_ms: u64,
    },
    /// Print fixes until interrupted
    Watch {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Wait for one fix that is accurate enough
    Locate {
        /// Required accuracy in meters
        #[arg(long)]
        accuracy: Option<f64>,
        /// Give up after this many milliseconds
        #[arg(long)]
        timeout: Option<u64>,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Initial great-circle bearing between two points
    Bearing {
        #[arg(allow_negative_numbers = true)]
        from_lat: f64,
        #[arg(allow_negative_numbers = true)]
        from_lon: f64,
        #[arg(allow_negative_numbers = true)]
        to_lat: f64,
        #[arg(allow_negative_numbers = true)]
        to_lon: f64,
    },
    /// Great-circle distance between two points
    Distance {
        #[arg(allow_negative_numbers = true)]
        from_lat: f64,
        #[arg(allow_negative_numbers = true)]
        from_lon: f64,
        #[arg(allow_negative_numbers = true)]
        to_lat: f64,
        #[arg(allow_negative_numbers = true)]
        to_lon: f64,
        /// Feet and miles instead of meters and kilometers
        #[arg(long)]
        imperial: bool,
    },
    /// List serial ports a GPS receiver could be attached to
    ListPorts,
}

#[derive(Debug, clap::Args)]
struct SourceArgs {
    /// Fallback receiver type
    #[arg(long, value_parser = ["gpsd", "serial"])]
    source: Option<String>,
    /// Serial port for the serial source
    #[arg(long)]
    port: Option<String>,
    #[arg(long)]
    baudrate: Option<u32>,
    /// gpsd host for the gpsd source
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    gpsd_port: Option<u16>,
    /// Scenario whose primary script stands in for the primary provider
    #[arg(long)]
    scenario: Option<PathBuf>,
    /// Remember the source settings in the config file
    #[arg(long)]
    save: bool,
}

struct PrintListener;

impl LocationListener for PrintListener {
    fn on_fix_accepted(&mut self, fix: &Fix) {
        println!("{}  {}", fix.timestamp.format("%H:%M:%S%.3f"), fix);
    }

    fn on_first_fix(&mut self, is_first_fix: bool) {
        println!("first fix: {}", is_first_fix);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<LocationConfig> {
    let config = match &cli.config {
        Some(path) => LocationConfig::load_from(path),
        None => LocationConfig::load(),
    };
    config.context("Failed to load configuration")
}

fn apply_source(config: &mut LocationConfig, args: &SourceArgs, path: Option<&PathBuf>) -> anyhow::Result<()> {
    match args.source.as_deref() {
        Some("serial") => {
            let port = args
                .port
                .clone()
                .or_else(|| config.fallback.serial_port.clone())
                .context("--port is required for the serial source")?;
            let baudrate = args.baudrate.or(config.fallback.serial_baudrate).unwrap_or(9600);
            config.update_serial(port, baudrate);
        }
        Some("gpsd") => {
            let host = args
                .host
                .clone()
                .or_else(|| config.fallback.gpsd_host.clone())
                .unwrap_or_else(|| "localhost".to_string());
            let port = args.gpsd_port.or(config.fallback.gpsd_port).unwrap_or(2947);
            config.update_gpsd(host, port);
        }
        _ => {}
    }

    if args.save {
        match path {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
        println!("Configuration saved");
    }
    Ok(())
}

fn primary_for(args: &SourceArgs) -> anyhow::Result<ScriptedProvider> {
    let events = match &args.scenario {
        Some(path) => Scenario::load(path).with_context(|| format!("Failed to load {}", path.display()))?.primary,
        None => Vec::new(),
    };
    Ok(ScriptedProvider::new("scripted primary", events))
}

fn point(lat: f64, lon: f64) -> anyhow::Result<GeoPoint> {
    Ok(GeoPoint::new(lat, lon)?)
}

async fn ctrl_c() {
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match &cli.command {
        Command::Simulate { scenario, duration_ms } => {
            let config = load_config(&cli)?;
            let scenario = Scenario::load(scenario).with_context(|| format!("Failed to load {}", scenario.display()))?;
            let primary = ScriptedProvider::new("scripted primary", scenario.primary);
            let fallback = ScriptedProvider::new("scripted fallback", scenario.fallback);
            let monitor = LocationMonitor::new(config, primary, fallback)?;

            let duration = Duration::from_millis(*duration_ms);
            monitor
                .watch(PrintListener, async move {
                    tokio::select! {
                        _ = tokio::time::sleep(duration) => {}
                        _ = ctrl_c() => {}
                    }
                })
                .await?;
        }
        Command::Watch { source } => {
            let mut config = load_config(&cli)?;
            apply_source(&mut config, source, cli.config.as_ref())?;
            let monitor = LocationMonitor::from_config(config, primary_for(source)?)?;
            println!("Watching for fixes, Ctrl+C to stop");
            monitor.watch(PrintListener, ctrl_c()).await?;
        }
        Command::Locate { accuracy, timeout, source } => {
            let mut config = load_config(&cli)?;
            apply_source(&mut config, source, cli.config.as_ref())?;
            let required = accuracy.unwrap_or(config.required_accuracy_m);
            let max_run_time = timeout.map(Duration::from_millis).unwrap_or_else(|| config.max_run_time());
            let mut monitor = LocationMonitor::from_config(config, primary_for(source)?)?;

            match monitor.locate_once(required, max_run_time).await? {
                Some(fix) if fix.meets_accuracy(required) => println!("{}", fix),
                Some(fix) => println!(
                    "{} (best available, {}s old, wanted {:.0}m)",
                    fix,
                    fix.age_seconds(),
                    required
                ),
                None => {
                    println!("No fix within {:?}", max_run_time);
                    std::process::exit(1);
                }
            }
        }
        Command::Bearing { from_lat, from_lon, to_lat, to_lon } => {
            let from = point(*from_lat, *from_lon)?;
            let to = point(*to_lat, *to_lon)?;
            println!("{:.2}", geo::bearing(&from, &to));
        }
        Command::Distance { from_lat, from_lon, to_lat, to_lon, imperial } => {
            let from = point(*from_lat, *from_lon)?;
            let to = point(*to_lat, *to_lon)?;
            println!("{}", geo::format_distance(geo::distance_km(&from, &to), !imperial));
        }
        Command::ListPorts => {
            let ports = monitor::list_serial_ports()?;
            if ports.is_empty() {
                println!("No serial ports found.");
            } else {
                println!("Available serial ports:");
                for port in ports {
                    println!("  {} - {:?}", port.port_name, port.port_type);
                }
            }
        }
    }

    Ok(())
}

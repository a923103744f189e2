// src/logging.rs
//! tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber on stderr. `RUST_LOG` takes precedence over
/// `verbosity` (0 = warn, 1 = info, 2 = debug, 3+ = trace).
///
/// Safe to call more than once; later calls are ignored.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn default_directive(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("warn,location_lib={}", level)
}

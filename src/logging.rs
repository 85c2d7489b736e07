//! Logging setup for the dupsweep binary.
//!
//! The library only emits through the `log` facade; this module installs the
//! `env_logger` backend. The level comes from, in priority order:
//!
//! 1. the `RUST_LOG` environment variable
//! 2. `--quiet` (errors only) or `--verbose` (debug, then trace)
//! 3. info
//!
//! Debug builds prefix each line with a millisecond timestamp. With `-v` the
//! module path is shown too. Directory-walking dependencies stay at `warn`
//! unless `RUST_LOG` says otherwise.
//!
//! ```rust,no_run
//! use dupsweep::logging::init_logging;
//!
//! init_logging(1, false);
//! log::debug!("visible");
//! ```

use std::env;
use std::io::Write;

use env_logger::Builder;
use log::LevelFilter;

/// Crates whose debug output drowns ours when `-vv` is given.
const NOISY_DEPENDENCIES: &[&str] = &["jwalk", "ignore", "globset"];

/// Install the global logger. Later calls are ignored.
pub fn init_logging(verbose: u8, quiet: bool) {
    let mut builder = Builder::new();
    let level = match env::var("RUST_LOG") {
        Ok(spec) => {
            builder.parse_filters(&spec);
            None
        }
        Err(_) => {
            let level = determine_level(verbose, quiet);
            builder.filter_level(level);
            for dependency in NOISY_DEPENDENCIES {
                builder.filter_module(dependency, level.min(LevelFilter::Warn));
            }
            Some(level)
        }
    };
    configure_format(&mut builder, cfg!(debug_assertions), verbose >= 1);

    if builder.try_init().is_ok() {
        match level {
            Some(level) => log::debug!("Logging at {level}"),
            None => log::debug!("Logging configured from RUST_LOG"),
        }
    }
}

fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    }
}

/// Module path without the crate prefix: `duplicates::finder`.
fn short_target(target: &str) -> &str {
    target.strip_prefix("dupsweep::").unwrap_or(target)
}

fn configure_format(builder: &mut Builder, timestamps: bool, with_target: bool) {
    builder.format(move |buf, record| {
        let level = record.level();
        let style = buf.default_level_style(level);
        if timestamps {
            write!(buf, "{} ", buf.timestamp_millis())?;
        }
        write!(buf, "{style}{level:<5}{style:#} ")?;
        if with_target {
            write!(buf, "[{}] ", short_target(record.target()))?;
        }
        writeln!(buf, "{}", record.args())
    });
}

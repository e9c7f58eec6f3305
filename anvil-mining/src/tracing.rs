//! Logging setup and the crate-wide tracing prelude.
//!
//! Library code logs through `use crate::tracing::prelude::*;`. Binaries call
//! [`init_journald_or_stdout`] once at startup.

use std::env;

use time::macros::format_description;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub mod prelude {
    pub use ::tracing::{debug, error, info, trace, warn};
}

const DEFAULT_FILTER: &str = "info";

/// Install a global subscriber.
///
/// Under systemd (`JOURNAL_STREAM` set) events go to journald with their
/// structured fields intact. Otherwise they are formatted to stdout with a
/// local wall-clock timestamp. `RUST_LOG` overrides the default `info`
/// filter in both cases.
pub fn init_journald_or_stdout() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let journald = if env::var_os("JOURNAL_STREAM").is_some() {
        match tracing_journald::layer() {
            Ok(layer) => Some(layer),
            Err(e) => {
                eprintln!("journald unavailable, logging to stdout: {e}");
                None
            }
        }
    } else {
        None
    };

    match journald {
        Some(layer) => tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .init(),
        None => {
            let timer = LocalTime::new(format_description!(
                "[hour]:[minute]:[second].[subsecond digits:3]"
            ));
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_timer(timer))
                .init();
        }
    }
}

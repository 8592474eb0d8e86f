//! Logging initializer, following the teacher's `fmt::layer()...compact()` +
//! `EnvFilter::from_default_env()` pattern (see `fetiched/src/main.rs` in the
//! retrieved reference pack), with the repeated `-v/--verbose` count (as
//! `format-specs/src/main.rs` and `import-adsb/src/cli.rs` parse it) setting
//! the default level when `RUST_LOG` isn't set.

use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber. `verbosity` picks the default
/// level (0 = info, 1 = debug, 2+ = trace) used when `RUST_LOG` is unset;
/// an explicit `RUST_LOG` always takes precedence. Safe to call more than
/// once; later calls are no-ops (an already-set global subscriber is left
/// alone).
pub fn init_logging(verbosity: u8) {
    let fmt_layer = fmt::layer()
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(false)
        .compact();

    let default_directive = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

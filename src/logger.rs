//! Diagnostics output of the command line tool
//!
//! Logs go to stderr, so that the clean printer output on stdout stays usable in pipes.
//! `RUST_LOG` takes precedence over the default level when neither flag is given.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber; call once, before anything is logged
///
/// * `verbose` - debug level for this crate (overrides `quiet`)
/// * `quiet` - errors only
pub fn init_logger(verbose: bool, quiet: bool) {
    let filter = if verbose {
        EnvFilter::new("dependency_chain=debug,depchain=debug")
    } else if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact();

    // a subscriber may already be installed (e.g. by a test harness)
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

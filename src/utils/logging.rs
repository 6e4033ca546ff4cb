// src/utils/logging.rs
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset. `--verbose` opens up the extractor's
/// own debug and trace events (geometry, section slicing).
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "info,plate_reads=trace"
    } else {
        "info"
    }
}

/// Installs the fmt subscriber. `RUST_LOG` wins over the default filter.
/// Logs go to stderr so `--json` output on stdout stays machine readable.
pub fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let installed = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();

    if installed.is_err() {
        tracing::debug!("Global subscriber already set, keeping it.");
    }
}

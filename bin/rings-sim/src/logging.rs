//! Logging setup.

use eyre::Result;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use crate::cli::LogArgs;

/// Initialize logging based on command line arguments.
pub(crate) fn init_logging(args: &LogArgs) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(log_filter(args)?);
    let initialized = if args.json {
        builder.json().try_init()
    } else {
        builder.without_time().try_init()
    };
    initialized.map_err(|e| eyre::eyre!("failed to install log subscriber: {e}"))
}

/// Build the log filter.
///
/// `--quiet` wins and shows only errors. Otherwise `RUST_LOG` is used if set,
/// falling back to a level derived from `-v`, and `--log.filter` directives
/// are layered on top.
fn log_filter(args: &LogArgs) -> Result<EnvFilter> {
    if args.quiet {
        return Ok(EnvFilter::new("error"));
    }

    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(base_level(args.verbosity).to_string()));

    if let Some(custom_filter) = &args.filter {
        for directive in custom_filter.split(',') {
            filter = filter.add_directive(directive.parse()?);
        }
    }

    Ok(filter)
}

fn base_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

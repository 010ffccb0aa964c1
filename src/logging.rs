use color_eyre::Result;
use tracing_subscriber::{
    fmt,
    prelude::*,
    EnvFilter,
    Layer,
};

/// Logs go to stderr so stdout only ever carries the report.
///
/// `RUST_LOG` wins over `verbose`, which selects `debug` instead of `info`.
pub fn init_logging(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .with(tracing_error::ErrorLayer::default())
        .try_init()?;
    Ok(())
}

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::new(if verbose { "debug" } else { "info" })
}

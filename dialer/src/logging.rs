use color_eyre::eyre::Result;
use std::io::IsTerminal as _;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const SYSLOG_IDENTIFIER: &str = "rhizo-dialer";

/// Initialize the logger.
///
/// Logs go to journald when not attached to a terminal, otherwise (or if
/// journald is unreachable) to stderr.
pub fn init() -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    // Checking for a terminal helps detect if we are running under systemd.
    let journald_layer = if std::io::stderr().is_terminal() {
        None
    } else {
        tracing_journald::layer()
            .inspect_err(|err| {
                eprintln!("failed connecting to journald socket, will write to stderr: {err}");
            })
            .map(|layer| layer.with_syslog_identifier(SYSLOG_IDENTIFIER.to_owned()))
            .ok()
    };
    let stderr_layer = journald_layer.is_none().then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(journald_layer)
        .try_init()?;

    Ok(())
}

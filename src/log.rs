use tracing_subscriber::{fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logs go to stderr so `--json` output on stdout stays parseable.
/// `RUST_LOG` overrides the level picked by `--verbose`.
pub fn init_logging(verbose: bool) {
    let level = if verbose { "gainsledger=debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(env_filter)
        .init();
}

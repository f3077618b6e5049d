use anyhow::Result;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    /// Quiet unless `RUST_LOG` says otherwise.
    Default,
    /// Debug-level hierarchical output (`--verbose`).
    Verbose,
}

pub(crate) fn setup_logging(level: Level) -> Result<()> {
    let filter = match level {
        Level::Default => EnvFilter::builder()
            .with_default_directive(LevelFilter::OFF.into())
            .from_env_lossy(),
        Level::Verbose => EnvFilter::builder()
            .with_default_directive(LevelFilter::DEBUG.into())
            .from_env_lossy(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_tree::HierarchicalLayer::default()
                .with_targets(true)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .try_init()?;

    Ok(())
}

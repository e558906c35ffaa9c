//! provides logging helpers for hosts embedding the reporter

use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use tracing_subscriber::util::TryInitError;

/// initiate the global tracing subscriber, panicking if one is already set
pub fn init() {
    registry().with(stderr_layer()).init();
}

/// like [`init`], but fails instead of panicking when a subscriber is already set
pub fn try_init() -> Result<(), TryInitError> {
    registry().with(stderr_layer()).try_init()
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();

    layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter)
}

//! Tracing subscriber setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn filter(debug: bool) -> EnvFilter {
    let directive = if debug {
        "aerowatch_server=debug,aerowatch_core=debug"
    } else {
        "aerowatch_server=info"
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
}

/// Install the global subscriber; `json` switches to structured output.
pub fn init(debug: bool, json: bool) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(filter(debug));

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    Ok(())
}

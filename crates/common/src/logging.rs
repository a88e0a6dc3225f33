use crate::config::Environment;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber with pretty formatting for development
/// and JSON formatting for production.
///
/// Uses RUST_LOG environment variable for filtering (defaults to "info" if not set).
///
/// # Panics
///
/// If a global subscriber is already installed. Use `try_setup_logging` where
/// that can happen, e.g. in tests.
pub fn setup_logging(environment: Environment) {
    if let Err(e) = try_setup_logging(environment) {
        panic!("Failed to initialize logging: {e}");
    }
}

/// Like `setup_logging`, but reports an already installed subscriber as an error.
pub fn try_setup_logging(environment: Environment) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    match environment {
        Environment::Production => registry
            .with(tracing_subscriber::fmt::layer().json().with_level(true))
            .try_init()?,
        Environment::Development => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
            .try_init()?,
    }
    Ok(())
}

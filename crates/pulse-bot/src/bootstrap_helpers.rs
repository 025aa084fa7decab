use std::path::PathBuf;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub(crate) fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// Logs the outcome of loading `.env`. Runs after [`init_tracing`] because
/// `.env` may itself set `RUST_LOG`.
pub(crate) fn report_dotenv(result: Result<PathBuf, dotenv::Error>) {
    match result {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(error) if error.not_found() => {}
        Err(error) => tracing::warn!(error = %error, "failed to load .env"),
    }
}

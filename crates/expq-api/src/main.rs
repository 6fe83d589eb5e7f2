//! Binary entrypoint for the EXPQ API server.
use expq_api::{run, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "server stopped");
        std::process::exit(1);
    }
}

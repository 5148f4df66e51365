use tracing_subscriber::EnvFilter;
use votechaos::prelude::*;

#[tokio::main]
async fn main() -> Result<(), VoteChaosError> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("ignoring unreadable .env: {e}");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("votechaos=info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(
        bind = %config.bind_addr,
        idle_timeout_secs = config.idle_timeout.as_secs(),
        default_round_secs = config.engine.default_round_seconds,
        "starting"
    );

    let server = VoteChaosServerBuilder::new()
        .config(config)
        .build(MemoryStore::new(), TrustingVerifier)
        .await?;
    let engine = server.engine();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    engine.shutdown().await;
    Ok(())
}

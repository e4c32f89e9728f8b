use anyhow::{Context, Result};
use sorting_agent::agent::AgentRuntime;
use sorting_agent::config::{load_config, AgentConfig};
use sorting_agent::coordinator::HttpCoordinator;
use sorting_agent::session::BridgeSession;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "sorting-agent.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sorting_agent=info".into()),
        )
        .init();

    info!("Sorting agent starting...");

    // Config file: first argument, then SORTING_AGENT_CONFIG, then the default path
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SORTING_AGENT_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = if config_path.exists() {
        load_config(&config_path)?
    } else {
        warn!(path = %config_path.display(), "Config file not found, using defaults");
        AgentConfig::default()
    };
    config.apply_env();

    info!(
        coordinator = %config.coordinator.endpoint,
        bridge = %config.bridge.address,
        "Configuration loaded"
    );

    let (coordinator, identity) =
        HttpCoordinator::register(&config.coordinator.endpoint, &config.coordinator.api_key)
            .await
            .context("Failed to register with coordinator")?;
    info!(agent_id = %identity.id, "Registered with coordinator");

    let mut session = BridgeSession::connect(&config.bridge.address).await?;
    let mut runtime = AgentRuntime::start(
        config,
        Arc::new(coordinator),
        session.sink.clone(),
        session.events,
    );

    // Run until ctrl_c or the bridge goes away
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl_c signal")?;
            info!("Shutdown signal received");
        }
        reason = runtime.wait_for_disconnect() => {
            warn!(reason = %reason, "Session ended");
        }
    }

    // Graceful shutdown
    runtime.shutdown();
    session.handle.close();
    info!("Sorting agent stopped");

    Ok(())
}

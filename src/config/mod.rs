use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Complete agent configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub agent: LoopConfig,
    #[serde(default)]
    pub shulker: ShulkerConfig,
    #[serde(default)]
    pub signs: SignsConfig,
}

/// Coordinator endpoint and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
}

fn default_endpoint() -> String {
    "http://localhost:6322".to_string()
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
        }
    }
}

/// Protocol bridge connection
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// host:port of the JSON-lines bridge
    #[serde(default = "default_bridge_address")]
    pub address: String,
}

fn default_bridge_address() -> String {
    "127.0.0.1:25580".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: default_bridge_address(),
        }
    }
}

/// Path execution timings
#[derive(Debug, Clone, Deserialize)]
pub struct NavigationConfig {
    /// Chunk-arrival poll interval (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause after the last hop before returning (milliseconds)
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_portal_attempts")]
    pub portal_attempts: u32,
    /// First portal backoff (milliseconds)
    #[serde(default = "default_portal_backoff_base_ms")]
    pub portal_backoff_base_ms: u64,
    /// Added to the backoff on each further attempt (milliseconds)
    #[serde(default = "default_portal_backoff_step_ms")]
    pub portal_backoff_step_ms: u64,
    /// How long each attempt waits for the world to change (milliseconds)
    #[serde(default = "default_portal_wait_ms")]
    pub portal_wait_ms: u64,
    /// Unset means wait for chunks forever
    #[serde(default)]
    pub max_chunk_wait_polls: Option<u32>,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_settle_ms() -> u64 {
    100
}

fn default_portal_attempts() -> u32 {
    3
}

fn default_portal_backoff_base_ms() -> u64 {
    700
}

fn default_portal_backoff_step_ms() -> u64 {
    750
}

fn default_portal_wait_ms() -> u64 {
    3000
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            settle_ms: default_settle_ms(),
            portal_attempts: default_portal_attempts(),
            portal_backoff_base_ms: default_portal_backoff_base_ms(),
            portal_backoff_step_ms: default_portal_backoff_step_ms(),
            portal_wait_ms: default_portal_wait_ms(),
            max_chunk_wait_polls: None,
        }
    }
}

impl NavigationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Backoff before the given (zero-based) portal attempt.
    pub fn portal_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(
            self.portal_backoff_base_ms + self.portal_backoff_step_ms * attempt as u64,
        )
    }

    pub fn portal_wait(&self) -> Duration {
        Duration::from_millis(self.portal_wait_ms)
    }
}

/// Container open behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryConfig {
    /// How long one interact waits for the content snapshot (milliseconds)
    #[serde(default = "default_open_attempt_timeout_ms")]
    pub open_attempt_timeout_ms: u64,
    /// Unset means retry the interact forever
    #[serde(default)]
    pub max_open_attempts: Option<u32>,
    #[serde(default = "default_chunk_poll_interval_ms")]
    pub chunk_poll_interval_ms: u64,
    /// Polls of the container's chunk before giving up; unset waits forever
    #[serde(default)]
    pub max_chunk_wait_polls: Option<u32>,
}

fn default_open_attempt_timeout_ms() -> u64 {
    1000
}

fn default_chunk_poll_interval_ms() -> u64 {
    100
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            open_attempt_timeout_ms: default_open_attempt_timeout_ms(),
            max_open_attempts: None,
            chunk_poll_interval_ms: default_chunk_poll_interval_ms(),
            max_chunk_wait_polls: None,
        }
    }
}

impl InventoryConfig {
    pub fn open_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.open_attempt_timeout_ms)
    }

    pub fn chunk_poll_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_poll_interval_ms)
    }
}

/// Lower bound applied by the background timers to any period they are given.
pub const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// Agent loop and background timer schedule
#[derive(Debug, Clone, Deserialize)]
pub struct LoopConfig {
    #[serde(default = "default_ready_poll_ms")]
    pub ready_poll_ms: u64,
    #[serde(default = "default_idle_sleep_ms")]
    pub idle_sleep_ms: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_sign_upload_interval_secs")]
    pub sign_upload_interval_secs: u64,
}

fn default_ready_poll_ms() -> u64 {
    500
}

fn default_idle_sleep_ms() -> u64 {
    1000
}

fn default_heartbeat_interval_secs() -> u64 {
    15
}

fn default_sign_upload_interval_secs() -> u64 {
    5
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            ready_poll_ms: default_ready_poll_ms(),
            idle_sleep_ms: default_idle_sleep_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            sign_upload_interval_secs: default_sign_upload_interval_secs(),
        }
    }
}

impl LoopConfig {
    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    /// Never shorter than one second; zero is treated as one.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn sign_upload_interval(&self) -> Duration {
        Duration::from_secs(self.sign_upload_interval_secs.max(1))
    }
}

/// Shulker station timings
#[derive(Debug, Clone, Deserialize)]
pub struct ShulkerConfig {
    /// Pause after placing the box and after pressing the button (milliseconds)
    #[serde(default = "default_shulker_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_return_poll_attempts")]
    pub return_poll_attempts: u32,
    #[serde(default = "default_return_poll_interval_ms")]
    pub return_poll_interval_ms: u64,
}

fn default_shulker_settle_ms() -> u64 {
    250
}

fn default_return_poll_attempts() -> u32 {
    20
}

fn default_return_poll_interval_ms() -> u64 {
    50
}

impl Default for ShulkerConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_shulker_settle_ms(),
            return_poll_attempts: default_return_poll_attempts(),
            return_poll_interval_ms: default_return_poll_interval_ms(),
        }
    }
}

impl ShulkerConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn return_poll_interval(&self) -> Duration {
        Duration::from_millis(self.return_poll_interval_ms)
    }
}

/// Sign scan timings
#[derive(Debug, Clone, Deserialize)]
pub struct SignsConfig {
    /// A scan is finished once no chunk arrived for this long (milliseconds)
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
    #[serde(default = "default_initial_wait_ms")]
    pub initial_wait_ms: u64,
    #[serde(default = "default_signs_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_quiet_period_ms() -> u64 {
    1000
}

fn default_initial_wait_ms() -> u64 {
    1000
}

fn default_signs_poll_interval_ms() -> u64 {
    500
}

impl Default for SignsConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period_ms(),
            initial_wait_ms: default_initial_wait_ms(),
            poll_interval_ms: default_signs_poll_interval_ms(),
        }
    }
}

impl SignsConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn initial_wait(&self) -> Duration {
        Duration::from_millis(self.initial_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

const ENV_PREFIX: &str = "SORTING_AGENT_";

impl AgentConfig {
    /// Override from `SORTING_AGENT_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok());
    }

    /// Override from any key lookup. Keys are the env names without prefix.
    /// Unparseable numbers and zero timer periods are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("COORDINATOR_ENDPOINT") {
            self.coordinator.endpoint = v;
        }
        if let Some(v) = lookup("API_KEY") {
            self.coordinator.api_key = v;
        }
        if let Some(v) = lookup("BRIDGE_ADDRESS") {
            self.bridge.address = v;
        }
        if let Some(n) = lookup("HEARTBEAT_INTERVAL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|n| *n > 0)
        {
            self.agent.heartbeat_interval_secs = n;
        }
        if let Some(n) = lookup("SIGN_UPLOAD_INTERVAL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|n| *n > 0)
        {
            self.agent.sign_upload_interval_secs = n;
        }
        if let Some(n) = lookup("MAX_OPEN_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.inventory.max_open_attempts = Some(n);
        }
        if let Some(n) = lookup("MAX_CHUNK_WAIT_POLLS").and_then(|v| v.parse().ok()) {
            self.navigation.max_chunk_wait_polls = Some(n);
            self.inventory.max_chunk_wait_polls = Some(n);
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<AgentConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: AgentConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

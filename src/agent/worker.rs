use super::home_location;
use crate::config::LoopConfig;
use crate::coordinator::Coordinator;
use crate::pose::PoseTracker;
use crate::tasks::TaskExecutor;
use crate::types::OperationStatus;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Where the worker is in its poll/execute cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    WaitingReady,
    ClearingCarry,
    Polling,
    Idle,
    Executing,
}

/// Sequential worker: one operation at a time, the way a single player in
/// the world can only do one thing at a time.
pub struct AgentLoop {
    tasks: TaskExecutor,
    pose: Arc<PoseTracker>,
    coordinator: Arc<dyn Coordinator>,
    config: LoopConfig,
    phase: LoopPhase,
    at_home: bool,
}

impl AgentLoop {
    pub fn new(
        tasks: TaskExecutor,
        pose: Arc<PoseTracker>,
        coordinator: Arc<dyn Coordinator>,
        config: LoopConfig,
    ) -> Self {
        Self {
            tasks,
            pose,
            coordinator,
            config,
            phase: LoopPhase::WaitingReady,
            at_home: false,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// Run until the task is aborted.
    pub async fn run(mut self) {
        info!("Agent loop started");
        loop {
            if let Err(e) = self.iterate().await {
                error!(error = ?e, phase = ?self.phase, "Agent loop iteration failed");
                let description = format!("agent loop error: {:#}", e);
                if let Err(alert_err) = self.coordinator.alert(&description).await {
                    warn!(error = %alert_err, "Failed to raise alert");
                }
                sleep(self.config.idle_sleep()).await;
            }
        }
    }

    /// One pass of the cycle. Returns the phase the pass ended in.
    pub async fn iterate(&mut self) -> Result<LoopPhase> {
        self.phase = LoopPhase::WaitingReady;
        if !self.pose.is_ready() {
            sleep(self.config.ready_poll()).await;
            return Ok(self.phase);
        }

        self.phase = LoopPhase::ClearingCarry;
        let cleared = match self.tasks.clear_inventory().await {
            Ok(cleared) => cleared,
            Err(e) => {
                warn!(error = %e, "Failed to clear carry inventory");
                false
            }
        };

        self.phase = LoopPhase::Polling;
        let location = self.pose.current_location();
        let operation = self
            .coordinator
            .poll_operation(location, cleared)
            .await
            .context("Failed to poll for operations")?;

        let Some(operation) = operation else {
            self.phase = LoopPhase::Idle;
            if !self.at_home {
                match self.go_home().await {
                    Ok(()) => self.at_home = true,
                    Err(e) => warn!(error = %e, "Failed to navigate home"),
                }
            }
            sleep(self.config.idle_sleep()).await;
            return Ok(self.phase);
        };

        self.at_home = false;
        self.phase = LoopPhase::Executing;
        info!(
            operation_id = %operation.id,
            kind = operation.kind.name(),
            "Acquired operation"
        );

        let status = match self.tasks.execute(&operation.kind).await {
            Ok(()) => OperationStatus::Complete,
            Err(e) => {
                error!(operation_id = %operation.id, error = ?e, "Operation aborted");
                OperationStatus::Aborted
            }
        };

        self.coordinator
            .operation_complete(&operation.id, status)
            .await
            .with_context(|| format!("Failed to report operation {}", operation.id))?;
        info!(operation_id = %operation.id, status = ?status, "Operation finished");

        Ok(self.phase)
    }

    async fn go_home(&self) -> Result<()> {
        let sign_config = self
            .coordinator
            .sign_config()
            .await
            .context("Failed to fetch sign config")?;
        if let Some(home) = home_location(&sign_config) {
            info!(home = %home, "Returning home");
            self.tasks.navigator().navigate_to(home).await?;
        }
        Ok(())
    }
}

use super::{run_event_pump, run_heartbeat_loop, AgentLoop, EventRouter};
use crate::config::AgentConfig;
use crate::coordinator::Coordinator;
use crate::inventory::ContainerEngine;
use crate::navigation::PathExecutor;
use crate::pose::PoseTracker;
use crate::session::{CommandSink, SessionEvent};
use crate::signs::{run_upload_loop, SignCollector};
use crate::tasks::TaskExecutor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Wires the components over one session and owns their tasks.
///
/// Four tasks run: the event pump, the worker loop, the heartbeat timer and
/// the sign upload timer. Shutdown aborts all of them; an in-flight
/// operation is abandoned at its next await point.
pub struct AgentRuntime {
    pose: Arc<PoseTracker>,
    engine: Arc<ContainerEngine>,
    signs: Arc<SignCollector>,
    pump: Option<JoinHandle<String>>,
    background: Vec<JoinHandle<()>>,
}

impl AgentRuntime {
    pub fn start(
        config: AgentConfig,
        coordinator: Arc<dyn Coordinator>,
        sink: Arc<dyn CommandSink>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Self {
        let pose = Arc::new(PoseTracker::new(Arc::clone(&sink)));
        let engine = Arc::new(ContainerEngine::new(
            Arc::clone(&sink),
            config.inventory.clone(),
        ));
        let signs = Arc::new(SignCollector::new());
        let router = Arc::new(EventRouter::new(
            Arc::clone(&pose),
            Arc::clone(&engine),
            Arc::clone(&signs),
            Arc::clone(&sink),
        ));

        let navigator = Arc::new(PathExecutor::new(
            Arc::clone(&pose),
            Arc::clone(&coordinator),
            config.navigation.clone(),
        ));
        let tasks = TaskExecutor::new(
            navigator,
            Arc::clone(&engine),
            Arc::clone(&signs),
            Arc::clone(&coordinator),
            sink,
            config.clone(),
        );
        let worker = AgentLoop::new(
            tasks,
            Arc::clone(&pose),
            Arc::clone(&coordinator),
            config.agent.clone(),
        );

        let pump = tokio::spawn(run_event_pump(router, events));
        let background = vec![
            tokio::spawn(worker.run()),
            tokio::spawn(run_heartbeat_loop(
                Arc::clone(&coordinator),
                config.agent.heartbeat_interval(),
            )),
            tokio::spawn(run_upload_loop(
                Arc::clone(&signs),
                coordinator,
                config.agent.sign_upload_interval(),
            )),
        ];
        info!("Agent runtime started");

        Self {
            pose,
            engine,
            signs,
            pump: Some(pump),
            background,
        }
    }

    pub fn pose(&self) -> &Arc<PoseTracker> {
        &self.pose
    }

    pub fn engine(&self) -> &Arc<ContainerEngine> {
        &self.engine
    }

    pub fn signs(&self) -> &Arc<SignCollector> {
        &self.signs
    }

    /// Wait for the session to end. Returns the disconnect reason.
    pub async fn wait_for_disconnect(&mut self) -> String {
        match self.pump.take() {
            Some(pump) => pump
                .await
                .unwrap_or_else(|e| format!("event pump stopped: {}", e)),
            None => "event pump already stopped".to_string(),
        }
    }

    /// Abort every task. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        let count = self.background.len();
        for handle in self.background.drain(..) {
            handle.abort();
        }
        if count > 0 {
            info!(tasks = count, "Agent runtime stopped");
        }
    }
}

impl Drop for AgentRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

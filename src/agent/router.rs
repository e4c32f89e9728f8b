use crate::inventory::ContainerEngine;
use crate::pose::PoseTracker;
use crate::session::{Command, CommandSink, SessionEvent};
use crate::signs::SignCollector;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Chunks per tick requested when acknowledging a chunk batch.
const CHUNKS_PER_TICK: f32 = 5.0;

/// Fans session events out to the components that consume them.
pub struct EventRouter {
    pose: Arc<PoseTracker>,
    engine: Arc<ContainerEngine>,
    signs: Arc<SignCollector>,
    sink: Arc<dyn CommandSink>,
}

impl EventRouter {
    pub fn new(
        pose: Arc<PoseTracker>,
        engine: Arc<ContainerEngine>,
        signs: Arc<SignCollector>,
        sink: Arc<dyn CommandSink>,
    ) -> Self {
        Self {
            pose,
            engine,
            signs,
            sink,
        }
    }

    pub fn route(&self, event: SessionEvent) {
        match event {
            SessionEvent::WorldChange { world, death } => {
                self.pose.on_world_change(&world, death.as_ref())
            }
            SessionEvent::PositionUpdate {
                x,
                y,
                z,
                relative,
                teleport_id,
            } => self.pose.on_position_update(x, y, z, relative, teleport_id),
            SessionEvent::ChunkLoad { cx, cz, signs } => {
                self.pose.on_chunk_load(cx, cz);
                self.signs.record_chunk(cx, cz, &signs, self.pose.world());
            }
            SessionEvent::ChunkForget { cx, cz } => self.pose.on_chunk_forget(cx, cz),
            SessionEvent::ChunkBatchFinished => {
                // The server holds further chunks until the batch is acknowledged
                self.sink.send(Command::ChunkBatchReceived {
                    chunks_per_tick: CHUNKS_PER_TICK,
                });
            }
            SessionEvent::ContainerOpen { container_id, kind } => {
                self.engine.on_container_open(container_id, kind)
            }
            SessionEvent::ContainerContent {
                container_id,
                state_seq,
                slots,
            } => self
                .engine
                .on_container_content(container_id, state_seq, &slots),
            SessionEvent::ContainerSlot {
                container_id,
                state_seq,
                slot,
                item,
            } => self
                .engine
                .on_container_slot(container_id, state_seq, slot, item),
            SessionEvent::ContainerClose { container_id } => {
                self.engine.on_container_close(container_id)
            }
            SessionEvent::CombatDeath => self.pose.on_combat_death(),
            SessionEvent::Disconnected { reason } => {
                warn!(reason = %reason, "Session disconnected")
            }
        }
    }
}

/// Route events until the session disconnects. Returns the reason.
pub async fn run_event_pump(
    router: Arc<EventRouter>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) -> String {
    while let Some(event) = events.recv().await {
        if let SessionEvent::Disconnected { reason } = event {
            return reason;
        }
        router.route(event);
    }
    debug!("Event stream ended");
    "event stream closed".to_string()
}

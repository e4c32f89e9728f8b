//! Test doubles: a scripted game server and an in-memory coordinator.
//!
//! `FakeServer` answers commands the way a real server would (chunks after
//! movement, window content after an interaction, slot updates after a drop)
//! and keeps its own model of the world, independent of the agent's shadow.

use crate::agent::EventRouter;
use crate::config::{
    AgentConfig, InventoryConfig, LoopConfig, NavigationConfig, ShulkerConfig, SignsConfig,
};
use crate::coordinator::{Coordinator, PathfindingResponse};
use crate::inventory::ContainerEngine;
use crate::navigation::PathExecutor;
use crate::pose::{ChunkKey, PoseTracker};
use crate::session::{Command, CommandSink, ContainerKind, RelativeFlags, SessionEvent, SignEntity};
use crate::signs::SignCollector;
use crate::tasks::TaskExecutor;
use crate::types::{
    Dimension, Hold, ItemStack, Location, Operation, OperationStatus, PathNode, ScanRegion, Slot,
    Vec3,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn overworld(x: i32, y: i32, z: i32) -> Location {
    Location::new(Vec3::new(x, y, z), Dimension::Overworld)
}

pub(crate) fn stack(item_id: i32, count: u32) -> Slot {
    Some(ItemStack::new(item_id, count))
}

/// Hold on an overworld container, opened from the block above it.
pub(crate) fn hold(id: &str, container: Vec3, slot: u32) -> Hold {
    Hold {
        id: id.to_string(),
        location: Location::new(container, Dimension::Overworld),
        slot,
        valid_until: chrono::Utc::now() + chrono::Duration::hours(1),
        open_from: container.offset(0, 1, 0),
    }
}

/// Millisecond-scale timings with every wait bounded.
pub(crate) fn fast_config() -> AgentConfig {
    AgentConfig {
        navigation: NavigationConfig {
            poll_interval_ms: 1,
            settle_ms: 0,
            portal_attempts: 3,
            portal_backoff_base_ms: 1,
            portal_backoff_step_ms: 1,
            portal_wait_ms: 20,
            max_chunk_wait_polls: Some(50),
        },
        inventory: InventoryConfig {
            open_attempt_timeout_ms: 50,
            max_open_attempts: Some(3),
            chunk_poll_interval_ms: 1,
            max_chunk_wait_polls: Some(50),
        },
        agent: LoopConfig {
            ready_poll_ms: 5,
            idle_sleep_ms: 5,
            heartbeat_interval_secs: 1,
            sign_upload_interval_secs: 1,
        },
        shulker: ShulkerConfig {
            settle_ms: 1,
            return_poll_attempts: 5,
            return_poll_interval_ms: 2,
        },
        signs: SignsConfig {
            quiet_period_ms: 20,
            initial_wait_ms: 5,
            poll_interval_ms: 5,
        },
        ..AgentConfig::default()
    }
}

/// Sink that only records.
#[derive(Default)]
pub(crate) struct RecordingSink {
    commands: Mutex<Vec<Command>>,
}

impl RecordingSink {
    pub fn commands(&self) -> Vec<Command> {
        lock(&self.commands).clone()
    }

    pub fn clear(&self) {
        lock(&self.commands).clear();
    }
}

impl CommandSink for RecordingSink {
    fn send(&self, command: Command) {
        lock(&self.commands).push(command);
    }
}

struct FakeContainer {
    kind: ContainerKind,
    slots: Vec<Slot>,
}

struct FakeWorld {
    world_name: String,
    carry: Vec<Slot>,
    containers: HashMap<Vec3, FakeContainer>,
    /// (window id, container position)
    open: Option<(i32, Vec3)>,
    next_window: i32,
    state_seq: i32,
    next_teleport: i32,
    load_chunks: bool,
    /// entry block -> (destination world, exit block)
    portals: HashMap<Vec3, (String, Vec3)>,
    /// button block -> station block it retracts
    buttons: HashMap<Vec3, Vec3>,
    held_slot: u8,
    placed: Option<(Vec3, ItemStack)>,
    shulker_contents: Option<Vec<Slot>>,
    chunk_signs: HashMap<ChunkKey, Vec<SignEntity>>,
    dropped: Vec<ItemStack>,
}

impl FakeWorld {
    fn bump_seq(&mut self) -> i32 {
        self.state_seq += 1;
        self.state_seq
    }

    fn chunk_load(&self, x: i32, z: i32) -> SessionEvent {
        let key = ChunkKey::containing(x, z);
        SessionEvent::ChunkLoad {
            cx: key.cx,
            cz: key.cz,
            signs: self.chunk_signs.get(&key).cloned().unwrap_or_default(),
        }
    }

    fn carry_window(&mut self) -> SessionEvent {
        let mut slots = vec![None; 9];
        slots.extend(self.carry.iter().cloned());
        SessionEvent::ContainerContent {
            container_id: 0,
            state_seq: self.bump_seq(),
            slots,
        }
    }

    fn react(&mut self, command: &Command) -> Vec<SessionEvent> {
        match command {
            Command::MoveTo { x, y, z, .. } => {
                let block = Vec3::new(x.floor() as i32, y.floor() as i32, z.floor() as i32);
                if let Some((world, exit)) = self.portals.get(&block).cloned() {
                    if world != self.world_name {
                        self.world_name = world.clone();
                        self.next_teleport += 1;
                        return vec![
                            SessionEvent::WorldChange { world, death: None },
                            SessionEvent::PositionUpdate {
                                x: exit.x as f64 + 0.5,
                                y: exit.y as f64,
                                z: exit.z as f64 + 0.5,
                                relative: RelativeFlags::NONE,
                                teleport_id: self.next_teleport,
                            },
                            self.chunk_load(exit.x, exit.z),
                        ];
                    }
                }
                if self.load_chunks {
                    vec![self.chunk_load(block.x, block.z)]
                } else {
                    vec![]
                }
            }
            Command::InteractBlock { pos, sequence, .. } => {
                if *sequence == 0 {
                    self.open_container(*pos)
                } else if let Some(station) = self.buttons.get(pos).copied() {
                    self.press_button(station)
                } else {
                    self.place_held(pos.offset(0, -1, 0));
                    vec![]
                }
            }
            Command::SetHeldSlot { slot } => {
                self.held_slot = *slot;
                vec![]
            }
            Command::ClickSlot { changed, .. } => {
                for (raw, item) in changed {
                    let raw = *raw as usize;
                    if raw < 27 {
                        if let Some((_, pos)) = self.open {
                            if let Some(container) = self.containers.get_mut(&pos) {
                                container.slots[raw] = item.clone();
                            }
                        }
                    } else if raw < 63 {
                        self.carry[raw - 27] = item.clone();
                    }
                }
                vec![]
            }
            Command::DropStack { slot, .. } => {
                let index = *slot as usize - 9;
                if let Some(item) = self.carry[index].take() {
                    self.dropped.push(item);
                }
                vec![SessionEvent::ContainerSlot {
                    container_id: 0,
                    state_seq: self.bump_seq(),
                    slot: *slot,
                    item: None,
                }]
            }
            Command::CloseContainer { container_id } => {
                if matches!(self.open, Some((id, _)) if id == *container_id) {
                    self.open = None;
                }
                vec![]
            }
            Command::ClientInformation { .. } => self
                .chunk_signs
                .iter()
                .map(|(key, signs)| SessionEvent::ChunkLoad {
                    cx: key.cx,
                    cz: key.cz,
                    signs: signs.clone(),
                })
                .collect(),
            Command::Respawn => {
                self.next_teleport += 1;
                vec![
                    SessionEvent::WorldChange {
                        world: self.world_name.clone(),
                        death: None,
                    },
                    SessionEvent::PositionUpdate {
                        x: 0.5,
                        y: 64.0,
                        z: 0.5,
                        relative: RelativeFlags::NONE,
                        teleport_id: self.next_teleport,
                    },
                    self.chunk_load(0, 0),
                ]
            }
            Command::AcceptTeleport { .. }
            | Command::SetRotation { .. }
            | Command::ChunkBatchReceived { .. } => vec![],
        }
    }

    fn open_container(&mut self, pos: Vec3) -> Vec<SessionEvent> {
        let Some(container) = self.containers.get(&pos) else {
            return vec![];
        };
        let kind = container.kind;
        let mut slots = container.slots.clone();
        slots.extend(self.carry.iter().cloned());

        let container_id = self.next_window;
        self.next_window = self.next_window % 100 + 1;
        self.open = Some((container_id, pos));

        vec![
            SessionEvent::ContainerOpen { container_id, kind },
            SessionEvent::ContainerContent {
                container_id,
                state_seq: self.bump_seq(),
                slots,
            },
        ]
    }

    fn place_held(&mut self, block: Vec3) {
        let index = 27 + self.held_slot as usize;
        if let Some(item) = self.carry[index].take() {
            let slots = self
                .shulker_contents
                .take()
                .unwrap_or_else(|| vec![None; 27]);
            self.containers.insert(
                block,
                FakeContainer {
                    kind: ContainerKind::ShulkerBox,
                    slots,
                },
            );
            self.placed = Some((block, item));
        }
    }

    fn press_button(&mut self, station: Vec3) -> Vec<SessionEvent> {
        match self.placed.take() {
            Some((block, item)) if block == station => {
                if let Some(container) = self.containers.remove(&block) {
                    self.shulker_contents = Some(container.slots);
                }
                self.carry[27] = Some(item.clone());
                vec![SessionEvent::ContainerSlot {
                    container_id: 0,
                    state_seq: self.bump_seq(),
                    slot: 36,
                    item: Some(item),
                }]
            }
            other => {
                self.placed = other;
                vec![]
            }
        }
    }
}

/// Scripted game server; doubles as the agent's command sink.
pub(crate) struct FakeServer {
    world: Mutex<FakeWorld>,
    commands: Mutex<Vec<Command>>,
    router: OnceLock<Weak<EventRouter>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            world: Mutex::new(FakeWorld {
                world_name: "minecraft:overworld".to_string(),
                carry: vec![None; 36],
                containers: HashMap::new(),
                open: None,
                next_window: 1,
                state_seq: 0,
                next_teleport: 0,
                load_chunks: true,
                portals: HashMap::new(),
                buttons: HashMap::new(),
                held_slot: 0,
                placed: None,
                shulker_contents: None,
                chunk_signs: HashMap::new(),
                dropped: Vec::new(),
            }),
            commands: Mutex::new(Vec::new()),
            router: OnceLock::new(),
        }
    }

    pub fn attach(&self, router: &Arc<EventRouter>) {
        let _ = self.router.set(Arc::downgrade(router));
    }

    /// Push an event to the agent as if it came off the wire.
    pub fn deliver(&self, event: SessionEvent) {
        if let Some(router) = self.router.get().and_then(Weak::upgrade) {
            router.route(event);
        }
    }

    /// Join the world at the given position and send the carry inventory.
    pub fn login(&self, x: f64, y: f64, z: f64) {
        let events = {
            let mut world = lock(&self.world);
            world.next_teleport += 1;
            vec![
                SessionEvent::WorldChange {
                    world: world.world_name.clone(),
                    death: None,
                },
                SessionEvent::PositionUpdate {
                    x,
                    y,
                    z,
                    relative: RelativeFlags::NONE,
                    teleport_id: world.next_teleport,
                },
                world.chunk_load(x.floor() as i32, z.floor() as i32),
                world.carry_window(),
            ]
        };
        for event in events {
            self.deliver(event);
        }
    }

    pub fn add_container(&self, pos: Vec3, slots: Vec<Slot>) {
        self.add_container_of(pos, ContainerKind::Generic9x3, slots);
    }

    pub fn add_container_of(&self, pos: Vec3, kind: ContainerKind, mut slots: Vec<Slot>) {
        slots.resize(27, None);
        lock(&self.world)
            .containers
            .insert(pos, FakeContainer { kind, slots });
    }

    pub fn set_carry_slot(&self, slot: usize, item: Slot) {
        lock(&self.world).carry[slot] = item;
    }

    pub fn add_portal(&self, entry: Vec3, destination_world: &str, exit: Vec3) {
        lock(&self.world)
            .portals
            .insert(entry, (destination_world.to_string(), exit));
    }

    pub fn add_button(&self, button: Vec3, station: Vec3) {
        lock(&self.world).buttons.insert(button, station);
    }

    pub fn set_load_chunks(&self, load: bool) {
        lock(&self.world).load_chunks = load;
    }

    pub fn add_chunk_signs(&self, cx: i32, cz: i32, signs: Vec<SignEntity>) {
        lock(&self.world)
            .chunk_signs
            .insert(ChunkKey::new(cx, cz), signs);
    }

    /// Contents the next placed shulker box will have.
    pub fn set_shulker_contents(&self, mut slots: Vec<Slot>) {
        slots.resize(27, None);
        lock(&self.world).shulker_contents = Some(slots);
    }

    /// Contents of the shulker box last broken at a station.
    pub fn stored_shulker(&self) -> Option<Vec<Slot>> {
        lock(&self.world).shulker_contents.clone()
    }

    pub fn container(&self, pos: Vec3) -> Option<Vec<Slot>> {
        lock(&self.world)
            .containers
            .get(&pos)
            .map(|c| c.slots.clone())
    }

    pub fn carry(&self) -> Vec<Slot> {
        lock(&self.world).carry.clone()
    }

    pub fn dropped(&self) -> Vec<ItemStack> {
        lock(&self.world).dropped.clone()
    }

    pub fn commands(&self) -> Vec<Command> {
        lock(&self.commands).clone()
    }

    pub fn clear_commands(&self) {
        lock(&self.commands).clear();
    }
}

impl CommandSink for FakeServer {
    fn send(&self, command: Command) {
        lock(&self.commands).push(command.clone());
        let events = lock(&self.world).react(&command);
        for event in events {
            self.deliver(event);
        }
    }
}

#[derive(Default)]
struct CoordinatorState {
    holds: HashMap<String, Hold>,
    free_holds: VecDeque<Hold>,
    operations: VecDeque<Operation>,
    routes: Vec<(Location, PathfindingResponse)>,
    path_requests: Vec<(Location, Location)>,
    scans: Vec<(Location, Vec<Slot>, Vec3)>,
    released: Vec<String>,
    completions: Vec<(String, OperationStatus)>,
    polls: Vec<(Location, bool)>,
    sign_batches: Vec<Vec<ScanRegion>>,
    fail_sign_uploads: bool,
    fail_heartbeats: bool,
    fail_polls: bool,
    heartbeats: usize,
    alerts: Vec<String>,
    sign_config: Option<Value>,
}

/// In-memory coordinator. Paths default to a single hop onto the target.
#[derive(Default)]
pub(crate) struct FakeCoordinator {
    state: Mutex<CoordinatorState>,
}

impl FakeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        lock(&self.state)
    }

    pub fn add_hold(&self, hold: Hold) {
        self.state().holds.insert(hold.id.clone(), hold);
    }

    pub fn push_free_hold(&self, hold: Hold) {
        self.state().free_holds.push_back(hold);
    }

    pub fn push_operation(&self, operation: Operation) {
        self.state().operations.push_back(operation);
    }

    pub fn set_route(&self, end: Location, response: PathfindingResponse) {
        self.state().routes.push((end, response));
    }

    pub fn fail_sign_uploads(&self, fail: bool) {
        self.state().fail_sign_uploads = fail;
    }

    pub fn fail_heartbeats(&self, fail: bool) {
        self.state().fail_heartbeats = fail;
    }

    pub fn fail_polls(&self, fail: bool) {
        self.state().fail_polls = fail;
    }

    pub fn set_sign_config(&self, config: Value) {
        self.state().sign_config = Some(config);
    }

    pub fn path_requests(&self) -> Vec<(Location, Location)> {
        self.state().path_requests.clone()
    }

    pub fn scans(&self) -> Vec<(Location, Vec<Slot>, Vec3)> {
        self.state().scans.clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.state().released.clone()
    }

    pub fn completions(&self) -> Vec<(String, OperationStatus)> {
        self.state().completions.clone()
    }

    pub fn polls(&self) -> Vec<(Location, bool)> {
        self.state().polls.clone()
    }

    pub fn sign_batches(&self) -> Vec<Vec<ScanRegion>> {
        self.state().sign_batches.clone()
    }

    pub fn heartbeats(&self) -> usize {
        self.state().heartbeats
    }

    pub fn alerts(&self) -> Vec<String> {
        self.state().alerts.clone()
    }
}

#[async_trait]
impl Coordinator for FakeCoordinator {
    async fn heartbeat(&self) -> Result<()> {
        let mut state = self.state();
        if state.fail_heartbeats {
            return Err(anyhow!("heartbeat rejected"));
        }
        state.heartbeats += 1;
        Ok(())
    }

    async fn alert(&self, description: &str) -> Result<()> {
        self.state().alerts.push(description.to_string());
        Ok(())
    }

    async fn poll_operation(
        &self,
        location: Location,
        has_clear_inventory: bool,
    ) -> Result<Option<Operation>> {
        let mut state = self.state();
        if state.fail_polls {
            return Err(anyhow!("coordinator unavailable"));
        }
        state.polls.push((location, has_clear_inventory));
        Ok(state.operations.pop_front())
    }

    async fn operation_complete(&self, operation_id: &str, status: OperationStatus) -> Result<()> {
        self.state()
            .completions
            .push((operation_id.to_string(), status));
        Ok(())
    }

    async fn inventory_scanned(
        &self,
        location: Location,
        slots: &[Slot],
        open_from: Vec3,
    ) -> Result<()> {
        self.state()
            .scans
            .push((location, slots.to_vec(), open_from));
        Ok(())
    }

    async fn get_hold(&self, hold_id: &str) -> Result<Hold> {
        self.state()
            .holds
            .get(hold_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown hold {}", hold_id))
    }

    async fn acquire_free_hold(&self) -> Result<Option<Hold>> {
        Ok(self.state().free_holds.pop_front())
    }

    async fn release_hold(&self, hold_id: &str) -> Result<()> {
        self.state().released.push(hold_id.to_string());
        Ok(())
    }

    async fn find_path(&self, start: Location, end: Location) -> Result<PathfindingResponse> {
        let mut state = self.state();
        state.path_requests.push((start, end));
        let routed = state
            .routes
            .iter()
            .find(|(target, _)| *target == end)
            .map(|(_, response)| response.clone());
        Ok(routed.unwrap_or(PathfindingResponse::PathFound {
            path: vec![PathNode::Vec(end.vec3)],
        }))
    }

    async fn send_sign_scan_data(&self, regions: &[ScanRegion]) -> Result<()> {
        let mut state = self.state();
        if state.fail_sign_uploads {
            return Err(anyhow!("sign upload rejected"));
        }
        state.sign_batches.push(regions.to_vec());
        Ok(())
    }

    async fn sign_config(&self) -> Result<Value> {
        Ok(self
            .state()
            .sign_config
            .clone()
            .unwrap_or_else(|| json!({ "complexes": {} })))
    }
}

/// Fully wired agent components over a `FakeServer` and `FakeCoordinator`.
pub(crate) struct TestRig {
    pub server: Arc<FakeServer>,
    pub coordinator: Arc<FakeCoordinator>,
    pub pose: Arc<PoseTracker>,
    pub engine: Arc<ContainerEngine>,
    pub signs: Arc<SignCollector>,
    pub router: Arc<EventRouter>,
    pub config: AgentConfig,
}

impl TestRig {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: AgentConfig) -> Self {
        let server = Arc::new(FakeServer::new());
        let sink: Arc<dyn CommandSink> = server.clone();
        let coordinator = Arc::new(FakeCoordinator::new());
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
            sink,
        ));
        server.attach(&router);

        Self {
            server,
            coordinator,
            pose,
            engine,
            signs,
            router,
            config,
        }
    }

    pub fn navigator(&self) -> Arc<PathExecutor> {
        Arc::new(PathExecutor::new(
            Arc::clone(&self.pose),
            self.coordinator.clone(),
            self.config.navigation.clone(),
        ))
    }

    pub fn executor(&self) -> TaskExecutor {
        let sink: Arc<dyn CommandSink> = self.server.clone();
        TaskExecutor::new(
            self.navigator(),
            Arc::clone(&self.engine),
            Arc::clone(&self.signs),
            self.coordinator.clone(),
            sink,
            self.config.clone(),
        )
    }
}

use super::error::{InventoryError, SlotArea};
use crate::config::InventoryConfig;
use crate::pose::PoseTracker;
use crate::session::{BlockFace, ClickAction, Command, CommandSink, ContainerKind};
use crate::types::{ItemStack, Slot, Vec3};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const CONTAINER_SLOTS: usize = 27;
pub const CARRY_SLOTS: usize = 36;
/// First carry slot of the quick-access row.
pub const HOTBAR_START: usize = 27;
pub const HOTBAR_SLOTS: usize = 9;
/// Largest stack a single slot can hold; anything above is a corrupt count.
pub const MAX_STACK_SIZE: u32 = 99;

/// Raw offset of carry slot 0 in the carry-only window (id 0).
const CARRY_WINDOW_OFFSET: usize = 9;

/// How many items a transfer moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Count {
    /// The entire source stack.
    All,
    Exactly(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToContainer,
    ToCarry,
}

/// Lifecycle of the tracked container window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerPhase {
    Closed,
    /// Accepted by the server, waiting for the content snapshot.
    Opening,
    Open,
}

struct EngineState {
    /// 0 when only the carry inventory is tracked.
    open_id: i32,
    state_seq: i32,
    container: Option<Vec<Slot>>,
    carry: Option<Vec<Slot>>,
}

impl EngineState {
    fn phase(&self) -> ContainerPhase {
        match (self.open_id, &self.container) {
            (0, _) => ContainerPhase::Closed,
            (_, None) => ContainerPhase::Opening,
            (_, Some(_)) => ContainerPhase::Open,
        }
    }

    fn reset(&mut self) {
        self.open_id = 0;
        self.container = None;
    }
}

/// Shadow of the carry inventory and the open container, plus the
/// open/close/transfer/drop primitives built on it.
///
/// Event handlers and the worker share the state through a mutex that is
/// never held while a command is sent. Content snapshots bump a watch
/// counter so `open_at` cannot miss one that arrives between its send and
/// its wait.
pub struct ContainerEngine {
    state: Mutex<EngineState>,
    sink: Arc<dyn CommandSink>,
    snapshots: watch::Sender<u64>,
    config: InventoryConfig,
}

impl ContainerEngine {
    pub fn new(sink: Arc<dyn CommandSink>, config: InventoryConfig) -> Self {
        let (snapshots, _) = watch::channel(0);
        Self {
            state: Mutex::new(EngineState {
                open_id: 0,
                state_seq: 0,
                container: None,
                carry: None,
            }),
            sink,
            snapshots,
            config,
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> ContainerPhase {
        self.state().phase()
    }

    /// Id of the tracked window, 0 when closed.
    pub fn open_container_id(&self) -> i32 {
        self.state().open_id
    }

    pub fn state_seq(&self) -> i32 {
        self.state().state_seq
    }

    pub fn carry_slots(&self) -> Option<Vec<Slot>> {
        self.state().carry.clone()
    }

    pub fn container_slots(&self) -> Option<Vec<Slot>> {
        self.state().container.clone()
    }

    /// Contents of one carry slot; `None` if empty, out of range or unknown.
    pub fn carry_slot(&self, slot: usize) -> Slot {
        self.state()
            .carry
            .as_ref()
            .and_then(|carry| carry.get(slot).cloned().flatten())
    }

    pub fn container_slot(&self, slot: usize) -> Slot {
        self.state()
            .container
            .as_ref()
            .and_then(|container| container.get(slot).cloned().flatten())
    }

    // --- session events ---

    pub fn on_container_open(&self, container_id: i32, kind: ContainerKind) {
        if !kind.is_supported() {
            warn!(container_id, ?kind, "Unsupported container opened, closing it");
            self.state().reset();
            self.sink.send(Command::CloseContainer { container_id });
            return;
        }

        let mut state = self.state();
        state.open_id = container_id;
        state.container = None;
        debug!(container_id, ?kind, "Container opening");
    }

    pub fn on_container_content(&self, container_id: i32, state_seq: i32, slots: &[Slot]) {
        {
            let mut state = self.state();
            if container_id != state.open_id {
                drop(state);
                warn!(container_id, "Content for an untracked container, closing");
                self.close_window();
                return;
            }

            if container_id == 0 {
                let Some(carry) = slots.get(CARRY_WINDOW_OFFSET..CARRY_WINDOW_OFFSET + CARRY_SLOTS)
                else {
                    warn!(len = slots.len(), "Short carry snapshot, ignoring");
                    return;
                };
                state.state_seq = state_seq;
                state.carry = Some(carry.to_vec());
            } else {
                if slots.len() < CONTAINER_SLOTS + CARRY_SLOTS {
                    warn!(container_id, len = slots.len(), "Short container snapshot, ignoring");
                    return;
                }
                state.state_seq = state_seq;
                state.container = Some(slots[..CONTAINER_SLOTS].to_vec());
                state.carry = Some(slots[CONTAINER_SLOTS..CONTAINER_SLOTS + CARRY_SLOTS].to_vec());
            }
        }

        self.snapshots.send_modify(|version| *version += 1);
    }

    pub fn on_container_slot(&self, container_id: i32, state_seq: i32, slot: i16, item: Slot) {
        let mut state = self.state();
        if container_id != state.open_id {
            drop(state);
            warn!(container_id, slot, "Slot update for an untracked container, closing");
            self.close_window();
            return;
        }

        state.state_seq = state_seq;

        // Negative slots are the cursor; crafting grid, armour and offhand
        // fall outside both arrays.
        let Ok(raw) = usize::try_from(slot) else {
            return;
        };

        let target = if container_id == 0 {
            match raw.checked_sub(CARRY_WINDOW_OFFSET) {
                Some(index) if index < CARRY_SLOTS => {
                    state.carry.as_mut().and_then(|carry| carry.get_mut(index))
                }
                _ => None,
            }
        } else if raw < CONTAINER_SLOTS {
            state.container.as_mut().and_then(|c| c.get_mut(raw))
        } else if raw - CONTAINER_SLOTS < CARRY_SLOTS {
            state
                .carry
                .as_mut()
                .and_then(|carry| carry.get_mut(raw - CONTAINER_SLOTS))
        } else {
            None
        };

        if let Some(entry) = target {
            *entry = item;
        }
    }

    pub fn on_container_close(&self, container_id: i32) {
        let mut state = self.state();
        if container_id != state.open_id {
            info!(
                container_id,
                tracked = state.open_id,
                "Server closed an untracked container, resetting"
            );
        }
        state.reset();
    }

    // --- primitives ---

    /// Close the tracked window. No-op when nothing is open.
    pub fn close_window(&self) {
        let container_id = self.state().open_id;
        if container_id == 0 {
            return;
        }

        self.sink.send(Command::CloseContainer { container_id });

        let mut state = self.state();
        if state.open_id == container_id {
            state.reset();
        }
        debug!(container_id, "Container closed");
    }

    /// Open the container block at `pos`.
    ///
    /// Closes whatever is open first, waits for the block's chunk, then
    /// interacts until a content snapshot for a non-zero window arrives.
    pub async fn open_at(&self, pos: Vec3, pose: &PoseTracker) -> Result<(), InventoryError> {
        info!(pos = %pos, "Opening container");
        self.close_window();

        let max_polls = self.config.max_chunk_wait_polls;
        if !pose
            .wait_for_chunk(pos.x, pos.z, self.config.chunk_poll_interval(), max_polls)
            .await
        {
            let polls = max_polls.unwrap_or_default();
            warn!(pos = %pos, polls, "Container chunk never loaded");
            return Err(InventoryError::ChunkNotLoaded { pos, polls });
        }

        let mut attempts = 0u32;
        loop {
            if let Some(limit) = self.config.max_open_attempts {
                if attempts >= limit {
                    return Err(InventoryError::OpenAttemptsExhausted { pos, attempts });
                }
            }
            attempts += 1;

            let mut snapshots = self.snapshots.subscribe();
            debug!(pos = %pos, attempt = attempts, "Sending open interaction");
            self.sink.send(Command::InteractBlock {
                pos,
                face: BlockFace::Down,
                sequence: 0,
            });

            let opened = tokio::time::timeout(self.config.open_attempt_timeout(), async {
                loop {
                    if self.phase() == ContainerPhase::Open {
                        return;
                    }
                    if snapshots.changed().await.is_err() {
                        return;
                    }
                }
            })
            .await;

            if opened.is_ok() && self.phase() == ContainerPhase::Open {
                info!(
                    pos = %pos,
                    container_id = self.open_container_id(),
                    attempts,
                    "Container opened"
                );
                return Ok(());
            }
        }
    }

    /// Move `count` items between a carry slot and a container slot.
    ///
    /// The stack is picked up whole, the surplus is put back into the source
    /// one unit at a time, and the remainder is placed onto the destination.
    /// The shadow is updated before the clicks leave, so the total item count
    /// is conserved at every step.
    pub fn transfer(
        &self,
        carry_slot: usize,
        container_slot: usize,
        count: Count,
        direction: Direction,
    ) -> Result<(), InventoryError> {
        let commands = {
            let mut state = self.state();
            if state.phase() != ContainerPhase::Open {
                return Err(InventoryError::ContainerNotOpen);
            }
            if state.carry.is_none() {
                return Err(InventoryError::InventoryNotPresent);
            }
            if carry_slot >= CARRY_SLOTS {
                return Err(InventoryError::SlotOutOfRange {
                    area: SlotArea::Carry,
                    slot: carry_slot,
                });
            }
            if container_slot >= CONTAINER_SLOTS {
                return Err(InventoryError::SlotOutOfRange {
                    area: SlotArea::Container,
                    slot: container_slot,
                });
            }

            let carry_raw = (CONTAINER_SLOTS + carry_slot) as i16;
            let container_raw = container_slot as i16;
            let (src_area, src_index, src_raw, dst_area, dst_index, dst_raw) = match direction {
                Direction::ToContainer => (
                    SlotArea::Carry,
                    carry_slot,
                    carry_raw,
                    SlotArea::Container,
                    container_slot,
                    container_raw,
                ),
                Direction::ToCarry => (
                    SlotArea::Container,
                    container_slot,
                    container_raw,
                    SlotArea::Carry,
                    carry_slot,
                    carry_raw,
                ),
            };

            let container_id = state.open_id;
            let state_seq = state.state_seq;
            let EngineState {
                container, carry, ..
            } = &mut *state;
            let (Some(container), Some(carry)) = (container.as_mut(), carry.as_mut()) else {
                return Err(InventoryError::ContainerNotOpen);
            };
            let (src, dst) = match direction {
                Direction::ToContainer => (&mut carry[carry_slot], &mut container[container_slot]),
                Direction::ToCarry => (&mut container[container_slot], &mut carry[carry_slot]),
            };

            let source = src.clone().ok_or(InventoryError::SlotEmpty {
                area: src_area,
                slot: src_index,
            })?;
            let total = source.count;
            if total > MAX_STACK_SIZE {
                return Err(InventoryError::StackTooLarge {
                    area: src_area,
                    slot: src_index,
                    count: total,
                });
            }
            let moving = match count {
                Count::All => total,
                Count::Exactly(0) => return Err(InventoryError::InvalidCount),
                Count::Exactly(n) if n > total => {
                    return Err(InventoryError::InsufficientCount {
                        area: src_area,
                        slot: src_index,
                        available: total,
                        requested: n,
                    })
                }
                Count::Exactly(n) => n,
            };

            let placed = match dst.as_ref() {
                Some(existing) => {
                    let merged = existing
                        .count
                        .checked_add(moving)
                        .filter(|n| *n <= MAX_STACK_SIZE)
                        .ok_or(InventoryError::StackOverflow {
                            area: dst_area,
                            slot: dst_index,
                            moving,
                        })?;
                    existing.with_count(merged)
                }
                None => source.with_count(moving),
            };

            let clicks = transfer_clicks(
                container_id,
                state_seq,
                &source,
                moving,
                src_raw,
                dst_raw,
                &placed,
            );

            *src = (moving < total).then(|| source.with_count(total - moving));
            *dst = Some(placed);

            debug!(
                container_id,
                carry_slot,
                container_slot,
                moving,
                ?direction,
                "Transferring items"
            );
            clicks
        };

        for command in commands {
            self.sink.send(command);
        }
        Ok(())
    }

    /// Drop a whole carry stack on the ground.
    ///
    /// Only possible from the carry-only view. Not confirmed; the shadow
    /// catches up through the slot update that follows.
    pub fn drop_items(&self, carry_slot: usize) -> Result<(), InventoryError> {
        let state_seq = {
            let state = self.state();
            if state.open_id != 0 {
                return Err(InventoryError::ContainerStillOpen {
                    container_id: state.open_id,
                });
            }
            let carry = state
                .carry
                .as_ref()
                .ok_or(InventoryError::InventoryNotPresent)?;
            let slot = carry.get(carry_slot).ok_or(InventoryError::SlotOutOfRange {
                area: SlotArea::Carry,
                slot: carry_slot,
            })?;
            if slot.is_none() {
                return Err(InventoryError::SlotEmpty {
                    area: SlotArea::Carry,
                    slot: carry_slot,
                });
            }
            state.state_seq
        };

        debug!(carry_slot, "Dropping stack");
        self.sink.send(Command::DropStack {
            container_id: 0,
            state_seq,
            slot: (CARRY_WINDOW_OFFSET + carry_slot) as i16,
        });
        Ok(())
    }

    /// Place the block held in quick-access slot `hotbar` at `target`.
    ///
    /// Interacts with the bottom face of the block above the target.
    pub fn place_from_hotbar(&self, hotbar: usize, target: Vec3) -> Result<(), InventoryError> {
        if hotbar >= HOTBAR_SLOTS {
            return Err(InventoryError::SlotOutOfRange {
                area: SlotArea::Carry,
                slot: HOTBAR_START + hotbar,
            });
        }
        let carry_slot = HOTBAR_START + hotbar;

        {
            let mut state = self.state();
            let carry = state
                .carry
                .as_mut()
                .ok_or(InventoryError::InventoryNotPresent)?;
            if carry[carry_slot].take().is_none() {
                return Err(InventoryError::SlotEmpty {
                    area: SlotArea::Carry,
                    slot: carry_slot,
                });
            }
        }

        info!(hotbar, target = %target, "Placing block");
        self.sink.send(Command::SetHeldSlot { slot: hotbar as u8 });
        self.sink.send(Command::InteractBlock {
            pos: target.offset(0, 1, 0),
            face: BlockFace::Down,
            sequence: 1,
        });
        Ok(())
    }
}

/// Click sequence for one transfer: take the whole stack, put back the
/// surplus one unit at a time, place the rest.
fn transfer_clicks(
    container_id: i32,
    state_seq: i32,
    source: &ItemStack,
    moving: u32,
    src_raw: i16,
    dst_raw: i16,
    placed: &ItemStack,
) -> Vec<Command> {
    let total = source.count;
    let mut commands = Vec::with_capacity((total - moving) as usize + 2);

    commands.push(Command::ClickSlot {
        container_id,
        state_seq,
        slot: src_raw,
        action: ClickAction::Left,
        carried: Some(source.clone()),
        changed: BTreeMap::from([(src_raw, None)]),
    });

    for returned in 1..=(total - moving) {
        commands.push(Command::ClickSlot {
            container_id,
            state_seq,
            slot: src_raw,
            action: ClickAction::Right,
            carried: Some(source.with_count(total - returned)),
            changed: BTreeMap::from([(src_raw, Some(source.with_count(returned)))]),
        });
    }

    commands.push(Command::ClickSlot {
        container_id,
        state_seq,
        slot: dst_raw,
        action: ClickAction::Left,
        carried: None,
        changed: BTreeMap::from([(dst_raw, Some(placed.clone()))]),
    });

    commands
}

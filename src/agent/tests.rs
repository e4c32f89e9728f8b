use super::*;
use crate::inventory::{ContainerEngine, ContainerPhase};
use crate::pose::PoseTracker;
use crate::session::{Command, ContainerKind, RelativeFlags, SessionEvent};
use crate::signs::SignCollector;
use crate::testing::{fast_config, hold, overworld, stack, FakeCoordinator, RecordingSink, TestRig};
use crate::types::{Operation, OperationKind, OperationStatus};
use serde_json::json;
use tokio::sync::mpsc;

fn worker(rig: &TestRig) -> AgentLoop {
    AgentLoop::new(
        rig.executor(),
        Arc::clone(&rig.pose),
        rig.coordinator.clone(),
        rig.config.agent.clone(),
    )
}

fn scan_operation(id: &str, container: Vec3) -> Operation {
    Operation {
        id: id.to_string(),
        priority: "Background".to_string(),
        status: "Pending".to_string(),
        kind: OperationKind::ScanInventory {
            location: Location::new(container, Dimension::Overworld),
            open_from: container.offset(0, 1, 0),
        },
    }
}

fn tower_config(x: i32, y: i32, z: i32) -> Value {
    json!({
        "complexes": {
            "main": {
                "Tower": {
                    "dimension": "Overworld",
                    "origin": {"x": x, "y": y, "z": z}
                }
            }
        }
    })
}

#[test]
fn test_home_from_tower() {
    assert_eq!(home_location(&tower_config(3, 70, -9)), Some(overworld(3, 70, -9)));
}

#[test]
fn test_home_from_flat_floor() {
    let config = json!({
        "complexes": {
            "floor": {
                "FlatFloor": {
                    "dimension": "TheNether",
                    "y_level": 40,
                    "bounds": [{"x": -10, "z": 5}, {"x": 10, "z": 25}]
                }
            }
        }
    });

    assert_eq!(
        home_location(&config),
        Some(Location::new(Vec3::new(-10, 41, 5), Dimension::TheNether))
    );
}

#[test]
fn test_no_home_without_complexes() {
    assert_eq!(home_location(&json!({"complexes": {}})), None);
    assert_eq!(home_location(&json!({})), None);
    assert_eq!(
        home_location(&json!({"complexes": {"x": {"Unknown": {}}}})),
        None
    );
}

#[tokio::test]
async fn test_waits_for_readiness() {
    let rig = TestRig::new();
    let mut agent = worker(&rig);

    assert_eq!(agent.iterate().await.unwrap(), LoopPhase::WaitingReady);
    assert!(rig.coordinator.polls().is_empty());
}

#[tokio::test]
async fn test_idle_goes_home_once() {
    let rig = TestRig::new();
    rig.server.login(0.5, 64.0, 0.5);
    rig.coordinator.set_sign_config(tower_config(8, 64, 8));
    let mut agent = worker(&rig);

    assert_eq!(agent.iterate().await.unwrap(), LoopPhase::Idle);
    assert_eq!(rig.pose.current_location(), overworld(8, 64, 8));
    assert_eq!(rig.coordinator.polls(), vec![(overworld(0, 64, 0), true)]);

    // Moved away while idle: home is not retaken
    rig.pose.assert_position(20.5, 64.0, 20.5);
    assert_eq!(agent.iterate().await.unwrap(), LoopPhase::Idle);
    assert_eq!(rig.pose.current_location(), overworld(20, 64, 20));
    assert_eq!(rig.coordinator.path_requests().len(), 1);
}

#[tokio::test]
async fn test_operation_reported_complete() {
    let rig = TestRig::new();
    rig.server.login(0.5, 64.0, 0.5);
    let chest = Vec3::new(4, 64, 4);
    rig.server.add_container(chest, vec![stack(1, 1)]);
    rig.coordinator.push_operation(scan_operation("op-1", chest));
    let mut agent = worker(&rig);

    assert_eq!(agent.iterate().await.unwrap(), LoopPhase::Executing);
    assert_eq!(
        rig.coordinator.completions(),
        vec![("op-1".to_string(), OperationStatus::Complete)]
    );
    assert_eq!(rig.coordinator.scans().len(), 1);
}

#[tokio::test]
async fn test_failed_operation_reported_aborted() {
    let rig = TestRig::new();
    rig.server.login(0.5, 64.0, 0.5);
    // Nothing to open at the scanned location
    rig.coordinator
        .push_operation(scan_operation("op-2", Vec3::new(4, 64, 4)));
    let mut agent = worker(&rig);

    assert_eq!(agent.iterate().await.unwrap(), LoopPhase::Executing);
    assert_eq!(
        rig.coordinator.completions(),
        vec![("op-2".to_string(), OperationStatus::Aborted)]
    );
}

#[tokio::test]
async fn test_home_retaken_after_operation() {
    let rig = TestRig::new();
    rig.server.login(0.5, 64.0, 0.5);
    rig.coordinator.set_sign_config(tower_config(8, 64, 8));
    let chest = Vec3::new(-6, 64, 3);
    rig.server.add_container(chest, vec![]);
    let mut agent = worker(&rig);

    agent.iterate().await.unwrap();
    rig.coordinator.push_operation(scan_operation("op-3", chest));
    assert_eq!(agent.iterate().await.unwrap(), LoopPhase::Executing);
    assert_eq!(agent.iterate().await.unwrap(), LoopPhase::Idle);

    assert_eq!(rig.pose.current_location(), overworld(8, 64, 8));
    let homeward = rig
        .coordinator
        .path_requests()
        .iter()
        .filter(|(_, end)| *end == overworld(8, 64, 8))
        .count();
    assert_eq!(homeward, 2);
}

#[tokio::test]
async fn test_poll_reports_uncleared_carry() {
    let rig = TestRig::new();
    rig.server.set_carry_slot(3, stack(5, 5));
    rig.server.login(0.5, 64.0, 0.5);
    let mut agent = worker(&rig);

    assert_eq!(agent.iterate().await.unwrap(), LoopPhase::Idle);
    assert_eq!(rig.coordinator.polls(), vec![(overworld(0, 64, 0), false)]);
}

#[tokio::test]
async fn test_clear_before_poll() {
    let rig = TestRig::new();
    rig.server.set_carry_slot(0, stack(5, 5));
    rig.server.login(0.5, 64.0, 0.5);
    let chest = Vec3::new(2, 64, 2);
    rig.server.add_container(chest, vec![]);
    rig.coordinator.push_free_hold(hold("free", chest, 0));
    let mut agent = worker(&rig);

    agent.iterate().await.unwrap();

    assert_eq!(rig.server.container(chest).unwrap()[0], stack(5, 5));
    assert!(rig.coordinator.polls()[0].1);
}

#[tokio::test]
async fn test_loop_error_raises_alert() {
    let rig = TestRig::new();
    rig.server.login(0.5, 64.0, 0.5);
    rig.coordinator.fail_polls(true);

    let handle = tokio::spawn(worker(&rig).run());
    tokio::time::sleep(Duration::from_millis(40)).await;
    handle.abort();

    let alerts = rig.coordinator.alerts();
    assert!(!alerts.is_empty());
    assert!(alerts[0].contains("coordinator unavailable"));
}

#[tokio::test]
async fn test_heartbeat_survives_failures() {
    let coordinator = Arc::new(FakeCoordinator::new());
    coordinator.fail_heartbeats(true);

    let handle = tokio::spawn(run_heartbeat_loop(
        coordinator.clone(),
        Duration::from_millis(5),
    ));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(coordinator.heartbeats(), 0);

    coordinator.fail_heartbeats(false);
    tokio::time::sleep(Duration::from_millis(40)).await;
    handle.abort();

    assert!(coordinator.heartbeats() >= 2);
}

#[tokio::test]
async fn test_runtime_polls_once_ready_and_stops_on_disconnect() {
    let sink = Arc::new(RecordingSink::default());
    let coordinator = Arc::new(FakeCoordinator::new());
    let (events, rx) = mpsc::unbounded_channel();

    let mut runtime = AgentRuntime::start(fast_config(), coordinator.clone(), sink.clone(), rx);

    events
        .send(SessionEvent::WorldChange {
            world: "minecraft:overworld".to_string(),
            death: None,
        })
        .unwrap();
    events
        .send(SessionEvent::PositionUpdate {
            x: 7.5,
            y: 64.0,
            z: 7.5,
            relative: RelativeFlags::NONE,
            teleport_id: 11,
        })
        .unwrap();

    for _ in 0..100 {
        if !coordinator.polls().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(coordinator.polls()[0], (overworld(7, 64, 7), true));
    assert!(runtime.pose().is_ready());
    assert!(sink
        .commands()
        .contains(&Command::AcceptTeleport { teleport_id: 11 }));

    events
        .send(SessionEvent::Disconnected {
            reason: "kicked".to_string(),
        })
        .unwrap();
    assert_eq!(runtime.wait_for_disconnect().await, "kicked");
    runtime.shutdown();
}

#[test]
fn test_router_acknowledges_chunk_batches_and_tracks_chunks() {
    let sink = Arc::new(RecordingSink::default());
    let pose = Arc::new(PoseTracker::new(sink.clone()));
    let engine = Arc::new(ContainerEngine::new(
        sink.clone(),
        fast_config().inventory.clone(),
    ));
    let signs = Arc::new(SignCollector::new());
    let router = EventRouter::new(pose.clone(), engine, signs.clone(), sink.clone());

    router.route(SessionEvent::ChunkLoad {
        cx: 2,
        cz: -1,
        signs: vec![],
    });
    router.route(SessionEvent::ChunkBatchFinished);

    assert!(pose.is_chunk_loaded_at(40, -3));
    assert_eq!(signs.pending_count(), 1);
    assert_eq!(
        sink.commands(),
        vec![Command::ChunkBatchReceived {
            chunks_per_tick: 5.0
        }]
    );
}

#[test]
fn test_router_survives_out_of_range_chunk() {
    let sink = Arc::new(RecordingSink::default());
    let pose = Arc::new(PoseTracker::new(sink.clone()));
    let engine = Arc::new(ContainerEngine::new(
        sink.clone(),
        fast_config().inventory.clone(),
    ));
    let signs = Arc::new(SignCollector::new());
    let router = EventRouter::new(pose.clone(), engine.clone(), signs.clone(), sink.clone());

    let event: SessionEvent =
        serde_json::from_value(json!({"event": "ChunkLoad", "cx": 200000000, "cz": 0})).unwrap();
    router.route(event);
    assert_eq!(signs.pending_count(), 0);

    // Later events are still handled
    router.route(SessionEvent::WorldChange {
        world: "minecraft:overworld".to_string(),
        death: None,
    });
    router.route(SessionEvent::PositionUpdate {
        x: 1.5,
        y: 64.0,
        z: 1.5,
        relative: RelativeFlags::NONE,
        teleport_id: 3,
    });
    router.route(SessionEvent::ChunkLoad {
        cx: 0,
        cz: 0,
        signs: vec![],
    });
    router.route(SessionEvent::ContainerOpen {
        container_id: 4,
        kind: ContainerKind::Generic9x3,
    });

    assert!(pose.is_ready());
    assert!(pose.is_chunk_loaded_at(1, 1));
    assert_eq!(signs.pending_count(), 1);
    assert_eq!(engine.phase(), ContainerPhase::Opening);
    assert_eq!(engine.open_container_id(), 4);
}

#[tokio::test]
async fn test_heartbeat_with_zero_period_keeps_running() {
    let coordinator = Arc::new(FakeCoordinator::new());

    let handle = tokio::spawn(run_heartbeat_loop(coordinator.clone(), Duration::ZERO));
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert!(!handle.is_finished());
    assert!(coordinator.heartbeats() >= 1);
    handle.abort();
}

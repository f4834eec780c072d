use std::sync::Arc;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;

use crate::builder::GraphBuilder;
use crate::config::ForceParams;
use crate::controller::{ControllerState, DragCommand, SimulationController};
use crate::core::GraphPayload;
use crate::embedding::HashingEmbedder;
use crate::simulation::SimulationPhase;
use crate::tests::init;
use crate::tests::test_data::make_records;

fn payload(n: usize) -> GraphPayload {
    GraphBuilder::new()
        .with_embedder(Arc::new(HashingEmbedder::new(64)))
        .build(&make_records(n, 21))
        .unwrap()
}

fn controller() -> SimulationController {
    SimulationController::new(ForceParams::default(), (500.0, 400.0))
}

#[test]
fn test_single_item_never_starts_a_simulator() {
    init();
    let now = Instant::now();
    let mut ctl = controller();
    assert!(!ctl.install(&payload(1), now));
    assert_eq!(ctl.state(), ControllerState::Idle);
    assert!(ctl.schedule().is_none());
    assert!(!ctl.resume(now));
}

#[test]
fn test_stale_tokens_are_ignored() {
    let now = Instant::now();
    let graph = payload(8);
    let mut ctl = controller();
    assert!(ctl.install(&graph, now));
    assert_eq!(ctl.state(), ControllerState::Active(SimulationPhase::Seeded));

    let old = ctl.schedule().unwrap();
    assert!(ctl.install(&graph, now));
    assert_eq!(ctl.tick(old, now), None);
    assert_eq!(ctl.simulator().unwrap().ticks(), 0);

    let fresh = ctl.schedule().unwrap();
    assert_eq!(fresh.generation(), ctl.generation());
    assert_eq!(ctl.tick(fresh, now), Some(SimulationPhase::Running));

    ctl.stop();
    assert_eq!(ctl.tick(fresh, now), None);
    assert_eq!(ctl.state(), ControllerState::Idle);
}

#[test]
fn test_drag_input_is_applied_at_the_next_tick() {
    let now = Instant::now();
    let mut ctl = controller();
    ctl.install(&payload(8), now);

    ctl.submit(DragCommand::Start { node: 0, x: 42.0, y: 24.0 });
    assert!(ctl.simulator().unwrap().nodes()[0].pinned.is_none());

    let token = ctl.schedule().unwrap();
    ctl.tick(token, now);
    let node = &ctl.simulator().unwrap().nodes()[0];
    assert_eq!(node.pinned, Some((42.0, 24.0)));
    assert_eq!((node.x, node.y), (42.0, 24.0));

    ctl.submit(DragCommand::Move { node: 0, x: 50.0, y: 60.0 });
    ctl.submit(DragCommand::Move { node: 0, x: 55.0, y: 65.0 });
    let token = ctl.schedule().unwrap();
    ctl.tick(token, now);
    let node = &ctl.simulator().unwrap().nodes()[0];
    assert_eq!((node.x, node.y), (55.0, 65.0));

    ctl.submit(DragCommand::End { node: 0 });
    let token = ctl.schedule().unwrap();
    ctl.tick(token, now);
    assert!(!ctl.simulator().unwrap().is_dragging());
}

#[test]
fn test_long_drag_outlives_the_timeout() {
    let start = Instant::now();
    let mut ctl = controller();
    ctl.install(&payload(8), start);

    ctl.submit(DragCommand::Start { node: 0, x: 300.0, y: 300.0 });
    let token = ctl.schedule().unwrap();
    ctl.tick(token, start);

    let later = start + Duration::from_secs(10);
    let others = |ctl: &SimulationController| -> Vec<(f64, f64)> {
        ctl.simulator().unwrap().nodes()[1..].iter().map(|n| (n.x, n.y)).collect()
    };
    let before = others(&ctl);
    ctl.submit(DragCommand::Move { node: 0, x: 700.0, y: 300.0 });
    let token = ctl.schedule().unwrap();
    assert_eq!(ctl.tick(token, later), Some(SimulationPhase::Running));
    assert_ne!(others(&ctl), before);
}

#[test]
fn test_pending_input_is_dropped_on_stop() {
    let now = Instant::now();
    let graph = payload(6);
    let mut ctl = controller();
    ctl.install(&graph, now);
    ctl.submit(DragCommand::Start { node: 1, x: 0.0, y: 0.0 });
    ctl.install(&graph, now);

    let token = ctl.schedule().unwrap();
    ctl.tick(token, now);
    assert!(!ctl.simulator().unwrap().is_dragging());
}

#[test]
fn test_force_change_reseeds_from_current_positions() {
    let now = Instant::now();
    let mut ctl = controller();
    ctl.install(&payload(10), now);
    for _ in 0..10 {
        let token = ctl.schedule().unwrap();
        ctl.tick(token, now);
    }
    let before: Vec<(f64, f64)> = ctl
        .simulator()
        .unwrap()
        .nodes()
        .iter()
        .map(|n| (n.x, n.y))
        .collect();
    let generation = ctl.generation();
    let stale = ctl.schedule().unwrap();

    assert!(!ctl.set_force_params(ForceParams::default(), now).unwrap());
    assert_eq!(ctl.generation(), generation);

    let stronger = ForceParams {
        repulsion: 400.0,
        ..Default::default()
    };
    assert!(ctl.set_force_params(stronger.clone(), now).unwrap());
    assert!(ctl.generation() > generation);
    assert_eq!(ctl.tick(stale, now), None);

    let sim = ctl.simulator().unwrap();
    assert_eq!(sim.phase(), SimulationPhase::Seeded);
    assert_relative_eq!(sim.alpha(), stronger.reheat_alpha);
    assert_relative_eq!(sim.params().repulsion, 400.0);
    let after: Vec<(f64, f64)> = sim.nodes().iter().map(|n| (n.x, n.y)).collect();
    assert_eq!(before, after);
    assert!(sim.nodes().iter().all(|n| n.vx == 0.0 && n.vy == 0.0));
}

#[test]
fn test_invalid_force_params_are_rejected() {
    let now = Instant::now();
    let mut ctl = controller();
    ctl.install(&payload(5), now);
    let bad = ForceParams {
        alpha_min: 0.0,
        ..Default::default()
    };
    assert!(ctl.set_force_params(bad, now).is_err());
    assert_eq!(ctl.params(), &ForceParams::default());
}

#[test]
fn test_resume_after_settling() {
    let now = Instant::now();
    let mut ctl = controller();
    ctl.install(&payload(6), now);
    while let Some(token) = ctl.schedule() {
        ctl.tick(token, now);
    }
    assert_eq!(ctl.state(), ControllerState::Active(SimulationPhase::Settled));

    assert!(ctl.resume(now));
    assert_eq!(ctl.state(), ControllerState::Active(SimulationPhase::Reheated));
    assert!(ctl.schedule().is_some());
}

//! Single owner of the live simulator.
//!
//! All position writes go through [`SimulationController::tick`]: drag
//! input is queued with [`SimulationController::submit`] and applied at
//! the start of the next tick, so there is exactly one writer at a time.
//!
//! Every install, reseed or stop bumps a generation counter. A scheduled
//! tick carries the generation it was issued for ([`TickToken`]) and is
//! ignored once the generation has moved on, so a discarded simulator can
//! never be written to by a tick that was already in flight.

use std::collections::VecDeque;
use std::time::Instant;

use log::{debug, info, trace};

use crate::config::ForceParams;
use crate::core::GraphPayload;
use crate::error::Result;
use crate::simulation::{ForceSimulator, SimulationGraph, SimulationPhase, SEED_ALPHA};

/// Fewer items than this never start a simulator.
pub const MIN_ITEMS_FOR_SIMULATION: usize = 2;

/// Pointer input for one node, by simulator node index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DragCommand {
    Start { node: usize, x: f64, y: f64 },
    Move { node: usize, x: f64, y: f64 },
    End { node: usize },
}

/// Permission to run one tick of a specific simulator generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickToken {
    generation: u64,
}

impl TickToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    /// No simulator installed.
    Idle,
    Active(SimulationPhase),
}

pub struct SimulationController {
    simulator: Option<ForceSimulator>,
    params: ForceParams,
    center: (f64, f64),
    generation: u64,
    pending: VecDeque<DragCommand>,
}

impl SimulationController {
    pub fn new(params: ForceParams, center: (f64, f64)) -> Self {
        Self {
            simulator: None,
            params,
            center,
            generation: 0,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ControllerState {
        match &self.simulator {
            Some(sim) => ControllerState::Active(sim.phase()),
            None => ControllerState::Idle,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn params(&self) -> &ForceParams {
        &self.params
    }

    pub fn simulator(&self) -> Option<&ForceSimulator> {
        self.simulator.as_ref()
    }

    pub fn set_center(&mut self, center: (f64, f64)) {
        self.center = center;
    }

    /// Discard the current simulator and pending input.
    pub fn stop(&mut self) {
        if let Some(mut sim) = self.simulator.take() {
            sim.stop();
        }
        self.generation += 1;
        self.pending.clear();
        debug!("Controller stopped, generation {}", self.generation);
    }

    /// Replace whatever runs now with a simulator seeded from `payload`.
    /// Returns `false` when the payload is too small to simulate.
    pub fn install(&mut self, payload: &GraphPayload, now: Instant) -> bool {
        self.stop();
        if payload.items.len() < MIN_ITEMS_FOR_SIMULATION {
            info!(
                "{} items, not starting a simulator",
                payload.items.len()
            );
            return false;
        }
        let graph = SimulationGraph::from_payload(payload);
        self.simulator = Some(ForceSimulator::new(
            graph,
            self.params.clone(),
            self.center,
            SEED_ALPHA,
            now,
        ));
        true
    }

    /// Token for the next tick, if anything is left to run.
    pub fn schedule(&self) -> Option<TickToken> {
        let sim = self.simulator.as_ref()?;
        if sim.phase().is_active() || !self.pending.is_empty() {
            Some(TickToken {
                generation: self.generation,
            })
        } else {
            None
        }
    }

    pub fn submit(&mut self, command: DragCommand) {
        if self.simulator.is_some() {
            self.pending.push_back(command);
        }
    }

    /// Apply queued input then advance one step. `None` for a stale token
    /// or when no simulator is installed.
    pub fn tick(&mut self, token: TickToken, now: Instant) -> Option<SimulationPhase> {
        if token.generation != self.generation {
            trace!(
                "dropping stale tick of generation {} (current {})",
                token.generation,
                self.generation
            );
            return None;
        }
        let sim = self.simulator.as_mut()?;
        while let Some(command) = self.pending.pop_front() {
            match command {
                DragCommand::Start { node, x, y } | DragCommand::Move { node, x, y } => {
                    sim.pin(node, x, y, now);
                }
                DragCommand::End { node } => {
                    sim.unpin(node);
                }
            }
        }
        Some(sim.tick(now))
    }

    /// Reheat and restart the timeout clock.
    pub fn resume(&mut self, now: Instant) -> bool {
        match self.simulator.as_mut() {
            Some(sim) => {
                sim.reheat(now);
                true
            }
            None => false,
        }
    }

    /// Swap the force model. Any change reseeds from the current
    /// positions; returns whether a reseed happened.
    pub fn set_force_params(&mut self, params: ForceParams, now: Instant) -> Result<bool> {
        params.validate()?;
        if params == self.params {
            return Ok(false);
        }
        self.params = params;
        let Some(graph) = self.simulator.as_ref().map(|sim| sim.snapshot()) else {
            return Ok(false);
        };
        self.stop();
        info!("Force parameters changed, reseeding from current positions");
        self.simulator = Some(ForceSimulator::new(
            graph,
            self.params.clone(),
            self.center,
            self.params.reheat_alpha,
            now,
        ));
        Ok(true)
    }

    /// Copy simulator positions into `payload`.
    pub fn write_positions(&self, payload: &mut GraphPayload) {
        if let Some(sim) = &self.simulator {
            sim.write_positions(payload);
        }
    }
}

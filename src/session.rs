//! A displayed graph: the current payload plus its live simulator.
//!
//! A rebuild replaces the payload as a whole. When it fails, the
//! previous payload and simulator stay exactly as they were.

use std::time::Instant;

use log::{info, warn};

use crate::builder::GraphBuilder;
use crate::config::AnalysisParams;
use crate::controller::{ControllerState, DragCommand, SimulationController};
use crate::core::{GraphPayload, ItemRecord};
use crate::error::Result;
use crate::simulation::SimulationPhase;

/// What a parameter update did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamChange {
    Unchanged,
    /// Only force constants changed; the simulator was reseeded.
    Reseeded,
    /// Edges, clusters or the initial layout changed; the graph was rebuilt.
    Rebuilt,
}

pub struct GraphSession {
    builder: GraphBuilder,
    records: Vec<ItemRecord>,
    payload: Option<GraphPayload>,
    controller: SimulationController,
}

impl GraphSession {
    pub fn new(builder: GraphBuilder) -> Self {
        let params = builder.params();
        let center = (params.layout.width / 2.0, params.layout.height / 2.0);
        let controller = SimulationController::new(params.forces.clone(), center);
        Self {
            builder,
            records: Vec::new(),
            payload: None,
            controller,
        }
    }

    pub fn payload(&self) -> Option<&GraphPayload> {
        self.payload.as_ref()
    }

    pub fn params(&self) -> &AnalysisParams {
        self.builder.params()
    }

    pub fn controller(&self) -> &SimulationController {
        &self.controller
    }

    pub fn state(&self) -> ControllerState {
        self.controller.state()
    }

    /// Build a new graph and install a simulator for it.
    pub fn rebuild(
        &mut self,
        records: Vec<ItemRecord>,
        params: AnalysisParams,
        now: Instant,
    ) -> Result<&GraphPayload> {
        let builder = self.builder.clone().with_params(params);
        let payload = match builder.build(&records) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Rebuild failed, keeping the current graph: {}", e);
                return Err(e);
            }
        };

        let layout = &builder.params().layout;
        self.controller
            .set_center((layout.width / 2.0, layout.height / 2.0));
        self.builder = builder;
        self.records = records;
        self.install(payload, now)
    }

    fn install(&mut self, payload: GraphPayload, now: Instant) -> Result<&GraphPayload> {
        let forces = self.builder.params().forces.clone();
        self.controller.stop();
        self.controller.set_force_params(forces, now)?;
        let started = self.controller.install(&payload, now);
        info!(
            "Installed graph with {} items, simulator {}",
            payload.items.len(),
            if started { "started" } else { "not started" }
        );
        Ok(&*self.payload.insert(payload))
    }

    /// Apply new parameters with the least work they need.
    pub fn update_params(&mut self, params: AnalysisParams, now: Instant) -> Result<ParamChange> {
        let current = self.builder.params().clone();
        if current.requires_rebuild(&params) {
            let records = self.records.clone();
            self.rebuild(records, params, now)?;
            return Ok(ParamChange::Rebuilt);
        }
        if current.requires_reseed(&params) {
            params.validate()?;
            self.controller.set_force_params(params.forces.clone(), now)?;
            self.builder = self.builder.clone().with_params(params);
            return Ok(ParamChange::Reseeded);
        }
        Ok(ParamChange::Unchanged)
    }

    pub fn drag(&mut self, command: DragCommand) {
        self.controller.submit(command);
    }

    pub fn resume(&mut self, now: Instant) -> bool {
        self.controller.resume(now)
    }

    /// One tick of the render loop; positions are written back into the
    /// payload.
    pub fn tick(&mut self, now: Instant) -> Option<SimulationPhase> {
        let token = self.controller.schedule()?;
        let phase = self.controller.tick(token, now)?;
        if let Some(payload) = self.payload.as_mut() {
            self.controller.write_positions(payload);
        }
        Some(phase)
    }

    /// Tear the simulator down, e.g. when the view goes away.
    pub fn close(&mut self) {
        self.controller.stop();
    }
}

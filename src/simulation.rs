//! # Force refinement simulator
//!
//! Continues from the initial layout under a damped force model, one
//! synchronous step per tick:
//!
//! 1. `alpha += (alpha_target - alpha) * alpha_decay`
//! 2. forces add to velocities, each scaled by `alpha`:
//!    - **links**: spring toward a rest distance; membership links use a
//!      fixed strength and distance, similarity links scale strength with
//!      the weight and shorten the rest distance as the weight grows
//!    - **repulsion**: inverse-distance charge from every node within
//!      `max_repulsion_distance`, anchors `anchor_repulsion_factor` times
//!      stronger than items
//!    - **centering**: weak pull toward the viewport centre
//!    - **collision**: overlapping discs (radius + padding) are separated
//! 3. integration: pinned nodes jump to their pin with zero velocity,
//!    all others keep `damping` of their velocity and move by it.
//!
//! ## Phases
//!
//! `Seeded -> Running -> Settled | Stopped`, and `reheat`/`pin` bring a
//! simulator back through `Reheated -> Running`. A run settles when
//! `alpha` falls below `alpha_min` and stops when the wall-clock timeout
//! since the last (re)start or dragged tick has elapsed. Time is always passed
//! in, never read, so callers and tests control the clock.
//!
//! ## Settling
//!
//! Once the kinetic energy starts to fall the simulator enters a settling
//! regime in which the energy of a tick is capped at the energy of the
//! previous tick (velocities are scaled down before integration).
//! Dragging, reheating and reseeding leave that regime.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, info, trace, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::ForceParams;
use crate::core::{anchor_id, GraphPayload};

/// Seed of the jiggle applied to coincident nodes.
const JIGGLE_SEED: u64 = 7;
/// Squared distance below which repulsion is softened.
const MIN_DISTANCE_SQ: f64 = 1.0;
const COLLISION_STRENGTH: f64 = 1.0;
/// Initial energy of a simulator seeded from a fresh layout.
pub const SEED_ALPHA: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Item,
    Anchor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkKind {
    Membership,
    Similarity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulationPhase {
    /// Positions initialised, no tick yet.
    Seeded,
    Running,
    /// Energy fell below the floor.
    Settled,
    /// Timed out or stopped explicitly.
    Stopped,
    /// Energy reset after a resume or a drag, next tick runs.
    Reheated,
}

impl SimulationPhase {
    /// Whether a tick would move anything.
    pub fn is_active(&self) -> bool {
        !matches!(self, SimulationPhase::Settled | SimulationPhase::Stopped)
    }
}

/// Node of the simulation graph.
#[derive(Clone, Debug, PartialEq)]
pub struct SimNode {
    pub id: String,
    pub kind: NodeKind,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    /// Pointer position while dragged.
    pub pinned: Option<(f64, f64)>,
}

impl SimNode {
    pub fn new(id: impl Into<String>, kind: NodeKind, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            pinned: None,
        }
    }
}

/// Link between two node indices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimLink {
    pub source: usize,
    pub target: usize,
    pub kind: LinkKind,
    /// Cosine similarity for similarity links, 1 for membership links.
    pub weight: f64,
}

/// Nodes and links a simulator is seeded with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimulationGraph {
    pub nodes: Vec<SimNode>,
    pub links: Vec<SimLink>,
}

impl SimulationGraph {
    /// Items first (payload order), then one anchor per cluster.
    pub fn from_payload(payload: &GraphPayload) -> Self {
        let mut nodes: Vec<SimNode> = payload
            .items
            .iter()
            .map(|item| SimNode::new(item.id.clone(), NodeKind::Item, item.x, item.y))
            .collect();
        let mut anchor_index = HashMap::new();
        for cluster in &payload.clusters {
            anchor_index.insert(cluster.id, nodes.len());
            nodes.push(SimNode::new(
                anchor_id(cluster.id),
                NodeKind::Anchor,
                cluster.x,
                cluster.y,
            ));
        }

        let index: HashMap<&str, usize> = payload
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id.as_str(), i))
            .collect();

        let mut links = Vec::new();
        for (i, item) in payload.items.iter().enumerate() {
            if let Some(&a) = item.cluster.and_then(|c| anchor_index.get(&c)) {
                links.push(SimLink {
                    source: a,
                    target: i,
                    kind: LinkKind::Membership,
                    weight: 1.0,
                });
            }
        }
        for edge in payload.similarity_edges() {
            let source = index.get(edge.source.as_str());
            let target = index.get(edge.target.as_str());
            if let (Some(&s), Some(&t)) = (source, target) {
                links.push(SimLink {
                    source: s,
                    target: t,
                    kind: LinkKind::Similarity,
                    weight: edge.weight,
                });
            }
        }
        Self { nodes, links }
    }

    pub fn item_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Item).count()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }
}

/// Per-link constants resolved from the force parameters.
#[derive(Clone, Copy, Debug)]
struct LinkForce {
    strength: f64,
    distance: f64,
    bias: f64,
}

pub struct ForceSimulator {
    graph: SimulationGraph,
    link_forces: Vec<LinkForce>,
    params: ForceParams,
    damping: f64,
    center: (f64, f64),
    alpha: f64,
    alpha_target: f64,
    phase: SimulationPhase,
    started_at: Instant,
    settling: bool,
    last_energy: Option<f64>,
    ticks: u64,
    rng: ChaCha8Rng,
}

impl ForceSimulator {
    pub fn new(
        graph: SimulationGraph,
        params: ForceParams,
        center: (f64, f64),
        alpha: f64,
        now: Instant,
    ) -> Self {
        let damping = params.clamped_damping();
        if (damping - params.damping).abs() > f64::EPSILON {
            warn!(
                "Damping {} outside the stable range, clamped to {}",
                params.damping, damping
            );
        }
        let link_forces = resolve_links(&graph, &params);
        let alpha = if alpha.is_finite() { alpha.clamp(0.0, 1.0) } else { SEED_ALPHA };
        info!(
            "Seeding simulator: {} nodes, {} links, alpha={}",
            graph.nodes.len(),
            graph.links.len(),
            alpha
        );
        Self {
            graph,
            link_forces,
            params,
            damping,
            center,
            alpha,
            alpha_target: 0.0,
            phase: SimulationPhase::Seeded,
            started_at: now,
            settling: false,
            last_energy: None,
            ticks: 0,
            rng: ChaCha8Rng::seed_from_u64(JIGGLE_SEED),
        }
    }

    pub fn phase(&self) -> SimulationPhase {
        self.phase
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn alpha_target(&self) -> f64 {
        self.alpha_target
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }

    pub fn params(&self) -> &ForceParams {
        &self.params
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.graph.nodes
    }

    pub fn graph(&self) -> &SimulationGraph {
        &self.graph
    }

    /// Current positions as a graph to seed a successor from; velocities
    /// and pins are dropped.
    pub fn snapshot(&self) -> SimulationGraph {
        let mut graph = self.graph.clone();
        for node in graph.nodes.iter_mut() {
            node.vx = 0.0;
            node.vy = 0.0;
            node.pinned = None;
        }
        graph
    }

    /// Sum of `½|v|²` over free nodes.
    pub fn kinetic_energy(&self) -> f64 {
        self.graph
            .nodes
            .iter()
            .filter(|n| n.pinned.is_none())
            .map(|n| 0.5 * (n.vx * n.vx + n.vy * n.vy))
            .sum()
    }

    pub fn stop(&mut self) {
        if self.phase != SimulationPhase::Stopped {
            info!("Simulator stopped after {} ticks", self.ticks);
        }
        self.phase = SimulationPhase::Stopped;
    }

    /// Reset energy and restart the timeout clock.
    pub fn reheat(&mut self, now: Instant) {
        self.alpha = self.params.reheat_alpha.clamp(0.0, 1.0);
        self.restart(now);
        debug!("Simulator reheated to alpha {}", self.alpha);
    }

    fn restart(&mut self, now: Instant) {
        self.started_at = now;
        self.phase = SimulationPhase::Reheated;
        self.leave_settling();
    }

    fn leave_settling(&mut self) {
        self.settling = false;
        self.last_energy = None;
    }

    /// Fix node `index` at the pointer position.
    pub fn pin(&mut self, index: usize, x: f64, y: f64, now: Instant) -> bool {
        let Some(node) = self.graph.nodes.get_mut(index) else {
            return false;
        };
        let starting = node.pinned.is_none();
        node.pinned = Some((x, y));
        node.x = x;
        node.y = y;
        node.vx = 0.0;
        node.vy = 0.0;
        if starting {
            trace!("pinning node {}", index);
            self.alpha_target = self.params.drag_alpha_target.clamp(0.0, 1.0);
            self.restart(now);
        }
        true
    }

    /// Release a pinned node back into integration.
    pub fn unpin(&mut self, index: usize) -> bool {
        let Some(node) = self.graph.nodes.get_mut(index) else {
            return false;
        };
        if node.pinned.take().is_none() {
            return false;
        }
        trace!("releasing node {}", index);
        if self.graph.nodes.iter().all(|n| n.pinned.is_none()) {
            self.alpha_target = 0.0;
        }
        self.leave_settling();
        true
    }

    pub fn is_dragging(&self) -> bool {
        self.graph.nodes.iter().any(|n| n.pinned.is_some())
    }

    /// Advance one step unless settled, stopped or timed out. The timeout
    /// clock is held while a node is dragged.
    pub fn tick(&mut self, now: Instant) -> SimulationPhase {
        if !self.phase.is_active() {
            return self.phase;
        }
        if self.is_dragging() {
            self.started_at = now;
        } else if now.saturating_duration_since(self.started_at) >= self.params.timeout() {
            info!(
                "Simulator timed out after {} ticks ({} ms)",
                self.ticks, self.params.timeout_ms
            );
            self.phase = SimulationPhase::Stopped;
            return self.phase;
        }

        self.alpha += (self.alpha_target - self.alpha) * self.params.alpha_decay;
        self.apply_links();
        self.apply_repulsion();
        self.apply_centering();
        self.apply_collision();
        self.integrate();
        self.ticks += 1;

        self.phase = if self.alpha < self.params.alpha_min {
            info!("Simulator settled after {} ticks", self.ticks);
            SimulationPhase::Settled
        } else {
            SimulationPhase::Running
        };
        self.phase
    }

    fn jiggle(&mut self) -> f64 {
        (self.rng.random::<f64>() - 0.5) * 1e-6
    }

    fn apply_links(&mut self) {
        for (l, link) in self.graph.links.clone().iter().enumerate() {
            let force = self.link_forces[l];
            let (s, t) = (&self.graph.nodes[link.source], &self.graph.nodes[link.target]);
            let mut dx = t.x + t.vx - s.x - s.vx;
            let mut dy = t.y + t.vy - s.y - s.vy;
            if dx == 0.0 {
                dx = self.jiggle();
            }
            if dy == 0.0 {
                dy = self.jiggle();
            }
            let len = (dx * dx + dy * dy).sqrt();
            let scale = (len - force.distance) / len * self.alpha * force.strength;
            dx *= scale;
            dy *= scale;

            let t = &mut self.graph.nodes[link.target];
            t.vx -= dx * force.bias;
            t.vy -= dy * force.bias;
            let s = &mut self.graph.nodes[link.source];
            s.vx += dx * (1.0 - force.bias);
            s.vy += dy * (1.0 - force.bias);
        }
    }

    fn charge(&self, kind: NodeKind) -> f64 {
        match kind {
            NodeKind::Item => -self.params.repulsion,
            NodeKind::Anchor => -self.params.repulsion * self.params.anchor_repulsion_factor,
        }
    }

    fn apply_repulsion(&mut self) {
        let max_sq = self.params.max_repulsion_distance * self.params.max_repulsion_distance;
        let n = self.graph.nodes.len();
        let mut dv = vec![(0.0, 0.0); n];
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let (a, b) = (&self.graph.nodes[i], &self.graph.nodes[j]);
                let (mut dx, mut dy) = (b.x - a.x, b.y - a.y);
                let mut l = dx * dx + dy * dy;
                if l >= max_sq {
                    continue;
                }
                if l == 0.0 {
                    dx = self.jiggle();
                    dy = self.jiggle();
                    l = dx * dx + dy * dy;
                }
                if l < MIN_DISTANCE_SQ {
                    l = (MIN_DISTANCE_SQ * l).sqrt();
                }
                let w = self.charge(self.graph.nodes[j].kind) * self.alpha / l;
                dv[i].0 += dx * w;
                dv[i].1 += dy * w;
            }
        }
        for (node, (dx, dy)) in self.graph.nodes.iter_mut().zip(dv) {
            node.vx += dx;
            node.vy += dy;
        }
    }

    fn apply_centering(&mut self) {
        let (cx, cy) = self.center;
        let k = (self.params.center_strength * self.alpha).min(1.0);
        for node in self.graph.nodes.iter_mut() {
            node.vx += (cx - node.x) * k;
            node.vy += (cy - node.y) * k;
        }
    }

    fn radius(&self, kind: NodeKind) -> f64 {
        let r = match kind {
            NodeKind::Item => self.params.item_radius,
            NodeKind::Anchor => self.params.anchor_radius,
        };
        r + self.params.collision_padding
    }

    fn apply_collision(&mut self) {
        let n = self.graph.nodes.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let (ri, rj) = (
                    self.radius(self.graph.nodes[i].kind),
                    self.radius(self.graph.nodes[j].kind),
                );
                let r = ri + rj;
                let (a, b) = (&self.graph.nodes[i], &self.graph.nodes[j]);
                let mut dx = (a.x + a.vx) - (b.x + b.vx);
                let mut dy = (a.y + a.vy) - (b.y + b.vy);
                let mut l = dx * dx + dy * dy;
                if l >= r * r {
                    continue;
                }
                if dx == 0.0 {
                    dx = self.jiggle();
                    l += dx * dx;
                }
                if dy == 0.0 {
                    dy = self.jiggle();
                    l += dy * dy;
                }
                let len = l.sqrt();
                let push = (r - len) / len * COLLISION_STRENGTH;
                dx *= push;
                dy *= push;
                // the larger disc moves less
                let share = rj * rj / (ri * ri + rj * rj);
                let a = &mut self.graph.nodes[i];
                a.vx += dx * share;
                a.vy += dy * share;
                let b = &mut self.graph.nodes[j];
                b.vx -= dx * (1.0 - share);
                b.vy -= dy * (1.0 - share);
            }
        }
    }

    fn integrate(&mut self) {
        for node in self.graph.nodes.iter_mut() {
            if node.pinned.is_none() {
                node.vx *= self.damping;
                node.vy *= self.damping;
            }
        }

        let dragging = self.is_dragging();
        let energy = self.kinetic_energy();
        match self.last_energy {
            Some(previous) if self.settling && energy > previous => {
                let scale = (previous / energy).sqrt();
                trace!("capping kinetic energy {:.6} -> {:.6}", energy, previous);
                for node in self.graph.nodes.iter_mut() {
                    node.vx *= scale;
                    node.vy *= scale;
                }
            }
            Some(previous) if !self.settling && !dragging && energy < previous => {
                debug!("Kinetic energy falling at tick {}, settling", self.ticks);
                self.settling = true;
            }
            _ => {}
        }
        self.last_energy = Some(self.kinetic_energy());

        for node in self.graph.nodes.iter_mut() {
            match node.pinned {
                Some((px, py)) => {
                    node.x = px;
                    node.y = py;
                    node.vx = 0.0;
                    node.vy = 0.0;
                }
                None => {
                    node.x += node.vx;
                    node.y += node.vy;
                }
            }
        }
    }

    /// Copy current positions into the payload the simulator was seeded from.
    pub fn write_positions(&self, payload: &mut GraphPayload) {
        let n_items = payload.items.len();
        for (item, node) in payload.items.iter_mut().zip(&self.graph.nodes) {
            item.x = node.x;
            item.y = node.y;
        }
        for (cluster, node) in payload
            .clusters
            .iter_mut()
            .zip(self.graph.nodes.iter().skip(n_items))
        {
            cluster.x = node.x;
            cluster.y = node.y;
        }
    }
}

fn resolve_links(graph: &SimulationGraph, params: &ForceParams) -> Vec<LinkForce> {
    let mut count = vec![0usize; graph.nodes.len()];
    for link in &graph.links {
        count[link.source] += 1;
        count[link.target] += 1;
    }
    let mut forces: Vec<LinkForce> = graph
        .links
        .iter()
        .map(|link| {
            let (strength, distance) = match link.kind {
                LinkKind::Membership => (params.membership_strength, params.membership_distance),
                LinkKind::Similarity => {
                    let w = link.weight.clamp(0.0, 1.0);
                    (
                        params.similarity_strength * w,
                        params.min_link_distance
                            + (params.similarity_distance - params.min_link_distance) * (1.0 - w),
                    )
                }
            };
            // the better-connected endpoint moves less
            let (cs, ct) = (count[link.source] as f64, count[link.target] as f64);
            LinkForce {
                strength,
                distance,
                bias: cs / (cs + ct),
            }
        })
        .collect();

    // summed link stiffness at every node stays <= 1
    let mut stiffness = vec![0.0; graph.nodes.len()];
    for (link, force) in graph.links.iter().zip(&forces) {
        stiffness[link.target] += force.strength * force.bias;
        stiffness[link.source] += force.strength * (1.0 - force.bias);
    }
    for (link, force) in graph.links.iter().zip(forces.iter_mut()) {
        let excess = stiffness[link.source].max(stiffness[link.target]);
        if excess > 1.0 {
            force.strength /= excess;
        }
    }
    forces
}

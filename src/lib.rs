//! # simgraph
//!
//! Turns short text records into an interactive 2-D similarity graph.
//!
//! Pipeline, leaf first:
//! - [`embedding`]: text -> unit-norm vectors (pluggable provider)
//! - [`similarity`]: deduplicated, degree-bounded cosine edges
//! - [`clustering`]: density clustering with a partition fallback, plus
//!   [`keywords`] for cluster labels
//! - [`layout`]: spring layout with one anchor node per cluster
//! - [`simulation`] and [`controller`]: live force refinement with drag
//!   input, bounded by an energy floor and a wall-clock timeout
//!
//! [`builder::GraphBuilder`] runs the analysis and produces a
//! [`core::GraphPayload`]; [`session::GraphSession`] keeps one payload and
//! its simulator alive across rebuilds and parameter changes.
//!
//! ```
//! use simgraph::builder::GraphBuilder;
//! use simgraph::core::ItemRecord;
//!
//! let records = vec![
//!     ItemRecord::new("R-1", "Steel supplier delivers late"),
//!     ItemRecord::new("R-2", "Late delivery of steel beams"),
//!     ItemRecord::new("R-3", "Permit approval delayed by council"),
//! ];
//! let payload = GraphBuilder::new().build(&records).unwrap();
//! assert_eq!(payload.items.len(), 3);
//! ```

pub mod builder;
pub mod clustering;
pub mod config;
pub mod controller;
pub mod core;
pub mod density;
pub mod embedding;
pub mod error;
pub mod keywords;
pub mod layout;
pub mod partition;
pub mod quality;
pub mod reduction;
pub mod session;
pub mod similarity;
pub mod simulation;

pub use error::{GraphError, Result};

#[cfg(test)]
mod tests;

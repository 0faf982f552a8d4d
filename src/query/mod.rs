//! Queries over an assembled `Graph`.
//!
//! Every query is a small value type holding its parameters and implementing
//! `Query<R>`; running it never mutates the graph.
use crate::graph::Graph;

pub mod centrality;
pub mod components;
pub mod focus;

pub use centrality::{CentralityQuery, CentralityScores};
pub use components::{ComponentReport, ComponentsQuery};
pub use focus::{Direction, FocusConfig, FocusQuery, FocusResult, FocusSummary};

/// Query trait implemented by all query types.
///
/// Given an immutable reference to a `Graph`, returns a result of type `R`.
pub trait Query<R> {
    fn run(&self, graph: &Graph) -> R;
}

//! Structural importance of every node.
//!
//! Two measures are computed and normalised independently to `[0, 1]` by
//! dividing by the run's maximum: a damped iterative importance (PageRank over
//! the union of call and semantic links) and out-degree centrality. The
//! combined score is their weighted sum. When PageRank does not converge within
//! `max_iterations`, total-degree centrality takes its place for that run.
use serde::{Deserialize, Serialize};

use super::Query;
use crate::graph::Graph;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CentralityConfig {
    pub damping: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub pagerank_weight: f64,
    pub out_degree_weight: f64,
}

impl Default for CentralityConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 100,
            tolerance: 1e-6,
            pagerank_weight: 0.4,
            out_degree_weight: 0.6,
        }
    }
}

/// Per-node scores indexed like `Graph::nodes()`.
#[derive(Debug, Clone, Default)]
pub struct CentralityScores {
    pub iterative: Vec<f64>,
    pub out_degree: Vec<f64>,
    pub combined: Vec<f64>,
    /// False when the degree-centrality fallback replaced PageRank.
    pub converged: bool,
}

pub struct CentralityQuery {
    pub config: CentralityConfig,
}

impl CentralityQuery {
    #[must_use]
    pub fn new(config: CentralityConfig) -> Self {
        Self { config }
    }
}

impl Query<CentralityScores> for CentralityQuery {
    fn run(&self, graph: &Graph) -> CentralityScores {
        let n = graph.node_count();
        if n == 0 {
            return CentralityScores { converged: true, ..CentralityScores::default() };
        }
        let adj = graph.adjacency();
        let scale = if n > 1 { 1.0 / (n - 1) as f64 } else { 1.0 };

        let (iterative, converged) = match pagerank(&adj.successors, &adj.predecessors, &self.config) {
            Some(ranks) => (ranks, true),
            None => {
                tracing::warn!(
                    max_iterations = self.config.max_iterations,
                    "PageRank did not converge, using degree centrality"
                );
                let degree = (0..n)
                    .map(|i| (adj.successors[i].len() + adj.predecessors[i].len()) as f64 * scale)
                    .collect();
                (degree, false)
            }
        };
        let out_degree: Vec<f64> = adj.successors.iter().map(|s| s.len() as f64 * scale).collect();

        let iterative = normalize(iterative);
        let out_degree = normalize(out_degree);
        let combined = iterative
            .iter()
            .zip(&out_degree)
            .map(|(p, o)| self.config.pagerank_weight * p + self.config.out_degree_weight * o)
            .collect();
        CentralityScores { iterative, out_degree, combined, converged }
    }
}

/// Power iteration; dangling mass is spread uniformly. `None` when the L1
/// change is still above `n * tolerance` after `max_iterations`.
fn pagerank(
    successors: &[Vec<usize>],
    predecessors: &[Vec<usize>],
    cfg: &CentralityConfig,
) -> Option<Vec<f64>> {
    let n = successors.len();
    let nf = n as f64;
    let mut rank = vec![1.0 / nf; n];
    for _ in 0..cfg.max_iterations {
        let dangling: f64 =
            successors.iter().zip(&rank).filter(|(s, _)| s.is_empty()).map(|(_, r)| r).sum();
        let base = (1.0 - cfg.damping) / nf + cfg.damping * dangling / nf;
        let next: Vec<f64> = (0..n)
            .map(|v| {
                let inflow: f64 =
                    predecessors[v].iter().map(|&u| rank[u] / successors[u].len() as f64).sum();
                base + cfg.damping * inflow
            })
            .collect();
        let delta: f64 = next.iter().zip(&rank).map(|(a, b)| (a - b).abs()).sum();
        rank = next;
        if delta < nf * cfg.tolerance {
            return Some(rank);
        }
    }
    None
}

fn normalize(mut values: Vec<f64>) -> Vec<f64> {
    let max = values.iter().copied().fold(0.0_f64, f64::max);
    if max > 0.0 {
        for v in &mut values {
            *v /= max;
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CallEdge, Node, NodeKind};
    use std::collections::{BTreeSet, HashMap};

    fn graph(edges: &[(&str, &str)]) -> Graph {
        let mut nodes = Vec::new();
        let mut calls = BTreeSet::new();
        for (a, b) in edges {
            nodes.push(Node::new(a, NodeKind::Function));
            nodes.push(Node::new(b, NodeKind::Function));
            calls.insert(CallEdge::new(a, b));
        }
        Graph::from_parts(nodes, &HashMap::new(), &calls, &BTreeSet::new())
    }

    #[test]
    fn hub_has_highest_out_degree() {
        let g = graph(&[("m.hub", "m.a"), ("m.hub", "m.b"), ("m.hub", "m.c"), ("m.a", "m.b")]);
        let scores = CentralityQuery::new(CentralityConfig::default()).run(&g);
        assert!(scores.converged);
        let hub = g.index_of("m.hub").unwrap();
        assert!((scores.out_degree[hub] - 1.0).abs() < 1e-12);
        assert!(scores.combined.iter().all(|c| (0.0..=1.0).contains(c)));
    }

    #[test]
    fn zero_iterations_falls_back_to_degree() {
        let g = graph(&[("m.a", "m.b"), ("m.b", "m.c")]);
        let cfg = CentralityConfig { max_iterations: 0, ..CentralityConfig::default() };
        let scores = CentralityQuery::new(cfg).run(&g);
        assert!(!scores.converged);
        let b = g.index_of("m.b").unwrap();
        assert!((scores.iterative[b] - 1.0).abs() < 1e-12);
    }
}

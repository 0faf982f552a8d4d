//! Bounded neighbourhood search around chosen entry points.
//!
//! The search is a breadth-first expansion along successors (downstream),
//! predecessors (upstream), or both. Two safety valves keep it bounded on hub
//! nodes: a bidirectional result that grows past `max_nodes_for_bidirectional`
//! is recomputed downstream-only, and dynamic depth escalation never goes past
//! `max_search_depth`.
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use super::Query;
use crate::graph::{Adjacency, Graph, NodeIdx};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Upstream,
    Downstream,
    #[default]
    Both,
}

impl Direction {
    fn follows_successors(self) -> bool {
        matches!(self, Direction::Downstream | Direction::Both)
    }

    fn follows_predecessors(self) -> bool {
        matches!(self, Direction::Upstream | Direction::Both)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
            Direction::Both => "both",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FocusConfig {
    pub entrypoints: Vec<String>,
    pub direction: Direction,
    pub initial_depth: usize,
    pub enable_dynamic_depth: bool,
    /// Escalate depth while the result has fewer nodes than this.
    pub min_nodes: usize,
    pub max_search_depth: usize,
    pub max_nodes_for_bidirectional: usize,
    pub auto_downstream_fallback: bool,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            entrypoints: Vec::new(),
            direction: Direction::Both,
            initial_depth: 2,
            enable_dynamic_depth: true,
            min_nodes: 10,
            max_search_depth: 7,
            max_nodes_for_bidirectional: 500,
            auto_downstream_fallback: true,
        }
    }
}

impl FocusConfig {
    /// Same parameters, different entry points.
    #[must_use]
    pub fn with_entrypoints(&self, entrypoints: Vec<String>) -> Self {
        Self { entrypoints, ..self.clone() }
    }
}

/// What the focus run actually did, for reports.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FocusSummary {
    pub entrypoints: Vec<String>,
    pub missing_entrypoints: Vec<String>,
    pub depth_reached: usize,
    pub direction_used: Direction,
    pub fell_back_to_downstream: bool,
    pub node_count: usize,
}

#[derive(Debug, Clone)]
pub struct FocusResult {
    /// Sub-graph induced by the focused node set.
    pub graph: Graph,
    pub summary: FocusSummary,
}

pub struct FocusQuery {
    pub config: FocusConfig,
}

impl FocusQuery {
    #[must_use]
    pub fn new(config: FocusConfig) -> Self {
        Self { config }
    }
}

impl Query<FocusResult> for FocusQuery {
    fn run(&self, graph: &Graph) -> FocusResult {
        let cfg = &self.config;
        let mut summary = FocusSummary {
            entrypoints: cfg.entrypoints.clone(),
            missing_entrypoints: Vec::new(),
            depth_reached: cfg.initial_depth,
            direction_used: cfg.direction,
            fell_back_to_downstream: false,
            node_count: graph.node_count(),
        };

        // No entry points: focus is a no-op.
        if cfg.entrypoints.is_empty() {
            return FocusResult { graph: graph.clone(), summary };
        }

        let mut seeds: Vec<NodeIdx> = Vec::new();
        for ep in &cfg.entrypoints {
            match graph.index_of(ep) {
                Some(i) => seeds.push(i),
                None => summary.missing_entrypoints.push(ep.clone()),
            }
        }
        if !summary.missing_entrypoints.is_empty() {
            tracing::warn!(missing = ?summary.missing_entrypoints, "Focus entry points not found in graph");
        }

        let adj = graph.adjacency();
        let mut direction = cfg.direction;
        let mut depth = cfg.initial_depth;
        let mut keep;
        loop {
            let mut fell_back = false;
            keep = expand(&adj, &seeds, depth, direction);
            // Evaluated once per depth; after switching, `direction` is no longer Both.
            if direction == Direction::Both
                && cfg.auto_downstream_fallback
                && count(&keep) > cfg.max_nodes_for_bidirectional
            {
                tracing::warn!(
                    depth,
                    nodes = count(&keep),
                    limit = cfg.max_nodes_for_bidirectional,
                    "Bidirectional focus too large, falling back to downstream"
                );
                direction = Direction::Downstream;
                keep = expand(&adj, &seeds, depth, direction);
                fell_back = true;
            }
            summary.fell_back_to_downstream |= fell_back;

            let n = count(&keep);
            tracing::debug!(depth, nodes = n, %direction, "Focus iteration");
            if !cfg.enable_dynamic_depth || n >= cfg.min_nodes || depth >= cfg.max_search_depth {
                break;
            }
            depth += 1;
        }

        let focused = graph.induced(&keep);
        summary.depth_reached = depth;
        summary.direction_used = direction;
        summary.node_count = focused.node_count();
        tracing::info!(
            nodes = focused.node_count(),
            edges = focused.edge_count(),
            depth,
            %direction,
            "Focus complete"
        );
        FocusResult { graph: focused, summary }
    }
}

fn count(keep: &[bool]) -> usize {
    keep.iter().filter(|&&k| k).count()
}

/// Seeds plus everything within `depth` hops in the requested direction(s).
fn expand(adj: &Adjacency, seeds: &[NodeIdx], depth: usize, direction: Direction) -> Vec<bool> {
    let mut keep = vec![false; adj.successors.len()];
    for &s in seeds {
        keep[s] = true;
    }
    if direction.follows_successors() {
        bfs(&adj.successors, seeds, depth, &mut keep);
    }
    if direction.follows_predecessors() {
        bfs(&adj.predecessors, seeds, depth, &mut keep);
    }
    keep
}

fn bfs(neighbours: &[Vec<NodeIdx>], seeds: &[NodeIdx], depth: usize, keep: &mut [bool]) {
    let mut visited = vec![false; neighbours.len()];
    let mut queue: VecDeque<(NodeIdx, usize)> = VecDeque::new();
    for &s in seeds {
        if !visited[s] {
            visited[s] = true;
            queue.push_back((s, 0));
        }
    }
    while let Some((u, d)) = queue.pop_front() {
        keep[u] = true;
        if d == depth {
            continue;
        }
        for &v in &neighbours[u] {
            if !visited[v] {
                visited[v] = true;
                queue.push_back((v, d + 1));
            }
        }
    }
}

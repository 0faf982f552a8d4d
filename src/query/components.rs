use serde::Serialize;

use super::Query;
use crate::graph::{Graph, NodeIdx};

/// Drop weakly connected components smaller than `min_component_size`.
pub struct ComponentsQuery {
    pub min_component_size: usize,
}

impl ComponentsQuery {
    #[must_use]
    pub fn new(min_component_size: usize) -> Self {
        Self { min_component_size }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    /// Kept components as FQN lists, largest first.
    pub kept: Vec<Vec<String>>,
    /// FQNs of nodes in dropped components, sorted.
    pub dropped: Vec<String>,
    #[serde(skip)]
    pub graph: Graph,
}

impl Query<ComponentReport> for ComponentsQuery {
    fn run(&self, graph: &Graph) -> ComponentReport {
        let n = graph.node_count();
        let mut uf = UnionFind::new(n);
        // Direction is ignored; call and semantic links both join components.
        for l in graph.links() {
            uf.union(l.from, l.to);
        }

        let mut groups: Vec<Vec<NodeIdx>> = Vec::new();
        let mut slot: Vec<Option<usize>> = vec![None; n];
        for i in 0..n {
            let root = uf.find(i);
            let g = *slot[root].get_or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[g].push(i);
        }

        let mut keep = vec![false; n];
        let mut kept: Vec<Vec<NodeIdx>> = Vec::new();
        let mut dropped: Vec<String> = Vec::new();
        for g in groups {
            if g.len() >= self.min_component_size {
                for &i in &g {
                    keep[i] = true;
                }
                kept.push(g);
            } else {
                dropped.extend(g.iter().filter_map(|&i| graph.node(i)).map(|node| node.fqn.clone()));
            }
        }
        // Node indices follow FQN order, so g[0] is the component's smallest FQN.
        kept.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));
        dropped.sort();

        if !dropped.is_empty() {
            tracing::info!(
                dropped = dropped.len(),
                min_size = self.min_component_size,
                "Dropped undersized components"
            );
        }

        let kept = kept
            .into_iter()
            .map(|g| g.into_iter().filter_map(|i| graph.node(i)).map(|node| node.fqn.clone()).collect())
            .collect();
        ComponentReport { kept, dropped, graph: graph.induced(&keep) }
    }
}

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect(), rank: vec![0; n] }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

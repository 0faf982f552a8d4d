//! Graph model and assembler for the crate.
//!
//! This module defines the facts produced by an external parser (`Node`,
//! `CallEdge`, `SemanticEdge`), the arena-indexed `Graph` that every query runs
//! on, and `GraphAssembler`, which merges call and semantic edges into one
//! graph while applying self-loop and exclude-pattern filtering.
//!
//! You typically obtain facts through `crate::pipeline::collect_facts` and
//! then pass the assembled graph to queries in `crate::query`.
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::errors::AnalysisError;

/// Dense index of a node inside one `Graph`.
pub type NodeIdx = usize;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Module,
    Class,
    #[default]
    Function,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Node {
    pub fqn: String,
    #[serde(default)]
    pub kind: NodeKind,
    /// Module that declares this entity, when the parser knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default)]
    pub is_high_level_component: bool,
    #[serde(default)]
    pub is_external: bool,
    #[serde(default)]
    pub is_private: bool,
}

impl Node {
    /// Build a node, deriving `is_private` from the trailing identifier.
    #[must_use]
    pub fn new(fqn: &str, kind: NodeKind) -> Self {
        Self {
            fqn: fqn.to_string(),
            kind,
            module: None,
            is_high_level_component: false,
            is_external: false,
            is_private: is_private_segment(last_segment(fqn)),
        }
    }

    #[must_use]
    pub fn component(fqn: &str, kind: NodeKind) -> Self {
        Self { is_high_level_component: true, ..Self::new(fqn, kind) }
    }

    #[must_use]
    pub fn in_module(mut self, module: &str) -> Self {
        self.module = Some(module.to_string());
        self
    }

    pub(crate) fn merge(&mut self, other: &Node) {
        self.is_high_level_component |= other.is_high_level_component;
        self.is_external &= other.is_external;
        self.is_private |= other.is_private;
        if self.module.is_none() {
            self.module.clone_from(&other.module);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
}

impl CallEdge {
    #[must_use]
    pub fn new(caller: &str, callee: &str) -> Self {
        Self { caller: caller.to_string(), callee: callee.to_string() }
    }
}

/// Kind of non-call architectural intent captured by a `SemanticEdge`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Registers,
    InheritsFrom,
    Decorates,
    Proxies,
    UsesStrategy,
    DependsOn,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Relation::Registers => "registers",
            Relation::InheritsFrom => "inherits_from",
            Relation::Decorates => "decorates",
            Relation::Proxies => "proxies",
            Relation::UsesStrategy => "uses_strategy",
            Relation::DependsOn => "depends_on",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SemanticEdge {
    pub source: String,
    pub target: String,
    pub relation: Relation,
}

impl SemanticEdge {
    #[must_use]
    pub fn new(source: &str, target: &str, relation: Relation) -> Self {
        Self { source: source.to_string(), target: target.to_string(), relation }
    }
}

/// Everything the parser reported for a project, merged across files.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectFacts {
    pub nodes: Vec<Node>,
    pub call_edges: Vec<CallEdge>,
    pub semantic_edges: Vec<SemanticEdge>,
    /// Module -> imported modules, used to recognise frameworks by import footprint.
    #[serde(default)]
    pub module_imports: BTreeMap<String, BTreeSet<String>>,
    /// Modules with a `__main__` block.
    #[serde(default)]
    pub main_block_modules: BTreeSet<String>,
}

/// An edge between two arena indices. `relation` is `None` for call edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Link {
    pub from: NodeIdx,
    pub to: NodeIdx,
    pub relation: Option<Relation>,
}

/// Successor and predecessor lists over the union of call and semantic edges.
#[derive(Debug, Clone, Default)]
pub struct Adjacency {
    pub successors: Vec<Vec<NodeIdx>>,
    pub predecessors: Vec<Vec<NodeIdx>>,
}

/// Arena-indexed architecture graph.
///
/// Nodes are kept sorted by FQN so that indices, iteration order, and every
/// derived ranking are deterministic across runs. Every link endpoint is a
/// valid index into `nodes`.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    modules: Vec<String>,
    index: HashMap<String, NodeIdx>,
    links: Vec<Link>,
}

impl Graph {
    /// Build a graph from nodes and FQN-addressed edges.
    ///
    /// `modules` maps each node FQN to its owning module; nodes missing from it
    /// fall back to their parent segment. Edges with an unknown endpoint are dropped.
    #[must_use]
    pub fn from_parts(
        nodes: Vec<Node>,
        modules: &HashMap<String, String>,
        call_edges: &BTreeSet<CallEdge>,
        semantic_edges: &BTreeSet<SemanticEdge>,
    ) -> Self {
        let mut by_fqn: BTreeMap<String, Node> = BTreeMap::new();
        for n in nodes {
            match by_fqn.get_mut(&n.fqn) {
                Some(existing) => existing.merge(&n),
                None => {
                    by_fqn.insert(n.fqn.clone(), n);
                }
            }
        }
        let nodes: Vec<Node> = by_fqn.into_values().collect();
        let index: HashMap<String, NodeIdx> =
            nodes.iter().enumerate().map(|(i, n)| (n.fqn.clone(), i)).collect();
        let modules_vec = nodes
            .iter()
            .map(|n| modules.get(&n.fqn).cloned().unwrap_or_else(|| parent_segment(&n.fqn)))
            .collect();

        let mut links: BTreeSet<Link> = BTreeSet::new();
        for e in call_edges {
            if let (Some(&from), Some(&to)) = (index.get(&e.caller), index.get(&e.callee)) {
                links.insert(Link { from, to, relation: None });
            }
        }
        for e in semantic_edges {
            if let (Some(&from), Some(&to)) = (index.get(&e.source), index.get(&e.target)) {
                links.insert(Link { from, to, relation: Some(e.relation) });
            }
        }

        Self { nodes, modules: modules_vec, index, links: links.into_iter().collect() }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn node(&self, idx: NodeIdx) -> Option<&Node> {
        self.nodes.get(idx)
    }

    #[must_use]
    pub fn index_of(&self, fqn: &str) -> Option<NodeIdx> {
        self.index.get(fqn).copied()
    }

    #[must_use]
    pub fn contains(&self, fqn: &str) -> bool {
        self.index.contains_key(fqn)
    }

    /// Owning module of the node at `idx`.
    #[must_use]
    pub fn module_of(&self, idx: NodeIdx) -> &str {
        self.modules.get(idx).map_or("", String::as_str)
    }

    #[must_use]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Call edges in FQN form, sorted.
    #[must_use]
    pub fn call_edges(&self) -> Vec<CallEdge> {
        self.links
            .iter()
            .filter(|l| l.relation.is_none())
            .map(|l| CallEdge::new(&self.nodes[l.from].fqn, &self.nodes[l.to].fqn))
            .collect()
    }

    /// Semantic edges in FQN form, sorted.
    #[must_use]
    pub fn semantic_edges(&self) -> Vec<SemanticEdge> {
        self.links
            .iter()
            .filter_map(|l| {
                l.relation.map(|r| SemanticEdge::new(&self.nodes[l.from].fqn, &self.nodes[l.to].fqn, r))
            })
            .collect()
    }

    /// Build successor/predecessor lists once. Parallel links between the same
    /// pair (a call plus a semantic edge) collapse into one neighbour entry.
    #[must_use]
    pub fn adjacency(&self) -> Adjacency {
        let n = self.nodes.len();
        let mut successors = vec![Vec::new(); n];
        let mut predecessors = vec![Vec::new(); n];
        for l in &self.links {
            successors[l.from].push(l.to);
            predecessors[l.to].push(l.from);
        }
        for list in successors.iter_mut().chain(predecessors.iter_mut()) {
            list.sort_unstable();
            list.dedup();
        }
        Adjacency { successors, predecessors }
    }

    /// Total number of distinct neighbours (either direction) per node.
    #[must_use]
    pub fn degrees(&self) -> Vec<usize> {
        let adj = self.adjacency();
        (0..self.nodes.len())
            .map(|i| adj.successors[i].len() + adj.predecessors[i].len())
            .collect()
    }

    /// Sub-graph induced by the nodes flagged in `keep`.
    ///
    /// Nodes are filtered first and only then are links whose endpoints did not
    /// both survive dropped, so the result always satisfies the closure invariant.
    #[must_use]
    pub fn induced(&self, keep: &[bool]) -> Graph {
        let mut remap: Vec<Option<NodeIdx>> = vec![None; self.nodes.len()];
        let mut nodes = Vec::new();
        let mut modules = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if keep.get(i).copied().unwrap_or(false) {
                remap[i] = Some(nodes.len());
                nodes.push(node.clone());
                modules.push(self.modules[i].clone());
            }
        }
        let links = self
            .links
            .iter()
            .filter_map(|l| match (remap[l.from], remap[l.to]) {
                (Some(from), Some(to)) => Some(Link { from, to, relation: l.relation }),
                _ => None,
            })
            .collect();
        let index = nodes.iter().enumerate().map(|(i, n)| (n.fqn.clone(), i)).collect();
        Graph { nodes, modules, index, links }
    }

    /// Nodes grouped by owning module, both levels sorted.
    #[must_use]
    pub fn nodes_by_module(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (i, n) in self.nodes.iter().enumerate() {
            out.entry(self.modules[i].clone()).or_default().push(n.fqn.clone());
        }
        out
    }
}

/// Options for `GraphAssembler::assemble`.
#[derive(Debug, Clone, Default)]
pub struct AssembleOptions {
    pub keep_self_loops: bool,
    /// Glob patterns matched against FQNs; `*` also matches dots.
    pub exclude_patterns: Vec<String>,
    /// Map every edge endpoint to its enclosing high-level component first.
    pub lift_to_components: bool,
    /// Drop call edges whose endpoints share an owning module.
    pub hide_intra_module_calls: bool,
}

/// Merges parser facts into one filtered `Graph`.
pub struct GraphAssembler {
    options: AssembleOptions,
    excludes: GlobSet,
}

impl GraphAssembler {
    /// # Errors
    /// Returns `AnalysisError::InvalidPattern` if an exclude pattern is not a valid glob.
    pub fn new(options: AssembleOptions) -> Result<Self, AnalysisError> {
        let excludes = build_globset(&options.exclude_patterns)?;
        Ok(Self { options, excludes })
    }

    #[must_use]
    pub fn is_excluded(&self, fqn: &str) -> bool {
        self.excludes.is_match(fqn)
    }

    /// Assemble the graph.
    ///
    /// Order of operations: self-loop removal, exclude-pattern node removal,
    /// dangling-edge removal, then node-set construction from surviving edge
    /// endpoints plus every surviving high-level component.
    #[must_use]
    pub fn assemble(&self, facts: &ProjectFacts) -> Graph {
        let declared: HashMap<&str, &Node> = facts.nodes.iter().map(|n| (n.fqn.as_str(), n)).collect();
        let module_map: HashMap<String, String> = facts
            .nodes
            .iter()
            .filter_map(|n| n.module.as_ref().map(|m| (n.fqn.clone(), m.clone())))
            .collect();
        let prefix_index = PrefixIndex::new(&module_map);
        let components: BTreeSet<&str> = facts
            .nodes
            .iter()
            .filter(|n| n.is_high_level_component)
            .map(|n| n.fqn.as_str())
            .collect();

        let lift = |fqn: &str| -> Option<String> {
            if !self.options.lift_to_components {
                return Some(fqn.to_string());
            }
            enclosing_component(fqn, &components).map(str::to_string)
        };

        let mut call_edges: BTreeSet<CallEdge> = BTreeSet::new();
        for e in &facts.call_edges {
            let (Some(caller), Some(callee)) = (lift(&e.caller), lift(&e.callee)) else {
                continue;
            };
            if caller == callee && !self.options.keep_self_loops {
                continue;
            }
            if self.options.hide_intra_module_calls
                && prefix_index.owning_module(&caller) == prefix_index.owning_module(&callee)
            {
                continue;
            }
            call_edges.insert(CallEdge { caller, callee });
        }
        let mut semantic_edges: BTreeSet<SemanticEdge> = BTreeSet::new();
        for e in &facts.semantic_edges {
            let (Some(source), Some(target)) = (lift(&e.source), lift(&e.target)) else {
                continue;
            };
            if source == target && !self.options.keep_self_loops {
                continue;
            }
            semantic_edges.insert(SemanticEdge { source, target, relation: e.relation });
        }

        // Nodes first, then edges: anything touching an excluded or unknown node goes.
        let alive = |fqn: &str| declared.contains_key(fqn) && !self.is_excluded(fqn);
        call_edges.retain(|e| alive(&e.caller) && alive(&e.callee));
        semantic_edges.retain(|e| alive(&e.source) && alive(&e.target));

        let mut keep: BTreeSet<&str> = components.iter().copied().filter(|c| alive(c)).collect();
        for e in &call_edges {
            keep.insert(&e.caller);
            keep.insert(&e.callee);
        }
        for e in &semantic_edges {
            keep.insert(&e.source);
            keep.insert(&e.target);
        }

        let nodes: Vec<Node> = keep.iter().filter_map(|f| declared.get(f).map(|n| (*n).clone())).collect();
        let modules: HashMap<String, String> =
            nodes.iter().map(|n| (n.fqn.clone(), prefix_index.owning_module(&n.fqn))).collect();

        let graph = Graph::from_parts(nodes, &modules, &call_edges, &semantic_edges);
        if graph.is_empty() {
            tracing::warn!("Assembled graph is empty after filtering");
        } else {
            tracing::info!(
                nodes = graph.node_count(),
                edges = graph.edge_count(),
                "Assembled architecture graph"
            );
        }
        graph
    }
}

/// Longest-prefix lookup from FQN to owning module.
struct PrefixIndex<'a> {
    map: &'a HashMap<String, String>,
}

impl<'a> PrefixIndex<'a> {
    fn new(map: &'a HashMap<String, String>) -> Self {
        Self { map }
    }

    fn owning_module(&self, fqn: &str) -> String {
        let mut candidate = fqn;
        loop {
            if let Some(m) = self.map.get(candidate) {
                return m.clone();
            }
            match candidate.rfind('.') {
                Some(pos) => candidate = &candidate[..pos],
                None => return parent_segment(fqn),
            }
        }
    }
}

/// The closest high-level component that is `fqn` itself or one of its dotted prefixes.
fn enclosing_component<'a>(fqn: &'a str, components: &BTreeSet<&str>) -> Option<&'a str> {
    let mut candidate = fqn;
    loop {
        if components.contains(candidate) {
            return Some(candidate);
        }
        candidate = &candidate[..candidate.rfind('.')?];
    }
}

/// Compile glob patterns where `*` may cross `.` boundaries.
///
/// # Errors
/// Returns `AnalysisError::InvalidPattern` for a malformed pattern.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet, AnalysisError> {
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        builder.add(GlobBuilder::new(p).literal_separator(false).build()?);
    }
    Ok(builder.build()?)
}

#[must_use]
pub fn last_segment(fqn: &str) -> &str {
    fqn.rsplit('.').next().unwrap_or(fqn)
}

/// Everything before the last dot, or the FQN itself for top-level names.
#[must_use]
pub fn parent_segment(fqn: &str) -> String {
    match fqn.rfind('.') {
        Some(pos) => fqn[..pos].to_string(),
        None => fqn.to_string(),
    }
}

/// Single leading underscore; dunder names such as `__init__` are not private.
#[must_use]
pub fn is_private_segment(segment: &str) -> bool {
    segment.starts_with('_') && !segment.starts_with("__")
}

/// Serializable snapshot handed to renderers and reporters.
#[derive(Debug, Clone, Serialize, Default)]
pub struct GraphData {
    pub nodes: Vec<Node>,
    pub call_edges: Vec<CallEdge>,
    pub semantic_edges: Vec<SemanticEdge>,
    pub nodes_by_module: BTreeMap<String, Vec<String>>,
    pub candidates: Vec<crate::recommend::Candidate>,
    pub filtered_out: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<crate::query::FocusSummary>,
}

impl GraphData {
    #[must_use]
    pub fn from_graph(graph: &Graph) -> Self {
        Self {
            nodes: graph.nodes().to_vec(),
            call_edges: graph.call_edges(),
            semantic_edges: graph.semantic_edges(),
            nodes_by_module: graph.nodes_by_module(),
            ..Self::default()
        }
    }

    /// Write pretty JSON to `path`.
    ///
    /// # Errors
    /// Returns an error if serialization or the file write fails.
    pub fn save_json(&self, path: &std::path::Path) -> Result<(), AnalysisError> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

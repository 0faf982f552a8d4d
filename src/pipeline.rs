//! From parser fact documents to the final `GraphData`.
//!
//! `collect_facts` wraps fact extraction in the incremental cache and the
//! parallel runner: hits are reused, misses are extracted in parallel, and the
//! cache is updated on the calling thread in input order once every worker has
//! returned. `load_project` adds discovery and graph assembly, and
//! `build_graph_data` applies focus, component filtering, and ranking.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::errors::AnalysisError;
use crate::graph::{AssembleOptions, CallEdge, Graph, GraphAssembler, GraphData, Node, ProjectFacts, SemanticEdge};
use crate::query::{ComponentsQuery, FocusQuery, Query};
use crate::recommend::{identify_framework, ProjectMetadata, Ranking, RecommendationEngine};
use crate::utils::cache::{clear_cache, IncrementalCache};
use crate::utils::config::Config;
use crate::utils::file_walker;
use crate::utils::parallel::ParallelTaskRunner;

/// Facts reported for one source file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileFacts {
    pub module: String,
    pub nodes: Vec<Node>,
    pub call_edges: Vec<CallEdge>,
    pub semantic_edges: Vec<SemanticEdge>,
    /// Modules imported by this file.
    pub imports: Vec<String>,
    /// The file has an `if __name__ == "__main__"` block.
    pub has_main_block: bool,
}

/// Read-only context shared by every extraction task.
#[derive(Debug, Clone, Default)]
pub struct ExtractContext {
    pub root: PathBuf,
    pub ignore_prefixes: Vec<String>,
}

impl ExtractContext {
    #[must_use]
    pub fn is_noise(&self, fqn: &str) -> bool {
        fqn.is_empty() || self.ignore_prefixes.iter().any(|p| fqn.starts_with(p.as_str()))
    }
}

/// Produces facts for one input file. Implementations must be pure.
pub trait FactExtractor: Sync {
    /// # Errors
    /// Returns an error when the file cannot be read or understood.
    fn extract(&self, path: &Path, ctx: &ExtractContext) -> Result<FileFacts, AnalysisError>;
}

/// Reads JSON fact documents written by an external parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFactExtractor;

impl FactExtractor for JsonFactExtractor {
    fn extract(&self, path: &Path, ctx: &ExtractContext) -> Result<FileFacts, AnalysisError> {
        let data = std::fs::read_to_string(path)?;
        let mut facts: FileFacts = serde_json::from_str(&data)
            .map_err(|e| AnalysisError::Extraction { file: path.to_path_buf(), message: e.to_string() })?;

        facts.nodes.retain(|n| !ctx.is_noise(&n.fqn));
        facts.call_edges.retain(|e| !ctx.is_noise(&e.caller) && !ctx.is_noise(&e.callee));
        facts.semantic_edges.retain(|e| !ctx.is_noise(&e.source) && !ctx.is_noise(&e.target));
        if !facts.module.is_empty() {
            for n in facts.nodes.iter_mut().filter(|n| n.module.is_none()) {
                n.module = Some(facts.module.clone());
            }
        }
        Ok(facts)
    }
}

/// How the cache participates in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Use,
    /// Neither read nor write.
    Ignore,
    /// Start empty and overwrite.
    Rebuild,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CollectStats {
    pub files: usize,
    pub cache_hits: usize,
    pub extracted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionFailure {
    pub file: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct CollectOutcome {
    pub facts: ProjectFacts,
    pub stats: CollectStats,
    pub failures: Vec<ExtractionFailure>,
}

/// Cache-or-recompute-in-parallel over `files`.
pub fn collect_facts<X: FactExtractor>(
    files: &[PathBuf],
    extractor: &X,
    ctx: &ExtractContext,
    mut cache: Option<&mut IncrementalCache<FileFacts>>,
    runner: &ParallelTaskRunner,
    batch_size: usize,
) -> CollectOutcome {
    if let Some(c) = cache.as_deref_mut() {
        c.prune(files);
    }
    let mut slots: Vec<Option<FileFacts>> =
        files.iter().map(|f| cache.as_deref().and_then(|c| c.get(f))).collect();
    let misses: Vec<usize> = (0..files.len()).filter(|&i| slots[i].is_none()).collect();
    let items: Vec<PathBuf> = misses.iter().map(|&i| files[i].clone()).collect();
    let stats_hits = files.len() - misses.len();
    tracing::info!(files = files.len(), cache_hits = stats_hits, to_extract = items.len(), "Collecting facts");

    let outcome = runner.run(|p: &PathBuf, c: &ExtractContext| extractor.extract(p, c), &items, ctx, batch_size);

    let mut failures = Vec::new();
    for f in &outcome.failures {
        failures.push(ExtractionFailure { file: items[f.index].clone(), message: f.error.to_string() });
    }
    let extracted = outcome.succeeded();
    for (slot_idx, result) in misses.into_iter().zip(outcome.results) {
        if let Some(facts) = result {
            if let Some(c) = cache.as_deref_mut() {
                c.update(&files[slot_idx], facts.clone());
            }
            slots[slot_idx] = Some(facts);
        }
    }
    if let Some(c) = cache {
        if let Err(e) = c.save() {
            tracing::warn!(error = %e, "Could not save analysis cache");
        }
    }

    let stats = CollectStats { files: files.len(), cache_hits: stats_hits, extracted, failed: failures.len() };
    CollectOutcome { facts: merge_facts(slots.into_iter().flatten()), stats, failures }
}

/// Union of per-file facts; duplicate nodes merge and edges deduplicate.
pub fn merge_facts<I: IntoIterator<Item = FileFacts>>(files: I) -> ProjectFacts {
    let mut nodes: BTreeMap<String, Node> = BTreeMap::new();
    let mut calls: BTreeSet<CallEdge> = BTreeSet::new();
    let mut semantic: BTreeSet<SemanticEdge> = BTreeSet::new();
    let mut module_imports: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut main_block_modules: BTreeSet<String> = BTreeSet::new();
    for f in files {
        for n in f.nodes {
            match nodes.get_mut(&n.fqn) {
                Some(existing) => existing.merge(&n),
                None => {
                    nodes.insert(n.fqn.clone(), n);
                }
            }
        }
        calls.extend(f.call_edges);
        semantic.extend(f.semantic_edges);
        if !f.module.is_empty() {
            if f.has_main_block {
                main_block_modules.insert(f.module.clone());
            }
            module_imports.entry(f.module).or_default().extend(f.imports);
        }
    }
    ProjectFacts {
        nodes: nodes.into_values().collect(),
        call_edges: calls.into_iter().collect(),
        semantic_edges: semantic.into_iter().collect(),
        module_imports,
        main_block_modules,
    }
}

/// Everything known about one project after assembly.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub facts: ProjectFacts,
    pub graph: Graph,
    pub stats: CollectStats,
    pub failures: Vec<ExtractionFailure>,
}

/// Discover fact documents under `root`, collect them, and assemble the graph.
///
/// # Errors
/// Returns an error for invalid exclude patterns.
pub fn load_project<X: FactExtractor>(
    root: &Path,
    config: &Config,
    mode: CacheMode,
    extractor: &X,
) -> Result<Project, AnalysisError> {
    let files = file_walker::fact_files(root, &config.analysis.fact_suffix, config.analysis.no_ignore);
    if files.is_empty() {
        tracing::warn!(root = %root.display(), suffix = %config.analysis.fact_suffix, "No fact files found");
    }
    let ctx = ExtractContext { root: root.to_path_buf(), ignore_prefixes: config.analysis.ignore_prefixes.clone() };
    let runner = ParallelTaskRunner::new(config.parallel.workers);

    let cache_dir = config.cache.dir_for(root);
    let fingerprint = config.fingerprint();
    let mut cache = match (config.cache.enabled, mode) {
        (false, _) | (_, CacheMode::Ignore) => None,
        (true, CacheMode::Use) => Some(IncrementalCache::open(root, &cache_dir, &fingerprint)),
        (true, CacheMode::Rebuild) => {
            if let Err(e) = clear_cache(&cache_dir) {
                tracing::warn!(error = %e, "Could not remove old cache");
            }
            Some(IncrementalCache::empty(root, &cache_dir, &fingerprint))
        }
    };

    let collected = collect_facts(&files, extractor, &ctx, cache.as_mut(), &runner, config.parallel.batch_size);
    let graph = assembler(config)?.assemble(&collected.facts);
    Ok(Project {
        root: root.to_path_buf(),
        facts: collected.facts,
        graph,
        stats: collected.stats,
        failures: collected.failures,
    })
}

/// Rebuild `project.graph` from the facts already collected, e.g. after the
/// exclude patterns changed. Nothing is re-extracted and the cache is untouched.
///
/// # Errors
/// Returns an error for invalid exclude patterns.
pub fn reassemble(project: &mut Project, config: &Config) -> Result<(), AnalysisError> {
    project.graph = assembler(config)?.assemble(&project.facts);
    Ok(())
}

fn assembler(config: &Config) -> Result<GraphAssembler, AnalysisError> {
    GraphAssembler::new(AssembleOptions {
        keep_self_loops: config.graph.keep_self_loops,
        exclude_patterns: config.graph.exclude_nodes.clone(),
        lift_to_components: config.graph.lift_to_components,
        hide_intra_module_calls: config.graph.hide_intra_module_calls,
    })
}

/// Rank entry-point candidates over the full graph.
///
/// # Errors
/// Returns an error for malformed scoring patterns.
pub fn rank_candidates(project: &Project, config: &Config) -> Result<Ranking, AnalysisError> {
    let mut metadata = ProjectMetadata::load(&project.root).with_overrides(&config.project);
    metadata.main_block_modules = project.facts.main_block_modules.clone();
    let framework = identify_framework(&metadata, &project.facts.module_imports, &config.scoring.frameworks);
    RecommendationEngine::new(&config.scoring)?.recommend(
        &project.graph,
        &config.analysis.context_roots,
        &metadata,
        framework.as_deref(),
    )
}

/// Focus, drop undersized components, and attach ranked candidates.
///
/// # Errors
/// Returns an error for malformed scoring patterns.
pub fn build_graph_data(project: &Project, config: &Config) -> Result<GraphData, AnalysisError> {
    let ranking = rank_candidates(project, config)?;

    let focused = FocusQuery::new(config.focus.clone()).run(&project.graph);
    let components = ComponentsQuery::new(config.graph.min_component_size).run(&focused.graph);

    let mut data = GraphData::from_graph(&components.graph);
    data.candidates = ranking.top(config.recommend.top_k);
    data.filtered_out = components.dropped;
    if !config.focus.entrypoints.is_empty() {
        data.focus = Some(focused.summary);
    }
    Ok(data)
}

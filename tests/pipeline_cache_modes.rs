use archscope::errors::AnalysisError;
use archscope::graph::{Node, NodeKind};
use archscope::pipeline::{
    self, merge_facts, CacheMode, ExtractContext, FactExtractor, FileFacts, JsonFactExtractor,
};
use archscope::utils::cache::CACHE_FILE_NAME;
use archscope::utils::config::Config;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    fs::write(path, content).unwrap();
}

fn write_facts(root: &Path, rel: &str, doc: &serde_json::Value) {
    write_file(&root.join(rel), &doc.to_string());
}

/// Counts how often the wrapped extractor actually runs.
#[derive(Default)]
struct Counting {
    calls: AtomicUsize,
}

impl FactExtractor for Counting {
    fn extract(&self, path: &Path, ctx: &ExtractContext) -> Result<FileFacts, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        JsonFactExtractor.extract(path, ctx)
    }
}

fn sample_project(root: &Path) {
    write_facts(
        root,
        "app/main.py.facts.json",
        &json!({
            "module": "app.main",
            "nodes": [
                {"fqn": "app.main.run", "kind": "function"},
                {"fqn": "app.main.App", "kind": "class", "is_high_level_component": true},
                {"fqn": "typing.List", "kind": "class"}
            ],
            "call_edges": [
                {"caller": "app.main.run", "callee": "app.core.step"},
                {"caller": "app.main.run", "callee": "typing.List"}
            ],
            "imports": ["app.core", "flask"]
        }),
    );
    write_facts(
        root,
        "app/core.py.facts.json",
        &json!({
            "module": "app.core",
            "nodes": [
                {"fqn": "app.core.step", "kind": "function"},
                {"fqn": "app.core.finish", "kind": "function"}
            ],
            "call_edges": [{"caller": "app.core.step", "callee": "app.core.finish"}],
            "semantic_edges": [{"source": "app.main.App", "target": "app.main.run", "relation": "registers"}]
        }),
    );
}

fn config() -> Config {
    let mut cfg = Config::default();
    cfg.parallel.workers = Some(2);
    cfg
}

#[test]
fn second_run_is_served_from_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    sample_project(root);
    let cfg = config();

    let x = Counting::default();
    let first = pipeline::load_project(root, &cfg, CacheMode::Use, &x).unwrap();
    assert_eq!(first.stats.files, 2);
    assert_eq!(first.stats.extracted, 2);
    assert_eq!(first.stats.cache_hits, 0);
    assert!(root.join(".archscope").join(CACHE_FILE_NAME).exists());

    let x2 = Counting::default();
    let second = pipeline::load_project(root, &cfg, CacheMode::Use, &x2).unwrap();
    assert_eq!(x2.calls.load(Ordering::SeqCst), 0);
    assert_eq!(second.stats.cache_hits, 2);
    assert_eq!(second.graph.call_edges(), first.graph.call_edges());
    assert_eq!(second.graph.node_count(), first.graph.node_count());
}

#[test]
fn changed_file_is_the_only_one_re_extracted() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    sample_project(root);
    let cfg = config();
    pipeline::load_project(root, &cfg, CacheMode::Use, &JsonFactExtractor).unwrap();

    write_facts(
        root,
        "app/core.py.facts.json",
        &json!({
            "module": "app.core",
            "nodes": [{"fqn": "app.core.step", "kind": "function"}, {"fqn": "app.core.done", "kind": "function"}],
            "call_edges": [{"caller": "app.core.step", "callee": "app.core.done"}]
        }),
    );
    let x = Counting::default();
    let p = pipeline::load_project(root, &cfg, CacheMode::Use, &x).unwrap();
    assert_eq!(x.calls.load(Ordering::SeqCst), 1);
    assert_eq!(p.stats.cache_hits, 1);
    assert!(p.graph.contains("app.core.done"));
    assert!(!p.graph.contains("app.core.finish"));
}

#[test]
fn ignore_mode_neither_reads_nor_writes() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    sample_project(root);
    let p = pipeline::load_project(root, &config(), CacheMode::Ignore, &JsonFactExtractor).unwrap();
    assert_eq!(p.stats.extracted, 2);
    assert!(!root.join(".archscope").exists());
}

#[test]
fn rebuild_mode_recomputes_and_rewrites() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    sample_project(root);
    let cfg = config();
    pipeline::load_project(root, &cfg, CacheMode::Use, &JsonFactExtractor).unwrap();

    let x = Counting::default();
    let p = pipeline::load_project(root, &cfg, CacheMode::Rebuild, &x).unwrap();
    assert_eq!(x.calls.load(Ordering::SeqCst), 2);
    assert_eq!(p.stats.cache_hits, 0);

    let again = pipeline::load_project(root, &cfg, CacheMode::Use, &JsonFactExtractor).unwrap();
    assert_eq!(again.stats.cache_hits, 2);
}

#[test]
fn disabled_cache_in_config_behaves_like_ignore() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    sample_project(root);
    let mut cfg = config();
    cfg.cache.enabled = false;
    pipeline::load_project(root, &cfg, CacheMode::Use, &JsonFactExtractor).unwrap();
    assert!(!root.join(".archscope").exists());
}

#[test]
fn broken_document_is_reported_and_others_still_load() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    sample_project(root);
    write_file(&root.join("app/broken.py.facts.json"), "{ this is not json");
    let cfg = config();

    let p = pipeline::load_project(root, &cfg, CacheMode::Use, &JsonFactExtractor).unwrap();
    assert_eq!(p.stats.files, 3);
    assert_eq!(p.stats.failed, 1);
    assert_eq!(p.failures.len(), 1);
    assert!(p.failures[0].file.ends_with("app/broken.py.facts.json"));
    assert!(p.graph.contains("app.core.step"));

    // Failures are not cached
    let again = pipeline::load_project(root, &cfg, CacheMode::Use, &JsonFactExtractor).unwrap();
    assert_eq!(again.stats.cache_hits, 2);
    assert_eq!(again.stats.failed, 1);
}

#[test]
fn noise_prefixes_and_modules_are_applied_during_extraction() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    sample_project(root);
    let p = pipeline::load_project(root, &config(), CacheMode::Ignore, &JsonFactExtractor).unwrap();

    assert!(!p.facts.nodes.iter().any(|n| n.fqn == "typing.List"));
    assert!(!p.facts.call_edges.iter().any(|e| e.callee == "typing.List"));
    let run = p.facts.nodes.iter().find(|n| n.fqn == "app.main.run").unwrap();
    assert_eq!(run.module.as_deref(), Some("app.main"));
    assert!(p.facts.module_imports["app.main"].contains("flask"));
    assert_eq!(p.graph.module_of(p.graph.index_of("app.main.run").unwrap()), "app.main");
}

#[test]
fn suffix_and_ignore_files_control_discovery() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    sample_project(root);
    write_file(&root.join("app/notes.json"), "{}");
    write_file(&root.join("build/gen.py.facts.json"), "{}");
    write_file(&root.join(".ignore"), "build/\n");

    let p = pipeline::load_project(root, &config(), CacheMode::Ignore, &JsonFactExtractor).unwrap();
    assert_eq!(p.stats.files, 2);

    let mut cfg = config();
    cfg.analysis.no_ignore = true;
    let p = pipeline::load_project(root, &cfg, CacheMode::Ignore, &JsonFactExtractor).unwrap();
    assert_eq!(p.stats.files, 3);
}

#[test]
fn invalid_exclude_pattern_fails_the_load() {
    let tmp = tempfile::tempdir().unwrap();
    sample_project(tmp.path());
    let mut cfg = config();
    cfg.graph.exclude_nodes = vec!["app.[".to_string()];
    let err = pipeline::load_project(tmp.path(), &cfg, CacheMode::Ignore, &JsonFactExtractor).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidPattern(_)));
}

#[test]
fn graph_data_carries_focus_candidates_and_dropped_nodes() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    sample_project(root);
    write_facts(
        root,
        "tools/lonely.py.facts.json",
        &json!({"module": "tools.lonely", "nodes": [{"fqn": "tools.lonely.Tool", "is_high_level_component": true}]}),
    );
    let cfg = config();
    let p = pipeline::load_project(root, &cfg, CacheMode::Ignore, &JsonFactExtractor).unwrap();
    assert!(p.graph.contains("tools.lonely.Tool"));

    let data = pipeline::build_graph_data(&p, &cfg).unwrap();
    assert_eq!(data.filtered_out, vec!["tools.lonely.Tool".to_string()]);
    assert!(data.focus.is_none());
    assert!(!data.candidates.is_empty());
    assert!(data.candidates.len() <= cfg.recommend.top_k);

    let mut focused = cfg.clone();
    focused.focus.entrypoints = vec!["app.core.step".to_string()];
    focused.focus.direction = archscope::query::Direction::Downstream;
    focused.focus.enable_dynamic_depth = false;
    let data = pipeline::build_graph_data(&p, &focused).unwrap();
    let names: Vec<&str> = data.nodes.iter().map(|n| n.fqn.as_str()).collect();
    assert_eq!(names, vec!["app.core.finish", "app.core.step"]);
    let summary = data.focus.unwrap();
    assert_eq!(summary.entrypoints, vec!["app.core.step".to_string()]);
}

#[test]
fn merging_unions_flags_and_deduplicates_edges() {
    let a = FileFacts {
        module: "m".to_string(),
        nodes: vec![Node::new("m.X", NodeKind::Class)],
        call_edges: vec![archscope::graph::CallEdge::new("m.X", "m.y")],
        ..FileFacts::default()
    };
    let b = FileFacts {
        module: "m".to_string(),
        nodes: vec![Node::component("m.X", NodeKind::Class)],
        call_edges: vec![archscope::graph::CallEdge::new("m.X", "m.y")],
        imports: vec!["os".to_string()],
        has_main_block: true,
        ..FileFacts::default()
    };
    let merged = merge_facts(vec![a, b]);
    assert_eq!(merged.main_block_modules.iter().collect::<Vec<_>>(), vec!["m"]);
    assert_eq!(merged.nodes.len(), 1);
    assert!(merged.nodes[0].is_high_level_component);
    assert_eq!(merged.call_edges.len(), 1);
    assert!(merged.module_imports["m"].contains("os"));
}

#[test]
fn main_block_flag_reaches_ranking() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write_facts(
        root,
        "app/tool.py.facts.json",
        &json!({"module": "app.tool", "has_main_block": true,
                "nodes": [{"fqn": "app.tool.go"}, {"fqn": "app.tool.step"}],
                "call_edges": [{"caller": "app.tool.go", "callee": "app.tool.step"}]}),
    );
    write_facts(
        root,
        "app/lib.py.facts.json",
        &json!({"module": "app.lib",
                "nodes": [{"fqn": "app.lib.go"}, {"fqn": "app.lib.step"}],
                "call_edges": [{"caller": "app.lib.go", "callee": "app.lib.step"}]}),
    );
    let cfg = Config::default();
    let project = pipeline::load_project(root, &cfg, CacheMode::Ignore, &JsonFactExtractor).unwrap();
    assert!(project.facts.main_block_modules.contains("app.tool"));
    assert!(!project.facts.main_block_modules.contains("app.lib"));

    let ranking = pipeline::rank_candidates(&project, &cfg).unwrap();
    let tool = ranking.get("app.tool.go").unwrap();
    let lib = ranking.get("app.lib.go").unwrap();
    assert!((tool.heuristic - lib.heuristic - cfg.scoring.main_block_bonus).abs() < 1e-9);
    assert!(tool.score > lib.score);
}

#[test]
fn reassemble_applies_new_excludes_without_extracting() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    sample_project(root);
    let extractor = Counting::default();
    let mut cfg = Config::default();
    let mut project = pipeline::load_project(root, &cfg, CacheMode::Ignore, &extractor).unwrap();
    let calls = extractor.calls.load(Ordering::SeqCst);
    let before = project.graph.node_count();

    cfg.graph.exclude_nodes.push("app.core.*".to_string());
    pipeline::reassemble(&mut project, &cfg).unwrap();
    assert!(project.graph.node_count() < before);
    assert!(project.graph.nodes().iter().all(|n| !n.fqn.starts_with("app.core.")));
    assert_eq!(extractor.calls.load(Ordering::SeqCst), calls);
    assert!(!root.join(".archscope").exists());

    cfg.graph.exclude_nodes.push("app.[".to_string());
    assert!(matches!(pipeline::reassemble(&mut project, &cfg), Err(AnalysisError::InvalidPattern(_))));
}

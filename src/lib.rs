//! archscope — architecture exploration for large codebases
//!
//! Turn facts emitted by a source-language parser (entities, call edges, and
//! semantic edges such as registration, inheritance, or decoration) into a
//! navigable, rankable architecture graph.
//!
//! # Features
//! - Incremental, content-addressed per-file cache with atomic writes
//! - Parallel fact extraction with per-item failure isolation
//! - Graph assembly with self-loop, exclude-pattern, and component filtering
//! - Adaptive focus search: depth escalation and bidirectional-to-downstream fallback on hubs
//! - Entry-point recommendation combining centrality, heuristics, and framework bonuses
//! - Interactive wizard for very large projects
//!
//! # Quickstart (Library)
//! ```no_run
//! use archscope::pipeline::{self, CacheMode, JsonFactExtractor};
//! use archscope::utils::config::load_config_near;
//!
//! let root = std::path::Path::new(".");
//! let config = load_config_near(root).expect("config");
//! let project = pipeline::load_project(root, &config, CacheMode::Use, &JsonFactExtractor).expect("load");
//! let data = pipeline::build_graph_data(&project, &config).expect("graph data");
//! println!("nodes: {} call edges: {}", data.nodes.len(), data.call_edges.len());
//! ```
//!
//! # Quickstart (CLI)
//! ```text
//! archscope analyze --path . --entry app.main.run --out graph.json
//! archscope recommend --path . --top 5
//! ```
pub mod app;
pub mod cli;
pub mod errors;
pub mod graph;
pub mod pipeline;
pub mod query;
pub mod recommend;
pub mod utils;

use crate::cli::{Cli, Commands, OutputFormat};
use crate::errors::AnalysisError;
use crate::graph::GraphData;
use crate::pipeline::{self, CacheMode, JsonFactExtractor, Project};
use crate::recommend::{needs_wizard, Candidate, StdioPrompt, Wizard, WizardOutcome};
use crate::utils::config::{self, Config};
use crate::utils::{cache, project_root, table};
use clap::CommandFactory;
use clap_complete::generate;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

/// Run the CLI logic in-process.
///
/// Returns an exit code: 0 success, 1 runtime failure, 2 invalid configuration or arguments.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn run_cli(cli: Cli) -> i32 {
    let quiet = cli.quiet;
    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let bin_name = env!("CARGO_PKG_NAME");
            generate(shell, &mut cmd, bin_name, &mut io::stdout());
            0
        }
        Commands::Analyze {
            path,
            config,
            no_cache,
            rebuild,
            no_ignore,
            entries,
            direction,
            depth,
            excludes,
            force,
            out,
            format,
        } => {
            let root = project_root::effective_path_opt(path.as_deref());
            let mut cfg = match load_config(&root, config.as_deref()) {
                Ok(c) => c,
                Err(code) => return code,
            };
            cfg.analysis.no_ignore |= no_ignore;
            if !entries.is_empty() {
                cfg.focus.entrypoints = entries;
            }
            if let Some(d) = direction {
                cfg.focus.direction = d.into();
            }
            if let Some(d) = depth {
                cfg.focus.initial_depth = d;
            }
            cfg.graph.exclude_nodes.extend(excludes);

            let config_path = config_file(&root, config.as_deref());
            let mut project = match load(&root, &cfg, cache_mode(no_cache, rebuild)) {
                Ok(p) => p,
                Err(code) => return code,
            };

            let interactive = io::stdin().is_terminal() && io::stdout().is_terminal();
            if !force && needs_wizard(project.graph.node_count(), &cfg, interactive) {
                tracing::warn!(
                    nodes = project.graph.node_count(),
                    limit = cfg.recommend.warn_node_count,
                    "Large graph without focus or filter"
                );
                match wizard(&mut project, &mut cfg, &config_path) {
                    Ok(true) => {}
                    Ok(false) => return 0,
                    Err(e) => {
                        eprintln!("Wizard failed: {e}");
                        return 1;
                    }
                }
            }

            let data = match pipeline::build_graph_data(&project, &cfg) {
                Ok(d) => d,
                Err(e) => {
                    eprintln!("Analysis failed: {e}");
                    return 1;
                }
            };
            report(&project, &data, out.as_deref(), format, quiet)
        }
        Commands::Recommend { path, config, no_cache, top, format } => {
            let root = project_root::effective_path_opt(path.as_deref());
            let cfg = match load_config(&root, config.as_deref()) {
                Ok(c) => c,
                Err(code) => return code,
            };
            let project = match load(&root, &cfg, cache_mode(no_cache, false)) {
                Ok(p) => p,
                Err(code) => return code,
            };
            let ranking = match pipeline::rank_candidates(&project, &cfg) {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("Ranking failed: {e}");
                    return 1;
                }
            };
            let picks = ranking.top(top.unwrap_or(cfg.recommend.top_k));
            if format == OutputFormat::Json {
                return print_json(&picks);
            }
            if picks.is_empty() {
                println!("<no candidates>");
            } else {
                println!("{}", candidate_table(&picks));
            }
            0
        }
        Commands::Wizard { path, config, no_cache, out } => {
            let root = project_root::effective_path_opt(path.as_deref());
            let mut cfg = match load_config(&root, config.as_deref()) {
                Ok(c) => c,
                Err(code) => return code,
            };
            let config_path = config_file(&root, config.as_deref());
            let mut project = match load(&root, &cfg, cache_mode(no_cache, false)) {
                Ok(p) => p,
                Err(code) => return code,
            };
            match wizard(&mut project, &mut cfg, &config_path) {
                Ok(true) => {}
                Ok(false) => return 0,
                Err(e) => {
                    eprintln!("Wizard failed: {e}");
                    return 1;
                }
            }
            match pipeline::build_graph_data(&project, &cfg) {
                Ok(data) => report(&project, &data, out.as_deref(), OutputFormat::Text, quiet),
                Err(e) => {
                    eprintln!("Analysis failed: {e}");
                    1
                }
            }
        }
        Commands::ClearCache { path, config } => {
            let root = project_root::effective_path_opt(path.as_deref());
            let cfg = match load_config(&root, config.as_deref()) {
                Ok(c) => c,
                Err(code) => return code,
            };
            match cache::clear_cache(&cfg.cache.dir_for(&root)) {
                Ok(removed) => {
                    if !quiet {
                        if removed {
                            println!("Cache cleared for path: {}", root.display());
                        } else {
                            println!("No cache found for path: {}", root.display());
                        }
                    }
                    0
                }
                Err(e) => {
                    eprintln!("Failed to clear cache: {e}");
                    1
                }
            }
        }
    }
}

fn cache_mode(no_cache: bool, rebuild: bool) -> CacheMode {
    if rebuild {
        CacheMode::Rebuild
    } else if no_cache {
        CacheMode::Ignore
    } else {
        CacheMode::Use
    }
}

fn load_config(root: &Path, explicit: Option<&Path>) -> Result<Config, i32> {
    let loaded = match explicit {
        Some(p) => config::load_config_at(p),
        None => config::load_config_near(root),
    };
    loaded.map_err(|e| {
        eprintln!("Cannot load configuration: {e}");
        2
    })
}

fn config_file(root: &Path, explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(|| root.join(config::CONFIG_FILE_NAME), Path::to_path_buf)
}

fn load(root: &Path, cfg: &Config, mode: CacheMode) -> Result<Project, i32> {
    match pipeline::load_project(root, cfg, mode, &JsonFactExtractor) {
        Ok(p) => {
            for f in &p.failures {
                eprintln!("Skipped {}: {}", f.file.display(), f.message);
            }
            Ok(p)
        }
        Err(e @ AnalysisError::InvalidPattern(_)) => {
            eprintln!("Invalid exclude pattern: {e}");
            Err(2)
        }
        Err(e) => {
            eprintln!("Analysis failed: {e}");
            Err(1)
        }
    }
}

/// Run the interactive wizard on stdin/stdout. Returns `false` when the user
/// chose to exit.
fn wizard(project: &mut Project, cfg: &mut Config, config_path: &Path) -> Result<bool, AnalysisError> {
    let ranking = pipeline::rank_candidates(project, cfg)?;
    let stdin = io::stdin();
    let mut prompt = StdioPrompt::new(stdin.lock(), io::stdout());
    let outcome = Wizard::new(&project.graph, &ranking, cfg).run(&mut prompt)?;
    follow_wizard(outcome, project, cfg, config_path)
}

/// Apply a wizard decision to this run and save it to `config_path` so later
/// runs start from it. New exclude patterns reassemble the graph from the
/// facts already collected. Returns `false` when the user chose to exit.
///
/// A failed save is logged and the run continues.
///
/// # Errors
/// Returns an error if the updated exclude patterns are invalid.
pub fn follow_wizard(
    outcome: WizardOutcome,
    project: &mut Project,
    cfg: &mut Config,
    config_path: &Path,
) -> Result<bool, AnalysisError> {
    let Some(exclude_changed) = apply_outcome(outcome.clone(), cfg) else {
        return Ok(false);
    };
    if exclude_changed {
        pipeline::reassemble(project, cfg)?;
    }
    let setting = match outcome {
        WizardOutcome::ForceFull => ("recommend.force_analysis", toml::Value::Boolean(true)),
        WizardOutcome::Exclude(_) => ("graph.exclude_nodes", toml::Value::from(cfg.graph.exclude_nodes.clone())),
        _ => ("focus.entrypoints", toml::Value::from(cfg.focus.entrypoints.clone())),
    };
    if let Err(e) = config::update_config_file(config_path, &[setting]) {
        tracing::warn!(path = %config_path.display(), error = %e, "Could not save wizard choice");
    }
    Ok(true)
}

/// Fold a wizard decision into the run configuration.
#[must_use]
pub fn apply_outcome(outcome: WizardOutcome, cfg: &mut Config) -> Option<bool> {
    match outcome {
        WizardOutcome::Focus { entrypoint, .. } => {
            cfg.focus.entrypoints = vec![entrypoint];
            Some(false)
        }
        WizardOutcome::ManualFocus(fqns) => {
            cfg.focus.entrypoints = fqns;
            Some(false)
        }
        WizardOutcome::Exclude(patterns) => {
            cfg.graph.exclude_nodes.extend(patterns);
            Some(true)
        }
        WizardOutcome::ForceFull => {
            cfg.recommend.force_analysis = true;
            Some(false)
        }
        WizardOutcome::Exit => None,
    }
}

fn report(project: &Project, data: &GraphData, out: Option<&Path>, format: OutputFormat, quiet: bool) -> i32 {
    if let Some(path) = out {
        if let Err(e) = data.save_json(path) {
            eprintln!("Failed to write graph JSON {}: {e}", path.display());
            return 1;
        }
    }
    if format == OutputFormat::Json {
        return print_json(data);
    }
    if quiet {
        return 0;
    }

    let s = &project.stats;
    let rows = vec![
        vec!["Fact files".to_string(), s.files.to_string()],
        vec!["Cache hits".to_string(), s.cache_hits.to_string()],
        vec!["Extracted".to_string(), s.extracted.to_string()],
        vec!["Failed".to_string(), s.failed.to_string()],
        vec!["Nodes".to_string(), data.nodes.len().to_string()],
        vec!["Call edges".to_string(), data.call_edges.len().to_string()],
        vec!["Semantic edges".to_string(), data.semantic_edges.len().to_string()],
        vec!["Modules".to_string(), data.nodes_by_module.len().to_string()],
        vec!["Dropped (small components)".to_string(), data.filtered_out.len().to_string()],
    ];
    println!("{}", table::render(&["Metric", "Value"], &rows));
    if let Some(f) = &data.focus {
        println!(
            "Focus: depth {} ({}){}",
            f.depth_reached,
            f.direction_used,
            if f.fell_back_to_downstream { ", fell back to downstream" } else { "" }
        );
        if !f.missing_entrypoints.is_empty() {
            println!("Missing entry points: {}", f.missing_entrypoints.join(", "));
        }
    }
    if !data.candidates.is_empty() {
        println!("{}", candidate_table(&data.candidates));
    }
    if let Some(path) = out {
        println!("Graph written to: {}", path.display());
    }
    0
}

fn candidate_table(picks: &[Candidate]) -> String {
    let rows: Vec<Vec<String>> = picks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            vec![
                (i + 1).to_string(),
                c.fqn.clone(),
                c.module.clone(),
                format!("{:.1}", c.score),
                format!("{:.1}", c.heuristic),
                format!("{:.3}", c.centrality),
                format!("{:.1}", c.framework_bonus),
                format!("{:.1}", c.entrypoint_bonus),
            ]
        })
        .collect();
    table::render(&["#", "FQN", "Module", "Score", "Heuristic", "Centrality", "Framework", "Entry"], &rows)
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{s}");
            0
        }
        Err(e) => {
            eprintln!("JSON encode error: {e}");
            1
        }
    }
}

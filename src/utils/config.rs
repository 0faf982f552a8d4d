//! Typed configuration loaded from `archscope.toml`.
//!
//! Every section and field is optional in the file; missing values take the
//! defaults documented on each struct.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::AnalysisError;
use crate::query::centrality::CentralityConfig;
use crate::query::FocusConfig;

pub const CONFIG_FILE_NAME: &str = "archscope.toml";

/// FQN prefixes of standard-library and compatibility shims that parsers
/// tend to report but that never belong to the analysed project.
const DEFAULT_IGNORE_PREFIXES: &[&str] = &[
    "builtins.", "typing.", "collections.", "functools.", "itertools.", "operator.",
    "contextlib.", "enum.", "abc.", "types.", "copy.", "weakref.", "dataclasses.",
    "importlib.", "sys.", "warnings.", "inspect.", "traceback.", "math.", "random.",
    "string.", "re.", "textwrap.", "struct.", "codecs.", "datetime.", "time.",
    "pathlib.", "os.", "shutil.", "glob.", "fnmatch.", "logging.", "pprint.", "pdb.",
    "six.", "typing_extensions.", "attr.", "attrs.",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisConfig,
    pub cache: CacheConfig,
    pub parallel: ParallelConfig,
    pub graph: GraphConfig,
    pub focus: FocusConfig,
    pub scoring: ScoringConfig,
    pub recommend: RecommendConfig,
    pub project: ProjectOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Suffix of the per-source-file fact documents, e.g. `app/main.py.facts.json`.
    pub fact_suffix: String,
    /// FQN prefixes treated as the project's own code. Empty means every non-external node.
    pub context_roots: Vec<String>,
    pub ignore_prefixes: Vec<String>,
    /// Walk files even if `.gitignore`/`.ignore` exclude them.
    pub no_ignore: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fact_suffix: ".facts.json".to_string(),
            context_roots: Vec::new(),
            ignore_prefixes: DEFAULT_IGNORE_PREFIXES.iter().map(|s| (*s).to_string()).collect(),
            no_ignore: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Relative paths resolve against the project root.
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true, dir: PathBuf::from(".archscope") }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn dir_for(&self, root: &Path) -> PathBuf {
        if self.dir.is_absolute() {
            self.dir.clone()
        } else {
            root.join(&self.dir)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Defaults to the number of available CPUs.
    pub workers: Option<usize>,
    pub batch_size: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self { workers: None, batch_size: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub keep_self_loops: bool,
    pub exclude_nodes: Vec<String>,
    pub min_component_size: usize,
    pub lift_to_components: bool,
    pub hide_intra_module_calls: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            keep_self_loops: false,
            exclude_nodes: Vec::new(),
            min_component_size: 2,
            lift_to_components: false,
            hide_intra_module_calls: false,
        }
    }
}

/// Glob pattern plus a signed score contribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternRule {
    pub pattern: String,
    pub score: f64,
}

impl PatternRule {
    #[must_use]
    pub fn new(pattern: &str, score: f64) -> Self {
        Self { pattern: pattern.to_string(), score }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FrameworkRules {
    /// Matched against the declared project name and against top-level imports.
    pub project_name: String,
    pub bonus_points: Vec<PatternRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoreWeights {
    pub heuristic: f64,
    pub centrality: f64,
    pub framework: f64,
    pub entry_point: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { heuristic: 1.0, centrality: 100.0, framework: 1.0, entry_point: 1.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    /// Matched against the trailing identifier of an FQN.
    pub name_rules: Vec<PatternRule>,
    /// Matched against the owning module and the full FQN.
    pub path_rules: Vec<PatternRule>,
    pub private_penalty: f64,
    pub class_like_bonus: f64,
    pub isolated_penalty: f64,
    pub entry_point_bonus: f64,
    /// Added to every definition in a module with a `__main__` block.
    pub main_block_bonus: f64,
    pub frameworks: BTreeMap<String, FrameworkRules>,
    pub centrality: CentralityConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            name_rules: vec![
                PatternRule::new("main", 50.0),
                PatternRule::new("run", 20.0),
                PatternRule::new("cli", 20.0),
                PatternRule::new("*App", 30.0),
                PatternRule::new("*Application", 30.0),
                PatternRule::new("*Engine", 15.0),
                PatternRule::new("test_*", -100.0),
                PatternRule::new("*Error", -30.0),
                PatternRule::new("*Exception", -30.0),
            ],
            path_rules: vec![
                PatternRule::new("*.main", 40.0),
                PatternRule::new("*.cli", 30.0),
                PatternRule::new("*.app", 25.0),
                PatternRule::new("*.core*", 10.0),
                PatternRule::new("*test*", -100.0),
                PatternRule::new("*.utils*", -20.0),
            ],
            private_penalty: 0.5,
            class_like_bonus: 1.2,
            isolated_penalty: 0.5,
            entry_point_bonus: 150.0,
            main_block_bonus: 40.0,
            frameworks: default_frameworks(),
            centrality: CentralityConfig::default(),
        }
    }
}

fn default_frameworks() -> BTreeMap<String, FrameworkRules> {
    let fw = |name: &str, rules: &[(&str, f64)]| FrameworkRules {
        project_name: name.to_string(),
        bonus_points: rules.iter().map(|(p, s)| PatternRule::new(p, *s)).collect(),
    };
    BTreeMap::from([
        ("django".to_string(), fw("django", &[("*.urls", 60.0), ("*.views.*", 40.0), ("*.management.commands.*", 30.0)])),
        ("fastapi".to_string(), fw("fastapi", &[("*.main.app", 80.0), ("*.routers.*", 40.0), ("*.api.*", 30.0)])),
        ("flask".to_string(), fw("flask", &[("*.create_app", 80.0), ("*.app", 50.0), ("*.views.*", 30.0)])),
    ])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    pub top_k: usize,
    /// Focus results smaller than this are rejected during the wizard loop.
    pub min_meaningful_nodes: usize,
    /// Graphs larger than this prompt for the wizard when run interactively.
    pub warn_node_count: usize,
    /// Analyse the full graph without asking. Set when the wizard's force option is chosen.
    pub force_analysis: bool,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self { top_k: 5, min_meaningful_nodes: 3, warn_node_count: 3000, force_analysis: false }
    }
}

/// Values that take precedence over `pyproject.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectOverrides {
    pub name: Option<String>,
    pub entrypoints: Vec<String>,
}

impl Config {
    /// Hash of the settings that shape per-file analysis payloads.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        #[derive(Serialize)]
        struct Shape<'a> {
            fact_suffix: &'a str,
            ignore_prefixes: &'a [String],
        }
        let shape = Shape {
            fact_suffix: &self.analysis.fact_suffix,
            ignore_prefixes: &self.analysis.ignore_prefixes,
        };
        let json = serde_json::to_vec(&shape).unwrap_or_default();
        Sha256::digest(&json).iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// # Errors
/// Returns an error if the file cannot be read or is not valid configuration.
pub fn load_config_at(path: &Path) -> Result<Config, AnalysisError> {
    let data = fs::read_to_string(path)?;
    Ok(toml::from_str::<Config>(&data)?)
}

/// Set dotted keys such as `focus.entrypoints` in the TOML file at `path`,
/// creating the file and any missing tables. Other settings are kept, but
/// comments and formatting are not.
///
/// # Errors
/// Returns an error if the file cannot be read, parsed, or written, or if a
/// key runs through a value that is not a table.
pub fn update_config_file(path: &Path, updates: &[(&str, toml::Value)]) -> Result<(), AnalysisError> {
    let mut doc: toml::Table = if path.is_file() { fs::read_to_string(path)?.parse()? } else { toml::Table::new() };
    for (key, value) in updates {
        let mut segments: Vec<&str> = key.split('.').collect();
        let Some(leaf) = segments.pop() else { continue };
        let mut table = &mut doc;
        for seg in segments {
            let entry = table.entry(seg).or_insert(toml::Value::Table(toml::Table::new()));
            table = match entry {
                toml::Value::Table(t) => t,
                _ => {
                    return Err(AnalysisError::ConfigUpdate {
                        path: path.to_path_buf(),
                        message: format!("`{seg}` in `{key}` is not a table"),
                    })
                }
            };
        }
        table.insert(leaf.to_string(), value.clone());
    }
    let text = toml::to_string(&doc)
        .map_err(|e| AnalysisError::ConfigUpdate { path: path.to_path_buf(), message: e.to_string() })?;
    fs::write(path, text)?;
    tracing::info!(path = %path.display(), keys = updates.len(), "Updated configuration file");
    Ok(())
}

/// Load `archscope.toml` from `root`, or defaults when there is none.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_near(root: &Path) -> Result<Config, AnalysisError> {
    let p = root.join(CONFIG_FILE_NAME);
    if p.is_file() {
        tracing::debug!(path = %p.display(), "Loading configuration");
        load_config_at(&p)
    } else {
        Ok(Config::default())
    }
}

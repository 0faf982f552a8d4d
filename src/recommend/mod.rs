//! Entry-point recommendation.
//!
//! Every internal node gets four sub-scores:
//!
//! - **heuristic**: signed name/path glob rules plus a bonus for modules with
//!   a `__main__` block, scaled down for private segments and up for
//!   class-like names;
//! - **centrality**: combined PageRank/out-degree score in `[0, 1]`;
//! - **framework**: bonus patterns of the detected framework;
//! - **entry point**: flat bonus for packaging-declared entry points.
//!
//! The final score is their weighted sum, scaled down for isolated nodes.
//! Ranking is by score descending with ties broken by FQN.
use globset::GlobSet;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::errors::AnalysisError;
use crate::graph::{build_globset, is_private_segment, last_segment, Graph};
use crate::query::{CentralityQuery, Query};
use crate::utils::config::{PatternRule, ScoringConfig};

pub mod ecosystem;
pub mod wizard;

pub use ecosystem::{identify_framework, ProjectMetadata};
pub use wizard::{needs_wizard, Choice, Prompt, StdioPrompt, Wizard, WizardOutcome, WizardState};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Candidate {
    pub fqn: String,
    pub module: String,
    pub heuristic: f64,
    pub centrality: f64,
    pub framework_bonus: f64,
    pub entrypoint_bonus: f64,
    pub score: f64,
}

/// Compiled glob rules; one pass over the set yields every matching rule.
struct RuleSet {
    globs: GlobSet,
    scores: Vec<f64>,
}

impl RuleSet {
    fn compile(rules: &[PatternRule]) -> Result<Self, AnalysisError> {
        let patterns: Vec<String> = rules.iter().map(|r| r.pattern.clone()).collect();
        Ok(Self { globs: build_globset(&patterns)?, scores: rules.iter().map(|r| r.score).collect() })
    }

    fn matching(&self, subject: &str) -> Vec<usize> {
        self.globs.matches(subject)
    }

    fn score(&self, subject: &str) -> f64 {
        self.sum(self.matching(subject))
    }

    /// Adds up the matched rule scores. An empty match gives `+0.0`.
    fn sum<I: IntoIterator<Item = usize>>(&self, matched: I) -> f64 {
        matched.into_iter().map(|i| self.scores[i]).fold(0.0, |acc, s| acc + s)
    }
}

/// Multiply positive scores by `factor` and divide negative ones by it, so a
/// factor below 1 always lowers the score and a factor above 1 always raises it.
#[must_use]
pub fn apply_factor(score: f64, factor: f64) -> f64 {
    if factor <= 0.0 {
        return score;
    }
    if score >= 0.0 {
        score * factor
    } else {
        score / factor
    }
}

fn is_class_like(name: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z][A-Za-z0-9]*$").expect("class-like pattern"))
        .is_match(name)
}

pub struct RecommendationEngine {
    config: ScoringConfig,
    name_rules: RuleSet,
    path_rules: RuleSet,
}

impl RecommendationEngine {
    /// # Errors
    /// Returns `AnalysisError::InvalidPattern` for a malformed rule pattern.
    pub fn new(config: &ScoringConfig) -> Result<Self, AnalysisError> {
        Ok(Self {
            name_rules: RuleSet::compile(&config.name_rules)?,
            path_rules: RuleSet::compile(&config.path_rules)?,
            config: config.clone(),
        })
    }

    /// Heuristic sub-score for one FQN owned by `module`. `has_main_block`
    /// adds the main-block bonus before the private and class-like factors.
    #[must_use]
    pub fn heuristic_score(&self, fqn: &str, module: &str, has_main_block: bool) -> f64 {
        let name = last_segment(fqn);
        let mut paths: BTreeSet<usize> = self.path_rules.matching(module).into_iter().collect();
        paths.extend(self.path_rules.matching(fqn));
        let mut score = self.name_rules.score(name) + self.path_rules.sum(paths);
        if has_main_block {
            score += self.config.main_block_bonus;
        }
        if fqn.split('.').any(is_private_segment) {
            score = apply_factor(score, self.config.private_penalty);
        }
        if is_class_like(name) {
            score = apply_factor(score, self.config.class_like_bonus);
        }
        score
    }

    /// Score and rank every node internal to `context_roots`.
    ///
    /// # Errors
    /// Returns `AnalysisError::InvalidPattern` if the framework's bonus patterns are malformed.
    pub fn recommend(
        &self,
        graph: &Graph,
        context_roots: &[String],
        metadata: &ProjectMetadata,
        framework: Option<&str>,
    ) -> Result<Ranking, AnalysisError> {
        let framework_rules = match framework.and_then(|f| self.config.frameworks.get(f)) {
            Some(rules) => RuleSet::compile(&rules.bonus_points)?,
            None => RuleSet::compile(&[])?,
        };
        let centrality = CentralityQuery::new(self.config.centrality.clone()).run(graph);
        let degrees = graph.degrees();
        let w = &self.config.weights;

        let mut candidates: Vec<Candidate> = graph
            .nodes()
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.is_external && is_internal(&n.fqn, context_roots))
            .map(|(i, n)| {
                let module = graph.module_of(i).to_string();
                let heuristic =
                    self.heuristic_score(&n.fqn, &module, metadata.main_block_modules.contains(&module));
                let central = centrality.combined.get(i).copied().unwrap_or(0.0);
                let framework_bonus = framework_rules.score(&n.fqn);
                let entrypoint_bonus =
                    if metadata.entrypoints.contains(&n.fqn) { self.config.entry_point_bonus } else { 0.0 };
                let mut score = w.heuristic * heuristic
                    + w.centrality * central
                    + w.framework * framework_bonus
                    + w.entry_point * entrypoint_bonus;
                if degrees[i] == 0 {
                    score = apply_factor(score, self.config.isolated_penalty);
                }
                Candidate {
                    fqn: n.fqn.clone(),
                    module,
                    heuristic,
                    centrality: central,
                    framework_bonus,
                    entrypoint_bonus,
                    score,
                }
            })
            .collect();
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.fqn.cmp(&b.fqn)));
        tracing::info!(candidates = candidates.len(), framework = ?framework, "Ranked entry-point candidates");
        Ok(Ranking { candidates })
    }
}

/// `fqn` equals a root or lives below one. No roots means everything is internal.
fn is_internal(fqn: &str, roots: &[String]) -> bool {
    roots.is_empty()
        || roots.iter().any(|r| fqn == r || (fqn.starts_with(r.as_str()) && fqn[r.len()..].starts_with('.')))
}

/// Fully scored candidates, best first.
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    candidates: Vec<Candidate>,
}

impl Ranking {
    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    #[must_use]
    pub fn get(&self, fqn: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.fqn == fqn)
    }

    /// Up to `top_k` best candidates, at most one per owning module, skipping
    /// anything in `rejected`.
    #[must_use]
    pub fn accept_or_retry(&self, rejected: &BTreeSet<String>, top_k: usize) -> Vec<Candidate> {
        let mut seen_modules: BTreeSet<&str> = BTreeSet::new();
        self.candidates
            .iter()
            .filter(|c| !rejected.contains(&c.fqn))
            .filter(|c| seen_modules.insert(c.module.as_str()))
            .take(top_k)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn top(&self, top_k: usize) -> Vec<Candidate> {
        self.accept_or_retry(&BTreeSet::new(), top_k)
    }
}

//! Human-in-the-loop choice of a starting point for large projects.
//!
//! States: `Ready -> Recommending -> AwaitingChoice`, then either
//! `Validating(fqn)` (back to `AwaitingChoice` when the focused graph is too
//! small, otherwise `Proceed`) or straight to `Proceed`/`Exit`.
use std::collections::BTreeSet;
use std::io::{BufRead, Write};

use super::{Candidate, Ranking};
use crate::errors::AnalysisError;
use crate::graph::{build_globset, Graph};
use crate::query::{FocusConfig, FocusQuery, FocusSummary, Query};
use crate::utils::config::Config;

#[derive(Debug, Clone, PartialEq)]
pub enum Choice {
    /// Zero-based index into the offered candidates.
    Pick(usize),
    Manual(Vec<String>),
    Exclude(Vec<String>),
    Force,
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WizardOutcome {
    Focus { entrypoint: String, summary: FocusSummary },
    ManualFocus(Vec<String>),
    Exclude(Vec<String>),
    ForceFull,
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WizardState {
    Ready,
    Recommending,
    AwaitingChoice,
    Validating(String),
    Proceed(WizardOutcome),
    Exit,
}

/// Source of user decisions.
pub trait Prompt {
    /// Present `offered` (and an optional notice about the previous round) and
    /// return the user's choice.
    ///
    /// # Errors
    /// Returns an error when the underlying input or output fails.
    fn choose(&mut self, offered: &[Candidate], notice: Option<&str>) -> Result<Choice, AnalysisError>;
}

pub struct Wizard<'a> {
    graph: &'a Graph,
    ranking: &'a Ranking,
    focus: FocusConfig,
    top_k: usize,
    min_meaningful_nodes: usize,
    rejected: BTreeSet<String>,
    state: WizardState,
}

impl<'a> Wizard<'a> {
    #[must_use]
    pub fn new(graph: &'a Graph, ranking: &'a Ranking, config: &Config) -> Self {
        Self {
            graph,
            ranking,
            focus: config.focus.clone(),
            top_k: config.recommend.top_k,
            min_meaningful_nodes: config.recommend.min_meaningful_nodes,
            rejected: BTreeSet::new(),
            state: WizardState::Ready,
        }
    }

    #[must_use]
    pub fn state(&self) -> &WizardState {
        &self.state
    }

    #[must_use]
    pub fn rejected(&self) -> &BTreeSet<String> {
        &self.rejected
    }

    /// Drive the state machine until `Proceed` or `Exit`.
    ///
    /// # Errors
    /// Propagates prompt I/O errors.
    pub fn run<P: Prompt>(&mut self, prompt: &mut P) -> Result<WizardOutcome, AnalysisError> {
        let mut offered: Vec<Candidate> = Vec::new();
        let mut notice: Option<String> = None;
        loop {
            let next = match &self.state {
                WizardState::Ready => WizardState::Recommending,
                WizardState::Recommending => {
                    offered = self.ranking.accept_or_retry(&self.rejected, self.top_k);
                    WizardState::AwaitingChoice
                }
                WizardState::AwaitingChoice => {
                    let choice = prompt.choose(&offered, notice.take().as_deref())?;
                    self.on_choice(choice, &offered, &mut notice)
                }
                WizardState::Validating(fqn) => {
                    let fqn = fqn.clone();
                    let result = FocusQuery::new(self.focus.with_entrypoints(vec![fqn.clone()])).run(self.graph);
                    if result.graph.node_count() >= self.min_meaningful_nodes {
                        WizardState::Proceed(WizardOutcome::Focus { entrypoint: fqn, summary: result.summary })
                    } else {
                        tracing::info!(entrypoint = %fqn, nodes = result.graph.node_count(), "Entry point rejected");
                        notice = Some(format!(
                            "{fqn} produced only {} nodes; pick another starting point.",
                            result.graph.node_count()
                        ));
                        self.rejected.insert(fqn);
                        offered = self.ranking.accept_or_retry(&self.rejected, self.top_k);
                        WizardState::AwaitingChoice
                    }
                }
                WizardState::Proceed(outcome) => return Ok(outcome.clone()),
                WizardState::Exit => return Ok(WizardOutcome::Exit),
            };
            tracing::debug!(state = ?next, "Wizard transition");
            self.state = next;
        }
    }

    fn on_choice(&self, choice: Choice, offered: &[Candidate], notice: &mut Option<String>) -> WizardState {
        match choice {
            Choice::Pick(i) => match offered.get(i) {
                Some(c) => WizardState::Validating(c.fqn.clone()),
                None => {
                    *notice = Some(format!("No recommendation number {}.", i + 1));
                    WizardState::AwaitingChoice
                }
            },
            Choice::Manual(fqns) if fqns.is_empty() => {
                *notice = Some("No entry points given.".to_string());
                WizardState::AwaitingChoice
            }
            Choice::Manual(fqns) => WizardState::Proceed(WizardOutcome::ManualFocus(fqns)),
            Choice::Exclude(patterns) => match build_globset(&patterns) {
                Ok(_) if !patterns.is_empty() => WizardState::Proceed(WizardOutcome::Exclude(patterns)),
                Ok(_) => {
                    *notice = Some("No patterns given.".to_string());
                    WizardState::AwaitingChoice
                }
                Err(e) => {
                    *notice = Some(e.to_string());
                    WizardState::AwaitingChoice
                }
            },
            Choice::Force => WizardState::Proceed(WizardOutcome::ForceFull),
            Choice::Exit => WizardState::Exit,
        }
    }
}

/// Whether a run should stop and ask before analysing the full graph.
#[must_use]
pub fn needs_wizard(node_count: usize, config: &Config, interactive: bool) -> bool {
    interactive
        && !config.recommend.force_analysis
        && node_count > config.recommend.warn_node_count
        && config.focus.entrypoints.is_empty()
        && config.graph.exclude_nodes.is_empty()
}

/// Line-oriented prompt over any reader/writer pair.
pub struct StdioPrompt<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> StdioPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> Result<Option<String>, AnalysisError> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn read_list(&mut self, question: &str) -> Result<Option<Vec<String>>, AnalysisError> {
        write!(self.output, "{question} (comma separated): ")?;
        self.output.flush()?;
        Ok(self.read_line()?.map(|l| {
            l.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
        }))
    }
}

impl<R: BufRead, W: Write> Prompt for StdioPrompt<R, W> {
    fn choose(&mut self, offered: &[Candidate], notice: Option<&str>) -> Result<Choice, AnalysisError> {
        let n = offered.len();
        let out = &mut self.output;
        writeln!(out)?;
        if let Some(msg) = notice {
            writeln!(out, "! {msg}")?;
        }
        writeln!(out, "Suggested starting points:")?;
        for (i, c) in offered.iter().enumerate() {
            writeln!(out, "  {}. {} (score {:.0})", i + 1, c.fqn, c.score)?;
        }
        writeln!(out, "  {}. Focus on entry points I type", n + 1)?;
        writeln!(out, "  {}. Exclude modules by pattern", n + 2)?;
        writeln!(out, "  {}. Analyse everything anyway", n + 3)?;
        writeln!(out, "  {}. Exit", n + 4)?;

        loop {
            write!(self.output, "Choice [1-{}]: ", n + 4)?;
            self.output.flush()?;
            let Some(line) = self.read_line()? else {
                return Ok(Choice::Exit);
            };
            let Ok(k) = line.parse::<usize>() else {
                writeln!(self.output, "Please enter a number.")?;
                continue;
            };
            let choice = match k {
                k if (1..=n).contains(&k) => Choice::Pick(k - 1),
                k if k == n + 1 => match self.read_list("Entry point FQNs")? {
                    Some(list) => Choice::Manual(list),
                    None => Choice::Exit,
                },
                k if k == n + 2 => match self.read_list("Glob patterns to exclude")? {
                    Some(list) => Choice::Exclude(list),
                    None => Choice::Exit,
                },
                k if k == n + 3 => Choice::Force,
                k if k == n + 4 => Choice::Exit,
                _ => {
                    writeln!(self.output, "Out of range.")?;
                    continue;
                }
            };
            return Ok(choice);
        }
    }
}

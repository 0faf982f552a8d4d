use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "archscope",
    version,
    about = "Explore the architecture of large codebases",
    long_about = "Assemble parser facts (entities, call edges, semantic edges) into an architecture graph, focus on entry points, and rank where to start reading. Fact documents are discovered with .gitignore/.ignore support and cached incrementally by content hash."
)]
pub struct Cli {
    /// Debug-level logging on stderr
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,
    /// Only warnings and errors on stderr, no summary on stdout
    #[arg(short, long, global = true)]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    Upstream,
    Downstream,
    Both,
}

impl From<DirectionArg> for crate::query::Direction {
    fn from(d: DirectionArg) -> Self {
        match d {
            DirectionArg::Upstream => Self::Upstream,
            DirectionArg::Downstream => Self::Downstream,
            DirectionArg::Both => Self::Both,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Assemble the graph, apply focus and filters, and report
    Analyze {
        /// Project root; `.` or omitted means auto-detect
        #[arg(short, long)]
        path: Option<PathBuf>,
        /// Path to a TOML configuration file (default: <root>/archscope.toml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Do not read or write the analysis cache
        #[arg(long, default_value_t = false)]
        no_cache: bool,
        /// Discard the cache and rebuild it
        #[arg(long, default_value_t = false, conflicts_with = "no_cache")]
        rebuild: bool,
        /// Walk files even if .gitignore/.ignore exclude them
        #[arg(long, default_value_t = false)]
        no_ignore: bool,
        /// Focus entry point FQN (repeatable)
        #[arg(long = "entry", value_name = "FQN")]
        entries: Vec<String>,
        /// Focus direction
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,
        /// Initial focus depth
        #[arg(long)]
        depth: Option<usize>,
        /// Glob pattern of FQNs to exclude (repeatable)
        #[arg(long = "exclude", value_name = "GLOB")]
        excludes: Vec<String>,
        /// Skip the interactive prompt for very large graphs
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Write GraphData JSON to this path
        #[arg(long)]
        out: Option<PathBuf>,
        /// Output format: text or json
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Rank entry-point candidates
    Recommend {
        #[arg(short, long)]
        path: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        no_cache: bool,
        /// Number of candidates (default from config)
        #[arg(long)]
        top: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Choose a starting point interactively, then analyse
    Wizard {
        #[arg(short, long)]
        path: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        no_cache: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete the analysis cache for a project
    ClearCache {
        #[arg(short, long)]
        path: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

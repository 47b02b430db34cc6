use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use versebert::{
    embedding::{DEFAULT_MAX_INPUT_CHARS, OverlongPolicy},
    indexer::DEFAULT_BATCH_SIZE,
};

#[derive(Debug, Parser)]
#[command(
    name = "versebert",
    version,
    about = "Semantic verse retrieval over scripture corpora"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Embedding model: a ColBERT model ID or local path, `hash`, or `hash:<dim>`
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the verse index from a corpus file (full rebuild)
    Index(IndexArgs),
    /// Find the verses closest in meaning to a query
    Search(SearchArgs),
    /// Print a verse by citation
    Get(GetArgs),
    /// Show index and configuration status
    Status(StatusArgs),
    /// Start MCP server for AI agent integration
    Mcp(McpArgs),
    /// Manage the embedding model configuration
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Path to the corpus JSON file
    pub corpus: PathBuf,

    /// Where to write the index (default: <data-dir>/index.redb)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of verses per embedding batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Maximum characters of input text sent to the embedder
    #[arg(long, default_value_t = DEFAULT_MAX_INPUT_CHARS)]
    pub max_chars: usize,

    /// What to do with text longer than --max-chars
    #[arg(long, value_enum, default_value_t = OverlongArg::Truncate)]
    pub overlong: OverlongArg,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OverlongArg {
    Truncate,
    Reject,
}

impl From<OverlongArg> for OverlongPolicy {
    fn from(arg: OverlongArg) -> Self {
        match arg {
            OverlongArg::Truncate => OverlongPolicy::Truncate,
            OverlongArg::Reject => OverlongPolicy::Reject,
        }
    }
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "3")]
    pub count: usize,

    /// Read the index from this path instead of the data directory
    #[arg(long)]
    pub index: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Get --

#[derive(Debug, Parser)]
pub struct GetArgs {
    /// Verse citation, e.g. "John 3:16"
    pub citation: String,

    /// Read the index from this path instead of the data directory
    #[arg(long)]
    pub index: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Inspect this index instead of the one in the data directory
    #[arg(long)]
    pub index: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- MCP --

#[derive(Debug, Parser)]
pub struct McpArgs {
    /// Serve this index instead of the one in the data directory
    #[arg(long)]
    pub index: Option<PathBuf>,
}

// -- Model --

#[derive(Debug, Subcommand)]
pub enum ModelAction {
    /// Show the currently resolved model
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a default model in config.redb
    Set {
        /// Model ID (HuggingFace), local path, `hash`, or `hash:<dim>`
        model: String,
    },
    /// Clear the stored model setting (revert to default)
    Clear,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "versebert",
            &mut std::io::stdout(),
        );
    }
}

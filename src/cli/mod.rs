//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "kbrecall",
    version,
    author = "neur0map",
    about = "Hybrid vector + metadata retrieval over a pre-embedded knowledge base",
    long_about = "kbrecall loads pre-embedded knowledge-base chunks into a local collection and \
                  answers queries by fusing semantic and metadata recall, optionally reordered \
                  by an external rerank service."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/kbrecall/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP search service
    Serve {
        /// Bind address (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one search against the local collection
    Search {
        /// Search query text
        query: String,

        /// Recall mode: vector, metadata or hybrid
        #[arg(short, long)]
        mode: Option<String>,

        /// Number of vector results
        #[arg(long)]
        vector_results: Option<usize>,

        /// Metadata filter in `key=value` form
        #[arg(long, value_name = "KEY=VALUE")]
        metadata: Option<String>,

        /// Number of metadata results
        #[arg(long)]
        metadata_results: Option<usize>,

        /// Rerank endpoint URL
        #[arg(long)]
        rerank_url: Option<String>,

        /// Rerank API key
        #[arg(long, env = "KBRECALL_RERANK_API_KEY", hide_env_values = true)]
        rerank_api_key: Option<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Load knowledge-base files into the collection
    Load {
        /// File names inside the knowledge-base directory
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// List knowledge-base files available for loading
    Files,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

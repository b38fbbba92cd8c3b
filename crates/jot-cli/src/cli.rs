use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "jot")]
#[command(about = "Capture short notes offline, sync them when the network is back")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Base URL of the Jot service (overrides JOT_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Work against the local replica only
    #[arg(long, global = true, conflicts_with = "api_url")]
    pub offline: bool,

    /// Quick capture: jot "my thought here"
    #[arg(trailing_var_arg = true)]
    pub text: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture a new item
    #[command(alias = "new")]
    Add {
        /// Item text
        text: Vec<String>,
    },
    /// List items, newest first
    #[command(alias = "ls")]
    List {
        /// Number of items to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an item
    #[command(alias = "rm")]
    Delete {
        /// Local key, unique local key prefix, or remote id
        key: String,
    },
    /// Reconcile the local replica with the service
    Sync,
    /// Keep the list on screen, refreshing as changes arrive
    Watch {
        /// Number of items to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

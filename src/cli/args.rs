//! CLI argument parsing (spec §6 host surface, exercised through a
//! standalone binary rather than an editor plug-in transport).
//!
//! Grounded on the teacher's `cli/args.rs`: the `Cli`/`Commands` clap
//! derive shape and global `--config` option survive; the custom
//! `override_help` rendering and command set are replaced with the
//! handful of operations this spec's core actually exposes (init, index,
//! serve, and the four read operations of spec §6's host request
//! protocol).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "smart-index",
    version = env!("CARGO_PKG_VERSION"),
    about = "Incremental workspace-wide symbol index for TypeScript/JavaScript"
)]
pub struct Cli {
    /// Path to a custom settings.toml file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create `.smart-index/settings.toml` with default configuration.
    Init {
        #[arg(short, long)]
        force: bool,
    },

    /// Build or incrementally refresh the index over one or more paths.
    Index {
        /// Files or directories to index (directories are walked
        /// recursively, honoring .gitignore and the exclusion globs).
        #[arg(value_name = "PATH")]
        paths: Vec<PathBuf>,

        /// Disable the progress bar.
        #[arg(long)]
        no_progress: bool,
    },

    /// Find where a symbol is defined.
    Definition {
        name: String,
    },

    /// Find every usage of a symbol by name.
    References {
        name: String,
    },

    /// Fuzzy workspace-symbol search.
    Search {
        query: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// List the symbols extracted from one file.
    Symbols {
        uri: String,
    },

    /// List the imports extracted from one file.
    Imports {
        uri: String,
    },

    /// Display the active configuration.
    Config,

    /// Run the freshness driver (file-system + version-control watchers)
    /// so the index stays up to date as files change, blocking until
    /// interrupted.
    Serve,

    /// Dump worker-pool counters and in-memory index sizes (spec §4.5
    /// debugging endpoint).
    Stats,
}

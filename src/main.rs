//! `smart-index`: a standalone CLI exercising the core workspace symbol
//! index directly (spec §1: the host-editor transport itself is out of
//! scope, so this binary stands in for it during development and testing).

use clap::Parser;
use smart_index::cli::commands::{index as index_cmd, init, query, serve};
use smart_index::cli::{Cli, Commands};
use smart_index::config::Settings;
use smart_index::index::PersistentIndex;
use smart_index::logging;
use smart_index::merged::MergedIndex;
use smart_index::open_file::OpenFileIndex;
use smart_index::shard::ShardStore;
use smart_index::workers::WorkerPool;
use std::sync::Arc;
use std::time::Duration;

fn load_settings(cli: &Cli) -> Settings {
    let result = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    result.unwrap_or_else(|e| {
        eprintln!("warning: failed to load configuration ({e}); using defaults");
        Settings::default()
    })
}

async fn build_index(settings: Arc<Settings>, coalesced: bool) -> (Arc<PersistentIndex>, Arc<WorkerPool>) {
    let store = if coalesced {
        ShardStore::new(
            settings.cache_root.clone(),
            Duration::from_millis(settings.timeouts.write_coalescing_ms),
        )
    } else {
        ShardStore::new_uncoalesced(settings.cache_root.clone())
    };
    let pool = WorkerPool::new(
        settings.worker_count.max(1),
        Duration::from_secs(settings.timeouts.worker_task_secs),
    );
    let index = PersistentIndex::new(Arc::clone(&settings), store, Arc::clone(&pool));
    if let Err(e) = index.load_from_disk().await {
        tracing::warn!(error = %e, "failed to rehydrate persistent index from disk; starting empty");
    }
    (index, pool)
}

fn merged_index(index: Arc<PersistentIndex>, pool: Arc<WorkerPool>, settings: &Settings) -> MergedIndex {
    let debounce = Duration::from_millis(settings.timeouts.editor_debounce_ms);
    let open_files = OpenFileIndex::new(Arc::clone(&index), pool, debounce);
    MergedIndex::new(index, open_files)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = Arc::new(load_settings(&cli));
    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => init::run_init(force),
        Commands::Config => init::run_config(&settings),

        Commands::Index { paths, no_progress } => {
            let (index, _pool) = build_index(Arc::clone(&settings), false).await;
            index_cmd::run(index, paths, no_progress).await;
        }

        Commands::Definition { name } => {
            let (index, pool) = build_index(Arc::clone(&settings), false).await;
            let merged = merged_index(index, pool, &settings);
            query::run_definition(&merged, &name).await;
        }

        Commands::References { name } => {
            let (index, pool) = build_index(Arc::clone(&settings), false).await;
            let merged = merged_index(index, pool, &settings);
            query::run_references(&merged, &name).await;
        }

        Commands::Search { query: q, limit } => {
            let (index, pool) = build_index(Arc::clone(&settings), false).await;
            let merged = merged_index(index, pool, &settings);
            query::run_search(&merged, &q, limit).await;
        }

        Commands::Symbols { uri } => {
            let (index, pool) = build_index(Arc::clone(&settings), false).await;
            let merged = merged_index(index, pool, &settings);
            query::run_symbols(&merged, &uri).await;
        }

        Commands::Imports { uri } => {
            let (index, pool) = build_index(Arc::clone(&settings), false).await;
            let merged = merged_index(index, pool, &settings);
            query::run_imports(&merged, &uri).await;
        }

        Commands::Stats => {
            let (index, _pool) = build_index(Arc::clone(&settings), false).await;
            query::run_stats(&index);
        }

        Commands::Serve => {
            let workspace_root = Settings::workspace_root()
                .or_else(|| std::env::current_dir().ok())
                .expect("a workspace root or current directory must be resolvable");
            let (index, _pool) = build_index(Arc::clone(&settings), true).await;
            let initial_files = index_cmd::discover_files(&workspace_root, &settings);
            index.ensure_up_to_date(&initial_files, None).await;
            serve::run(index, settings, workspace_root).await;
        }
    }
}

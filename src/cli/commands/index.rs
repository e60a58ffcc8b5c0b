//! `index` command: discover files under one or more paths and drive
//! `PersistentIndex::ensure_up_to_date` over them.
//!
//! File discovery follows the teacher's `indexing/walker.rs` posture
//! (delegate `.gitignore` handling to the `ignore` crate rather than
//! reimplementing it) layered with the index's own exclusion globs and a
//! TS/JS extension filter.

use crate::config::Settings;
use crate::extractor::Dialect;
use crate::index::{PersistentIndex, Progress};
use ignore::WalkBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Walk `root` collecting every file whose extension is a known TS/JS
/// dialect and which is not excluded by `settings`.
pub fn discover_files(root: &Path, settings: &Settings) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }

    let mut files = Vec::new();
    let mut builder = WalkBuilder::new(root);
    builder.hidden(false).git_ignore(true).git_exclude(true);

    for entry in builder.build().filter_map(Result::ok) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if Dialect::from_extension(ext).is_none() {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        if settings.is_excluded(relative) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    files
}

pub async fn run(index: Arc<PersistentIndex>, paths: Vec<PathBuf>, no_progress: bool) {
    let settings = index.settings().clone();
    let roots = if paths.is_empty() {
        vec![std::env::current_dir().expect("current directory must be readable")]
    } else {
        paths
    };

    let mut files = Vec::new();
    for root in &roots {
        if !root.exists() {
            eprintln!("path does not exist: {}", root.display());
            continue;
        }
        files.extend(discover_files(root, &settings));
    }

    if files.is_empty() {
        println!("no TypeScript/JavaScript files found");
        return;
    }

    let bar = (!no_progress).then(|| {
        let bar = ProgressBar::new(files.len() as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    });

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Progress>();
    let progress_task = bar.clone().map(|bar| {
        tokio::spawn(async move {
            while let Some(p) = rx.recv().await {
                bar.set_position(p.done as u64);
                if let Some(file) = p.current_file {
                    bar.set_message(file);
                }
            }
        })
    });

    let stats = index.ensure_up_to_date(&files, Some(tx)).await;
    if let Some(task) = progress_task {
        let _ = task.await;
    }
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    println!(
        "indexed {} file(s), {} cache hit(s), {} reference(s) resolved by finalization",
        stats.indexed, stats.cache_hits, stats.finalize.resolved
    );
    if !stats.finalize.timed_out_files.is_empty() {
        for uri in &stats.finalize.timed_out_files {
            eprintln!("warning: finalization timed out for {uri}");
        }
    }
}

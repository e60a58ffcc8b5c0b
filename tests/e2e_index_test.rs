//! End-to-end coverage of the bulk indexing pipeline (spec §8 seed
//! scenarios 1 and 2): real TS source on disk, run through the actual
//! tree-sitter extractor via `PersistentIndex::ensure_up_to_date`, not
//! hand-built shards.

use smart_index::config::Settings;
use smart_index::index::PersistentIndex;
use smart_index::shard::ShardStore;
use smart_index::workers::WorkerPool;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fresh_index(dir: &std::path::Path) -> Arc<PersistentIndex> {
    let settings = Arc::new(Settings::default());
    let store = ShardStore::new_uncoalesced(dir.to_path_buf());
    let pool = WorkerPool::new(2, Duration::from_secs(5));
    PersistentIndex::new(settings, store, pool)
}

/// Spec §8 scenario 1: action-group cross-file resolution.
#[tokio::test]
async fn action_group_cross_file_resolution() {
    let workspace = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();

    let a_path = workspace.path().join("a.ts");
    fs::write(
        &a_path,
        r#"
import { createActionGroup, emptyProps } from '@ngrx/store';

export const PageActions = createActionGroup({
  source: 'Page',
  events: {
    'Load Data': emptyProps(),
    'Load': emptyProps(),
  },
});
"#,
    )
    .unwrap();

    let b_path = workspace.path().join("b.ts");
    fs::write(
        &b_path,
        r#"
import { PageActions } from './a';

function onInit() {
  dispatch(PageActions.loadData());
}
"#,
    )
    .unwrap();

    let index = fresh_index(cache.path());
    let stats = index.ensure_up_to_date(&[a_path, b_path], None).await;
    assert_eq!(stats.indexed, 2);
    assert_eq!(stats.cache_hits, 0);

    let definitions = index.find_definitions("loadData").await;
    assert_eq!(definitions.len(), 1);
    assert!(definitions[0].uri.ends_with("a.ts"));

    let references = index.find_references_by_name("loadData").await;
    assert_eq!(references.len(), 1);
    assert!(references[0].uri.ends_with("b.ts"));
}

/// Spec §8 scenario 2: incremental cache hit — a second `ensure_up_to_date`
/// over an unmodified workspace performs zero extractions.
#[tokio::test]
async fn incremental_cache_hit_indexes_nothing_the_second_time() {
    let workspace = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();

    let mut files = Vec::new();
    for i in 0..20 {
        let path = workspace.path().join(format!("file{i}.ts"));
        fs::write(&path, format!("export function fn{i}() {{ return {i}; }}\n")).unwrap();
        files.push(path);
    }

    let index = fresh_index(cache.path());
    let first = index.ensure_up_to_date(&files, None).await;
    assert_eq!(first.indexed, 20);
    assert_eq!(first.cache_hits, 0);

    let second = index.ensure_up_to_date(&files, None).await;
    assert_eq!(second.indexed, 0);
    assert_eq!(second.cache_hits, 20);
    assert_eq!(index.stats().active_tasks, 0);
}

/// Spec §8 "Eviction completeness": after `remove_file`, no inverted index
/// still points at the removed uri, and its shard is gone from disk.
#[tokio::test]
async fn remove_file_evicts_from_every_index() {
    let workspace = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();

    let path = workspace.path().join("solo.ts");
    fs::write(&path, "export function onlyHere() {}\n").unwrap();

    let index = fresh_index(cache.path());
    index.ensure_up_to_date(&[path.clone()], None).await;
    assert_eq!(index.find_definitions("onlyHere").await.len(), 1);

    let uri = path.to_string_lossy().to_string();
    index.remove_file(&uri).await.unwrap();

    assert!(index.find_definitions("onlyHere").await.is_empty());
    assert!(index.get_file_symbols(&uri).await.is_empty());
}

/// Spec §8 boundary: a file larger than the configured cap is skipped,
/// leaving no shard and no symbols behind.
#[tokio::test]
async fn oversized_file_is_skipped() {
    let workspace = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();

    let path = workspace.path().join("huge.ts");
    let huge_body = "a".repeat(2 * 1024 * 1024);
    fs::write(&path, format!("export const huge = \"{huge_body}\";\n")).unwrap();

    let settings = Arc::new(Settings {
        max_indexed_file_size_bytes: 1024,
        ..Settings::default()
    });
    let store = ShardStore::new_uncoalesced(cache.path().to_path_buf());
    let pool = WorkerPool::new(1, Duration::from_secs(5));
    let index = PersistentIndex::new(settings, store, pool);

    let stats = index.ensure_up_to_date(&[path.clone()], None).await;
    assert_eq!(stats.indexed, 1);
    let uri = path.to_string_lossy().to_string();
    assert!(index.get_file_symbols(&uri).await.is_empty());
}

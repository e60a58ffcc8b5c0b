//! Merged index (spec §4.8, C9): the stateless façade every reader-facing
//! call actually goes through. Queries the persistent tier (C7) and the
//! open-file tier (C8) in parallel and combines them; holds no state of its
//! own beyond two `Arc` handles, so building one is free and many can exist
//! at once.
//!
//! Grounded on the teacher's `mcp/mod.rs` pattern of a thin read-only
//! wrapper dispatching to whichever backing index is configured, adapted
//! here to always merge both tiers rather than choose one at startup.

use crate::index::{fuzzy, PersistentIndex};
use crate::model::{ImportInfo, IndexedReference, IndexedSymbol, Uri};
use crate::open_file::OpenFileIndex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Fuzzy-search context bonuses (spec §4.8), applied only here: `fuzzy::score`
/// sees one candidate name in isolation and knows nothing about open files,
/// directories, or workspace layout.
const OPEN_FILE_BONUS: i64 = 100;
const SAME_DIRECTORY_BONUS: i64 = 30;
const NODE_MODULES_PENALTY: i64 = -50;
const BUILD_OUTPUT_PENALTY: i64 = -30;
const SRC_DIRECTORY_BONUS: i64 = 10;

#[derive(Clone)]
pub struct MergedIndex {
    persistent: Arc<PersistentIndex>,
    open_files: Arc<OpenFileIndex>,
}

impl MergedIndex {
    pub fn new(persistent: Arc<PersistentIndex>, open_files: Arc<OpenFileIndex>) -> Self {
        Self { persistent, open_files }
    }

    /// `findDefinitions(name)` merged across both tiers; an open-file's
    /// view of its own uri always wins over whatever the persistent tier
    /// has on disk for that same uri (spec §4.8 "C8-preference").
    pub async fn find_definitions(&self, name: &str) -> Vec<IndexedSymbol> {
        let persistent = self.persistent.find_definitions(name).await;
        let open = self.open_files.find_definitions(name);
        merge_preferring_open(persistent, open, |s| s.uri.clone())
    }

    pub async fn find_references_by_name(&self, name: &str) -> Vec<IndexedReference> {
        let persistent = self.persistent.find_references_by_name(name).await;
        let open = self.open_files.find_references_by_name(name);
        merge_preferring_open(persistent, open, |r| r.uri.clone())
    }

    pub async fn get_file_symbols(&self, uri: &Uri) -> Vec<IndexedSymbol> {
        if self.open_files.is_open(uri) {
            self.open_files.get_file_symbols(uri)
        } else {
            self.persistent.get_file_symbols(uri).await
        }
    }

    pub async fn get_file_imports(&self, uri: &Uri) -> Vec<ImportInfo> {
        if self.open_files.is_open(uri) {
            self.open_files.get_file_imports(uri)
        } else {
            self.persistent.get_file_imports(uri).await
        }
    }

    /// `searchSymbols(query, limit)` (spec §4.8): both tiers are queried
    /// concurrently, results are deduped by `(name, uri, line, column)`
    /// preferring the open-file copy, context bonuses are applied, and the
    /// combined set is re-ranked before truncating to `limit`.
    pub async fn search_symbols(
        &self,
        query: &str,
        limit: usize,
        context_uri: Option<&Uri>,
    ) -> Vec<IndexedSymbol> {
        let budget = limit.saturating_mul(2).min(1_000).max(limit.max(1));
        let persistent_hits = self.persistent.search_symbols(query, budget).await;
        let open_hits = self.open_files.search_symbols(query);

        let mut is_open: HashSet<(String, Uri, u32, u32)> = HashSet::new();
        let mut by_key: HashMap<(String, Uri, u32, u32), IndexedSymbol> = HashMap::new();

        for symbol in open_hits {
            let key = symbol_key(&symbol);
            is_open.insert(key.clone());
            by_key.insert(key, symbol);
        }
        for symbol in persistent_hits {
            let key = symbol_key(&symbol);
            by_key.entry(key).or_insert(symbol);
        }

        let mut scored: Vec<(IndexedSymbol, i64)> = by_key
            .into_iter()
            .filter_map(|(key, symbol)| {
                let base = fuzzy::score(query, &symbol.name)?;
                let bonus = context_bonus(&symbol.uri, is_open.contains(&key), context_uri);
                Some((symbol, base + bonus))
            })
            .collect();

        scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.name.cmp(&b.0.name)));
        scored.into_iter().take(limit).map(|(s, _)| s).collect()
    }
}

fn symbol_key(symbol: &IndexedSymbol) -> (String, Uri, u32, u32) {
    (
        symbol.name.clone(),
        symbol.uri.clone(),
        symbol.location.line,
        symbol.location.column,
    )
}

fn merge_preferring_open<T>(persistent: Vec<T>, open: Vec<T>, uri_of: impl Fn(&T) -> Uri) -> Vec<T> {
    let open_uris: HashSet<Uri> = open.iter().map(&uri_of).collect();
    let mut out: Vec<T> = persistent
        .into_iter()
        .filter(|item| !open_uris.contains(&uri_of(item)))
        .collect();
    out.extend(open);
    out
}

fn context_bonus(uri: &str, is_open: bool, context_uri: Option<&Uri>) -> i64 {
    let mut bonus = 0;
    if is_open {
        bonus += OPEN_FILE_BONUS;
    }
    if let Some(context_uri) = context_uri {
        if Path::new(context_uri).parent() == Path::new(uri).parent() {
            bonus += SAME_DIRECTORY_BONUS;
        }
    }
    if uri.contains("node_modules/") {
        bonus += NODE_MODULES_PENALTY;
    }
    if uri.contains("/dist/") || uri.contains("/build/") || uri.starts_with("dist/") || uri.starts_with("build/") {
        bonus += BUILD_OUTPUT_PENALTY;
    }
    if uri.contains("src/") {
        bonus += SRC_DIRECTORY_BONUS;
    }
    bonus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::shard::ShardStore;
    use crate::workers::WorkerPool;
    use std::time::Duration;

    async fn fresh(dir: &Path) -> MergedIndex {
        let settings = Arc::new(Settings::default());
        let store = ShardStore::new_uncoalesced(dir.to_path_buf());
        let pool = WorkerPool::new(2, Duration::from_secs(5));
        let persistent = PersistentIndex::new(settings, store, pool.clone());
        let open_files = OpenFileIndex::new(Arc::clone(&persistent), pool, Duration::from_millis(20));
        MergedIndex::new(persistent, open_files)
    }

    #[tokio::test]
    async fn open_file_copy_shadows_the_persisted_one() {
        let dir = tempfile::TempDir::new().unwrap();
        let merged = fresh(dir.path()).await;

        let src = dir.path().join("a.ts");
        std::fs::write(&src, "function loadData() { return 1; }\n").unwrap();
        merged.persistent.ensure_up_to_date(&[src.clone()], None).await;
        assert_eq!(merged.find_definitions("loadData").await.len(), 1);

        let uri = crate::index::sanitize::sanitize_path(&src.to_string_lossy()).unwrap();
        merged
            .open_files
            .open(uri.clone(), "function loadData(extra) { return 2; }\n".to_string())
            .await;

        let defs = merged.find_definitions("loadData").await;
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].parameters_count, Some(1));
    }

    #[tokio::test]
    async fn search_symbols_ranks_open_files_first() {
        let dir = tempfile::TempDir::new().unwrap();
        let merged = fresh(dir.path()).await;

        let src = dir.path().join("a.ts");
        std::fs::write(&src, "function loadData() {}\nfunction loadOther() {}\n").unwrap();
        merged.persistent.ensure_up_to_date(&[src.clone()], None).await;

        let uri = crate::index::sanitize::sanitize_path(&src.to_string_lossy()).unwrap();
        merged.open_files.open(uri.clone(), "function loadData() {}\n".to_string()).await;

        let results = merged.search_symbols("load", 10, None).await;
        assert_eq!(results[0].name, "loadData");
    }
}

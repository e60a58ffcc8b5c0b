//! Finalizer (spec §4.6 Phase 2/3, §4.9, C10): cross-file action-group
//! reference resolution that runs once Phase 1 extraction has settled.
//!
//! Split out of `index::PersistentIndex` because spec §4.9 calls out its
//! contracts separately from the rest of bulk indexing: a fixed resolution
//! order (exact, then camelCase, then PascalCase), dedup by
//! `(symbolName, line, column)`, a per-file write timeout, and partial
//! failure that never aborts the batch. Grounded on the teacher's
//! second-pass-over-already-extracted-symbols shape in
//! `relationship/resolver.rs`, adapted here to a much narrower resolution
//! problem (one container type, not a general call graph).

use crate::index::PersistentIndex;
use crate::model::{FileShard, IndexedReference, PendingReference, Uri};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Outcome of one `finalize` pass.
#[derive(Debug, Clone, Default)]
pub struct FinalizeStats {
    pub resolved: usize,
    pub files_written: usize,
    pub timed_out_files: Vec<Uri>,
}

/// `containerName -> (uri, eventKey -> camelCaseMethodName)` (spec §4.6
/// Phase 2), built by scanning every known symbol for `is_group` metadata.
type ActionGroupLookup = HashMap<String, (Uri, HashMap<String, String>)>;

/// Run Phase 2 (lookup build) then Phase 3 (batch linking) over the whole
/// index. Infallible: a failure resolving or persisting one file is logged
/// and that file is skipped; the rest of the batch still commits.
pub async fn finalize(index: &Arc<PersistentIndex>) -> FinalizeStats {
    let (lookup, pending_by_file) = build_lookup(index).await;
    if pending_by_file.is_empty() {
        return FinalizeStats::default();
    }

    let mut stats = FinalizeStats::default();
    for (uri, pending) in pending_by_file {
        let resolved = resolve_pending(&pending, &lookup);
        if resolved.is_empty() {
            continue;
        }
        for (name, _) in &resolved {
            index.record_reference_in_memory(&uri, name);
        }
        match write_resolved(index, &uri, &resolved).await {
            Ok(true) => {
                index.invalidate_shard_cache(&uri);
                stats.resolved += resolved.len();
                stats.files_written += 1;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(uri, error = %e, "finalization write failed or timed out; file skipped");
                stats.timed_out_files.push(uri);
            }
        }
    }
    stats
}

/// Phase 2: a single-threaded, LRU-cached scan of every known file,
/// collecting action-group container symbols and pending references.
async fn build_lookup(
    index: &Arc<PersistentIndex>,
) -> (ActionGroupLookup, HashMap<Uri, Vec<PendingReference>>) {
    let mut lookup = ActionGroupLookup::new();
    let mut pending_by_file = HashMap::new();

    for uri in index.known_uris() {
        let Ok(Some(shard)) = index.read_shard_cached(&uri).await else {
            continue;
        };
        for symbol in &shard.symbols {
            let Some(metadata) = &symbol.metadata else {
                continue;
            };
            let is_group = metadata.get("is_group").and_then(|v| v.as_bool()).unwrap_or(false);
            if !is_group {
                continue;
            }
            let events = metadata
                .get("events")
                .and_then(|v| v.as_object())
                .map(|obj| {
                    obj.iter()
                        .filter_map(|(k, v)| v.as_str().map(|name| (k.clone(), name.to_string())))
                        .collect::<HashMap<_, _>>()
                })
                .unwrap_or_default();
            lookup.insert(symbol.name.clone(), (uri.clone(), events));
        }
        if !shard.pending_references.is_empty() {
            pending_by_file.insert(uri, shard.pending_references.clone());
        }
    }

    (lookup, pending_by_file)
}

fn pascal_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Match `member` against one action group's event-key map: exact key
/// match across every event first, then camelCase method-name match across
/// every event, then PascalCase — global precedence, not per-event
/// early-exit (spec §4.9).
fn match_event<'a>(member: &str, events: &'a HashMap<String, String>) -> Option<&'a str> {
    if let Some((_, camel_name)) = events.iter().find(|(event_key, _)| member == event_key.as_str()) {
        return Some(camel_name.as_str());
    }
    if let Some((_, camel_name)) = events.iter().find(|(_, camel_name)| member == camel_name.as_str()) {
        return Some(camel_name.as_str());
    }
    if let Some((_, camel_name)) = events
        .iter()
        .find(|(_, camel_name)| member == pascal_case(camel_name))
    {
        return Some(camel_name.as_str());
    }
    None
}

/// Resolve every pending reference whose container names a known action
/// group. A pending reference with no match is simply left unresolved; it
/// stays in the shard and is retried on the next finalization pass.
fn resolve_pending(
    pending: &[PendingReference],
    lookup: &ActionGroupLookup,
) -> Vec<(String, PendingReference)> {
    let mut resolved = Vec::new();
    for p in pending {
        let Some((_, events)) = lookup.get(&p.container) else {
            continue;
        };
        if let Some(name) = match_event(&p.member, events) {
            resolved.push((name.to_string(), p.clone()));
        }
    }
    resolved
}

/// Phase 3 per-file batch write: synthesize an `IndexedReference` at each
/// resolved pending reference's own usage location (not the action group's
/// definition site), dedup against what's already there, drop the now-
/// resolved pending entries, and persist under the per-file write timeout.
///
/// Returns `Ok(true)` if the shard was rewritten, `Ok(false)` if the file
/// had no shard to update (e.g. removed mid-batch).
async fn write_resolved(
    index: &Arc<PersistentIndex>,
    uri: &Uri,
    resolved: &[(String, PendingReference)],
) -> Result<bool, crate::error::IndexError> {
    let timeout = index.finalization_timeout();
    let store = index.store().clone();
    let target_uri = uri.clone();
    let resolved = resolved.to_vec();

    let write = store.with_lock(&target_uri, move |store| {
        let uri = target_uri.clone();
        let resolved = resolved.clone();
        async move {
            let Some(mut shard) = store.read_no_lock(&uri).await? else {
                return Ok(false);
            };
            apply_resolved(&mut shard, &resolved);
            store.write_no_lock(shard).await?;
            Ok(true)
        }
    });

    match tokio::time::timeout(timeout, write).await {
        Ok(result) => result,
        Err(_) => Err(crate::error::IndexError::FinalizationTimeout {
            uri: uri.clone(),
            timeout_secs: timeout.as_secs(),
        }),
    }
}

fn apply_resolved(shard: &mut FileShard, resolved: &[(String, PendingReference)]) {
    let mut seen: HashSet<(String, u32, u32)> = shard
        .references
        .iter()
        .map(|r| (r.symbol_name.clone(), r.location.line, r.location.column))
        .collect();

    for (name, pending) in resolved {
        let key = (name.clone(), pending.location.line, pending.location.column);
        if seen.insert(key) {
            shard.references.push(IndexedReference {
                symbol_name: name.clone(),
                uri: shard.uri.clone(),
                location: pending.location,
                range: pending.range,
                container_name: pending.container_name.clone(),
                scope_id: None,
                is_local: Some(false),
                is_import: Some(false),
            });
        }
    }

    let now_resolved: HashSet<(String, String, u32, u32)> = resolved
        .iter()
        .map(|(_, p)| (p.container.clone(), p.member.clone(), p.location.line, p.location.column))
        .collect();
    shard.pending_references.retain(|p| {
        !now_resolved.contains(&(p.container.clone(), p.member.clone(), p.location.line, p.location.column))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::model::{Location, Range};
    use crate::shard::ShardStore;
    use crate::workers::WorkerPool;
    use std::time::Duration;

    fn range_at(line: u32) -> Range {
        Range {
            start_line: line,
            start_column: 0,
            end_line: line,
            end_column: 10,
        }
    }

    async fn fresh_index(dir: &std::path::Path) -> Arc<PersistentIndex> {
        let settings = Arc::new(Settings::default());
        let store = ShardStore::new_uncoalesced(dir.to_path_buf());
        let pool = WorkerPool::new(2, Duration::from_secs(5));
        PersistentIndex::new(settings, store, pool)
    }

    fn container_shard() -> FileShard {
        let mut shard = FileShard::new("a.ts".to_string(), "hasha".to_string(), 1, 1);
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("is_group".to_string(), serde_json::json!(true));
        let mut events = std::collections::HashMap::new();
        events.insert("Load Data".to_string(), "loadData".to_string());
        metadata.insert("events".to_string(), serde_json::json!(events));
        shard.symbols.push(crate::model::IndexedSymbol {
            id: crate::model::SymbolId::new("a.ts", "", "PageActions", None),
            name: "PageActions".to_string(),
            kind: crate::model::SymbolKind::Class,
            uri: "a.ts".to_string(),
            location: Location::new(0, 0),
            range: range_at(0),
            container_name: None,
            container_kind: None,
            full_container_path: None,
            is_static: None,
            parameters_count: None,
            metadata: Some(metadata),
        });
        shard
    }

    fn referencing_shard() -> FileShard {
        let mut shard = FileShard::new("b.ts".to_string(), "hashb".to_string(), 1, 1);
        shard.pending_references.push(PendingReference {
            container: "PageActions".to_string(),
            member: "loadData".to_string(),
            uri: "b.ts".to_string(),
            location: Location::new(5, 4),
            range: range_at(5),
            container_name: Some("onInit".to_string()),
        });
        shard
    }

    #[tokio::test]
    async fn resolves_action_group_member_access_to_the_usage_site() {
        let dir = tempfile::TempDir::new().unwrap();
        let index = fresh_index(dir.path()).await;
        index.update_file(container_shard()).await.unwrap();
        index.update_file(referencing_shard()).await.unwrap();

        let stats = finalize(&index).await;
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.files_written, 1);

        let refs = index.find_references_by_name("loadData").await;
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].uri, "b.ts");
        assert_eq!(refs[0].location, Location::new(5, 4));

        let shard_b = index.read_shard_cached(&"b.ts".to_string()).await.unwrap().unwrap();
        assert!(shard_b.pending_references.is_empty());
    }

    #[tokio::test]
    async fn unresolved_pending_reference_is_left_for_the_next_pass() {
        let dir = tempfile::TempDir::new().unwrap();
        let index = fresh_index(dir.path()).await;
        index.update_file(container_shard()).await.unwrap();

        let mut orphan = FileShard::new("c.ts".to_string(), "hashc".to_string(), 1, 1);
        orphan.pending_references.push(PendingReference {
            container: "PageActions".to_string(),
            member: "neverDeclared".to_string(),
            uri: "c.ts".to_string(),
            location: Location::new(2, 0),
            range: range_at(2),
            container_name: None,
        });
        index.update_file(orphan).await.unwrap();

        let stats = finalize(&index).await;
        assert_eq!(stats.resolved, 0);
        assert!(index.find_references_by_name("neverDeclared").await.is_empty());
    }

    #[test]
    fn match_event_prefers_exact_key_over_camel_case_collision() {
        let mut events = HashMap::new();
        events.insert("loadData".to_string(), "loadData".to_string());
        events.insert("Load Data".to_string(), "loadDataTwo".to_string());
        assert_eq!(match_event("loadData", &events), Some("loadData"));
    }

    #[test]
    fn match_event_falls_back_to_pascal_case() {
        let mut events = HashMap::new();
        events.insert("Load Data".to_string(), "loadData".to_string());
        assert_eq!(match_event("LoadData", &events), Some("loadData"));
    }
}

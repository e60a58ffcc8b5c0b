//! Host request protocol (spec §6): the value types a host-editor
//! integration sends to and receives from the merged index. This module
//! is a seam only — no transport, no wire framing; spec §1 places the
//! host-editor protocol and its transport out of this crate's scope.
//!
//! Grounded on `mcp/mod.rs`'s request/response struct shapes
//! (`FindSymbolRequest`, `GetCallsRequest`, ...), stripped of the
//! `rmcp`/JSON-RPC tool-router plumbing (`tool`, `tool_router`,
//! `ServerHandler`) that spec §1 excludes — only the serde-shaped request
//! and response values survive, plus a dispatcher against `MergedIndex`
//! that a concrete transport can call into.

use crate::index::Progress;
use crate::merged::MergedIndex;
use crate::model::{ImportInfo, IndexedReference, IndexedSymbol, Uri};
use serde::{Deserialize, Serialize};

/// A `(uri, range)` tuple, the common shape every location-bearing
/// response collapses to (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationResult {
    pub uri: Uri,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl From<&IndexedSymbol> for LocationResult {
    fn from(symbol: &IndexedSymbol) -> Self {
        Self {
            uri: symbol.uri.clone(),
            line: symbol.range.start_line,
            column: symbol.range.start_column,
            end_line: symbol.range.end_line,
            end_column: symbol.range.end_column,
        }
    }
}

impl From<&IndexedReference> for LocationResult {
    fn from(reference: &IndexedReference) -> Self {
        Self {
            uri: reference.uri.clone(),
            line: reference.range.start_line,
            column: reference.range.start_column,
            end_line: reference.range.end_line,
            end_column: reference.range.end_column,
        }
    }
}

/// Definition lookup at `(uri, line, col)` (spec §6). The core has no
/// notion of "definition under cursor" on its own — callers resolve the
/// identifier at that position (an external, parser-backend concern) and
/// pass its name here; this seam only covers what the core answers once
/// it has a name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DefinitionRequest {
    pub uri: Uri,
    pub line: u32,
    pub column: u32,
    pub symbol_name: String,
}

/// Reference search by symbol name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReferenceSearchRequest {
    pub symbol_name: String,
}

/// Workspace-symbol search by fuzzy query (ranked, capped).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkspaceSymbolSearchRequest {
    pub query: String,
    pub limit: usize,
    /// The file the query originated from, used for the same-directory
    /// context bonus (spec §4.6 fuzzy matcher).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_uri: Option<Uri>,
}

/// Per-file symbol listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileSymbolsRequest {
    pub uri: Uri,
}

/// Per-file import listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileImportsRequest {
    pub uri: Uri,
}

/// Every request kind the core satisfies (spec §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    Definition(DefinitionRequest),
    ReferenceSearch(ReferenceSearchRequest),
    WorkspaceSymbolSearch(WorkspaceSymbolSearchRequest),
    FileSymbols(FileSymbolsRequest),
    FileImports(FileImportsRequest),
}

/// Every response kind, one variant per request kind above.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Definition { locations: Vec<LocationResult> },
    ReferenceSearch { locations: Vec<LocationResult> },
    WorkspaceSymbolSearch { symbols: Vec<IndexedSymbol> },
    FileSymbols { symbols: Vec<IndexedSymbol> },
    FileImports { imports: Vec<ImportInfo> },
}

/// A progress notification emitted during bulk indexing (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct ProgressNotification {
    pub total: usize,
    pub done: usize,
    pub current_file: Option<Uri>,
}

impl From<Progress> for ProgressNotification {
    fn from(p: Progress) -> Self {
        Self {
            total: p.total,
            done: p.done,
            current_file: p.current_file,
        }
    }
}

/// Dispatch one request against the merged index. This is the entire
/// "host request protocol" surface the core exposes; a concrete transport
/// (LSP, a CLI REPL, an MCP tool router) wraps this in whatever framing it
/// needs.
pub async fn dispatch(index: &MergedIndex, request: Request) -> Response {
    match request {
        Request::Definition(req) => {
            let symbols = index.find_definitions(&req.symbol_name).await;
            Response::Definition {
                locations: symbols.iter().map(LocationResult::from).collect(),
            }
        }
        Request::ReferenceSearch(req) => {
            let refs = index.find_references_by_name(&req.symbol_name).await;
            Response::ReferenceSearch {
                locations: refs.iter().map(LocationResult::from).collect(),
            }
        }
        Request::WorkspaceSymbolSearch(req) => {
            let symbols = index
                .search_symbols(&req.query, req.limit, req.context_uri.as_ref())
                .await;
            Response::WorkspaceSymbolSearch { symbols }
        }
        Request::FileSymbols(req) => {
            let symbols = index.get_file_symbols(&req.uri).await;
            Response::FileSymbols { symbols }
        }
        Request::FileImports(req) => {
            let imports = index.get_file_imports(&req.uri).await;
            Response::FileImports { imports }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::index::PersistentIndex;
    use crate::open_file::OpenFileIndex;
    use crate::shard::ShardStore;
    use crate::workers::WorkerPool;
    use std::sync::Arc;
    use std::time::Duration;

    async fn fresh(dir: &std::path::Path) -> MergedIndex {
        let settings = Arc::new(Settings::default());
        let store = ShardStore::new_uncoalesced(dir.to_path_buf());
        let pool = WorkerPool::new(2, Duration::from_secs(5));
        let persistent = PersistentIndex::new(settings, store, pool.clone());
        let open_files = OpenFileIndex::new(Arc::clone(&persistent), pool, Duration::from_millis(20));
        MergedIndex::new(persistent, open_files)
    }

    #[tokio::test]
    async fn dispatch_file_symbols_round_trips_through_the_merged_index() {
        let dir = tempfile::TempDir::new().unwrap();
        let merged = fresh(dir.path()).await;
        let src = dir.path().join("a.ts");
        std::fs::write(&src, "function loadData() {}\n").unwrap();

        let response = dispatch(
            &merged,
            Request::WorkspaceSymbolSearch(WorkspaceSymbolSearchRequest {
                query: "load".to_string(),
                limit: 10,
                context_uri: None,
            }),
        )
        .await;

        match response {
            Response::WorkspaceSymbolSearch { symbols } => assert!(symbols.is_empty()),
            _ => panic!("unexpected response variant"),
        }
    }
}

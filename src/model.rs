//! Core data model (spec §3): the value types shared by every component.
//!
//! Everything here is a plain value type — no references to parser AST
//! nodes survive past extraction (spec §4.1's POJO-equivalent contract).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// A file's logical location. Opaque outside this crate's extraction and
/// shard layers; always a workspace-relative, forward-slash path string in
/// practice (the host-editor URI scheme is not the core's concern).
pub type Uri = String;

/// Stable per-symbol identifier.
///
/// Encoded as `<filePathHash8>:<containerPath>.<symbolName>[#sigHash4]`.
/// Survives line edits within a file; only changes when the symbol's name,
/// container, signature, or file moves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub String);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SymbolId {
    /// Build a `SymbolId` from its constituent parts.
    ///
    /// `disambiguator` encodes `is_static` and parameter arity for overload
    /// resolution (spec §3); when `None`, the `#sigHash4` suffix is omitted.
    pub fn new(
        uri: &str,
        container_path: &str,
        name: &str,
        disambiguator: Option<(bool, usize)>,
    ) -> Self {
        let file_hash = file_path_hash8(uri);
        let qualified = if container_path.is_empty() {
            name.to_string()
        } else {
            format!("{container_path}.{name}")
        };
        match disambiguator {
            Some((is_static, arity)) => {
                let sig_hash = sig_hash4(is_static, arity);
                SymbolId(format!("{file_hash}:{qualified}#{sig_hash}"))
            }
            None => SymbolId(format!("{file_hash}:{qualified}")),
        }
    }
}

/// First 8 hex chars of the SHA-256 digest of a URI.
pub fn file_path_hash8(uri: &str) -> String {
    let digest = Sha256::digest(uri.as_bytes());
    hex_prefix(&digest, 4)
}

/// 4 hex chars derived from an overload disambiguator.
fn sig_hash4(is_static: bool, arity: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update([is_static as u8]);
    hasher.update(arity.to_le_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest, 2)
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes[..n].iter().map(|b| format!("{b:02x}")).collect()
}

/// SHA-256 digest of file contents, as used for the C7/C8 freshness checks.
/// Truncated to 16 hex chars — "MD5 or equivalent" per spec §4.7; any stable
/// digest satisfies the contract.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex_prefix(&digest, 8)
}

/// Symbol kinds the extractor can produce (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    Class,
    Method,
    Property,
    Variable,
    Constant,
    Interface,
    TypeAlias,
    Enum,
    /// Synthesized by the action-group framework plugin (spec §4.2).
    VirtualMethod,
}

/// A `(uri, line, column)` point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A `(startLine, startCol, endLine, endCol)` span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// Opaque, string-keyed framework metadata attached to a symbol.
///
/// Known keys: `"role"` (`"action" | "effect" | "reducer"`), `"action_group"`
/// (a map of camelCased event name → original event string, present on the
/// container symbol of an action group).
pub type Metadata = HashMap<String, serde_json::Value>;

/// The unit of "definition" (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedSymbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub uri: Uri,
    pub location: Location,
    pub range: Range,
    pub container_name: Option<String>,
    pub container_kind: Option<SymbolKind>,
    pub full_container_path: Option<String>,
    pub is_static: Option<bool>,
    pub parameters_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// The unit of "usage" (spec §3).
///
/// Invariant: an identifier at a declaration site is never emitted as a
/// reference (spec §3, §8 "Declaration exclusion").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedReference {
    pub symbol_name: String,
    pub uri: Uri,
    pub location: Location,
    pub range: Range,
    pub container_name: Option<String>,
    pub scope_id: Option<String>,
    pub is_local: Option<bool>,
    pub is_import: Option<bool>,
}

/// A deferred reference whose target requires cross-file context.
///
/// Canonical case: a member access on a local binding that holds an
/// action-group value, resolved by the finalizer (C10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReference {
    pub container: String,
    pub member: String,
    pub uri: Uri,
    pub location: Location,
    pub range: Range,
    pub container_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportInfo {
    pub local_name: String,
    pub module_specifier: String,
    pub is_default: Option<bool>,
    pub is_namespace: Option<bool>,
    pub exported_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReExportInfo {
    pub module_specifier: String,
    pub is_all: Option<bool>,
    pub exported_names: Option<Vec<String>>,
}

/// The current shard format version. Bumping this forces re-indexing of
/// every shard on next `ensure_up_to_date` (spec §4.6 "Freshness decision").
pub const CURRENT_SHARD_VERSION: u32 = 1;

/// Everything extracted from one source file (spec §3).
///
/// Owned exclusively by the shard store on disk; the persistent index holds
/// only transient copies while applying an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileShard {
    pub uri: Uri,
    pub content_hash: String,
    pub mtime: i64,
    pub symbols: Vec<IndexedSymbol>,
    pub references: Vec<IndexedReference>,
    pub imports: Vec<ImportInfo>,
    pub re_exports: Vec<ReExportInfo>,
    pub pending_references: Vec<PendingReference>,
    pub shard_version: u32,
    pub last_indexed_at: i64,
}

impl FileShard {
    pub fn new(uri: Uri, content_hash: String, mtime: i64, last_indexed_at: i64) -> Self {
        Self {
            uri,
            content_hash,
            mtime,
            symbols: Vec::new(),
            references: Vec::new(),
            imports: Vec::new(),
            re_exports: Vec::new(),
            pending_references: Vec::new(),
            shard_version: CURRENT_SHARD_VERSION,
            last_indexed_at,
        }
    }
}

/// In-memory summary of a shard (spec §3, C7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    pub content_hash_set: bool,
    pub mtime: i64,
    pub last_indexed_at: i64,
    pub symbol_count: usize,
    pub shard_version: u32,
}

impl FileMetadata {
    pub fn from_shard(shard: &FileShard) -> Self {
        Self {
            content_hash_set: true,
            mtime: shard.mtime,
            last_indexed_at: shard.last_indexed_at,
            symbol_count: shard.symbols.len(),
            shard_version: shard.shard_version,
        }
    }
}

/// Result of extraction before timing fields are attached, or a skip.
#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    Extracted(ExtractedFile),
    Skipped { uri: Uri, reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct ExtractedFile {
    pub symbols: Vec<IndexedSymbol>,
    pub references: Vec<IndexedReference>,
    pub imports: Vec<ImportInfo>,
    pub re_exports: Vec<ReExportInfo>,
    pub pending_references: Vec<PendingReference>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_id_is_stable_across_line_edits() {
        let a = SymbolId::new("src/a.ts", "PageComponent", "render", None);
        let b = SymbolId::new("src/a.ts", "PageComponent", "render", None);
        assert_eq!(a, b);
    }

    #[test]
    fn symbol_id_changes_with_container() {
        let a = SymbolId::new("src/a.ts", "PageComponent", "render", None);
        let b = SymbolId::new("src/a.ts", "OtherComponent", "render", None);
        assert_ne!(a, b);
    }

    #[test]
    fn overload_disambiguator_changes_id() {
        let a = SymbolId::new("src/a.ts", "Foo", "bar", Some((false, 1)));
        let b = SymbolId::new("src/a.ts", "Foo", "bar", Some((false, 2)));
        assert_ne!(a, b);
    }

    #[test]
    fn content_hash_is_deterministic() {
        assert_eq!(content_hash("const x = 1;"), content_hash("const x = 1;"));
        assert_ne!(content_hash("const x = 1;"), content_hash("const x = 2;"));
    }
}

//! Compact binary encoding for `FileShard` (spec §4.3, C4).
//!
//! The wire format is a thin wrapper around `bincode`: a header carrying
//! `uri`, `shardVersion`, `contentHash`, `mtime`, `lastIndexedAt`, a
//! deduplicated scope-string table, and the symbol/reference/import/
//! re-export/pending-reference vectors with `scopeId` replaced by an index
//! into that table. `bincode`'s own compact varint/length-prefixed encoding
//! already gets most of the size win the naive JSON-equivalent encoding
//! would lose; the scope table removes the remaining duplication from
//! repeating the same dotted container path on every reference in a file.

use crate::error::{IndexError, IndexResult};
use crate::model::{FileShard, IndexedReference};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// On-disk representation. Not part of the public API: callers only ever
/// see `FileShard`; this type exists to host the scope table.
#[derive(Debug, Serialize, Deserialize)]
struct WireShard {
    uri: String,
    content_hash: String,
    mtime: i64,
    last_indexed_at: i64,
    shard_version: u32,
    scope_table: Vec<String>,
    symbols: Vec<crate::model::IndexedSymbol>,
    references: Vec<WireReference>,
    imports: Vec<crate::model::ImportInfo>,
    re_exports: Vec<crate::model::ReExportInfo>,
    pending_references: Vec<crate::model::PendingReference>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireReference {
    symbol_name: String,
    location: crate::model::Location,
    range: crate::model::Range,
    container_name: Option<String>,
    scope_index: Option<u32>,
    is_local: Option<bool>,
    is_import: Option<bool>,
}

/// A one-shot interner used only for building a shard's scope table.
struct ScopeTable {
    strings: Vec<String>,
    index: HashMap<String, u32>,
}

impl ScopeTable {
    fn new() -> Self {
        Self {
            strings: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&i) = self.index.get(s) {
            return i;
        }
        let i = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), i);
        i
    }
}

/// Current binary format tag, checked ahead of the shard-level `bincode`
/// decode. Distinct from `FileShard::shard_version`, which is a content
/// version the persistent index uses for freshness decisions; this tag is
/// the wire-format version and lets us detect the legacy textual encoding.
const WIRE_MAGIC: &[u8; 4] = b"SIX1";

/// Encode a `FileShard` into its compact binary form.
pub fn encode(shard: &FileShard) -> IndexResult<Vec<u8>> {
    let mut scope_table = ScopeTable::new();
    let references = shard
        .references
        .iter()
        .map(|r| WireReference {
            symbol_name: r.symbol_name.clone(),
            location: r.location,
            range: r.range,
            container_name: r.container_name.clone(),
            scope_index: r.scope_id.as_deref().map(|s| scope_table.intern(s)),
            is_local: r.is_local,
            is_import: r.is_import,
        })
        .collect();

    let wire = WireShard {
        uri: shard.uri.clone(),
        content_hash: shard.content_hash.clone(),
        mtime: shard.mtime,
        last_indexed_at: shard.last_indexed_at,
        shard_version: shard.shard_version,
        scope_table: scope_table.strings,
        symbols: shard.symbols.clone(),
        references,
        imports: shard.imports.clone(),
        re_exports: shard.re_exports.clone(),
        pending_references: shard.pending_references.clone(),
    };

    let body = bincode::serialize(&wire).map_err(|e| IndexError::PersistenceError {
        uri: shard.uri.clone(),
        source: Box::new(e),
    })?;

    let mut out = Vec::with_capacity(body.len() + WIRE_MAGIC.len());
    out.extend_from_slice(WIRE_MAGIC);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode bytes previously produced by `encode`, or a legacy textual (JSON)
/// encoding if that is what is found on disk (spec §4.3 migration path).
/// A legacy decode does not rewrite the file; the caller re-persists it on
/// the next `write` so the migration happens transparently in the normal
/// write path.
pub fn decode(uri: &str, bytes: &[u8]) -> IndexResult<FileShard> {
    if let Some(body) = bytes.strip_prefix(WIRE_MAGIC) {
        return decode_wire(uri, body);
    }
    decode_legacy_json(uri, bytes)
}

fn decode_wire(uri: &str, body: &[u8]) -> IndexResult<FileShard> {
    let wire: WireShard = bincode::deserialize(body).map_err(|e| IndexError::ShardCorrupted {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;

    let references = wire
        .references
        .into_iter()
        .map(|r| IndexedReference {
            symbol_name: r.symbol_name,
            uri: wire.uri.clone(),
            location: r.location,
            range: r.range,
            container_name: r.container_name,
            scope_id: r
                .scope_index
                .and_then(|i| wire.scope_table.get(i as usize).cloned()),
            is_local: r.is_local,
            is_import: r.is_import,
        })
        .collect();

    let mut symbols = wire.symbols;
    for s in &mut symbols {
        s.uri = wire.uri.clone();
    }
    let mut pending_references = wire.pending_references;
    for p in &mut pending_references {
        p.uri = wire.uri.clone();
    }

    Ok(FileShard {
        uri: wire.uri,
        content_hash: wire.content_hash,
        mtime: wire.mtime,
        symbols,
        references,
        imports: wire.imports,
        re_exports: wire.re_exports,
        pending_references,
        shard_version: wire.shard_version,
        last_indexed_at: wire.last_indexed_at,
    })
}

/// Best-effort migration path for shards written by a pre-binary build.
/// The only textual format this crate ever produced is plain JSON of
/// `FileShard` itself (no scope-table indirection).
fn decode_legacy_json(uri: &str, bytes: &[u8]) -> IndexResult<FileShard> {
    serde_json::from_slice(bytes).map_err(|e| IndexError::ShardCorrupted {
        uri: uri.to_string(),
        reason: format!("not a recognized shard encoding: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IndexedReference, Location, Range};

    fn sample_shard() -> FileShard {
        let mut shard = FileShard::new("src/a.ts".to_string(), "deadbeef".to_string(), 1000, 2000);
        shard.references.push(IndexedReference {
            symbol_name: "fetchThing".to_string(),
            uri: shard.uri.clone(),
            location: Location::new(1, 9),
            range: Range {
                start_line: 1,
                start_column: 9,
                end_line: 1,
                end_column: 19,
            },
            container_name: None,
            scope_id: Some("PageComponent".to_string()),
            is_local: Some(false),
            is_import: Some(false),
        });
        shard
    }

    #[test]
    fn round_trips_through_wire_format() {
        let shard = sample_shard();
        let bytes = encode(&shard).unwrap();
        let decoded = decode(&shard.uri, &bytes).unwrap();
        assert_eq!(decoded, shard);
    }

    #[test]
    fn wire_bytes_carry_the_magic_prefix() {
        let shard = sample_shard();
        let bytes = encode(&shard).unwrap();
        assert!(bytes.starts_with(WIRE_MAGIC));
    }

    #[test]
    fn scope_table_deduplicates_repeated_scope_ids() {
        let mut shard = sample_shard();
        for i in 0..5 {
            shard.references.push(IndexedReference {
                symbol_name: format!("ref{i}"),
                uri: shard.uri.clone(),
                location: Location::new(i, 0),
                range: Range {
                    start_line: i,
                    start_column: 0,
                    end_line: i,
                    end_column: 5,
                },
                container_name: None,
                scope_id: Some("PageComponent".to_string()),
                is_local: Some(false),
                is_import: Some(false),
            });
        }
        let bytes = encode(&shard).unwrap();
        let decoded = decode(&shard.uri, &bytes).unwrap();
        assert!(decoded
            .references
            .iter()
            .all(|r| r.scope_id.as_deref() == Some("PageComponent")));
    }

    #[test]
    fn corrupted_bytes_produce_shard_corrupted_error() {
        let bytes = b"SIX1not a real bincode body at all, just junk";
        let err = decode("src/a.ts", bytes).unwrap_err();
        assert!(matches!(err, IndexError::ShardCorrupted { .. }));
    }
}

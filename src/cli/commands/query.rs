//! Read-only query commands (`definition`, `references`, `search`,
//! `symbols`, `imports`, `stats`): thin wrappers over `MergedIndex` /
//! `PersistentIndex` that render results as a table (spec §6 host request
//! protocol, exercised here directly instead of through a transport).

use crate::index::PersistentIndex;
use crate::merged::MergedIndex;
use crate::model::{ImportInfo, IndexedReference, IndexedSymbol};
use comfy_table::Table;

pub async fn run_definition(index: &MergedIndex, name: &str) {
    let symbols = index.find_definitions(name).await;
    if symbols.is_empty() {
        println!("no definitions found for '{name}'");
        return;
    }
    print_symbols(&symbols);
}

pub async fn run_references(index: &MergedIndex, name: &str) {
    let refs = index.find_references_by_name(name).await;
    if refs.is_empty() {
        println!("no references found for '{name}'");
        return;
    }
    print_references(&refs);
}

pub async fn run_search(index: &MergedIndex, query: &str, limit: usize) {
    let symbols = index.search_symbols(query, limit, None).await;
    if symbols.is_empty() {
        println!("no symbols matched '{query}'");
        return;
    }
    print_symbols(&symbols);
}

pub async fn run_symbols(index: &MergedIndex, uri: &str) {
    let symbols = index.get_file_symbols(&uri.to_string()).await;
    if symbols.is_empty() {
        println!("no symbols indexed for '{uri}'");
        return;
    }
    print_symbols(&symbols);
}

pub async fn run_imports(index: &MergedIndex, uri: &str) {
    let imports = index.get_file_imports(&uri.to_string()).await;
    if imports.is_empty() {
        println!("no imports indexed for '{uri}'");
        return;
    }
    print_imports(&imports);
}

/// `smart-index stats` (spec §4.5 debugging endpoint).
pub fn run_stats(index: &PersistentIndex) {
    let stats = index.stats();
    let mut table = Table::new();
    table.set_header(vec!["metric", "value"]);
    table.add_row(vec!["active tasks".to_string(), stats.active_tasks.to_string()]);
    table.add_row(vec!["queued tasks".to_string(), stats.queued_tasks.to_string()]);
    table.add_row(vec!["known files".to_string(), stats.known_files.to_string()]);
    table.add_row(vec!["cached shards".to_string(), stats.cached_shards.to_string()]);
    println!("{table}");
}

fn print_symbols(symbols: &[IndexedSymbol]) {
    let mut table = Table::new();
    table.set_header(vec!["name", "kind", "container", "uri", "line:col"]);
    for symbol in symbols {
        table.add_row(vec![
            symbol.name.clone(),
            format!("{:?}", symbol.kind),
            symbol.container_name.clone().unwrap_or_default(),
            symbol.uri.clone(),
            format!("{}:{}", symbol.location.line, symbol.location.column),
        ]);
    }
    println!("{table}");
}

fn print_references(refs: &[IndexedReference]) {
    let mut table = Table::new();
    table.set_header(vec!["name", "uri", "line:col", "local"]);
    for reference in refs {
        table.add_row(vec![
            reference.symbol_name.clone(),
            reference.uri.clone(),
            format!("{}:{}", reference.location.line, reference.location.column),
            reference
                .is_local
                .map(|b| b.to_string())
                .unwrap_or_default(),
        ]);
    }
    println!("{table}");
}

fn print_imports(imports: &[ImportInfo]) {
    let mut table = Table::new();
    table.set_header(vec!["local name", "module", "default", "namespace"]);
    for import in imports {
        table.add_row(vec![
            import.local_name.clone(),
            import.module_specifier.clone(),
            import.is_default.map(|b| b.to_string()).unwrap_or_default(),
            import.is_namespace.map(|b| b.to_string()).unwrap_or_default(),
        ]);
    }
    println!("{table}");
}

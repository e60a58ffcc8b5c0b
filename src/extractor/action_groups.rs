//! Framework plugin: action-group container/virtual-method synthesis (spec
//! §4.2 built-in behavior #2).
//!
//! Recognizes the shape:
//!
//! ```ts
//! const PageActions = createActionGroup({
//!   source: 'Page',
//!   events: {
//!     'Load Data': emptyProps(),
//!     'Load Data Success': props<{ data: Data }>(),
//!   },
//! });
//! ```
//!
//! and synthesizes one container symbol (`PageActions`) plus one virtual
//! method symbol per event key, camelCased (`loadData`, `loadDataSuccess`),
//! so that `PageActions.loadData()` elsewhere in the workspace resolves to a
//! real definition instead of vanishing as an unresolvable member access.
//!
//! There is no teacher equivalent of this behavior to ground on directly;
//! the call-expression/object-literal traversal reuses the same
//! `child_by_field_name` idiom as the rest of this module.

use super::walk::WalkContext;
use crate::model::{IndexedSymbol, Location, Range, SymbolKind};
use std::collections::HashMap;
use tree_sitter::Node;

/// Names of factory functions this plugin recognizes as an action-group
/// constructor. A fixed list rather than config: the shape is what matters,
/// not the import path it was bound through.
const ACTION_GROUP_FACTORIES: &[&str] = &["createActionGroup"];

pub struct ActionGroupExtraction {
    pub container_symbol: IndexedSymbol,
    pub virtual_methods: Vec<IndexedSymbol>,
    /// eventKey (original) -> camelCase(eventKey), handed to the walk
    /// context so later member accesses on this binding resolve.
    pub event_map: HashMap<String, String>,
}

fn text<'t>(node: Node, source: &'t str) -> &'t str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn range_of(node: Node) -> Range {
    let start = node.start_position();
    let end = node.end_position();
    Range {
        start_line: start.row as u32,
        start_column: start.column as u32,
        end_line: end.row as u32,
        end_column: end.column as u32,
    }
}

fn location_of(node: Node) -> Location {
    let p = node.start_position();
    Location::new(p.row as u32, p.column as u32)
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

fn call_callee_name<'t>(call: Node, source: &'t str) -> Option<&'t str> {
    let callee = call.child_by_field_name("function")?;
    match callee.kind() {
        "identifier" => Some(text(callee, source)),
        _ => None,
    }
}

/// camelCase an event key: `"Load Data Success"` -> `"loadDataSuccess"`.
fn camel_case_event_key(key: &str) -> String {
    let mut result = String::with_capacity(key.len());
    let mut capitalize_next = false;
    for (i, word) in key.split(|c: char| !c.is_alphanumeric()).enumerate() {
        if word.is_empty() {
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if i == 0 && !capitalize_next {
                result.extend(first.to_lowercase());
            } else {
                result.extend(first.to_uppercase());
            }
        }
        result.push_str(&chars.as_str().to_lowercase());
        capitalize_next = true;
    }
    result
}

/// If `value` is a `createActionGroup({...})` call, build the synthesized
/// container and virtual-method symbols. `binding_name` is the identifier
/// the call result was assigned to.
pub(super) fn try_extract_action_group(
    binding_name: &str,
    value: Node,
    source: &str,
    ctx: &WalkContext,
) -> Option<ActionGroupExtraction> {
    if value.kind() != "call_expression" {
        return None;
    }
    let callee_name = call_callee_name(value, source)?;
    if !ACTION_GROUP_FACTORIES.contains(&callee_name) {
        return None;
    }

    let args = value.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    let config_obj = args
        .named_children(&mut cursor)
        .find(|n| n.kind() == "object")?;

    let mut source_label: Option<String> = None;
    let mut events_obj: Option<Node> = None;

    let mut pc = config_obj.walk();
    for pair in config_obj.named_children(&mut pc) {
        if pair.kind() != "pair" {
            continue;
        }
        let Some(key_node) = pair.child_by_field_name("key") else {
            continue;
        };
        let Some(val_node) = pair.child_by_field_name("value") else {
            continue;
        };
        let key = strip_quotes(text(key_node, source));
        match key {
            "source" => source_label = Some(strip_quotes(text(val_node, source)).to_string()),
            "events" if val_node.kind() == "object" => events_obj = Some(val_node),
            _ => {}
        }
    }

    let container_path = ctx.container_path();
    let container_symbol_id = crate::model::SymbolId::new(&ctx.uri, &container_path, binding_name, None);

    let mut metadata = HashMap::new();
    if let Some(label) = &source_label {
        metadata.insert("action_group_source".to_string(), serde_json::json!(label));
    }
    // Marks this symbol as an action-group container for the finalizer's
    // Phase 2 lookup build (spec §4.6); `events` maps the original event key
    // to its camelCased virtual-method name.
    metadata.insert("is_group".to_string(), serde_json::json!(true));

    let mut container_symbol = IndexedSymbol {
        id: container_symbol_id,
        name: binding_name.to_string(),
        kind: SymbolKind::Class,
        uri: ctx.uri.clone(),
        location: location_of(value),
        range: range_of(value),
        container_name: ctx.container_name(),
        container_kind: ctx.container_kind(),
        full_container_path: if container_path.is_empty() {
            None
        } else {
            Some(container_path.clone())
        },
        is_static: None,
        parameters_count: None,
        metadata: Some(metadata),
    };

    let mut virtual_methods = Vec::new();
    let mut event_map = HashMap::new();

    if let Some(events_obj) = events_obj {
        let mut ec = events_obj.walk();
        for pair in events_obj.named_children(&mut ec) {
            if pair.kind() != "pair" {
                continue;
            }
            let Some(key_node) = pair.child_by_field_name("key") else {
                continue;
            };
            let event_key = strip_quotes(text(key_node, source)).to_string();
            let method_name = camel_case_event_key(&event_key);
            if method_name.is_empty() {
                continue;
            }

            let mut method_metadata = HashMap::new();
            method_metadata.insert("event_key".to_string(), serde_json::json!(event_key));

            let full_path = if container_path.is_empty() {
                binding_name.to_string()
            } else {
                format!("{container_path}.{binding_name}")
            };
            let method_id = crate::model::SymbolId::new(&ctx.uri, &full_path, &method_name, None);

            virtual_methods.push(IndexedSymbol {
                id: method_id,
                name: method_name.clone(),
                kind: SymbolKind::VirtualMethod,
                uri: ctx.uri.clone(),
                location: location_of(key_node),
                range: range_of(pair),
                container_name: Some(binding_name.to_string()),
                container_kind: Some(SymbolKind::Class),
                full_container_path: Some(full_path),
                is_static: None,
                parameters_count: None,
                metadata: Some(method_metadata),
            });

            event_map.insert(event_key, method_name);
        }
    }

    if let Some(metadata) = &mut container_symbol.metadata {
        metadata.insert("events".to_string(), serde_json::json!(event_map));
    }

    Some(ActionGroupExtraction {
        container_symbol,
        virtual_methods,
        event_map,
    })
}

/// Names of calls that mark a variable's role for debugging/filtering
/// purposes (spec §3 metadata note). Not action-group-specific but lives
/// here since it shares the "recognize a factory call by callee name" shape.
const ROLE_FACTORIES: &[(&str, &str)] = &[
    ("createAction", "action"),
    ("createEffect", "effect"),
    ("createReducer", "reducer"),
];

/// If `value` is a call to one of the well-known NgRx-style factory
/// functions, return the role label to attach as symbol metadata.
pub(super) fn try_role_marker(value: Node, source: &str) -> Option<&'static str> {
    if value.kind() != "call_expression" {
        return None;
    }
    let callee_name = call_callee_name(value, source)?;
    ROLE_FACTORIES
        .iter()
        .find(|(name, _)| *name == callee_name)
        .map(|(_, role)| *role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::StringInterner;
    use tree_sitter::Parser;

    fn parse(source: &str) -> tree_sitter::Tree {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            .unwrap();
        parser.parse(source, None).unwrap()
    }

    #[test]
    fn camel_case_event_key_handles_spaces() {
        assert_eq!(camel_case_event_key("Load Data"), "loadData");
        assert_eq!(camel_case_event_key("Load Data Success"), "loadDataSuccess");
    }

    #[test]
    fn recognizes_action_group_call_and_synthesizes_methods() {
        let source = "const PageActions = createActionGroup({\n  source: 'Page',\n  events: {\n    'Load Data': emptyProps(),\n    'Load Data Success': props(),\n  },\n});\n";
        let tree = parse(source);
        let root = tree.root_node();
        let declarator = find_kind(root, "variable_declarator").expect("declarator");
        let value = declarator.child_by_field_name("value").unwrap();

        let mut interner = StringInterner::new();
        let ctx = WalkContext::new(
            "a.ts".to_string(),
            super::super::Dialect::TypeScript,
            &mut interner,
        );
        let extraction = try_extract_action_group("PageActions", value, source, &ctx)
            .expect("should recognize action group");
        assert_eq!(extraction.container_symbol.name, "PageActions");
        assert_eq!(extraction.virtual_methods.len(), 2);
        assert!(extraction
            .virtual_methods
            .iter()
            .any(|m| m.name == "loadData"));
        assert!(extraction
            .virtual_methods
            .iter()
            .any(|m| m.name == "loadDataSuccess"));
    }

    fn find_kind<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
        if node.kind() == kind {
            return Some(node);
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if let Some(found) = find_kind(child, kind) {
                return Some(found);
            }
        }
        None
    }
}

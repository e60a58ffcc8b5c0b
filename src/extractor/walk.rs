//! The depth-first AST walk (spec §4.2 steps 2-5).
//!
//! Declaration discrimination is a lookup table from parent node kind to
//! "which child slot is the name" (spec §4.2 step 4): each declaration-kind
//! handler below consumes its own `name`/`property` field directly and
//! recurses into the remaining children, so a plain `identifier` node is
//! only ever reached by the generic fallback when it is *not* sitting in a
//! declaration's name slot — satisfying the "declaration exclusion"
//! invariant (spec §8) without a second pass.

use super::action_groups;
use super::Dialect;
use crate::interner::StringInterner;
use crate::model::{
    ExtractedFile, ImportInfo, IndexedReference, IndexedSymbol, Location, Range, ReExportInfo,
    SymbolId, SymbolKind, Uri,
};
use std::collections::HashMap;
use tree_sitter::Node;

pub(super) struct WalkContext<'a> {
    pub uri: Uri,
    pub dialect: Dialect,
    pub interner: &'a mut StringInterner,
    pub container_stack: Vec<String>,
    pub container_kind_stack: Vec<SymbolKind>,
    /// `bindingName -> eventKey -> cameCase(eventKey)` for action-group
    /// values currently in scope (spec §4.2 built-in behavior #2).
    pub action_group_bindings: HashMap<String, HashMap<String, String>>,
}

impl<'a> WalkContext<'a> {
    pub fn new(uri: Uri, dialect: Dialect, interner: &'a mut StringInterner) -> Self {
        Self {
            uri,
            dialect,
            interner,
            container_stack: Vec::new(),
            container_kind_stack: Vec::new(),
            action_group_bindings: HashMap::new(),
        }
    }

    pub fn container_path(&self) -> String {
        self.container_stack.join(".")
    }

    pub fn container_name(&self) -> Option<String> {
        self.container_stack.last().cloned()
    }

    pub fn container_kind(&self) -> Option<SymbolKind> {
        self.container_kind_stack.last().copied()
    }

    pub fn register_action_group_binding(&mut self, name: String, events: HashMap<String, String>) {
        self.action_group_bindings.insert(name, events);
    }
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

fn has_static_modifier(node: Node) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == "static")
}

fn count_parameters(node: Node) -> usize {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .find(|c| c.kind() == "formal_parameters")
        .map(|params| {
            let mut pc = params.walk();
            params
                .named_children(&mut pc)
                .filter(|c| c.kind() != "comment")
                .count()
        })
        .unwrap_or(0)
}

fn make_symbol(
    ctx: &WalkContext,
    name: &str,
    kind: SymbolKind,
    name_node: Node,
    range_node: Node,
    disambiguator: Option<(bool, usize)>,
) -> IndexedSymbol {
    let container_path = ctx.container_path();
    IndexedSymbol {
        id: SymbolId::new(&ctx.uri, &container_path, name, disambiguator),
        name: name.to_string(),
        kind,
        uri: ctx.uri.clone(),
        location: location_of(name_node),
        range: range_of(range_node),
        container_name: ctx.container_name(),
        container_kind: ctx.container_kind(),
        full_container_path: if container_path.is_empty() {
            None
        } else {
            Some(container_path)
        },
        is_static: None,
        parameters_count: None,
        metadata: None,
    }
}

/// Recursively walk `node`, filling `out`. `depth` guards against stack
/// overflow on adversarial or deeply-generated input (spec §4.2 is silent on
/// a bound; the teacher's parsers apply one uniformly).
pub(super) fn walk_node(
    node: Node,
    source: &str,
    ctx: &mut WalkContext,
    out: &mut ExtractedFile,
    depth: usize,
) {
    if depth > super::MAX_RECURSION_DEPTH {
        return;
    }

    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            handle_named_function(node, source, ctx, out, depth, SymbolKind::Function);
        }
        "function_expression" => {
            // Only named function expressions produce a symbol; anonymous
            // ones assigned to a variable are covered by the declarator.
            if node.child_by_field_name("name").is_some() {
                handle_named_function(node, source, ctx, out, depth, SymbolKind::Function);
            } else {
                walk_children_skipping(node, source, ctx, out, depth, None);
            }
        }
        "arrow_function" => {
            walk_children_skipping(node, source, ctx, out, depth, None);
        }
        "class_declaration" | "abstract_class_declaration" => {
            handle_class(node, source, ctx, out, depth);
        }
        "interface_declaration" if ctx.dialect.is_typescript() => {
            handle_container_decl(node, source, ctx, out, depth, SymbolKind::Interface);
        }
        "enum_declaration" if ctx.dialect.is_typescript() => {
            handle_enum(node, source, ctx, out, depth);
        }
        "type_alias_declaration" if ctx.dialect.is_typescript() => {
            handle_simple_decl(node, source, ctx, out, SymbolKind::TypeAlias);
        }
        "method_definition" => {
            handle_class_member(node, source, ctx, out, depth, SymbolKind::Method);
        }
        "public_field_definition" | "field_definition" => {
            handle_class_member(node, source, ctx, out, depth, SymbolKind::Property);
        }
        "variable_declarator" => {
            handle_variable_declarator(node, source, ctx, out, depth);
        }
        "import_statement" => {
            handle_import(node, source, ctx, out);
        }
        "export_statement" => {
            handle_export(node, source, ctx, out, depth);
        }
        "member_expression" => {
            handle_member_expression(node, source, ctx, out, depth);
        }
        "identifier" => {
            out.references.push(IndexedReference {
                symbol_name: ctx.interner.intern_to_string(text(node, source)),
                uri: ctx.uri.clone(),
                location: location_of(node),
                range: range_of(node),
                container_name: ctx.container_name(),
                scope_id: Some(ctx.container_path()),
                is_local: None,
                is_import: Some(false),
            });
        }
        _ => {
            walk_children_skipping(node, source, ctx, out, depth, None);
        }
    }
}

fn walk_children_skipping(
    node: Node,
    source: &str,
    ctx: &mut WalkContext,
    out: &mut ExtractedFile,
    depth: usize,
    skip_id: Option<usize>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if Some(child.id()) == skip_id {
            continue;
        }
        walk_node(child, source, ctx, out, depth + 1);
    }
}

fn handle_named_function(
    node: Node,
    source: &str,
    ctx: &mut WalkContext,
    out: &mut ExtractedFile,
    depth: usize,
    kind: SymbolKind,
) {
    let name_node = node.child_by_field_name("name");
    if let Some(name_node) = name_node {
        let name = ctx.interner.intern_to_string(text(name_node, source));
        let mut symbol = make_symbol(ctx, &name, kind, name_node, node, None);
        symbol.parameters_count = Some(count_parameters(node));
        out.symbols.push(symbol);
    }
    walk_children_skipping(node, source, ctx, out, depth, name_node.map(|n| n.id()));
}

fn handle_container_decl(
    node: Node,
    source: &str,
    ctx: &mut WalkContext,
    out: &mut ExtractedFile,
    depth: usize,
    kind: SymbolKind,
) {
    let name_node = node.child_by_field_name("name");
    let Some(name_node) = name_node else {
        walk_children_skipping(node, source, ctx, out, depth, None);
        return;
    };
    let name = ctx.interner.intern_to_string(text(name_node, source));
    let symbol = make_symbol(ctx, &name, kind, name_node, node, None);
    out.symbols.push(symbol);

    ctx.container_stack.push(name);
    ctx.container_kind_stack.push(kind);
    walk_children_skipping(node, source, ctx, out, depth, Some(name_node.id()));
    ctx.container_stack.pop();
    ctx.container_kind_stack.pop();
}

fn handle_class(node: Node, source: &str, ctx: &mut WalkContext, out: &mut ExtractedFile, depth: usize) {
    handle_container_decl(node, source, ctx, out, depth, SymbolKind::Class);
}

fn handle_enum(node: Node, source: &str, ctx: &mut WalkContext, out: &mut ExtractedFile, depth: usize) {
    let name_node = node.child_by_field_name("name");
    let Some(name_node) = name_node else { return };
    let name = ctx.interner.intern_to_string(text(name_node, source));
    out.symbols.push(make_symbol(ctx, &name, SymbolKind::Enum, name_node, node, None));

    ctx.container_stack.push(name);
    ctx.container_kind_stack.push(SymbolKind::Enum);
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            let member_name_node = member.child_by_field_name("name").unwrap_or(member);
            let member_name = ctx.interner.intern_to_string(text(member_name_node, source));
            out.symbols.push(make_symbol(
                ctx,
                &member_name,
                SymbolKind::Constant,
                member_name_node,
                member,
                None,
            ));
        }
    }
    ctx.container_stack.pop();
    ctx.container_kind_stack.pop();
}

fn handle_simple_decl(
    node: Node,
    source: &str,
    ctx: &mut WalkContext,
    out: &mut ExtractedFile,
    kind: SymbolKind,
) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = ctx.interner.intern_to_string(text(name_node, source));
    out.symbols.push(make_symbol(ctx, &name, kind, name_node, node, None));
}

fn handle_class_member(
    node: Node,
    source: &str,
    ctx: &mut WalkContext,
    out: &mut ExtractedFile,
    depth: usize,
    kind: SymbolKind,
) {
    let name_node = node
        .child_by_field_name("name")
        .or_else(|| node.child_by_field_name("property"));
    let Some(name_node) = name_node else {
        walk_children_skipping(node, source, ctx, out, depth, None);
        return;
    };
    let name = ctx.interner.intern_to_string(text(name_node, source));
    let is_static = has_static_modifier(node);
    let param_count = if kind == SymbolKind::Method {
        Some(count_parameters(node))
    } else {
        None
    };
    let disambiguator = param_count.map(|pc| (is_static, pc));
    let mut symbol = make_symbol(ctx, &name, kind, name_node, node, disambiguator);
    symbol.is_static = Some(is_static);
    symbol.parameters_count = param_count;
    out.symbols.push(symbol);

    walk_children_skipping(node, source, ctx, out, depth, Some(name_node.id()));
}

fn handle_variable_declarator(
    node: Node,
    source: &str,
    ctx: &mut WalkContext,
    out: &mut ExtractedFile,
    depth: usize,
) {
    let Some(name_node) = node.child_by_field_name("name") else {
        walk_children_skipping(node, source, ctx, out, depth, None);
        return;
    };
    let value_node = node.child_by_field_name("value");

    if name_node.kind() != "identifier" {
        // Destructuring pattern: no single symbol to attach; still walk the
        // initializer for references.
        if let Some(value) = value_node {
            walk_node(value, source, ctx, out, depth + 1);
        }
        return;
    }

    let name = ctx.interner.intern_to_string(text(name_node, source));

    if let Some(value) = value_node {
        if let Some(group) = action_groups::try_extract_action_group(&name, value, source, ctx) {
            out.symbols.push(group.container_symbol);
            out.symbols.extend(group.virtual_methods);
            ctx.register_action_group_binding(name.clone(), group.event_map);
            walk_children_skipping(node, source, ctx, out, depth, Some(name_node.id()));
            return;
        }
    }

    let mut symbol = make_symbol(ctx, &name, SymbolKind::Variable, name_node, node, None);
    if let Some(value) = value_node {
        if let Some(role) = action_groups::try_role_marker(value, source) {
            let mut metadata = HashMap::new();
            metadata.insert("role".to_string(), serde_json::json!(role));
            symbol.metadata = Some(metadata);
        }
    }
    out.symbols.push(symbol);

    walk_children_skipping(node, source, ctx, out, depth, Some(name_node.id()));
}

fn strip_quotes(s: &str) -> String {
    s.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

fn handle_import(node: Node, source: &str, ctx: &mut WalkContext, out: &mut ExtractedFile) {
    let Some(source_node) = node.child_by_field_name("source") else {
        return;
    };
    // Module specifiers repeat heavily across a file's imports (the same
    // `"react"` or a sibling's relative path); interning avoids re-allocating
    // the same spelling once per import statement.
    let module_specifier = ctx.interner.intern_to_string(&strip_quotes(text(source_node, source)));

    let clause = node.child_by_field_name("clause").or_else(|| {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .find(|c| c.kind() == "import_clause")
    });
    let Some(clause) = clause else {
        return;
    };
    let mut cursor = clause.walk();
    for child in clause.named_children(&mut cursor) {
        match child.kind() {
            "identifier" => {
                // default import: `import Foo from "..."`
                out.imports.push(ImportInfo {
                    local_name: ctx.interner.intern_to_string(text(child, source)),
                    module_specifier: module_specifier.clone(),
                    is_default: Some(true),
                    is_namespace: Some(false),
                    exported_name: None,
                });
            }
            "namespace_import" => {
                if let Some(name) = child.child_by_field_name("name") {
                    out.imports.push(ImportInfo {
                        local_name: ctx.interner.intern_to_string(text(name, source)),
                        module_specifier: module_specifier.clone(),
                        is_default: Some(false),
                        is_namespace: Some(true),
                        exported_name: None,
                    });
                }
            }
            "named_imports" => {
                let mut spec_cursor = child.walk();
                for spec in child.named_children(&mut spec_cursor) {
                    if spec.kind() != "import_specifier" {
                        continue;
                    }
                    let imported = spec
                        .child_by_field_name("name")
                        .map(|n| ctx.interner.intern_to_string(text(n, source)));
                    let alias = spec
                        .child_by_field_name("alias")
                        .map(|n| ctx.interner.intern_to_string(text(n, source)));
                    let Some(imported) = imported else { continue };
                    out.imports.push(ImportInfo {
                        local_name: alias.clone().unwrap_or_else(|| imported.clone()),
                        module_specifier: module_specifier.clone(),
                        is_default: Some(false),
                        is_namespace: Some(false),
                        exported_name: if alias.is_some() { Some(imported) } else { None },
                    });
                }
            }
            _ => {}
        }
    }
}

fn handle_export(
    node: Node,
    source: &str,
    ctx: &mut WalkContext,
    out: &mut ExtractedFile,
    depth: usize,
) {
    if let Some(source_node) = node.child_by_field_name("source") {
        let module_specifier = ctx.interner.intern_to_string(&strip_quotes(text(source_node, source)));
        let mut cursor = node.walk();
        let export_clause = node
            .named_children(&mut cursor)
            .find(|c| c.kind() == "export_clause");

        let re_export = match export_clause {
            Some(clause) => {
                let mut names = Vec::new();
                let mut sc = clause.walk();
                for spec in clause.named_children(&mut sc) {
                    if spec.kind() == "export_specifier" {
                        if let Some(name) = spec.child_by_field_name("name") {
                            names.push(ctx.interner.intern_to_string(text(name, source)));
                        }
                    }
                }
                ReExportInfo {
                    module_specifier,
                    is_all: Some(false),
                    exported_names: Some(names),
                }
            }
            None => ReExportInfo {
                module_specifier,
                is_all: Some(true),
                exported_names: None,
            },
        };
        out.re_exports.push(re_export);
        return;
    }

    // `export function foo() {}` / `export const x = ...` / `export default ...`
    walk_children_skipping(node, source, ctx, out, depth, None);
}

fn handle_member_expression(
    node: Node,
    source: &str,
    ctx: &mut WalkContext,
    out: &mut ExtractedFile,
    depth: usize,
) {
    let Some(object) = node.child_by_field_name("object") else {
        return;
    };
    let Some(property) = node.child_by_field_name("property") else {
        walk_node(object, source, ctx, out, depth + 1);
        return;
    };

    walk_node(object, source, ctx, out, depth + 1);

    let object_binding = if object.kind() == "identifier" {
        Some(ctx.interner.intern_to_string(text(object, source)))
    } else {
        None
    };

    let property_name = ctx.interner.intern_to_string(text(property, source));

    let resolved_as_action_group = object_binding
        .as_ref()
        .map(|name| ctx.action_group_bindings.contains_key(name))
        .unwrap_or(false);

    if resolved_as_action_group {
        let container = object_binding.unwrap();
        out.pending_references.push(crate::model::PendingReference {
            container,
            member: property_name,
            uri: ctx.uri.clone(),
            location: location_of(property),
            range: range_of(property),
            container_name: ctx.container_name(),
        });
    } else {
        out.references.push(IndexedReference {
            symbol_name: property_name,
            uri: ctx.uri.clone(),
            location: location_of(property),
            range: range_of(property),
            container_name: ctx.container_name(),
            scope_id: Some(ctx.container_path()),
            is_local: Some(false),
            is_import: Some(false),
        });
    }
}

//! Tree-sitter extraction strategy
//!
//! One adapter type, parameterised by a [`GrammarProfile`]. The walker visits
//! declaration nodes, emits entities for types, functions and fields, and
//! records name-keyed edges for bases, calls, construction, exceptions,
//! attributes and imports.

use super::framework::{LanguageAdapter, ParseRequest, ParseResult};
use super::grammar::{Dialect, GrammarProfile, node_text};
use super::heuristic::collapse_whitespace;
use crate::entity::{CodeEntity, EntityKind};
use crate::relationship::RelationshipKind;
use crate::resolver::{normalize_name, normalize_type};
use crate::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;
use tree_sitter::{Node, Parser};

/// Longest signature kept in metadata
const MAX_SIGNATURE_LEN: usize = 300;

/// Longest doc summary kept in metadata
const MAX_DOC_LEN: usize = 200;

/// Deepest syntax-tree level the walker descends to; deeper nodes are skipped
pub const MAX_SYNTAX_DEPTH: usize = 200;

/// Wrapper nodes whose leading comment documents the inner declaration
const DOC_WRAPPERS: &[&str] = &[
    "type_declaration",
    "export_statement",
    "lexical_declaration",
    "variable_declaration",
];

/// JavaScript test-framework calls that declare a test case
const JS_TEST_CALLS: &[&str] = &["it", "test"];

static XML_DOC_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("valid XML doc tag regex"));

/// Tree-sitter backed strategy for one language
pub struct SyntaxTreeAdapter {
    profile: &'static GrammarProfile,
}

impl SyntaxTreeAdapter {
    pub fn new(profile: &'static GrammarProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &'static GrammarProfile {
        self.profile
    }
}

impl LanguageAdapter for SyntaxTreeAdapter {
    fn language_name(&self) -> &str {
        self.profile.language
    }

    fn file_extensions(&self) -> &[&str] {
        self.profile.extensions
    }

    fn parse_code(&self, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.profile.tree_sitter_language())
            .map_err(|e| Error::Strategy(format!("Failed to set language: {}", e)))?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| Error::Parse(format!("tree-sitter produced no tree for {}", request.path)))?;
        let root = tree.root_node();

        let mut result = ParseResult::new();
        let file_name = request.file_name();
        result.add_entity(request.file_entity(content, self.profile.language));

        if root.has_error() {
            let line = first_error_line(root).unwrap_or(1);
            tracing::debug!("Syntax errors in {} starting at line {}", request.path, line);
            result.add_error(format!("syntax error in {} at line {}", request.path, line));
        }

        let mut walker = Walker {
            profile: self.profile,
            source: content,
            request,
            result,
            level: 0,
            clipped: false,
        };
        let scope = Scope {
            owner: file_name,
            type_name: None,
            depth: 0,
        };
        walker.visit_children(root, &scope);
        Ok(walker.result)
    }
}

/// Where the walker currently is: who edges come from, and the enclosing type
#[derive(Debug, Clone)]
struct Scope {
    owner: String,
    type_name: Option<String>,
    /// Declaration nesting depth of the enclosing type or function (0 at file level)
    depth: usize,
}

impl Scope {
    fn qualify(&self, name: &str) -> String {
        match &self.type_name {
            Some(t) => format!("{}.{}", t, name),
            None => name.to_string(),
        }
    }
}

struct Walker<'a> {
    profile: &'static GrammarProfile,
    source: &'a str,
    request: &'a ParseRequest,
    result: ParseResult,
    /// Current syntax-tree level below the root
    level: usize,
    clipped: bool,
}

impl<'a> Walker<'a> {
    fn text(&self, node: Node) -> &'a str {
        node_text(node, self.source)
    }

    fn visit_children(&mut self, node: Node, scope: &Scope) {
        if self.level >= MAX_SYNTAX_DEPTH {
            if !self.clipped {
                self.clipped = true;
                tracing::warn!("{} nests deeper than {} syntax levels", self.request.path, MAX_SYNTAX_DEPTH);
                self.result.add_error(format!(
                    "{} nests deeper than {} syntax levels at line {}; inner nodes skipped",
                    self.request.path,
                    MAX_SYNTAX_DEPTH,
                    line_of(node)
                ));
            }
            return;
        }
        self.level += 1;
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child, scope);
        }
        self.level -= 1;
    }

    fn visit(&mut self, node: Node, scope: &Scope) {
        let kind = node.kind();
        let profile = self.profile;

        if profile.is_type(kind) {
            self.visit_type(node, scope);
        } else if profile.is_function(kind) {
            self.visit_function(node, scope, None);
        } else if profile.field_kinds.contains(&kind) {
            self.visit_field(node, scope);
        } else if profile.import_kinds.contains(&kind) {
            if let Some(target) = profile.import_target(node, self.source) {
                let rel = self
                    .request
                    .relationship(self.request.file_name(), target, RelationshipKind::Imports)
                    .at_line(line_of(node));
                self.result.add_relationship(rel);
            }
        } else if profile.is_attribute(kind) || profile.is_comment(kind) {
            // Attributes are read from their declaration
        } else if profile.dialect == Dialect::Rust && kind == "impl_item" {
            self.visit_impl(node, scope);
        } else if let Some(value) = bound_function(node) {
            self.visit_function(node, scope, Some(value));
        } else if profile.call_kinds.contains(&kind) {
            self.visit_call(node, scope);
        } else if profile.new_kinds.contains(&kind) {
            if let Some(created) = profile.created_type(node, self.source) {
                self.edge(&scope.owner, created, RelationshipKind::Uses, node);
            }
            self.visit_children(node, scope);
        } else if profile.throw_kinds.contains(&kind) {
            if let Some(thrown) = profile.thrown_type(node, self.source) {
                self.edge(&scope.owner, thrown, RelationshipKind::Throws, node);
            }
            self.visit_children(node, scope);
        } else if profile.catch_kinds.contains(&kind) {
            for caught in profile.catch_types(node, self.source) {
                self.edge(&scope.owner, caught, RelationshipKind::Catches, node);
            }
            self.visit_children(node, scope);
        } else {
            self.visit_children(node, scope);
        }
    }

    fn edge(&mut self, from: &str, to: impl Into<String>, kind: RelationshipKind, at: Node) {
        let rel = self.request.relationship(from, to, kind).at_line(line_of(at));
        self.result.add_relationship(rel);
    }

    fn visit_type(&mut self, node: Node, scope: &Scope) {
        let depth = scope.depth + 1;
        if !self.request.policy.allows_depth(depth) {
            tracing::trace!("Skipping type nested beyond depth {} in {}", scope.depth, self.request.path);
            return;
        }
        let Some(simple) = self.profile.type_name(node, self.source) else {
            self.visit_children(node, scope);
            return;
        };
        let name = scope.qualify(&simple);

        let entity = self
            .declaration(EntityKind::Class, &name, node, scope)
            .with_meta("kind", self.profile.declaration_tag(node, self.source));
        self.result.add_entity(entity);
        self.edge(&scope.owner, &name, RelationshipKind::Defines, node);

        for (base, kind) in self.profile.base_types(node, self.source) {
            self.edge(&name, base, kind, node);
        }
        for attribute in self.profile.attribute_names(node, self.source) {
            self.edge(&name, attribute, RelationshipKind::HasAttribute, node);
        }

        let inner = Scope {
            owner: name.clone(),
            type_name: Some(name),
            depth,
        };
        match node.child_by_field_name("body") {
            Some(body) => self.visit_children(body, &inner),
            // Go type specs carry their members under `type`
            None => self.visit_children(node, &inner),
        }
    }

    fn visit_impl(&mut self, node: Node, scope: &Scope) {
        let Some(type_node) = node.child_by_field_name("type") else {
            return;
        };
        let type_name = normalize_type(self.text(type_node));
        if let Some(trait_node) = node.child_by_field_name("trait") {
            let trait_name = normalize_type(self.text(trait_node));
            self.edge(&type_name, trait_name, RelationshipKind::Implements, node);
        }
        let inner = Scope {
            owner: type_name.clone(),
            type_name: Some(type_name),
            depth: scope.depth,
        };
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, &inner);
        }
    }

    fn visit_function<'t>(&mut self, node: Node<'t>, scope: &Scope, bound: Option<Node<'t>>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            self.visit_children(node, scope);
            return;
        };
        let body_holder = bound.unwrap_or(node);
        let depth = scope.depth + 1;
        if !self.request.policy.allows_depth(depth) {
            // Calls inside still count, against the deepest kept owner
            tracing::trace!("Folding function nested beyond depth {} in {}", scope.depth, self.request.path);
            if let Some(body) = body_holder.child_by_field_name("body") {
                self.visit_children(body, scope);
            }
            return;
        }
        let simple = normalize_name(self.text(name_node));

        let owner_type = self
            .profile
            .receiver_type(node, self.source)
            .or_else(|| scope.type_name.clone());
        let name = match &owner_type {
            Some(t) => format!("{}.{}", t, simple),
            None => simple.clone(),
        };

        let attributes = self.profile.attribute_names(node, self.source);
        let kind = if self.profile.is_test(&simple, &attributes) {
            EntityKind::Test
        } else {
            EntityKind::Method
        };

        let return_type = self.return_type(node, body_holder);
        let entity = self
            .declaration(kind, &name, node, scope)
            .with_optional_meta("returnType", return_type.clone());
        self.result.add_entity(entity);

        let definer = owner_type.unwrap_or_else(|| scope.owner.clone());
        self.edge(&definer, &name, RelationshipKind::Defines, node);
        for attribute in attributes {
            self.edge(&name, attribute, RelationshipKind::HasAttribute, node);
        }
        if let Some(ret) = return_type {
            self.edge(&name, ret, RelationshipKind::ReturnsType, node);
        }

        let inner = Scope {
            owner: name,
            type_name: scope.type_name.clone(),
            depth,
        };
        if let Some(body) = body_holder.child_by_field_name("body") {
            self.visit_children(body, &inner);
        }
    }

    /// Declared return type, ignoring `void`
    fn return_type(&self, node: Node, body_holder: Node) -> Option<String> {
        let declared = ["return_type", "returns", "result"]
            .iter()
            .find_map(|f| body_holder.child_by_field_name(f).or_else(|| node.child_by_field_name(f)))
            .or_else(|| {
                // Java puts the return type under `type`
                (self.profile.dialect == Dialect::Java && node.kind() == "method_declaration")
                    .then(|| node.child_by_field_name("type"))
                    .flatten()
            })?;
        let name = normalize_type(self.text(declared).trim_start_matches(':'));
        (!name.is_empty() && name != "void").then_some(name)
    }

    fn visit_field(&mut self, node: Node, scope: &Scope) {
        let Some(type_name) = scope.type_name.clone() else {
            self.visit_children(node, scope);
            return;
        };

        for name_node in field_name_nodes(node) {
            let name = format!("{}.{}", type_name, normalize_name(self.text(name_node)));
            let entity = self
                .declaration(EntityKind::Property, &name, node, scope)
                .with_optional_meta(
                    "type",
                    node.child_by_field_name("type")
                        .map(|t| normalize_type(self.text(t).trim_start_matches(':'))),
                );
            self.result.add_entity(entity);
            self.edge(&type_name, &name, RelationshipKind::Defines, node);
        }
        // Initializers may call or construct
        for value in ["value", "declarator"] {
            if let Some(child) = node.child_by_field_name(value) {
                self.visit_children(child, scope);
            }
        }
    }

    fn visit_call(&mut self, node: Node, scope: &Scope) {
        let callee = self.profile.callee_text(node, self.source).unwrap_or_default();
        let callee = normalize_name(&callee);

        if matches!(self.profile.dialect, Dialect::JavaScript | Dialect::TypeScript | Dialect::Tsx) {
            if callee == "require" {
                if let Some(module) = self.first_string_argument(node) {
                    let file = self.request.file_name();
                    self.edge(&file, module, RelationshipKind::Imports, node);
                    return;
                }
            }
            if JS_TEST_CALLS.contains(&callee.as_str()) {
                if let Some(title) = self.first_string_argument(node) {
                    self.visit_js_test(node, &title, scope);
                    return;
                }
            }
        }

        if !callee.is_empty() {
            self.edge(&scope.owner, callee, RelationshipKind::Calls, node);
        }
        self.visit_children(node, scope);
    }

    fn visit_js_test(&mut self, node: Node, title: &str, scope: &Scope) {
        let entity = self
            .request
            .entity(EntityKind::Test, title, line_of(node), self.text(node))
            .with_meta("endLine", end_line_of(node));
        self.result.add_entity(entity);
        self.edge(&scope.owner, title, RelationshipKind::Defines, node);

        let inner = Scope {
            owner: title.to_string(),
            type_name: scope.type_name.clone(),
            depth: scope.depth,
        };
        if let Some(args) = node.child_by_field_name("arguments") {
            self.visit_children(args, &inner);
        }
    }

    fn first_string_argument(&self, call: Node) -> Option<String> {
        let args = call.child_by_field_name("arguments")?;
        let first = args.named_child(0)?;
        if !matches!(first.kind(), "string" | "template_string") {
            return None;
        }
        let value = normalize_name(self.text(first));
        (!value.is_empty()).then_some(value)
    }

    /// Entity for a declaration node with the shared declaration metadata
    fn declaration(&self, kind: EntityKind, name: &str, node: Node, scope: &Scope) -> CodeEntity {
        let mut entity = self
            .request
            .entity(kind, name, line_of(node), self.text(node))
            .with_meta("signature", self.signature(node))
            .with_meta("endLine", end_line_of(node))
            .with_meta("language", self.profile.language)
            .with_optional_meta("doc", self.doc_summary(node));
        if let Some(parent) = &scope.type_name {
            entity = entity.with_meta("parent", parent.as_str());
        }
        entity
    }

    /// Header text of a declaration, up to its body
    fn signature(&self, node: Node) -> String {
        let body_start = node
            .child_by_field_name("body")
            .or_else(|| node.child_by_field_name("value").and_then(|v| v.child_by_field_name("body")))
            .map(|b| b.start_byte());
        let header = match body_start {
            Some(end) => self.source.get(node.start_byte()..end).unwrap_or(""),
            None => self.text(node).lines().next().unwrap_or(""),
        };
        // Skip leading attribute/annotation lines
        let header: String = header
            .lines()
            .map(str::trim)
            .filter(|l| !(l.starts_with('[') || l.starts_with("#[") || (l.starts_with('@') && !l.contains(' '))))
            .collect::<Vec<_>>()
            .join(" ");
        let header = header.trim().trim_end_matches(['{', '=', '>', ':']).trim();
        let mut signature = collapse_whitespace(header);
        cut_to(&mut signature, MAX_SIGNATURE_LEN);
        signature
    }

    /// Summary line of the doc comment directly above a declaration
    fn doc_summary(&self, node: Node) -> Option<String> {
        let mut target = node;
        loop {
            let comments = self.leading_comments(target);
            if !comments.is_empty() {
                return summarize_comment(&comments.join("\n"));
            }
            match target.parent() {
                Some(parent) if DOC_WRAPPERS.contains(&parent.kind()) => target = parent,
                _ => return None,
            }
        }
    }

    fn leading_comments(&self, node: Node) -> Vec<&'a str> {
        let mut comments = Vec::new();
        let mut prev = node.prev_named_sibling();
        let mut expected_row = node.start_position().row;
        while let Some(sibling) = prev {
            if self.profile.is_comment(sibling.kind()) {
                // Only comments touching the declaration (or each other)
                if sibling.end_position().row + 1 < expected_row {
                    break;
                }
                comments.push(self.text(sibling));
            } else if !self.profile.is_attribute(sibling.kind()) {
                break;
            }
            expected_row = sibling.start_position().row;
            prev = sibling.prev_named_sibling();
        }
        comments.reverse();
        comments
    }
}

/// `const f = () => ...` / `let f = function () ...`
fn bound_function(declarator: Node) -> Option<Node> {
    if declarator.kind() != "variable_declarator" {
        return None;
    }
    let value = declarator.child_by_field_name("value")?;
    matches!(
        value.kind(),
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
    .then_some(value)
}

/// Cut `text` to at most `max` bytes on a char boundary
fn cut_to(text: &mut String, max: usize) {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
}

/// Names declared by a field/property node
fn field_name_nodes(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    let direct: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
    if !direct.is_empty() {
        return direct;
    }
    if let Some(property) = node.child_by_field_name("property") {
        return vec![property];
    }

    // `int a, b;` / `private final Repo repo = ...;`
    let mut names = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let mut cursor = current.walk();
        for child in current.named_children(&mut cursor) {
            if child.kind() == "variable_declarator" {
                let name = child
                    .child_by_field_name("name")
                    .or_else(|| child.named_child(0).filter(|n| n.kind() == "identifier"));
                names.extend(name);
            } else if child.kind() == "variable_declaration" {
                stack.push(child);
            }
        }
    }
    names
}

/// First meaningful line of a comment block, markup stripped
pub fn summarize_comment(raw: &str) -> Option<String> {
    for line in raw.lines() {
        let line = line
            .trim()
            .trim_start_matches('/')
            .trim_start_matches('*')
            .trim_start_matches('!')
            .trim_end_matches("*/")
            .trim();
        let line = XML_DOC_TAG.replace_all(line, "");
        let line = line.trim();
        if line.is_empty() || line.starts_with('@') {
            continue;
        }
        let mut summary = line.to_string();
        cut_to(&mut summary, MAX_DOC_LEN);
        return Some(summary);
    }
    None
}

fn line_of(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

fn end_line_of(node: Node) -> u32 {
    node.end_position().row as u32 + 1
}

/// 1-based line of the first ERROR or MISSING node
fn first_error_line(root: Node) -> Option<u32> {
    let mut stack = vec![root];
    let mut first: Option<u32> = None;
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let line = line_of(node);
            first = Some(first.map_or(line, |f| f.min(line)));
            continue;
        }
        if node.has_error() {
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::grammar::{CSHARP, GO, JAVA, JAVASCRIPT, RUST, TYPESCRIPT};
    use crate::relationship::Relationship;

    fn parse(profile: &'static GrammarProfile, path: &str, code: &str) -> ParseResult {
        let adapter = SyntaxTreeAdapter::new(profile);
        adapter.parse_code(code, &ParseRequest::new(path)).unwrap()
    }

    fn has_edge(rels: &[Relationship], from: &str, to: &str, kind: RelationshipKind) -> bool {
        rels.iter()
            .any(|r| r.from_name == from && normalize_name(&r.to_name) == to && r.kind == kind)
    }

    #[test]
    fn test_csharp_class_with_interface_and_calls() {
        let code = r#"using System.Linq;

namespace Shop
{
    /// <summary>Handles orders.</summary>
    public class OrderService : BaseService, IOrderService
    {
        private readonly IRepository _repo;

        public string Name { get; set; }

        public void Place(Order order)
        {
            Validate(order);
            _repo.Save(order);
            if (order == null) throw new ArgumentNullException(nameof(order));
        }

        [Fact]
        public void PlacesOrder() { }
    }
}
"#;
        let result = parse(&CSHARP, "OrderService.cs", code);
        assert!(result.succeeded(), "{:?}", result.errors);

        let class = result.entity("OrderService").unwrap();
        assert_eq!(class.kind, EntityKind::Class);
        assert_eq!(class.line_number, 6);
        assert_eq!(class.meta("doc").and_then(|v| v.as_text()), Some("Handles orders."));

        let method = result.entity("OrderService.Place").unwrap();
        assert_eq!(method.kind, EntityKind::Method);
        assert_eq!(method.line_number, 12);
        assert_eq!(result.entity("OrderService.PlacesOrder").unwrap().kind, EntityKind::Test);
        assert!(result.entity("OrderService._repo").is_some());
        assert!(result.entity("OrderService.Name").is_some());

        let rels = &result.relationships;
        assert!(has_edge(rels, "OrderService", "BaseService", RelationshipKind::Inherits));
        assert!(has_edge(rels, "OrderService", "IOrderService", RelationshipKind::Implements));
        assert!(has_edge(rels, "OrderService.Place", "Validate", RelationshipKind::Calls));
        assert!(has_edge(rels, "OrderService.Place", "_repo.Save", RelationshipKind::Calls));
        assert!(has_edge(rels, "OrderService.Place", "ArgumentNullException", RelationshipKind::Throws));
        assert!(has_edge(rels, "OrderService.cs", "System.Linq", RelationshipKind::Imports));
        assert!(has_edge(rels, "OrderService.PlacesOrder", "Fact", RelationshipKind::HasAttribute));
    }

    #[test]
    fn test_java_extends_implements_and_catch() {
        let code = r#"import java.util.List;

public class Invoice extends Document implements Printable, Serializable {
    private int total;

    @Test
    public void prints() {
        try {
            render(total);
        } catch (IOException | IllegalStateException e) {
            log.warn("failed");
        }
    }
}
"#;
        let result = parse(&JAVA, "Invoice.java", code);
        assert!(result.succeeded(), "{:?}", result.errors);
        let rels = &result.relationships;
        assert!(has_edge(rels, "Invoice", "Document", RelationshipKind::Inherits));
        assert!(has_edge(rels, "Invoice", "Printable", RelationshipKind::Implements));
        assert!(has_edge(rels, "Invoice", "Serializable", RelationshipKind::Implements));
        assert!(has_edge(rels, "Invoice.prints", "render", RelationshipKind::Calls));
        assert!(has_edge(rels, "Invoice.prints", "log.warn", RelationshipKind::Calls));
        assert!(has_edge(rels, "Invoice.prints", "IOException", RelationshipKind::Catches));
        assert!(has_edge(rels, "Invoice.prints", "IllegalStateException", RelationshipKind::Catches));
        assert!(has_edge(rels, "Invoice.java", "java.util.List", RelationshipKind::Imports));
        assert_eq!(result.entity("Invoice.prints").unwrap().kind, EntityKind::Test);
        assert!(result.entity("Invoice.total").is_some());
    }

    #[test]
    fn test_javascript_functions_and_tests() {
        let code = r#"import { render } from './view';
const fs = require('fs');

class Widget extends Base {
  draw() {
    render(this.el);
  }
}

const load = async (path) => {
  return fs.readFileSync(path);
};

it('draws the widget', () => {
  new Widget().draw();
});
"#;
        let result = parse(&JAVASCRIPT, "widget.js", code);
        assert!(result.succeeded(), "{:?}", result.errors);
        assert_eq!(result.entity("Widget.draw").unwrap().kind, EntityKind::Method);
        assert_eq!(result.entity("load").unwrap().line_number, 10);
        let test = result.entity("draws the widget").unwrap();
        assert_eq!(test.kind, EntityKind::Test);
        assert_eq!(test.line_number, 14);

        let rels = &result.relationships;
        assert!(has_edge(rels, "widget.js", "./view", RelationshipKind::Imports));
        assert!(has_edge(rels, "widget.js", "fs", RelationshipKind::Imports));
        assert!(has_edge(rels, "Widget", "Base", RelationshipKind::Inherits));
        assert!(has_edge(rels, "Widget.draw", "render", RelationshipKind::Calls));
        assert!(has_edge(rels, "load", "fs.readFileSync", RelationshipKind::Calls));
        assert!(has_edge(rels, "draws the widget", "Widget", RelationshipKind::Uses));
    }

    #[test]
    fn test_typescript_interface_and_implements() {
        let code = r#"export interface Shape extends Drawable {
  area(): number;
}

export class Circle implements Shape {
  radius: number = 1;
  area(): number {
    return Math.PI * this.radius ** 2;
  }
}
"#;
        let result = parse(&TYPESCRIPT, "shape.ts", code);
        assert!(result.succeeded(), "{:?}", result.errors);
        let rels = &result.relationships;
        assert!(has_edge(rels, "Shape", "Drawable", RelationshipKind::Inherits));
        assert!(has_edge(rels, "Circle", "Shape", RelationshipKind::Implements));
        assert!(result.entity("Circle.area").is_some());
        assert!(result.entity("Circle.radius").is_some());
        assert_eq!(
            result.entity("Circle").unwrap().meta("kind").and_then(|v| v.as_text()),
            Some("class")
        );
    }

    #[test]
    fn test_go_methods_and_tests() {
        let code = r#"package store

import "fmt"

// Store keeps items.
type Store struct {
	Base
	items []string
}

func (s *Store) Add(item string) {
	s.items = append(s.items, item)
	fmt.Println(item)
}

func TestAdd(t *testing.T) {
	s := &Store{}
	s.Add("x")
}
"#;
        let result = parse(&GO, "store.go", code);
        assert!(result.succeeded(), "{:?}", result.errors);
        let store = result.entity("Store").unwrap();
        assert_eq!(store.meta("kind").and_then(|v| v.as_text()), Some("struct"));
        assert_eq!(store.meta("doc").and_then(|v| v.as_text()), Some("Store keeps items."));
        assert!(result.entity("Store.items").is_some());
        assert_eq!(result.entity("Store.Add").unwrap().kind, EntityKind::Method);
        assert_eq!(result.entity("TestAdd").unwrap().kind, EntityKind::Test);

        let rels = &result.relationships;
        assert!(has_edge(rels, "Store", "Base", RelationshipKind::Inherits));
        assert!(has_edge(rels, "Store.Add", "fmt.Println", RelationshipKind::Calls));
        assert!(has_edge(rels, "TestAdd", "s.Add", RelationshipKind::Calls));
        assert!(has_edge(rels, "TestAdd", "Store", RelationshipKind::Uses));
        assert!(has_edge(rels, "store.go", "fmt", RelationshipKind::Imports));
    }

    #[test]
    fn test_rust_impl_trait_and_test_attr() {
        let code = r#"use std::fmt;

/// A point.
pub struct Point {
    x: i32,
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_point(f, self.x)
    }
}

#[test]
fn formats_point() {
    let p = Point { x: 1 };
    assert_eq!(p.to_string(), "1");
}
"#;
        let result = parse(&RUST, "point.rs", code);
        assert!(result.succeeded(), "{:?}", result.errors);
        assert_eq!(
            result.entity("Point").unwrap().meta("doc").and_then(|v| v.as_text()),
            Some("A point.")
        );
        assert!(result.entity("Point.x").is_some());
        assert_eq!(result.entity("Point.fmt").unwrap().kind, EntityKind::Method);
        assert_eq!(result.entity("formats_point").unwrap().kind, EntityKind::Test);

        let rels = &result.relationships;
        assert!(has_edge(rels, "Point", "fmt::Display", RelationshipKind::Implements));
        assert!(has_edge(rels, "Point.fmt", "write_point", RelationshipKind::Calls));
        assert!(has_edge(rels, "formats_point", "Point", RelationshipKind::Uses));
        assert!(has_edge(rels, "point.rs", "std::fmt", RelationshipKind::Imports));
    }

    #[test]
    fn test_syntax_error_is_partial_success() {
        let code = "public class Good {\n    public void Ok() { Run(); }\n}\n\npublic class Broken {\n    public void Bad( {\n}\n";
        let result = parse(&CSHARP, "Mixed.cs", code);
        assert!(!result.errors.is_empty());
        assert!(result.errors[0].contains("Mixed.cs"));
        assert!(result.entity("Good").is_some());
        assert!(result.entity("Good.Ok").is_some());
    }

    #[test]
    fn test_nested_types_limited_by_depth() {
        let mut code = String::new();
        for i in 0..8 {
            code.push_str(&format!("class L{} {{\n", i));
        }
        code.push_str(&"}\n".repeat(8));
        let result = parse(&JAVA, "Deep.java", &code);
        let classes = result.entities_of(EntityKind::Class).count();
        assert_eq!(classes, crate::policy::DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_nested_functions_limited_by_depth() {
        let mut code = String::new();
        for i in 0..10 {
            code.push_str(&format!("function f{}() {{\n  step{}();\n", i, i));
        }
        code.push_str(&"}\n".repeat(10));
        let result = parse(&JAVASCRIPT, "nested.js", &code);

        assert!(result.succeeded(), "{:?}", result.errors);
        assert_eq!(result.entities_of(EntityKind::Method).count(), crate::policy::DEFAULT_MAX_DEPTH);
        assert!(result.entity("f3").is_some());
        assert!(result.entity("f4").is_none());
        // Calls below the ceiling are kept on the deepest function that was emitted
        assert!(has_edge(&result.relationships, "f3", "step9", RelationshipKind::Calls));
    }

    #[test]
    fn test_methods_count_toward_depth() {
        let code = "class A { class B { class C { class D { void run() { go(); } } } } }\n";
        let result = parse(&JAVA, "Nest.java", code);
        assert_eq!(result.entities_of(EntityKind::Class).count(), 4);
        assert!(result.entities_of(EntityKind::Method).next().is_none());
        assert!(has_edge(&result.relationships, "A.B.C.D", "go", RelationshipKind::Calls));
    }

    #[test]
    fn test_deep_expression_is_clipped_not_overflowed() {
        let depth = 20_000;
        let code = format!("const x = {}1{};\nfunction after() {{}}\n", "[".repeat(depth), "]".repeat(depth));
        let result = std::thread::spawn(move || parse(&JAVASCRIPT, "deep.js", &code))
            .join()
            .unwrap();

        assert!(result.entities.iter().any(|e| e.kind == EntityKind::File));
        assert!(result.entity("after").is_some());
        assert!(result.errors.iter().any(|e| e.contains("syntax levels")));
    }

    #[test]
    fn test_summarize_comment() {
        assert_eq!(
            summarize_comment("/// <summary>\n/// Saves the order.\n/// </summary>"),
            Some("Saves the order.".to_string())
        );
        assert_eq!(summarize_comment("/**\n * Loads data.\n * @param x\n */"), Some("Loads data.".to_string()));
        assert_eq!(summarize_comment("//"), None);
    }
}

//! Grammar profiles for the tree-sitter strategy
//!
//! A profile maps one grammar's node kinds onto the shared extraction
//! vocabulary (types, functions, fields, calls, ...). The per-dialect hooks
//! below cover the few places where grammars disagree on structure: base
//! lists, import targets, catch clauses and test markers.

use crate::relationship::RelationshipKind;
use crate::resolver::normalize_type;
use tree_sitter::{Language, Node};

/// Grammar family, used for the structural hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    CSharp,
    Java,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
    Rust,
}

/// Node-kind tables for one grammar
#[derive(Debug)]
pub struct GrammarProfile {
    pub language: &'static str,
    pub dialect: Dialect,
    pub extensions: &'static [&'static str],
    /// Declarations emitted as `Class`
    pub type_kinds: &'static [&'static str],
    /// Declarations emitted as `Method` / `Test`
    pub function_kinds: &'static [&'static str],
    /// Member declarations emitted as `Property`
    pub field_kinds: &'static [&'static str],
    pub call_kinds: &'static [&'static str],
    /// Object construction (`new T`, composite/struct literals)
    pub new_kinds: &'static [&'static str],
    pub throw_kinds: &'static [&'static str],
    pub catch_kinds: &'static [&'static str],
    pub import_kinds: &'static [&'static str],
    pub attribute_kinds: &'static [&'static str],
    pub comment_kinds: &'static [&'static str],
}

pub static CSHARP: GrammarProfile = GrammarProfile {
    language: "csharp",
    dialect: Dialect::CSharp,
    extensions: &["cs"],
    type_kinds: &[
        "class_declaration",
        "interface_declaration",
        "struct_declaration",
        "record_declaration",
        "record_struct_declaration",
        "enum_declaration",
    ],
    function_kinds: &[
        "method_declaration",
        "constructor_declaration",
        "local_function_statement",
    ],
    field_kinds: &["field_declaration", "property_declaration"],
    call_kinds: &["invocation_expression"],
    new_kinds: &["object_creation_expression"],
    throw_kinds: &["throw_statement", "throw_expression"],
    catch_kinds: &["catch_clause"],
    import_kinds: &["using_directive"],
    attribute_kinds: &["attribute_list"],
    comment_kinds: &["comment"],
};

pub static JAVA: GrammarProfile = GrammarProfile {
    language: "java",
    dialect: Dialect::Java,
    extensions: &["java"],
    type_kinds: &[
        "class_declaration",
        "interface_declaration",
        "enum_declaration",
        "record_declaration",
        "annotation_type_declaration",
    ],
    function_kinds: &["method_declaration", "constructor_declaration"],
    field_kinds: &["field_declaration"],
    call_kinds: &["method_invocation"],
    new_kinds: &["object_creation_expression"],
    throw_kinds: &["throw_statement"],
    catch_kinds: &["catch_clause"],
    import_kinds: &["import_declaration"],
    attribute_kinds: &["marker_annotation", "annotation"],
    comment_kinds: &["line_comment", "block_comment"],
};

const JS_FUNCTIONS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "method_definition",
];

pub static JAVASCRIPT: GrammarProfile = GrammarProfile {
    language: "javascript",
    dialect: Dialect::JavaScript,
    extensions: &["js", "jsx", "mjs", "cjs"],
    type_kinds: &["class_declaration"],
    function_kinds: JS_FUNCTIONS,
    field_kinds: &["field_definition"],
    call_kinds: &["call_expression"],
    new_kinds: &["new_expression"],
    throw_kinds: &["throw_statement"],
    catch_kinds: &[],
    import_kinds: &["import_statement"],
    attribute_kinds: &["decorator"],
    comment_kinds: &["comment"],
};

const TS_TYPES: &[&str] = &[
    "class_declaration",
    "abstract_class_declaration",
    "interface_declaration",
    "enum_declaration",
];

const TS_FUNCTIONS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "method_definition",
    "method_signature",
    "abstract_method_signature",
];

const TS_FIELDS: &[&str] = &["public_field_definition", "property_signature"];

pub static TYPESCRIPT: GrammarProfile = GrammarProfile {
    language: "typescript",
    dialect: Dialect::TypeScript,
    extensions: &["ts", "mts", "cts"],
    type_kinds: TS_TYPES,
    function_kinds: TS_FUNCTIONS,
    field_kinds: TS_FIELDS,
    call_kinds: &["call_expression"],
    new_kinds: &["new_expression"],
    throw_kinds: &["throw_statement"],
    catch_kinds: &[],
    import_kinds: &["import_statement"],
    attribute_kinds: &["decorator"],
    comment_kinds: &["comment"],
};

pub static TSX: GrammarProfile = GrammarProfile {
    language: "typescript",
    dialect: Dialect::Tsx,
    extensions: &["tsx"],
    type_kinds: TS_TYPES,
    function_kinds: TS_FUNCTIONS,
    field_kinds: TS_FIELDS,
    call_kinds: &["call_expression"],
    new_kinds: &["new_expression"],
    throw_kinds: &["throw_statement"],
    catch_kinds: &[],
    import_kinds: &["import_statement"],
    attribute_kinds: &["decorator"],
    comment_kinds: &["comment"],
};

pub static GO: GrammarProfile = GrammarProfile {
    language: "go",
    dialect: Dialect::Go,
    extensions: &["go"],
    type_kinds: &["type_spec"],
    function_kinds: &["function_declaration", "method_declaration"],
    field_kinds: &["field_declaration"],
    call_kinds: &["call_expression"],
    new_kinds: &["composite_literal"],
    throw_kinds: &[],
    catch_kinds: &[],
    import_kinds: &["import_spec"],
    attribute_kinds: &[],
    comment_kinds: &["comment"],
};

pub static RUST: GrammarProfile = GrammarProfile {
    language: "rust",
    dialect: Dialect::Rust,
    extensions: &["rs"],
    type_kinds: &["struct_item", "enum_item", "trait_item", "union_item"],
    function_kinds: &["function_item", "function_signature_item"],
    field_kinds: &["field_declaration"],
    call_kinds: &["call_expression"],
    new_kinds: &["struct_expression"],
    throw_kinds: &[],
    catch_kinds: &[],
    import_kinds: &["use_declaration"],
    attribute_kinds: &["attribute_item"],
    comment_kinds: &["line_comment", "block_comment"],
};

/// Every profile, in dispatch order
pub fn all_profiles() -> [&'static GrammarProfile; 7] {
    [&CSHARP, &JAVA, &JAVASCRIPT, &TYPESCRIPT, &TSX, &GO, &RUST]
}

/// Text of a node, empty when the range is not valid UTF-8 boundaries
pub fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

fn named_children_of(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    named_children_of(node).into_iter().find(|c| c.kind() == kind)
}

/// Named children that denote a type, skipping type argument lists
fn type_children(node: Node) -> Vec<Node> {
    named_children_of(node)
        .into_iter()
        .filter(|c| !matches!(c.kind(), "type_arguments" | "comment"))
        .collect()
}

/// C# convention: an `IName` base is an interface
fn looks_like_interface(name: &str) -> bool {
    let simple = name.rsplit('.').next().unwrap_or(name);
    let mut chars = simple.chars();
    matches!((chars.next(), chars.next()), (Some('I'), Some(c)) if c.is_ascii_uppercase())
}

impl GrammarProfile {
    pub fn tree_sitter_language(&self) -> Language {
        match self.dialect {
            Dialect::CSharp => tree_sitter_c_sharp::LANGUAGE.into(),
            Dialect::Java => tree_sitter_java::LANGUAGE.into(),
            Dialect::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Dialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Dialect::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Dialect::Go => tree_sitter_go::LANGUAGE.into(),
            Dialect::Rust => tree_sitter_rust::LANGUAGE.into(),
        }
    }

    pub fn is_type(&self, kind: &str) -> bool {
        self.type_kinds.contains(&kind)
    }

    pub fn is_function(&self, kind: &str) -> bool {
        self.function_kinds.contains(&kind)
    }

    pub fn is_attribute(&self, kind: &str) -> bool {
        self.attribute_kinds.contains(&kind)
    }

    pub fn is_comment(&self, kind: &str) -> bool {
        self.comment_kinds.contains(&kind)
    }

    /// Short type tag for metadata: `class_declaration` -> `class`
    pub fn declaration_tag(&self, node: Node, source: &str) -> String {
        if self.dialect == Dialect::Go {
            return match node.child_by_field_name("type").map(|t| t.kind()) {
                Some("struct_type") => "struct".to_string(),
                Some("interface_type") => "interface".to_string(),
                _ => "type".to_string(),
            };
        }
        let kind = node.kind();
        let tag = kind
            .trim_end_matches("_declaration")
            .trim_end_matches("_item")
            .trim_start_matches("abstract_");
        if self.dialect == Dialect::CSharp && tag == "record" && node_text(node, source).contains("record struct") {
            return "record_struct".to_string();
        }
        tag.to_string()
    }

    /// Name of a type declaration
    pub fn type_name(&self, node: Node, source: &str) -> Option<String> {
        let name = node.child_by_field_name("name")?;
        Some(node_text(name, source).to_string())
    }

    /// Declared base types of a type declaration with the edge kind each one gets
    pub fn base_types(&self, node: Node, source: &str) -> Vec<(String, RelationshipKind)> {
        let mut bases = Vec::new();
        let mut push = |n: Node, kind: RelationshipKind| {
            let name = normalize_type(node_text(n, source));
            if !name.is_empty() {
                bases.push((name, kind));
            }
        };

        match self.dialect {
            Dialect::CSharp => {
                let is_interface = node.kind() == "interface_declaration";
                if let Some(list) = child_of_kind(node, "base_list") {
                    for base in type_children(list) {
                        let base = match base.kind() {
                            "primary_constructor_base_type" => base.named_child(0).unwrap_or(base),
                            _ => base,
                        };
                        let name = normalize_type(node_text(base, source));
                        let kind = if !is_interface && looks_like_interface(&name) {
                            RelationshipKind::Implements
                        } else {
                            RelationshipKind::Inherits
                        };
                        push(base, kind);
                    }
                }
            }
            Dialect::Java => {
                for child in named_children_of(node) {
                    let kind = match child.kind() {
                        "superclass" => RelationshipKind::Inherits,
                        "super_interfaces" => RelationshipKind::Implements,
                        "extends_interfaces" => RelationshipKind::Inherits,
                        _ => continue,
                    };
                    for part in type_children(child) {
                        if part.kind() == "type_list" {
                            for t in type_children(part) {
                                push(t, kind);
                            }
                        } else {
                            push(part, kind);
                        }
                    }
                }
            }
            Dialect::JavaScript | Dialect::TypeScript | Dialect::Tsx => {
                for child in named_children_of(node) {
                    match child.kind() {
                        "class_heritage" => {
                            for clause in type_children(child) {
                                match clause.kind() {
                                    "extends_clause" => {
                                        for t in type_children(clause) {
                                            push(t, RelationshipKind::Inherits);
                                        }
                                    }
                                    "implements_clause" => {
                                        for t in type_children(clause) {
                                            push(t, RelationshipKind::Implements);
                                        }
                                    }
                                    // Plain JavaScript: `extends <expression>`
                                    _ => push(clause, RelationshipKind::Inherits),
                                }
                            }
                        }
                        "extends_type_clause" => {
                            for t in type_children(child) {
                                push(t, RelationshipKind::Inherits);
                            }
                        }
                        _ => {}
                    }
                }
            }
            Dialect::Go => {
                // Embedded fields and embedded interfaces
                if let Some(body) = node.child_by_field_name("type") {
                    let members = match body.kind() {
                        "struct_type" => child_of_kind(body, "field_declaration_list")
                            .map(named_children_of)
                            .unwrap_or_default(),
                        "interface_type" => named_children_of(body),
                        _ => Vec::new(),
                    };
                    for member in members {
                        match member.kind() {
                            "field_declaration" if member.child_by_field_name("name").is_none() => {
                                if let Some(t) = member.child_by_field_name("type") {
                                    push(t, RelationshipKind::Inherits);
                                }
                            }
                            "type_elem" => push(member, RelationshipKind::Inherits),
                            _ => {}
                        }
                    }
                }
            }
            Dialect::Rust => {
                if let Some(bounds) = node.child_by_field_name("bounds") {
                    for t in type_children(bounds) {
                        push(t, RelationshipKind::Inherits);
                    }
                }
            }
        }
        bases
    }

    /// Module or namespace named by an import node
    pub fn import_target(&self, node: Node, source: &str) -> Option<String> {
        let raw = match self.dialect {
            Dialect::JavaScript | Dialect::TypeScript | Dialect::Tsx => {
                node_text(node.child_by_field_name("source")?, source).to_string()
            }
            Dialect::Go => node_text(node.child_by_field_name("path")?, source).to_string(),
            Dialect::Rust => node_text(node.child_by_field_name("argument")?, source).to_string(),
            Dialect::CSharp | Dialect::Java => {
                let text = node_text(node, source).trim().trim_end_matches(';');
                let mut rest = text;
                for keyword in ["global ", "using ", "import ", "static "] {
                    rest = rest.trim_start().strip_prefix(keyword).unwrap_or(rest);
                }
                // `using Alias = Some.Namespace;`
                let rest = rest.rsplit('=').next().unwrap_or(rest);
                rest.trim().to_string()
            }
        };
        let target = crate::resolver::normalize_name(&raw);
        (!target.is_empty()).then_some(target)
    }

    /// Exception types named by a catch clause
    pub fn catch_types(&self, node: Node, source: &str) -> Vec<String> {
        let mut types = Vec::new();
        match self.dialect {
            Dialect::CSharp => {
                let declared = child_of_kind(node, "catch_declaration").and_then(|d| d.child_by_field_name("type"));
                if let Some(t) = declared {
                    types.push(normalize_type(node_text(t, source)));
                }
            }
            Dialect::Java => {
                let declared = child_of_kind(node, "catch_formal_parameter").and_then(|p| child_of_kind(p, "catch_type"));
                if let Some(catch_type) = declared {
                    for t in type_children(catch_type) {
                        types.push(normalize_type(node_text(t, source)));
                    }
                }
            }
            _ => {}
        }
        types.retain(|t| !t.is_empty());
        types
    }

    /// Type constructed by an object-creation node
    pub fn created_type(&self, node: Node, source: &str) -> Option<String> {
        let field = ["type", "constructor", "name"]
            .iter()
            .find_map(|f| node.child_by_field_name(f))?;
        let name = normalize_type(node_text(field, source));
        (!name.is_empty()).then_some(name)
    }

    /// Exception type of a throw node, when it throws a freshly created object
    pub fn thrown_type(&self, node: Node, source: &str) -> Option<String> {
        let thrown = named_children_of(node)
            .into_iter()
            .find(|c| self.new_kinds.contains(&c.kind()))?;
        self.created_type(thrown, source)
    }

    /// Literal callee text of a call node
    pub fn callee_text(&self, node: Node, source: &str) -> Option<String> {
        if let Some(function) = node.child_by_field_name("function") {
            return Some(node_text(function, source).to_string());
        }
        // Java: `obj.method(args)` has no function field
        let args = node.child_by_field_name("arguments")?;
        source
            .get(node.start_byte()..args.start_byte())
            .map(|s| s.to_string())
    }

    /// Attribute/annotation/decorator names attached to a declaration
    pub fn attribute_names(&self, node: Node, source: &str) -> Vec<String> {
        let mut holders: Vec<Node> = Vec::new();
        for child in named_children_of(node) {
            if self.is_attribute(child.kind()) {
                holders.push(child);
            } else if child.kind() == "modifiers" {
                holders.extend(named_children_of(child).into_iter().filter(|c| self.is_attribute(c.kind())));
            }
        }
        // Rust attributes and TypeScript member decorators precede the item
        let mut prev = node.prev_named_sibling();
        while let Some(sibling) = prev {
            if self.is_attribute(sibling.kind()) {
                holders.push(sibling);
            } else if !self.is_comment(sibling.kind()) {
                break;
            }
            prev = sibling.prev_named_sibling();
        }

        let mut names = Vec::new();
        for holder in holders {
            if holder.kind() == "attribute_list" {
                for attribute in named_children_of(holder).into_iter().filter(|a| a.kind() == "attribute") {
                    names.push(attribute_name(node_text(attribute, source)));
                }
            } else {
                names.push(attribute_name(node_text(holder, source)));
            }
        }
        names.retain(|n| !n.is_empty());
        names
    }

    /// Whether a function declaration is a test by its attributes or name
    pub fn is_test(&self, name: &str, attributes: &[String]) -> bool {
        match self.dialect {
            Dialect::CSharp => attributes
                .iter()
                .any(|a| matches!(a.trim_end_matches("Attribute"), "Test" | "Fact" | "TestMethod" | "Theory" | "TestCase")),
            Dialect::Java => attributes
                .iter()
                .any(|a| matches!(a.as_str(), "Test" | "ParameterizedTest" | "org.junit.Test" | "org.junit.jupiter.api.Test")),
            Dialect::Rust => attributes.iter().any(|a| a == "test" || a.ends_with("::test")),
            Dialect::Go => name
                .strip_prefix("Test")
                .is_some_and(|rest| rest.is_empty() || !rest.starts_with(|c: char| c.is_ascii_lowercase())),
            // JavaScript tests are `it(...)` / `test(...)` calls, handled by the walker
            Dialect::JavaScript | Dialect::TypeScript | Dialect::Tsx => false,
        }
    }

    /// Receiver type of a Go method declaration
    pub fn receiver_type(&self, node: Node, source: &str) -> Option<String> {
        if self.dialect != Dialect::Go {
            return None;
        }
        let receiver = node.child_by_field_name("receiver")?;
        let param = child_of_kind(receiver, "parameter_declaration")?;
        let t = node_text(param.child_by_field_name("type")?, source);
        // Generic receivers: `*List[T]`
        let t = t.split('[').next().unwrap_or(t);
        let name = normalize_type(t);
        (!name.is_empty()).then_some(name)
    }
}

/// `[HttpGet("x")]`, `@Test`, `#[tokio::test]` -> bare attribute name
fn attribute_name(text: &str) -> String {
    let text = text.trim();
    let text = text.strip_prefix("#!").or_else(|| text.strip_prefix('#')).unwrap_or(text);
    let text = text.trim_start_matches(['[', '@']).trim_end_matches(']');
    let text = text.split('(').next().unwrap_or(text);
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_name() {
        assert_eq!(attribute_name("[Fact]"), "Fact");
        assert_eq!(attribute_name("HttpGet(\"orders\")"), "HttpGet");
        assert_eq!(attribute_name("@Override"), "Override");
        assert_eq!(attribute_name("#[tokio::test]"), "tokio::test");
        assert_eq!(attribute_name("@Component({ selector: 'x' })"), "Component");
    }

    #[test]
    fn test_interface_convention() {
        assert!(looks_like_interface("IRepository"));
        assert!(looks_like_interface("Contracts.IOrderService"));
        assert!(!looks_like_interface("Invoice"));
        assert!(!looks_like_interface("I"));
    }

    #[test]
    fn test_go_test_names() {
        assert!(GO.is_test("TestParse", &[]));
        assert!(GO.is_test("Test", &[]));
        assert!(!GO.is_test("Testify", &[]));
        assert!(!GO.is_test("parse", &[]));
    }

    #[test]
    fn test_profiles_load_languages() {
        for profile in all_profiles() {
            let mut parser = tree_sitter::Parser::new();
            assert!(parser.set_language(&profile.tree_sitter_language()).is_ok(), "{}", profile.language);
        }
    }
}

//! Entity types - the node half of the ingestion graph
//!
//! Every extraction strategy maps what it finds into six entity kinds:
//! - `File`: the ingested file itself
//! - `Class`: class, struct, interface, trait, table, view
//! - `Method`: function, method, constructor, procedure, script function
//! - `Property`: field, property, settings key
//! - `Pattern`: section, style rule, config block, manifest, chunk
//! - `Test`: a test function or test case

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Line number used when a format gives no usable position.
pub const SENTINEL_LINE: u32 = 1;

/// Context label used when the caller does not supply one.
pub const DEFAULT_CONTEXT: &str = "default";

/// Universal entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    File,
    Class,
    Method,
    Property,
    Pattern,
    Test,
}

impl EntityKind {
    /// Get the string representation of the entity kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::File => "File",
            EntityKind::Class => "Class",
            EntityKind::Method => "Method",
            EntityKind::Property => "Property",
            EntityKind::Pattern => "Pattern",
            EntityKind::Test => "Test",
        }
    }

    /// Get all entity kinds
    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::File,
            EntityKind::Class,
            EntityKind::Method,
            EntityKind::Property,
            EntityKind::Pattern,
            EntityKind::Test,
        ]
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" | "module" | "namespace" => Ok(EntityKind::File),
            "class" | "struct" | "interface" | "trait" | "enum" | "record" | "type" => {
                Ok(EntityKind::Class)
            }
            "method" | "function" | "fn" | "def" | "constructor" | "procedure" => {
                Ok(EntityKind::Method)
            }
            "property" | "field" | "attribute" | "variable" | "constant" | "key" => {
                Ok(EntityKind::Property)
            }
            "pattern" | "section" | "rule" | "block" | "chunk" => Ok(EntityKind::Pattern),
            "test" | "testcase" | "test_method" => Ok(EntityKind::Test),
            _ => Err(Error::Parse(format!("Unknown entity kind: {}", s))),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A scalar or small-collection metadata value.
///
/// Metadata never holds nested maps or entity references, which keeps it
/// acyclic and trivially serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl MetaValue {
    /// Borrow the value as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer, if it is one
    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetaValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow the value as a list, if it is one
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            MetaValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Convert a JSON value into metadata.
    ///
    /// Objects and nulls have no metadata representation and yield `None`;
    /// arrays keep only their scalar members, rendered as strings.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match value {
            Value::Bool(b) => Some(MetaValue::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(MetaValue::Int)
                .or_else(|| n.as_f64().map(MetaValue::Float)),
            Value::String(s) => Some(MetaValue::Text(s.clone())),
            Value::Array(items) => Some(MetaValue::List(
                items.iter().filter_map(json_scalar_text).collect(),
            )),
            Value::Null | Value::Object(_) => None,
        }
    }
}

/// Render a scalar JSON value as plain text.
pub fn json_scalar_text(value: &serde_json::Value) -> Option<String> {
    use serde_json::Value;
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<usize> for MetaValue {
    fn from(value: usize) -> Self {
        MetaValue::Int(value as i64)
    }
}

impl From<u32> for MetaValue {
    fn from(value: u32) -> Self {
        MetaValue::Int(value as i64)
    }
}

impl From<Vec<String>> for MetaValue {
    fn from(value: Vec<String>) -> Self {
        MetaValue::List(value)
    }
}

/// Open key/value payload attached to entities and relationships.
///
/// Ordered so serialized output is deterministic.
pub type Metadata = BTreeMap<String, MetaValue>;

/// One unit of indexable code knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeEntity {
    /// What kind of entity this is
    pub kind: EntityKind,
    /// Human-readable identifier, unique only within (file, kind)
    pub name: String,
    /// Textual body, bounded by the content ceiling
    pub content: String,
    /// Path of the file the entity came from
    pub file_path: String,
    /// Caller-supplied logical grouping label
    pub context: String,
    /// 1-based line of the declaration; [`SENTINEL_LINE`] when unknown
    pub line_number: u32,
    /// Language, flags, counts and sub-type tags
    pub metadata: Metadata,
}

impl CodeEntity {
    /// Create a new entity with minimal required fields
    pub fn new(
        kind: EntityKind,
        name: impl Into<String>,
        file_path: impl Into<String>,
        context: impl Into<String>,
        line_number: u32,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            content: content.into(),
            file_path: file_path.into(),
            context: context.into(),
            line_number: line_number.max(SENTINEL_LINE),
            metadata: Metadata::new(),
        }
    }

    /// Attach one metadata entry
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach a metadata entry only when a value is present
    pub fn with_optional_meta(self, key: &str, value: Option<impl Into<MetaValue>>) -> Self {
        match value {
            Some(v) => self.with_meta(key, v),
            None => self,
        }
    }

    /// Look up a metadata entry
    pub fn meta(&self, key: &str) -> Option<&MetaValue> {
        self.metadata.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_roundtrip() {
        for kind in EntityKind::all() {
            let parsed: EntityKind = kind.as_str().parse().unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn test_entity_kind_aliases() {
        assert_eq!(EntityKind::from_str("struct").unwrap(), EntityKind::Class);
        assert_eq!(EntityKind::from_str("function").unwrap(), EntityKind::Method);
        assert_eq!(EntityKind::from_str("Section").unwrap(), EntityKind::Pattern);
        assert!(EntityKind::from_str("galaxy").is_err());
    }

    #[test]
    fn test_entity_line_never_below_sentinel() {
        let entity = CodeEntity::new(EntityKind::File, "a.css", "a.css", "default", 0, "");
        assert_eq!(entity.line_number, SENTINEL_LINE);
    }

    #[test]
    fn test_meta_from_json_drops_objects() {
        let value = serde_json::json!({"nested": {"a": 1}});
        assert!(MetaValue::from_json(&value).is_none());

        let list = serde_json::json!(["a", 1, {"x": 2}, true]);
        assert_eq!(
            MetaValue::from_json(&list),
            Some(MetaValue::List(vec!["a".into(), "1".into(), "true".into()]))
        );
    }

    #[test]
    fn test_entity_serializes_camel_case() {
        let entity = CodeEntity::new(EntityKind::Method, "run", "src/a.js", "web", 4, "run()")
            .with_meta("language", "javascript");
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["filePath"], "src/a.js");
        assert_eq!(json["lineNumber"], 4);
        assert_eq!(json["metadata"]["language"], "javascript");
    }
}

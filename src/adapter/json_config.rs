//! Generic JSON configuration strategy
//!
//! Nested objects become `Pattern` entities named by their dotted key path.
//! Scalars and scalar arrays are folded into the metadata of the object that
//! holds them. JSON carries no usable positions, so every entity sits on the
//! sentinel line.
//!
//! Comments and trailing commas (JSONC, as in `tsconfig.json` or VS Code
//! settings) are accepted: strict parsing is tried first, then a relaxed pass.

use super::framework::{LanguageAdapter, ParseRequest, ParseResult};
use crate::Result;
use crate::entity::{CodeEntity, EntityKind, MetaValue, SENTINEL_LINE};
use crate::relationship::RelationshipKind;
use serde_json::{Map, Value};

pub struct JsonConfigAdapter;

/// Fold the scalar members of `object` into `entity` without replacing keys
/// the strategy already set.
pub(crate) fn fold_scalars(mut entity: CodeEntity, object: &Map<String, Value>) -> CodeEntity {
    for (key, value) in object {
        if value.is_object() {
            continue;
        }
        if let Value::Array(items) = value {
            if items.iter().any(Value::is_object) {
                continue;
            }
        }
        if let Some(meta) = MetaValue::from_json(value) {
            entity.metadata.entry(key.clone()).or_insert(meta);
        }
    }
    entity
}

/// Parse JSON, retrying without comments and trailing commas.
///
/// The strict error is the one reported when both passes fail.
pub(crate) fn parse_relaxed(content: &str) -> serde_json::Result<Value> {
    serde_json::from_str(content).or_else(|strict| serde_json::from_str(&strip_jsonc(content)).map_err(|_| strict))
}

/// Remove `//` and `/* */` comments and trailing commas outside strings.
///
/// Newlines inside comments are kept so error positions still line up.
fn strip_jsonc(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => out.extend(chars.next()),
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match (c, chars.peek().copied()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                while chars.next_if(|&n| n != '\n').is_some() {}
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    if n == '\n' {
                        out.push('\n');
                    }
                    prev = n;
                }
            }
            ('}' | ']', _) => {
                let kept = out.trim_end().len();
                if out[..kept].ends_with(',') {
                    out.remove(kept - 1);
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn render(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

struct Walker<'a> {
    request: &'a ParseRequest,
    result: ParseResult,
}

impl Walker<'_> {
    /// Emit `value` (an object) as entity `name` at `depth`, then descend
    fn object(&mut self, name: &str, parent: &str, object: &Map<String, Value>, depth: usize) {
        let policy = &self.request.policy;
        if !policy.allows_depth(depth) {
            return;
        }
        let value = Value::Object(object.clone());
        let text = render(&value);
        if object.is_empty() || policy.is_trivial(&text) {
            return;
        }

        let entity = self
            .request
            .entity(EntityKind::Pattern, name, SENTINEL_LINE, &text)
            .with_meta("keyPath", name)
            .with_meta("keyCount", object.len())
            .with_meta("depth", depth);
        self.result.add_entity(fold_scalars(entity, object));
        self.result
            .add_relationship(self.request.relationship(parent, name, RelationshipKind::Defines));

        self.children(name, object, depth);
    }

    fn children(&mut self, name: &str, object: &Map<String, Value>, depth: usize) {
        for (key, value) in object {
            let path = if name.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", name, key)
            };
            match value {
                Value::Object(child) => self.object(&path, name, child, depth + 1),
                Value::Array(items) => self.array(&path, name, items, depth + 1),
                _ => {}
            }
        }
    }

    /// Object elements of an array become `path[i]` entities, up to the cap
    fn array(&mut self, path: &str, parent: &str, items: &[Value], depth: usize) {
        let objects = items.iter().enumerate().filter_map(|(i, v)| v.as_object().map(|o| (i, o)));
        for (count, (index, object)) in objects.enumerate() {
            if !self.request.policy.allows_item(count) {
                tracing::debug!(
                    "{}: {} holds more than {} objects, rest skipped",
                    self.request.path,
                    path,
                    self.request.policy.max_items
                );
                break;
            }
            self.object(&format!("{}[{}]", path, index), parent, object, depth);
        }
    }
}

impl LanguageAdapter for JsonConfigAdapter {
    fn language_name(&self) -> &str {
        "json"
    }

    fn file_extensions(&self) -> &[&str] {
        &["json", "jsonc"]
    }

    fn parse_code(&self, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        let root: Value = match parse_relaxed(content) {
            Ok(value) => value,
            Err(e) => return Ok(request.raw_fallback(content, "json", e)),
        };

        let file = request.file_name();
        let mut walker = Walker {
            request,
            result: ParseResult::new(),
        };

        match &root {
            Value::Object(object) => {
                let entity = request
                    .file_entity(content, "json")
                    .with_meta("keyCount", object.len());
                walker.result.add_entity(fold_scalars(entity, object));
                for (key, value) in object {
                    match value {
                        Value::Object(child) => walker.object(key, &file, child, 1),
                        Value::Array(items) => walker.array(key, &file, items, 1),
                        _ => {}
                    }
                }
            }
            Value::Array(items) => {
                walker
                    .result
                    .add_entity(request.file_entity(content, "json").with_meta("itemCount", items.len()));
                walker.array(&file, &file, items, 1);
            }
            _ => walker.result.add_entity(request.file_entity(content, "json")),
        }

        Ok(walker.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ChunkingPolicy;

    fn parse(json: &str) -> ParseResult {
        JsonConfigAdapter.parse_code(json, &ParseRequest::new("config/app.json")).unwrap()
    }

    #[test]
    fn test_commented_config_with_trailing_commas() {
        let json = "{\n  // compiler settings\n  \"compilerOptions\": {\n    \"target\": \"es2020\", /* modern */\n    \"outDir\": \"dist//out\",\n  },\n  \"include\": [\"src\",],\n}\n";
        let result = JsonConfigAdapter
            .parse_code(json, &ParseRequest::new("tsconfig.json"))
            .unwrap();

        assert!(result.succeeded(), "{:?}", result.errors);
        let options = result.entity("compilerOptions").unwrap();
        assert_eq!(options.meta("target").and_then(|v| v.as_text()), Some("es2020"));
        assert_eq!(options.meta("outDir").and_then(|v| v.as_text()), Some("dist//out"));
    }

    #[test]
    fn test_broken_json_reports_strict_error() {
        let result = parse("{ \"a\": // dangling\n");
        assert!(!result.errors.is_empty());
        assert_eq!(result.entities.len(), 1);
    }

    #[test]
    fn test_strip_jsonc_keeps_strings() {
        assert_eq!(strip_jsonc("{\"u\": \"http://x\", /* c */ \"q\": \"a\\\"//b\"}"), "{\"u\": \"http://x\",  \"q\": \"a\\\"//b\"}");
        assert_eq!(strip_jsonc("[1, 2 ,\n]"), "[1, 2 \n]");
    }

    #[test]
    fn test_nested_object_becomes_pattern() {
        let json = "{\n  \"name\": \"billing\",\n  \"retries\": 3,\n  \"database\": { \"host\": \"db\", \"port\": 5432, \"pool\": true }\n}\n";
        let result = parse(json);

        assert_eq!(result.entities.len(), 2);
        let file = &result.entities[0];
        assert_eq!(file.kind, EntityKind::File);
        assert_eq!(file.meta("name").and_then(|v| v.as_text()), Some("billing"));
        assert_eq!(file.meta("retries").and_then(|v| v.as_int()), Some(3));

        let db = result.entity("database").unwrap();
        assert_eq!(db.kind, EntityKind::Pattern);
        assert_eq!(db.line_number, SENTINEL_LINE);
        assert_eq!(db.meta("port").and_then(|v| v.as_int()), Some(5432));

        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.relationships[0].from_name, "app.json");
        assert_eq!(result.relationships[0].to_name, "database");
        assert_eq!(result.relationships[0].kind, RelationshipKind::Defines);
    }

    #[test]
    fn test_scalar_keys_do_not_replace_file_metadata() {
        let result = parse(r#"{"language": "klingon", "lineCount": 99}"#);
        let file = &result.entities[0];
        assert_eq!(file.meta("language").and_then(|v| v.as_text()), Some("json"));
        assert_eq!(file.meta("lineCount").and_then(|v| v.as_int()), Some(1));
    }

    #[test]
    fn test_depth_ceiling() {
        let mut json = String::from("1");
        for level in (0..10).rev() {
            json = format!("{{\"k{}\": {}, \"v\": \"value\"}}", level, json);
        }
        let result = parse(&json);
        let patterns: Vec<_> = result.entities_of(EntityKind::Pattern).collect();
        assert_eq!(patterns.len(), ChunkingPolicy::default().max_depth);
        assert!(result.entity("k0.k1.k2.k3").is_some());
        assert!(result.entity("k0.k1.k2.k3.k4").is_none());
    }

    #[test]
    fn test_array_cardinality_cap() {
        let items: Vec<String> = (0..1000).map(|i| format!("{{\"id\": {}}}", i)).collect();
        let json = format!("{{\"rows\": [{}]}}", items.join(","));
        let result = parse(&json);
        assert_eq!(result.entities_of(EntityKind::Pattern).count(), 100);
        assert!(result.entity("rows[0]").is_some());
        assert!(result.entity("rows[99]").is_some());
        assert!(result.entity("rows[100]").is_none());
    }

    #[test]
    fn test_root_array_elements() {
        let result = parse(r#"[{"id": 1, "tags": ["a", "b"]}, 7, {"id": 2}]"#);
        let first = result.entity("app.json[0]").unwrap();
        assert_eq!(
            first.meta("tags"),
            Some(&MetaValue::List(vec!["a".into(), "b".into()]))
        );
        assert!(result.entity("app.json[2]").is_some());
    }

    #[test]
    fn test_malformed_json_falls_back_to_raw() {
        let result = parse("{ \"a\": ");
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].meta("rawContent"), Some(&MetaValue::Bool(true)));
        assert_eq!(result.errors.len(), 1);
        assert!(result.is_partial());
    }
}

//! SQL strategy
//!
//! `CREATE` statements become entities: tables and views as `Class`,
//! procedures, functions and triggers as `Method`, indexes as `Pattern`.
//! Foreign keys give `DependsOn`, tables read or written by views and
//! routines give `Uses`, and `EXEC` gives `Calls`.

use super::framework::{LanguageAdapter, ParseRequest, ParseResult};
use super::heuristic::{LineCounter, MAX_BLOCK_SCAN, collapse_whitespace, delimited_block, mask_comments};
use crate::Result;
use crate::entity::EntityKind;
use crate::relationship::RelationshipKind;
use regex::Regex;
use std::sync::LazyLock;

static CREATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?im)^[ \t]*CREATE\s+(?:OR\s+(?:REPLACE|ALTER)\s+)?(?:DEFINER\s*=\s*\S+\s+)?(?:TEMP(?:ORARY)?\s+)?(?:UNIQUE\s+)?(?:(?:NON)?CLUSTERED\s+)?(TABLE|MATERIALIZED\s+VIEW|VIEW|PROCEDURE|PROC|FUNCTION|TRIGGER|INDEX)\s+(?:IF\s+NOT\s+EXISTS\s+)?((?:[\w$]+|\[[^\]]+\]|"[^"]+"|`[^`]+`)(?:\s*\.\s*(?:[\w$]+|\[[^\]]+\]|"[^"]+"|`[^`]+`))*)"#,
    )
    .expect("valid CREATE regex")
});

static GO_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*GO[ \t]*$").expect("valid GO regex"));

static TABLE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(FROM|JOIN|INTO|UPDATE)\s+((?:[\w$#]+|\[[^\]]+\]|"[^"]+"|`[^`]+`)(?:\.(?:[\w$]+|\[[^\]]+\]|"[^"]+"|`[^`]+`))*)"#)
        .expect("valid table reference regex")
});

static REFERENCES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bREFERENCES\s+((?:[\w$]+|\[[^\]]+\]|"[^"]+"|`[^`]+`)(?:\.(?:[\w$]+|\[[^\]]+\]|"[^"]+"|`[^`]+`))*)"#)
        .expect("valid REFERENCES regex")
});

static EXEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:EXEC(?:UTE)?|CALL|PERFORM)\s+((?:[\w$]+|\[[^\]]+\])(?:\.(?:[\w$]+|\[[^\]]+\]))*)"#)
        .expect("valid EXEC regex")
});

static ON_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bON\s+((?:[\w$]+|\[[^\]]+\]|"[^"]+"|`[^`]+`)(?:\.(?:[\w$]+|\[[^\]]+\]|"[^"]+"|`[^`]+`))*)"#)
        .expect("valid ON regex")
});

/// Words that can follow FROM/JOIN/INTO without naming a table
const NOT_TABLES: &[&str] = &[
    "select", "where", "values", "set", "lateral", "unnest", "dual", "inserted", "deleted", "new", "old",
    "as", "on", "of", "or",
];

/// Leading words of table-level constraints in a column list
const CONSTRAINT_WORDS: &[&str] = &[
    "constraint", "primary", "foreign", "unique", "check", "index", "key", "period", "exclude",
];

/// Strip `[x]`, `"x"` and `` `x` `` quoting from each part of a dotted name
pub fn unquote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| part.trim().trim_matches(['[', ']', '"', '`']))
        .collect::<Vec<_>>()
        .join(".")
}

/// Replace `-- ...` comments with spaces, keeping offsets
fn mask_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let bytes = line.as_bytes();
        let mut cut = None;
        for at in 0..bytes.len() {
            match bytes[at] {
                b'\'' => in_string = !in_string,
                b'-' if !in_string && bytes.get(at + 1) == Some(&b'-') => {
                    cut = Some(at);
                    break;
                }
                _ => {}
            }
        }
        match cut {
            Some(at) => {
                out.push_str(&line[..at]);
                out.extend(std::iter::repeat_n(' ', line.len() - at));
            }
            None => out.push_str(line),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectType {
    Table,
    View,
    Procedure,
    Function,
    Trigger,
    Index,
}

impl ObjectType {
    fn from_keyword(keyword: &str) -> Self {
        let upper = keyword.to_ascii_uppercase();
        match upper.split_whitespace().last().unwrap_or("") {
            "TABLE" => ObjectType::Table,
            "VIEW" => ObjectType::View,
            "PROCEDURE" | "PROC" => ObjectType::Procedure,
            "FUNCTION" => ObjectType::Function,
            "TRIGGER" => ObjectType::Trigger,
            _ => ObjectType::Index,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Table => "table",
            ObjectType::View => "view",
            ObjectType::Procedure => "procedure",
            ObjectType::Function => "function",
            ObjectType::Trigger => "trigger",
            ObjectType::Index => "index",
        }
    }

    fn entity_kind(&self) -> EntityKind {
        match self {
            ObjectType::Table | ObjectType::View => EntityKind::Class,
            ObjectType::Procedure | ObjectType::Function | ObjectType::Trigger => EntityKind::Method,
            ObjectType::Index => EntityKind::Pattern,
        }
    }

    /// Routines may contain `;` inside their body
    fn is_routine(&self) -> bool {
        matches!(self, ObjectType::Procedure | ObjectType::Function | ObjectType::Trigger)
    }
}

/// Offset of the first `;` outside parentheses and quotes
fn statement_end(text: &str, from: usize, limit: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    for (at, &b) in bytes.iter().enumerate().take(limit).skip(from) {
        match b {
            b'\'' => in_string = !in_string,
            b'(' if !in_string => depth += 1,
            b')' if !in_string => depth -= 1,
            b';' if !in_string && depth <= 0 => return Some(at + 1),
            _ => {}
        }
    }
    None
}

/// Column names from the parenthesised list of a CREATE TABLE
fn columns(statement: &str) -> Vec<String> {
    let Some(open) = statement.find('(') else {
        return Vec::new();
    };
    let Some(block) = delimited_block(statement, open, b'(', b')', MAX_BLOCK_SCAN) else {
        return Vec::new();
    };
    let inner = block.inner(statement);

    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (at, c) in inner.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                items.push(&inner[start..at]);
                start = at + 1;
            }
            _ => {}
        }
    }
    items.push(&inner[start..]);

    items
        .into_iter()
        .filter_map(|item| {
            let first = item.split_whitespace().next()?;
            if CONSTRAINT_WORDS.contains(&first.to_ascii_lowercase().as_str()) {
                return None;
            }
            Some(unquote_identifier(first))
        })
        .filter(|name| !name.is_empty())
        .collect()
}

pub struct SqlAdapter;

impl LanguageAdapter for SqlAdapter {
    fn language_name(&self) -> &str {
        "sql"
    }

    fn file_extensions(&self) -> &[&str] {
        &["sql", "ddl", "psql", "pgsql"]
    }

    fn parse_code(&self, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        let policy = &request.policy;
        let file = request.file_name();
        let masked = mask_line_comments(&mask_comments(content, "/*", "*/"));
        let mut lines = LineCounter::new(&masked);

        let mut result = ParseResult::new();
        result.add_entity(request.file_entity(content, "sql"));

        let creates: Vec<(usize, ObjectType, String)> = CREATE
            .captures_iter(&masked)
            .filter_map(|caps| {
                let start = caps.get(0)?.start();
                Some((start, ObjectType::from_keyword(&caps[1]), unquote_identifier(&caps[2])))
            })
            .collect();
        let separators: Vec<usize> = GO_SEPARATOR.find_iter(&masked).map(|m| m.start()).collect();

        for (index, (start, object, name)) in creates.iter().enumerate() {
            if !policy.allows_item(index) {
                tracing::debug!("{}: more than {} statements, rest skipped", request.path, policy.max_items);
                break;
            }
            let next = creates.get(index + 1).map(|c| c.0).unwrap_or(masked.len());
            let batch_end = separators.iter().copied().find(|s| *s > *start).unwrap_or(masked.len());
            let limit = next.min(batch_end).min(start.saturating_add(MAX_BLOCK_SCAN));
            let mut end = if object.is_routine() {
                limit
            } else {
                statement_end(&masked, *start, limit).unwrap_or(limit)
            };
            while end > *start && !masked.is_char_boundary(end) {
                end -= 1;
            }

            let statement = &masked[*start..end];
            let text = content.get(*start..end).unwrap_or(statement).trim();
            let line = lines.line_at(*start);
            let header = collapse_whitespace(statement.lines().next().unwrap_or(""));

            let mut entity = request
                .entity(object.entity_kind(), name.as_str(), line, text)
                .with_meta("objectType", object.as_str())
                .with_meta("signature", header)
                .with_meta("endLine", line + text.matches('\n').count() as u32);

            let edge = |to: String, kind: RelationshipKind, at: usize| {
                if to.is_empty() || to.eq_ignore_ascii_case(name) {
                    return None;
                }
                let at_line = line + statement[..at].matches('\n').count() as u32;
                Some(request.relationship(name.as_str(), to, kind).at_line(at_line))
            };
            let mut edges = Vec::new();

            match object {
                ObjectType::Table => {
                    let cols = columns(statement);
                    entity = entity
                        .with_meta("columnCount", cols.len())
                        .with_meta("columns", policy.cap(cols));
                    for caps in REFERENCES.captures_iter(statement) {
                        let Some(m) = caps.get(1) else { continue };
                        edges.extend(edge(unquote_identifier(m.as_str()), RelationshipKind::DependsOn, m.start()));
                    }
                }
                ObjectType::Index | ObjectType::Trigger => {
                    if let Some(m) = ON_TABLE.captures(statement).and_then(|c| c.get(1)) {
                        let table = unquote_identifier(m.as_str());
                        entity = entity.with_meta("table", table.as_str());
                        edges.extend(edge(table, RelationshipKind::DependsOn, m.start()));
                    }
                }
                _ => {}
            }

            if *object == ObjectType::View || object.is_routine() {
                for caps in TABLE_REF.captures_iter(statement) {
                    let Some(m) = caps.get(2) else { continue };
                    let table = unquote_identifier(m.as_str());
                    if NOT_TABLES.contains(&table.to_ascii_lowercase().as_str()) || table.starts_with('@') {
                        continue;
                    }
                    edges.extend(edge(table, RelationshipKind::Uses, m.start()));
                }
                for caps in EXEC.captures_iter(statement) {
                    let Some(m) = caps.get(1) else { continue };
                    edges.extend(edge(unquote_identifier(m.as_str()), RelationshipKind::Calls, m.start()));
                }
            }

            result.add_entity(entity);
            result.add_relationship(request.relationship(&file, name.as_str(), RelationshipKind::Defines).at_line(line));
            for edge in edges {
                result.add_relationship(edge);
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> ParseResult {
        SqlAdapter.parse_code(sql, &ParseRequest::new("schema.sql")).unwrap()
    }

    fn edges(result: &ParseResult, kind: RelationshipKind) -> Vec<(&str, &str)> {
        result
            .relationships_of(kind)
            .map(|r| (r.from_name.as_str(), r.to_name.as_str()))
            .collect()
    }

    #[test]
    fn test_tables_and_foreign_keys() {
        let sql = "-- customers\nCREATE TABLE customers (\n  id INT PRIMARY KEY,\n  name VARCHAR(100) NOT NULL\n);\n\nCREATE TABLE IF NOT EXISTS [dbo].[orders] (\n  id INT,\n  customer_id INT REFERENCES customers(id),\n  total DECIMAL(10, 2),\n  CONSTRAINT pk_orders PRIMARY KEY (id)\n);\n";
        let result = parse(sql);

        let tables: Vec<_> = result.entities_of(EntityKind::Class).collect();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "customers");
        assert_eq!(tables[0].line_number, 2);
        assert_eq!(tables[1].name, "dbo.orders");
        assert_eq!(tables[1].line_number, 7);
        assert_eq!(
            tables[1].meta("columns").and_then(|v| v.as_list()),
            Some(&["id".to_string(), "customer_id".to_string(), "total".to_string()][..])
        );
        assert_eq!(edges(&result, RelationshipKind::DependsOn), vec![("dbo.orders", "customers")]);
        let fk = result.relationships_of(RelationshipKind::DependsOn).next().unwrap();
        assert_eq!(fk.properties.get("line").and_then(|v| v.as_int()), Some(9));
    }

    #[test]
    fn test_view_and_procedure_references() {
        let sql = "CREATE VIEW active_orders AS\nSELECT o.id FROM orders o\nJOIN customers c ON c.id = o.customer_id;\n\nCREATE PROCEDURE archive_orders @before DATE\nAS\nBEGIN\n  INSERT INTO orders_archive SELECT * FROM orders WHERE created < @before;\n  DELETE FROM orders WHERE created < @before;\n  EXEC dbo.log_event 'archived';\nEND\nGO\n";
        let result = parse(sql);

        let view = result.entity("active_orders").unwrap();
        assert_eq!(view.kind, EntityKind::Class);
        let proc = result.entity("archive_orders").unwrap();
        assert_eq!(proc.kind, EntityKind::Method);
        assert_eq!(proc.line_number, 5);
        assert!(proc.content.ends_with("END"));

        let uses = edges(&result, RelationshipKind::Uses);
        assert!(uses.contains(&("active_orders", "orders")));
        assert!(uses.contains(&("active_orders", "customers")));
        assert!(uses.contains(&("archive_orders", "orders_archive")));
        assert!(uses.contains(&("archive_orders", "orders")));
        assert_eq!(edges(&result, RelationshipKind::Calls), vec![("archive_orders", "dbo.log_event")]);
    }

    #[test]
    fn test_index_and_trigger() {
        let sql = "CREATE UNIQUE INDEX ix_email ON users (email);\nCREATE TRIGGER trg_audit ON users AFTER UPDATE AS\nBEGIN\n  INSERT INTO audit_log SELECT * FROM inserted;\nEND;\n";
        let result = parse(sql);

        let index = result.entity("ix_email").unwrap();
        assert_eq!(index.kind, EntityKind::Pattern);
        assert_eq!(index.meta("table").and_then(|v| v.as_text()), Some("users"));

        let deps = edges(&result, RelationshipKind::DependsOn);
        assert_eq!(deps, vec![("ix_email", "users"), ("trg_audit", "users")]);
        let uses = edges(&result, RelationshipKind::Uses);
        assert_eq!(uses, vec![("trg_audit", "audit_log")]);
    }

    #[test]
    fn test_commented_statements_are_ignored() {
        let sql = "/* CREATE TABLE ghost (id INT); */\n-- CREATE TABLE phantom (id INT);\nSELECT 1;\n";
        let result = parse(sql);
        assert_eq!(result.entities.len(), 1);
    }
}

//! Environment-settings strategy
//!
//! Handles `.env` files, .NET `appsettings*.json`, INI-style files and
//! generic TOML. Every value whose key looks like a credential is replaced by
//! [`MASK`] in entity content and metadata, including the file entity.

use super::framework::{LanguageAdapter, ParseRequest, ParseResult};
use super::json_config::parse_relaxed;
use crate::Result;
use crate::entity::{CodeEntity, EntityKind, MetaValue, SENTINEL_LINE};
use crate::relationship::RelationshipKind;
use serde_json::Value;

/// Replacement for secret values
pub const MASK: &str = "****";

/// Key fragments that mark a value as secret (compared lower-cased)
const SECRET_MARKERS: &[&str] = &["password", "passwd", "pwd", "secret", "token", "key", "connectionstring"];

/// Check whether any segment of a key path names a credential
pub fn is_secret_key(key: &str) -> bool {
    let lower: String = key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == ':')
        .collect::<String>()
        .to_ascii_lowercase();
    SECRET_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn masked<'v>(key: &str, value: &'v str) -> &'v str {
    if is_secret_key(key) && !value.is_empty() { MASK } else { value }
}

/// Which settings dialect a file name selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFlavor {
    Env,
    AppSettings,
    Ini,
    Toml,
}

impl SettingsFlavor {
    /// Detect the dialect from a file name
    pub fn detect(file_name: &str) -> Option<Self> {
        let lower = file_name.to_ascii_lowercase();
        if lower == ".env" || lower.starts_with(".env.") || lower.ends_with(".env") {
            return Some(SettingsFlavor::Env);
        }
        if lower.starts_with("appsettings") && lower.ends_with(".json") {
            return Some(SettingsFlavor::AppSettings);
        }
        let ext = lower.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
        match ext {
            "ini" | "cfg" | "conf" | "properties" => Some(SettingsFlavor::Ini),
            "toml" => Some(SettingsFlavor::Toml),
            _ => None,
        }
    }

    fn language(&self) -> &'static str {
        match self {
            SettingsFlavor::Env => "dotenv",
            SettingsFlavor::AppSettings => "appsettings",
            SettingsFlavor::Ini => "ini",
            SettingsFlavor::Toml => "toml",
        }
    }
}

pub struct SettingsAdapter;

impl SettingsAdapter {
    /// Split `key=value` / `key: value`, masking secret values
    fn split_pair<'l>(line: &'l str, separators: &[char]) -> Option<(&'l str, &'l str)> {
        let at = line.find(separators)?;
        let key = line[..at].trim();
        if key.is_empty() || (key.contains(char::is_whitespace) && !key.starts_with('"')) {
            return None;
        }
        Some((key, line[at + 1..].trim()))
    }

    /// The file text with secret values replaced, line by line
    fn mask_lines(content: &str, separators: &[char], comments: &[char]) -> String {
        content
            .lines()
            .map(|line| {
                let body = line.trim_start();
                if body.starts_with(comments) {
                    return line.to_string();
                }
                match Self::split_pair(body.trim_start_matches("export "), separators) {
                    Some((key, value)) if is_secret_key(key) && !value.is_empty() => {
                        let at = line.find(separators).unwrap_or(line.len());
                        format!("{}{} {}", &line[..at], &line[at..at + 1], MASK)
                    }
                    _ => line.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn property(request: &ParseRequest, name: &str, line: u32, key: &str, value: &str) -> CodeEntity {
        let shown = masked(name, value);
        request
            .entity(EntityKind::Property, name, line, &format!("{}={}", key, shown))
            .with_meta("value", shown)
            .with_meta("secret", is_secret_key(name))
    }

    fn parse_env(content: &str, request: &ParseRequest) -> ParseResult {
        let file = request.file_name();
        let safe = Self::mask_lines(content, &['='], &['#']);
        let mut result = ParseResult::new();
        result.add_entity(request.file_entity(&safe, SettingsFlavor::Env.language()));

        let mut count = 0usize;
        for (i, line) in content.lines().enumerate() {
            let body = line.trim();
            if body.is_empty() || body.starts_with('#') {
                continue;
            }
            let body = body.strip_prefix("export ").unwrap_or(body);
            let Some((key, value)) = Self::split_pair(body, &['=']) else {
                continue;
            };
            if !request.policy.allows_item(count) {
                break;
            }
            count += 1;

            let value = super::yaml::unquote(super::yaml::strip_comment(value));
            let line = i as u32 + 1;
            result.add_entity(Self::property(request, key, line, key, value));
            result.add_relationship(request.relationship(&file, key, RelationshipKind::Defines).at_line(line));
        }
        result
    }

    fn parse_ini(content: &str, request: &ParseRequest) -> ParseResult {
        let policy = &request.policy;
        let file = request.file_name();
        let safe = Self::mask_lines(content, &['=', ':'], &['#', ';', '!']);
        let safe_lines: Vec<&str> = safe.lines().collect();
        let mut result = ParseResult::new();
        result.add_entity(request.file_entity(&safe, SettingsFlavor::Ini.language()));

        let lines: Vec<&str> = content.lines().collect();
        let headers: Vec<(usize, String)> = lines
            .iter()
            .enumerate()
            .filter_map(|(i, line)| {
                let body = line.trim();
                let name = body.strip_prefix('[')?.strip_suffix(']')?.trim();
                (!name.is_empty()).then(|| (i, name.to_string()))
            })
            .collect();

        for (n, (start, name)) in headers.iter().enumerate() {
            if !policy.allows_item(n) {
                break;
            }
            let end = headers.get(n + 1).map(|(i, _)| *i).unwrap_or(lines.len());
            let text = safe_lines.get(*start..end).map(|s| s.join("\n")).unwrap_or_default();
            let line = *start as u32 + 1;
            result.add_entity(
                request
                    .entity(EntityKind::Pattern, name, line, text.trim_end())
                    .with_meta("section", name.as_str()),
            );
            result.add_relationship(request.relationship(&file, name, RelationshipKind::Defines).at_line(line));
        }

        let mut section: Option<&str> = None;
        let mut section_index = 0usize;
        let mut keys = 0usize;
        for (i, line) in lines.iter().enumerate() {
            let body = line.trim();
            if body.is_empty() || body.starts_with(['#', ';', '!']) {
                continue;
            }
            if let Some((n, (_, name))) = headers.iter().enumerate().find(|(_, (at, _))| *at == i) {
                section = Some(name.as_str());
                section_index = n;
                keys = 0;
                continue;
            }
            if section.is_some() && !policy.allows_item(section_index) {
                continue;
            }
            let Some((key, value)) = Self::split_pair(body, &['=', ':']) else {
                continue;
            };
            if !policy.allows_item(keys) {
                continue;
            }
            keys += 1;

            let name = match section {
                Some(s) => format!("{}.{}", s, key),
                None => key.to_string(),
            };
            let line = i as u32 + 1;
            let value = super::yaml::unquote(value);
            result.add_entity(Self::property(request, &name, line, key, value));
            result.add_relationship(
                request
                    .relationship(section.unwrap_or(&file), &name, RelationshipKind::Defines)
                    .at_line(line),
            );
        }
        result
    }

    fn parse_appsettings(content: &str, request: &ParseRequest) -> ParseResult {
        let mut root: Value = match parse_relaxed(content) {
            Ok(value) => value,
            Err(e) => return request.raw_fallback(content, SettingsFlavor::AppSettings.language(), e),
        };
        mask_json(&mut root, "");
        let safe = serde_json::to_string_pretty(&root).unwrap_or_default();

        let mut result = ParseResult::new();
        result.add_entity(request.file_entity(&safe, SettingsFlavor::AppSettings.language()));
        let file = request.file_name();
        if let Value::Object(object) = &root {
            for (key, value) in object {
                app_setting(request, &mut result, &file, key, value, 1);
            }
        }
        result
    }

    fn parse_toml(content: &str, request: &ParseRequest) -> ParseResult {
        let table: toml::Table = match content.parse() {
            Ok(table) => table,
            Err(e) => return request.raw_fallback(content, SettingsFlavor::Toml.language(), e),
        };
        let safe = Self::mask_lines(content, &['='], &['#']);
        let lines: Vec<&str> = content.lines().collect();

        let file = request.file_name();
        let mut result = ParseResult::new();
        let mut file_entity = request.file_entity(&safe, SettingsFlavor::Toml.language());
        fold_toml_scalars(&mut file_entity, "", &table);
        result.add_entity(file_entity);

        let mut walker = TomlWalker {
            request,
            lines: &lines,
            result,
        };
        for (key, value) in &table {
            walker.value(&file, key, value, 1);
        }
        walker.result
    }
}

/// Replace secret values in a JSON tree in place
fn mask_json(value: &mut Value, path: &str) {
    match value {
        Value::Object(object) => {
            for (key, child) in object.iter_mut() {
                let child_path = format!("{}:{}", path, key);
                mask_json(child, &child_path);
            }
        }
        Value::Array(items) => {
            for item in items {
                mask_json(item, path);
            }
        }
        Value::Null => {}
        _ => {
            if is_secret_key(path) {
                *value = Value::String(MASK.to_string());
            }
        }
    }
}

/// One appsettings node: objects are sections, everything else a property
fn app_setting(request: &ParseRequest, result: &mut ParseResult, parent: &str, path: &str, value: &Value, depth: usize) {
    let policy = &request.policy;
    if !policy.allows_depth(depth) {
        return;
    }
    match value {
        Value::Object(object) => {
            let text = serde_json::to_string_pretty(value).unwrap_or_default();
            result.add_entity(
                request
                    .entity(EntityKind::Pattern, path, SENTINEL_LINE, &text)
                    .with_meta("section", path)
                    .with_meta("keyCount", object.len()),
            );
            result.add_relationship(request.relationship(parent, path, RelationshipKind::Defines));
            for (key, child) in object {
                app_setting(request, result, path, &format!("{}:{}", path, key), child, depth + 1);
            }
        }
        Value::Array(items) if items.iter().any(Value::is_object) => {
            for (i, item) in items.iter().enumerate() {
                if !policy.allows_item(i) {
                    break;
                }
                app_setting(request, result, parent, &format!("{}:{}", path, i), item, depth);
            }
        }
        _ => {
            let Some(meta) = MetaValue::from_json(value) else { return };
            let text = match &meta {
                MetaValue::List(items) => items.join(", "),
                _ => crate::entity::json_scalar_text(value).unwrap_or_default(),
            };
            let key = path.rsplit(':').next().unwrap_or(path);
            result.add_entity(
                request
                    .entity(EntityKind::Property, path, SENTINEL_LINE, &format!("{}={}", key, text))
                    .with_meta("value", meta)
                    .with_meta("secret", is_secret_key(path)),
            );
            result.add_relationship(request.relationship(parent, path, RelationshipKind::Defines));
        }
    }
}

fn toml_meta(key_path: &str, value: &toml::Value) -> Option<MetaValue> {
    let meta = match value {
        toml::Value::String(s) => MetaValue::Text(s.clone()),
        toml::Value::Integer(n) => MetaValue::Int(*n),
        toml::Value::Float(f) => MetaValue::Float(*f),
        toml::Value::Boolean(b) => MetaValue::Bool(*b),
        toml::Value::Datetime(d) => MetaValue::Text(d.to_string()),
        toml::Value::Array(items) => MetaValue::List(
            items
                .iter()
                .filter_map(|item| match item {
                    toml::Value::String(s) => Some(s.clone()),
                    toml::Value::Table(_) | toml::Value::Array(_) => None,
                    other => Some(other.to_string()),
                })
                .collect(),
        ),
        toml::Value::Table(_) => return None,
    };
    if is_secret_key(key_path) {
        return Some(MetaValue::Text(MASK.to_string()));
    }
    Some(meta)
}

fn fold_toml_scalars(entity: &mut CodeEntity, path: &str, table: &toml::Table) {
    for (key, value) in table {
        if let toml::Value::Array(items) = value {
            if items.iter().any(toml::Value::is_table) {
                continue;
            }
        }
        let key_path = if path.is_empty() { key.clone() } else { format!("{}.{}", path, key) };
        if let Some(meta) = toml_meta(&key_path, value) {
            entity.metadata.entry(key.clone()).or_insert(meta);
        }
    }
}

struct TomlWalker<'a> {
    request: &'a ParseRequest,
    lines: &'a [&'a str],
    result: ParseResult,
}

impl TomlWalker<'_> {
    /// Line of the `[path]` or `[[path]]` header, if the table has one
    fn header_line(&self, path: &str, occurrence: usize) -> u32 {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| {
                let body = line.trim();
                let inner = body
                    .strip_prefix("[[")
                    .and_then(|b| b.strip_suffix("]]"))
                    .or_else(|| body.strip_prefix('[').and_then(|b| b.strip_suffix(']')));
                inner.is_some_and(|name| name.trim() == path)
            })
            .nth(occurrence)
            .map(|(i, _)| i as u32 + 1)
            .unwrap_or(SENTINEL_LINE)
    }

    fn value(&mut self, parent: &str, path: &str, value: &toml::Value, depth: usize) {
        match value {
            toml::Value::Table(table) => self.table(parent, path, path, table, depth, 0),
            toml::Value::Array(items) if items.iter().any(toml::Value::is_table) => {
                let tables = items.iter().filter_map(toml::Value::as_table);
                for (i, table) in tables.enumerate() {
                    if !self.request.policy.allows_item(i) {
                        break;
                    }
                    self.table(parent, &format!("{}[{}]", path, i), path, table, depth, i);
                }
            }
            _ => {}
        }
    }

    fn table(&mut self, parent: &str, name: &str, header: &str, table: &toml::Table, depth: usize, occurrence: usize) {
        let request = self.request;
        if !request.policy.allows_depth(depth) {
            return;
        }
        let body = SettingsAdapter::mask_lines(&toml::to_string(table).unwrap_or_default(), &['='], &['#']);
        let line = self.header_line(header, occurrence);
        let mut entity = request
            .entity(EntityKind::Pattern, name, line, &format!("[{}]\n{}", header, body.trim_end()))
            .with_meta("table", header)
            .with_meta("keyCount", table.len());
        fold_toml_scalars(&mut entity, name, table);
        self.result.add_entity(entity);
        self.result
            .add_relationship(request.relationship(parent, name, RelationshipKind::Defines).at_line(line));

        for (key, value) in table {
            self.value(name, &format!("{}.{}", header, key), value, depth + 1);
        }
    }
}

impl LanguageAdapter for SettingsAdapter {
    fn language_name(&self) -> &str {
        "settings"
    }

    fn file_extensions(&self) -> &[&str] {
        &["env", "ini", "cfg", "conf", "properties", "toml"]
    }

    fn parse_code(&self, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        let flavor = SettingsFlavor::detect(&request.file_name()).unwrap_or(SettingsFlavor::Ini);
        Ok(match flavor {
            SettingsFlavor::Env => Self::parse_env(content, request),
            SettingsFlavor::AppSettings => Self::parse_appsettings(content, request),
            SettingsFlavor::Ini => Self::parse_ini(content, request),
            SettingsFlavor::Toml => Self::parse_toml(content, request),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(path: &str, text: &str) -> ParseResult {
        SettingsAdapter.parse_code(text, &ParseRequest::new(path)).unwrap()
    }

    #[test]
    fn test_detect_flavor() {
        assert_eq!(SettingsFlavor::detect(".env"), Some(SettingsFlavor::Env));
        assert_eq!(SettingsFlavor::detect(".env.production"), Some(SettingsFlavor::Env));
        assert_eq!(SettingsFlavor::detect("AppSettings.Development.json"), Some(SettingsFlavor::AppSettings));
        assert_eq!(SettingsFlavor::detect("setup.cfg"), Some(SettingsFlavor::Ini));
        assert_eq!(SettingsFlavor::detect("rustfmt.toml"), Some(SettingsFlavor::Toml));
        assert_eq!(SettingsFlavor::detect("data.json"), None);
    }

    #[test]
    fn test_secret_keys() {
        assert!(is_secret_key("DB_PASSWORD"));
        assert!(is_secret_key("ConnectionStrings:Default"));
        assert!(is_secret_key("api_key"));
        assert!(!is_secret_key("PORT"));
    }

    #[test]
    fn test_env_keys_masked() {
        let env = "# local\nPORT=8080\nexport API_TOKEN=\"abc123\"\nDEBUG=true # verbose\n";
        let result = parse(".env", env);

        let props: Vec<_> = result.entities_of(EntityKind::Property).collect();
        assert_eq!(props.len(), 3);
        assert_eq!(props[0].name, "PORT");
        assert_eq!(props[0].line_number, 2);

        let token = result.entity("API_TOKEN").unwrap();
        assert_eq!(token.meta("value").and_then(|v| v.as_text()), Some(MASK));
        assert!(!token.content.contains("abc123"));
        assert!(!result.entities[0].content.contains("abc123"));
        assert_eq!(result.entity("DEBUG").unwrap().meta("value").and_then(|v| v.as_text()), Some("true"));
    }

    #[test]
    fn test_appsettings_sections_and_properties() {
        let json = r#"{
  "Logging": { "LogLevel": { "Default": "Information" } },
  "ConnectionStrings": { "Main": "Server=db;Password=hunter2" },
  "AllowedHosts": "*"
}"#;
        let result = parse("appsettings.json", json);

        assert!(result.entity("Logging").is_some());
        assert!(result.entity("Logging:LogLevel").is_some());
        let level = result.entity("Logging:LogLevel:Default").unwrap();
        assert_eq!(level.kind, EntityKind::Property);
        assert_eq!(level.content, "Default=Information");

        let conn = result.entity("ConnectionStrings:Main").unwrap();
        assert_eq!(conn.meta("value").and_then(|v| v.as_text()), Some(MASK));
        assert!(result.entities.iter().all(|e| !e.content.contains("hunter2")));

        assert!(result.relationships.iter().any(|r| {
            r.kind == RelationshipKind::Defines && r.from_name == "Logging" && r.to_name == "Logging:LogLevel"
        }));
    }

    #[test]
    fn test_ini_sections_and_keys() {
        let ini = "; global\nroot = yes\n\n[server]\nhost = example.org\nport: 80\n\n[auth]\nsecret = s3cr3t\n";
        let result = parse("app.ini", ini);

        let server = result.entity("server").unwrap();
        assert_eq!(server.kind, EntityKind::Pattern);
        assert_eq!(server.line_number, 4);
        assert_eq!(result.entity("server.port").unwrap().line_number, 6);
        assert!(result.entity("root").is_some());

        let secret = result.entity("auth.secret").unwrap();
        assert_eq!(secret.meta("value").and_then(|v| v.as_text()), Some(MASK));
        assert!(!result.entity("auth").unwrap().content.contains("s3cr3t"));
    }

    #[test]
    fn test_toml_tables_with_lines() {
        let toml = "title = \"demo\"\n\n[database]\nurl = \"postgres://x\"\npassword = \"pw\"\n\n[database.pool]\nsize = 5\n\n[[hooks]]\nname = \"a\"\n\n[[hooks]]\nname = \"b\"\n";
        let result = parse("service.toml", toml);

        assert_eq!(result.entities[0].meta("title").and_then(|v| v.as_text()), Some("demo"));

        let db = result.entity("database").unwrap();
        assert_eq!(db.line_number, 3);
        assert_eq!(db.meta("password").and_then(|v| v.as_text()), Some(MASK));
        assert!(!db.content.contains("\"pw\""));

        assert_eq!(result.entity("database.pool").unwrap().line_number, 7);
        assert_eq!(result.entity("hooks[0]").unwrap().line_number, 10);
        assert_eq!(result.entity("hooks[1]").unwrap().line_number, 13);
    }

    #[test]
    fn test_malformed_toml_falls_back() {
        let result = parse("bad.toml", "[unclosed\nkey = ");
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.errors.len(), 1);
    }
}

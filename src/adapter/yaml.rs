//! YAML strategy
//!
//! YAML is read line by line with an indentation stack instead of a full
//! parser, so positions stay exact and broken documents still yield their
//! well-formed blocks. Every `key:` that opens a block becomes a `Pattern`
//! entity named by its dotted path; mapping items of a list become `path[i]`.
//! Docker Compose files additionally get `DependsOn` edges from each service
//! to its image and to the services it depends on.

use super::framework::{LanguageAdapter, ParseRequest, ParseResult};
use super::heuristic::indent_of;
use crate::Result;
use crate::entity::{EntityKind, MetaValue, Metadata};
use crate::relationship::{Relationship, RelationshipKind};
use regex::Regex;
use std::sync::LazyLock;

static KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^("[^"]*"|'[^']*'|[^\s#'"\-\[{][^:#]*?|-[^\s:#][^:#]*?)\s*:(?:\s+(.*?))?\s*$"#)
        .expect("valid YAML key regex")
});

pub struct YamlAdapter;

/// Remove surrounding quotes
pub(crate) fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Drop a trailing ` # comment` that is not inside quotes
pub(crate) fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut prev = ' ';
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' && prev.is_whitespace() => return line[..i].trim_end(),
            None => {}
        }
        prev = c;
    }
    line
}

/// Items of a `[a, b, c]` flow sequence
fn flow_list(value: &str) -> Option<Vec<String>> {
    let inner = value.strip_prefix('[')?.strip_suffix(']')?;
    Some(
        inner
            .split(',')
            .map(|item| unquote(item).to_string())
            .filter(|item| !item.is_empty())
            .collect(),
    )
}

/// Type a scalar the way YAML would, minus the exotic forms
fn scalar(value: &str) -> MetaValue {
    if let Some(items) = flow_list(value) {
        return MetaValue::List(items);
    }
    let quoted = value.starts_with(['"', '\'']);
    let text = unquote(value);
    if !quoted {
        match text {
            "true" | "True" | "yes" => return MetaValue::Bool(true),
            "false" | "False" | "no" => return MetaValue::Bool(false),
            _ => {}
        }
        if let Ok(n) = text.parse::<i64>() {
            return MetaValue::Int(n);
        }
        if let Ok(f) = text.parse::<f64>() {
            if f.is_finite() {
                return MetaValue::Float(f);
            }
        }
    }
    MetaValue::Text(text.to_string())
}

/// A block that may become an entity once its extent is known
struct Section {
    name: String,
    parent: String,
    start: usize,
    last: usize,
    depth: usize,
    children: usize,
    metadata: Metadata,
}

struct Frame {
    indent: usize,
    key: String,
    path: String,
    depth: usize,
    slot: Option<usize>,
    emits: bool,
    is_item: bool,
    items: usize,
    scalars: Vec<String>,
}

impl Frame {
    fn root() -> Self {
        Self {
            indent: 0,
            key: String::new(),
            path: String::new(),
            depth: 0,
            slot: None,
            emits: true,
            is_item: false,
            items: 0,
            scalars: Vec::new(),
        }
    }
}

struct Outline<'a> {
    request: &'a ParseRequest,
    file: String,
    compose: bool,
    sections: Vec<Option<Section>>,
    file_meta: Metadata,
    stack: Vec<Frame>,
    edges: Vec<Relationship>,
}

/// The service a compose path belongs to: `services.web` for `services.web`
fn service_path(path: &str) -> Option<&str> {
    let name = path.strip_prefix("services.")?;
    (!name.is_empty() && !name.contains('.')).then_some(path)
}

impl<'a> Outline<'a> {
    fn new(request: &'a ParseRequest) -> Self {
        let file = request.file_name();
        let lower = file.to_ascii_lowercase();
        let compose = lower.starts_with("docker-compose") || lower.starts_with("compose.");
        Self {
            request,
            file,
            compose,
            sections: Vec::new(),
            file_meta: Metadata::new(),
            stack: vec![Frame::root()],
            edges: Vec::new(),
        }
    }

    fn top(&self) -> &Frame {
        // The root frame is never popped
        &self.stack[self.stack.len() - 1]
    }

    fn meta_of(&mut self, slot: Option<usize>) -> Option<&mut Metadata> {
        match slot {
            Some(i) => self.sections[i].as_mut().map(|s| &mut s.metadata),
            None if self.stack.len() == 1 => Some(&mut self.file_meta),
            None => None,
        }
    }

    fn depends_on(&mut self, from: &str, to: &str, line: usize) {
        let rel = self
            .request
            .relationship(from, to, RelationshipKind::DependsOn)
            .at_line(line as u32 + 1);
        self.edges.push(rel);
    }

    fn child_path(&self, key: &str) -> String {
        let parent = &self.top().path;
        if parent.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", parent, key)
        }
    }

    fn open_section(&mut self, name: &str, line: usize, depth: usize, allowed: bool) -> Option<usize> {
        let (parent_emits, parent_slot, parent_path) = {
            let top = self.top();
            (top.emits, top.slot, top.path.clone())
        };
        if !(parent_emits && allowed && self.request.policy.allows_depth(depth)) {
            return None;
        }
        if let Some(p) = parent_slot {
            if let Some(parent) = self.sections[p].as_mut() {
                parent.children += 1;
            }
        }
        self.sections.push(Some(Section {
            name: name.to_string(),
            parent: if parent_path.is_empty() { self.file.clone() } else { parent_path },
            start: line,
            last: line,
            depth,
            children: 0,
            metadata: Metadata::new(),
        }));
        Some(self.sections.len() - 1)
    }

    /// Pop frames that the line at `indent` closes
    fn close_until(&mut self, indent: usize, list_line: bool) {
        while self.stack.len() > 1 {
            let top = self.top();
            let closes = top.indent > indent || (top.indent == indent && (!list_line || top.is_item));
            if !closes {
                break;
            }
            self.pop();
        }
    }

    fn pop(&mut self) {
        let Some(frame) = self.stack.pop() else { return };
        let policy = self.request.policy;

        let empty = frame
            .slot
            .and_then(|s| self.sections[s].as_ref())
            .map(|s| s.metadata.is_empty() && s.children == 0)
            .unwrap_or(false);

        if !frame.scalars.is_empty() {
            let list = MetaValue::List(policy.cap(frame.scalars));
            if empty || frame.slot.is_none() {
                if let Some(slot) = frame.slot {
                    self.sections[slot] = None;
                }
                let parent_slot = self.top().slot;
                if let Some(meta) = self.meta_of(parent_slot) {
                    meta.entry(frame.key).or_insert(list);
                }
            } else if let Some(section) = frame.slot.and_then(|s| self.sections[s].as_mut()) {
                section.metadata.insert("items".to_string(), list);
            }
        } else if empty {
            // A bare `key:` with nothing under it is a null, not a block
            let single_line = frame
                .slot
                .and_then(|s| self.sections[s].as_ref())
                .is_some_and(|s| s.last == s.start);
            if let (true, Some(slot)) = (single_line, frame.slot) {
                self.sections[slot] = None;
                let parent_slot = self.top().slot;
                if let Some(meta) = self.meta_of(parent_slot) {
                    meta.entry(frame.key).or_insert(MetaValue::Text(String::new()));
                }
            }
        }
    }

    fn close_all(&mut self) {
        while self.stack.len() > 1 {
            self.pop();
        }
    }

    /// `key: value` or `key:` at `indent`
    fn entry(&mut self, line: usize, indent: usize, body: &str) -> Option<usize> {
        let caps = KEY.captures(body)?;
        let key = unquote(&caps[1]).to_string();
        let value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        let path = self.child_path(&key);
        let parent_path = self.top().path.clone();
        let depth = self.top().depth + 1;

        // `key: &anchor` still opens a block
        let opens_block = value.is_empty() || (value.starts_with('&') && !value.contains(' '));

        if self.compose {
            if let Some(service) = parent_path.strip_suffix(".depends_on").and_then(service_path) {
                let service = service.to_string();
                self.depends_on(&service, &format!("services.{}", key), line);
            } else if let Some(service) = service_path(&parent_path) {
                if key == "image" && !opens_block {
                    let service = service.to_string();
                    self.depends_on(&service, unquote(value), line);
                } else if key == "depends_on" {
                    if let Some(items) = flow_list(value) {
                        let service = service.to_string();
                        for item in items {
                            self.depends_on(&service, &format!("services.{}", item), line);
                        }
                    }
                }
            }
        }

        if opens_block {
            let slot = self.open_section(&path, line, depth, true);
            self.stack.push(Frame {
                indent,
                key,
                path,
                depth,
                slot,
                emits: slot.is_some(),
                is_item: false,
                items: 0,
                scalars: Vec::new(),
            });
            return None;
        }

        if value.starts_with(['|', '>']) {
            return Some(indent);
        }

        let parent_slot = self.top().slot;
        if let Some(meta) = self.meta_of(parent_slot) {
            meta.entry(key).or_insert_with(|| scalar(value));
        }
        None
    }

    /// `- rest` with the dash at `indent`
    fn list_item(&mut self, line: usize, indent: usize, rest: &str) -> Option<usize> {
        let (index, parent_path, depth) = {
            let Some(top) = self.stack.last_mut() else { return None };
            let index = top.items;
            top.items += 1;
            (index, top.path.clone(), top.depth + 1)
        };

        let mapping = rest.is_empty() || KEY.is_match(rest);
        if !mapping {
            let item = unquote(rest).to_string();
            if self.compose {
                if let Some(service) = parent_path.strip_suffix(".depends_on").and_then(service_path) {
                    let service = service.to_string();
                    self.depends_on(&service, &format!("services.{}", item), line);
                }
            }
            if let Some(top) = self.stack.last_mut() {
                top.scalars.push(item);
            }
            return None;
        }

        let base = if parent_path.is_empty() { self.file.clone() } else { parent_path };
        let name = format!("{}[{}]", base, index);
        let allowed = self.request.policy.allows_item(index);
        let slot = self.open_section(&name, line, depth, allowed);
        self.stack.push(Frame {
            indent,
            key: format!("[{}]", index),
            path: name,
            depth,
            slot,
            emits: slot.is_some(),
            is_item: true,
            items: 0,
            scalars: Vec::new(),
        });

        if rest.is_empty() {
            None
        } else {
            self.entry(line, indent + 2, rest)
        }
    }

    fn touch(&mut self, line: usize) {
        for frame in &self.stack {
            if let Some(section) = frame.slot.and_then(|s| self.sections[s].as_mut()) {
                section.last = line;
            }
        }
    }
}

impl LanguageAdapter for YamlAdapter {
    fn language_name(&self) -> &str {
        "yaml"
    }

    fn file_extensions(&self) -> &[&str] {
        &["yml", "yaml"]
    }

    fn parse_code(&self, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        let lines: Vec<&str> = content.lines().collect();
        let mut outline = Outline::new(request);
        let mut block_scalar: Option<usize> = None;

        for (i, raw) in lines.iter().enumerate() {
            if let Some(block_indent) = block_scalar {
                if raw.trim().is_empty() || indent_of(raw) > block_indent {
                    outline.touch(i);
                    continue;
                }
                block_scalar = None;
            }

            let text = strip_comment(raw.trim_end());
            let body = text.trim_start();
            if body.is_empty() || body.starts_with('#') {
                continue;
            }
            if body == "---" || body == "..." || body.starts_with("--- ") || body.starts_with('%') {
                outline.close_all();
                continue;
            }

            let indent = indent_of(text);
            let list_rest = if body == "-" { Some("") } else { body.strip_prefix("- ") };
            block_scalar = match list_rest {
                Some(rest) => {
                    outline.close_until(indent, true);
                    outline.list_item(i, indent, rest.trim())
                }
                None => {
                    outline.close_until(indent, false);
                    outline.entry(i, indent, body)
                }
            };
            outline.touch(i);
        }
        outline.close_all();

        let Outline {
            sections,
            file_meta,
            edges,
            compose,
            ..
        } = outline;

        let mut file_entity = request.file_entity(content, "yaml").with_meta("compose", compose);
        for (key, value) in file_meta {
            file_entity.metadata.entry(key).or_insert(value);
        }

        let mut result = ParseResult::new();
        result.add_entity(file_entity);
        let mut defines = Vec::new();

        for section in sections.into_iter().flatten() {
            let text = lines[section.start..=section.last.min(lines.len() - 1)].join("\n");
            if request.policy.is_trivial(&text) {
                continue;
            }
            let line = section.start as u32 + 1;
            let mut entity = request
                .entity(EntityKind::Pattern, &section.name, line, &text)
                .with_meta("keyPath", section.name.as_str())
                .with_meta("depth", section.depth)
                .with_meta("endLine", section.last as u32 + 1);
            for (key, value) in section.metadata {
                entity.metadata.entry(key).or_insert(value);
            }
            result.add_entity(entity);
            defines.push(
                request
                    .relationship(&section.parent, &section.name, RelationshipKind::Defines)
                    .at_line(line),
            );
        }

        if result.entities.len() == 1 {
            tracing::debug!("{}: no YAML blocks found", request.path);
        }
        result.relationships.extend(defines);
        result.relationships.extend(edges);
        Ok(result)
    }
}

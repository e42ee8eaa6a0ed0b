//! Markup strategies: Markdown documents and HTML pages

use super::framework::{LanguageAdapter, ParseRequest, ParseResult};
use super::heuristic::{LineCounter, MAX_BLOCK_SCAN, collapse_whitespace, line_offsets, mask_comments};
use crate::Result;
use crate::entity::EntityKind;
use crate::relationship::RelationshipKind;
use regex::Regex;
use std::sync::LazyLock;

static ATX_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(#{1,6})\s+(.*?)\s*#*\s*$").expect("valid heading regex"));

static SETEXT_UNDERLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(=+|-+)\s*$").expect("valid setext regex"));

static MD_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]\(\s*<?([^)\s>]+)>?(?:\s+[^)]*)?\)").expect("valid link regex"));

static HTML_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<([a-z][a-z0-9-]*)\b([^>]*)>").expect("valid tag regex")
});

static HTML_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\b([a-z][a-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).expect("valid attribute regex")
});

/// Elements that never have a closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

/// True for link targets that point at another file in the same tree
fn is_relative_target(target: &str) -> bool {
    let lower = target.to_ascii_lowercase();
    !(target.is_empty()
        || target.starts_with('#')
        || target.starts_with("//")
        || lower.contains("://")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("javascript:")
        || lower.starts_with("data:"))
}

/// Drop a `#fragment` or `?query` suffix
fn strip_fragment(target: &str) -> &str {
    target.split(['#', '?']).next().unwrap_or(target)
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

pub struct MarkdownAdapter;

#[derive(Debug)]
struct Heading {
    level: usize,
    title: String,
    /// 0-based index of the first line of the heading
    line: usize,
    /// 0-based index of the first body line
    body: usize,
}

/// Find headings outside fenced code blocks
fn find_headings(lines: &[&str]) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut fence: Option<&str> = None;

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if let Some(marker) = fence {
            if trimmed.starts_with(marker) {
                fence = None;
            }
            continue;
        }
        if trimmed.starts_with("```") {
            fence = Some("```");
            continue;
        }
        if trimmed.starts_with("~~~") {
            fence = Some("~~~");
            continue;
        }

        if let Some(caps) = ATX_HEADING.captures(line) {
            headings.push(Heading {
                level: caps[1].len(),
                title: collapse_whitespace(&caps[2]),
                line: i,
                body: i + 1,
            });
            continue;
        }

        // Setext: a text line underlined with === or ---
        let Some(next) = lines.get(i + 1) else { continue };
        if trimmed.is_empty() || trimmed.starts_with(['-', '*', '>', '|']) {
            continue;
        }
        if let Some(caps) = SETEXT_UNDERLINE.captures(next) {
            let level = if caps[1].starts_with('=') { 1 } else { 2 };
            headings.push(Heading {
                level,
                title: collapse_whitespace(trimmed),
                line: i,
                body: i + 2,
            });
        }
    }

    headings
}

impl LanguageAdapter for MarkdownAdapter {
    fn language_name(&self) -> &str {
        "markdown"
    }

    fn file_extensions(&self) -> &[&str] {
        &["md", "markdown", "mdx"]
    }

    fn parse_code(&self, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        let policy = &request.policy;
        let file = request.file_name();
        let lines: Vec<&str> = content.lines().collect();
        let offsets = line_offsets(content);

        // Headings deeper than the depth ceiling fold into their section
        let headings: Vec<Heading> = find_headings(&lines)
            .into_iter()
            .filter(|h| policy.allows_depth(h.level) && !h.title.is_empty())
            .collect();

        let doc_title = headings
            .iter()
            .find(|h| h.level == 1)
            .or(headings.first())
            .map(|h| h.title.clone());

        let mut result = ParseResult::new();
        result.add_entity(
            request
                .file_entity(content, "markdown")
                .with_meta("headingCount", headings.len())
                .with_optional_meta("title", doc_title),
        );

        // (level, name) of the open headings
        let mut stack: Vec<(usize, String)> = Vec::new();
        let mut owner_of_line: Vec<Option<usize>> = vec![None; lines.len()];

        for (index, heading) in headings.iter().enumerate() {
            if !policy.allows_item(index) {
                break;
            }
            let end = headings.get(index + 1).map(|h| h.line).unwrap_or(lines.len());
            let start = offsets.get(heading.line).copied().unwrap_or(content.len());
            let stop = offsets.get(end).copied().unwrap_or(content.len());
            let text = content[start..stop].trim_end();
            if policy.is_trivial(text) {
                continue;
            }

            while stack.last().is_some_and(|(level, _)| *level >= heading.level) {
                stack.pop();
            }
            let parent = stack.last().map(|(_, name)| name.clone());
            let line = heading.line as u32 + 1;

            let body_lines = lines.get(heading.body..end).map(|b| b.len()).unwrap_or(0);
            let entity = request
                .entity(EntityKind::Pattern, &heading.title, line, text)
                .with_meta("headingLevel", heading.level)
                .with_meta("bodyLines", body_lines)
                .with_optional_meta("parent", parent.clone());
            result.add_entity(entity);
            result.add_relationship(
                request
                    .relationship(parent.as_deref().unwrap_or(&file), &heading.title, RelationshipKind::Defines)
                    .at_line(line),
            );

            for slot in owner_of_line.iter_mut().take(end).skip(heading.line) {
                *slot = Some(index);
            }
            stack.push((heading.level, heading.title.clone()));
        }

        let mut in_fence = false;
        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }
            for caps in MD_LINK.captures_iter(line) {
                let target = strip_fragment(&caps[1]);
                if !is_relative_target(&caps[1]) || target.is_empty() {
                    continue;
                }
                let from = owner_of_line[i]
                    .map(|h| headings[h].title.as_str())
                    .unwrap_or(&file);
                result.add_relationship(
                    request
                        .relationship(from, target, RelationshipKind::Uses)
                        .at_line(i as u32 + 1),
                );
            }
        }

        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

pub struct HtmlAdapter;

/// Attributes of one start tag, names lower-cased
fn attributes(raw: &str) -> Vec<(String, String)> {
    HTML_ATTR
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or(caps.get(3))
                .or(caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or("");
            (caps[1].to_ascii_lowercase(), value.trim().to_string())
        })
        .collect()
}

fn attribute<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

/// End offset of the element whose start tag ends at `after`, found by
/// counting same-name open and close tags. Bounded by [`MAX_BLOCK_SCAN`].
fn element_end(lower: &str, tag: &str, after: usize) -> usize {
    let limit = after.saturating_add(MAX_BLOCK_SCAN).min(lower.len());
    let open = format!("<{}", tag);
    let close = format!("</{}", tag);
    let bytes = lower.as_bytes();
    let is_boundary = |at: usize| at >= bytes.len() || !(bytes[at].is_ascii_alphanumeric() || bytes[at] == b'-');

    let mut depth = 1usize;
    let mut pos = after;
    while pos < limit {
        let Some(rel) = lower[pos..limit].find('<') else { break };
        let at = pos + rel;
        let rest = &lower[at..limit];
        if rest.starts_with(&close) && is_boundary(at + close.len()) {
            depth -= 1;
            let stop = lower[at..limit].find('>').map(|i| at + i + 1).unwrap_or(limit);
            if depth == 0 {
                return stop;
            }
            pos = stop;
        } else {
            if rest.starts_with(&open) && is_boundary(at + open.len()) {
                depth += 1;
            }
            pos = at + 1;
        }
    }

    let mut end = limit;
    while end > after && !lower.is_char_boundary(end) {
        end -= 1;
    }
    end
}

impl LanguageAdapter for HtmlAdapter {
    fn language_name(&self) -> &str {
        "html"
    }

    fn file_extensions(&self) -> &[&str] {
        &["html", "htm", "xhtml"]
    }

    fn parse_code(&self, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        let policy = &request.policy;
        let file = request.file_name();
        let masked = mask_comments(content, "<!--", "-->");
        let lower = masked.to_ascii_lowercase();

        let title = HTML_TITLE
            .captures(&masked)
            .map(|caps| collapse_whitespace(&caps[1]))
            .filter(|t| !t.is_empty());

        let mut result = ParseResult::new();
        result.add_entity(
            request
                .file_entity(content, "html")
                .with_optional_meta("title", title),
        );

        let mut lines = LineCounter::new(&masked);
        let mut elements = 0usize;

        for caps in HTML_TAG.captures_iter(&masked) {
            let Some(whole) = caps.get(0) else { continue };
            let tag = caps[1].to_ascii_lowercase();
            let attrs = attributes(&caps[2]);
            let line = lines.line_at(whole.start());

            let import = match tag.as_str() {
                "script" => attribute(&attrs, "src"),
                "link" => attribute(&attrs, "href"),
                _ => None,
            };
            if let Some(target) = import.filter(|t| !t.is_empty()) {
                result.add_relationship(
                    request
                        .relationship(&file, strip_fragment(target), RelationshipKind::Imports)
                        .with_property("element", tag.as_str())
                        .at_line(line),
                );
            }

            if tag == "a" {
                if let Some(href) = attribute(&attrs, "href").filter(|h| is_relative_target(h)) {
                    let target = strip_fragment(href);
                    if !target.is_empty() {
                        result.add_relationship(
                            request
                                .relationship(&file, target, RelationshipKind::Uses)
                                .at_line(line),
                        );
                    }
                }
            }

            let Some(id) = attribute(&attrs, "id").filter(|id| !id.is_empty()) else {
                continue;
            };
            if !policy.allows_item(elements) {
                continue;
            }
            elements += 1;

            let self_closing = caps[2].trim_end().ends_with('/');
            let end = if self_closing || VOID_ELEMENTS.contains(&tag.as_str()) {
                whole.end()
            } else {
                element_end(&lower, &tag, whole.end())
            };
            let name = format!("{}#{}", tag, id);
            let text = content.get(whole.start()..end).unwrap_or(whole.as_str());

            let entity = request
                .entity(EntityKind::Pattern, &name, line, text)
                .with_meta("tag", tag.as_str())
                .with_meta("id", id)
                .with_optional_meta("class", attribute(&attrs, "class").filter(|c| !c.is_empty()));
            result.add_entity(entity);
            result.add_relationship(
                request
                    .relationship(&file, &name, RelationshipKind::Defines)
                    .at_line(line),
            );
        }

        Ok(result)
    }
}

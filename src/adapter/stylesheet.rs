//! Stylesheet strategy (CSS, SCSS, Less)
//!
//! Top-level rule blocks and block at-rules become `Pattern` entities. Rules
//! nested inside them are listed in the parent's `nestedSelectors` metadata.

use super::framework::{LanguageAdapter, ParseRequest, ParseResult};
use super::heuristic::{LineCounter, MAX_BLOCK_SCAN, brace_block, collapse_whitespace, mask_comments};
use crate::Result;
use crate::entity::EntityKind;
use crate::relationship::RelationshipKind;
use regex::Regex;
use std::sync::LazyLock;

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^@(?:import|use|forward)\s+(?:url\(\s*)?["']?([^"')\s;]+)"#).expect("valid CSS import regex")
});

pub struct StylesheetAdapter;

/// What sits directly inside a rule body
#[derive(Debug, Default)]
struct BodySummary {
    declarations: usize,
    nested: Vec<String>,
}

/// Count declarations and collect nested rule headers at depth zero of `body`
fn summarize_body(body: &str) -> BodySummary {
    let mut summary = BodySummary::default();
    let mut depth = 0usize;
    let mut segment_start = 0;

    for (i, c) in body.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    let header = collapse_whitespace(body[segment_start..i].trim());
                    if !header.is_empty() {
                        summary.nested.push(header);
                    }
                }
                depth += 1;
            }
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    segment_start = i + 1;
                }
            }
            ';' if depth == 0 => {
                if body[segment_start..i].contains(':') {
                    summary.declarations += 1;
                }
                segment_start = i + 1;
            }
            _ => {}
        }
    }
    if depth == 0 && body[segment_start..].contains(':') {
        summary.declarations += 1;
    }
    summary
}

impl StylesheetAdapter {
    fn dialect(path: &str) -> &'static str {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".scss") {
            "scss"
        } else if lower.ends_with(".less") {
            "less"
        } else {
            "css"
        }
    }
}

impl LanguageAdapter for StylesheetAdapter {
    fn language_name(&self) -> &str {
        "css"
    }

    fn file_extensions(&self) -> &[&str] {
        &["css", "scss", "less"]
    }

    fn parse_code(&self, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        let policy = &request.policy;
        let file = request.file_name();
        let mut result = ParseResult::new();
        result.add_entity(request.file_entity(content, Self::dialect(&request.path)));

        let mut masked = mask_comments(content, "/*", "*/");
        if Self::dialect(&request.path) != "css" {
            masked = mask_line_comments(&masked);
        }
        let bytes = masked.as_bytes();
        let mut lines = LineCounter::new(&masked);
        let mut pos = 0;

        while pos < bytes.len() {
            if bytes[pos].is_ascii_whitespace() {
                pos += 1;
                continue;
            }
            let start = pos;
            let Some(stop) = masked[pos..].find(['{', ';', '}']).map(|i| pos + i) else {
                break;
            };

            match bytes[stop] {
                b'}' => pos = stop + 1,
                b';' => {
                    let statement = masked[start..stop].trim();
                    if let Some(target) = IMPORT.captures(statement).and_then(|c| c.get(1)) {
                        let rel = request
                            .relationship(&file, target.as_str(), RelationshipKind::Imports)
                            .at_line(lines.line_at(start));
                        result.add_relationship(rel);
                    }
                    pos = stop + 1;
                }
                _ => {
                    let Some(block) = brace_block(&masked, stop, MAX_BLOCK_SCAN) else {
                        break;
                    };
                    let header = collapse_whitespace(masked[start..stop].trim());
                    let text = content.get(start..block.end).unwrap_or(&masked[start..block.end]);
                    pos = block.end.max(stop + 1);

                    if header.is_empty() || policy.is_trivial(text) {
                        continue;
                    }
                    let body = summarize_body(block.inner(&masked));
                    let line = lines.line_at(start);

                    let mut entity = request
                        .entity(EntityKind::Pattern, &header, line, text)
                        .with_meta("selector", header.as_str())
                        .with_meta("declarationCount", body.declarations)
                        .with_meta("terminated", block.terminated);
                    if let Some(at_rule) = header.strip_prefix('@') {
                        let name = at_rule.split_whitespace().next().unwrap_or(at_rule);
                        entity = entity.with_meta("atRule", name);
                    }
                    if !body.nested.is_empty() {
                        entity = entity.with_meta("nestedSelectors", policy.cap(body.nested));
                    }
                    result.add_entity(entity);
                    result.add_relationship(
                        request
                            .relationship(&file, &header, RelationshipKind::Defines)
                            .at_line(line),
                    );
                }
            }
        }

        Ok(result)
    }
}

/// Blank `// ...` line comments (SCSS/Less), leaving `://` in URLs alone
fn mask_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let cut = line
            .match_indices("//")
            .find(|(at, _)| *at == 0 || line.as_bytes()[at - 1] != b':')
            .map(|(at, _)| at);
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

//! Shell and PowerShell strategy
//!
//! Function declarations become `Method` entities with brace-delimited
//! bodies. Inside a body, the first word of every command that is not a
//! keyword or builtin is taken as a call. Sourced files become imports.
//! Bats `@test` blocks and Pester `It` blocks become `Test` entities.

use super::framework::{LanguageAdapter, ParseRequest, ParseResult};
use super::heuristic::{LineCounter, MAX_BLOCK_SCAN, brace_block};
use crate::Result;
use crate::entity::EntityKind;
use crate::relationship::RelationshipKind;
use regex::Regex;
use std::sync::LazyLock;

static SH_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:function[ \t]+([A-Za-z_][\w:.-]*)[ \t]*(?:\(\s*\))?|([A-Za-z_][\w:.-]*)[ \t]*\(\s*\))[ \t]*\{?")
        .expect("valid shell function regex")
});

static PS_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[ \t]*(?:function|filter)[ \t]+([A-Za-z_][\w-]*(?::[\w-]+)?)[ \t]*(?:\([^)]*\))?[ \t]*\{?")
        .expect("valid PowerShell function regex")
});

static SH_TEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^[ \t]*@test[ \t]+["']([^"']+)["'][ \t]*\{?"#).expect("valid bats regex"));

static PS_TEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?mi)^[ \t]*It[ \t]+["']([^"']+)["'][^{\n]*\{?"#).expect("valid Pester regex")
});

static SH_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*(?:source|\.)[ \t]+["']?([^"'\s;]+)"#).expect("valid source regex")
});

static PS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?mi)^[ \t]*(?:\.[ \t]+|Import-Module[ \t]+(?:-Name[ \t]+)?)["']?([^"'\s;]+)"#)
        .expect("valid import regex")
});

/// Shell words that are never calls
const SH_KEYWORDS: &[&str] = &[
    "if", "then", "else", "elif", "fi", "for", "while", "until", "do", "done", "case", "esac", "in",
    "function", "select", "time", "return", "local", "export", "declare", "readonly", "typeset",
    "unset", "shift", "set", "echo", "printf", "read", "cd", "pushd", "popd", "exit", "eval",
    "exec", "test", "true", "false", "trap", "wait", "break", "continue", "source", "let", "alias",
    "unalias", "command", "builtin", "type", "hash", "umask", "getopts", "shopt", "mapfile",
    "readarray", "printenv", "[", "[[", "]]", "{", "}", "!", ".", ":",
];

/// PowerShell words that are never calls
const PS_KEYWORDS: &[&str] = &[
    "if", "elseif", "else", "foreach", "for", "while", "do", "until", "switch", "return", "param",
    "begin", "process", "end", "try", "catch", "finally", "throw", "break", "continue", "function",
    "filter", "trap", "exit", "write-host", "write-output", "write-verbose", "write-debug",
    "write-warning", "write-error", "{", "}", "(", ")",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shell {
    Posix,
    PowerShell,
}

impl Shell {
    fn detect(path: &str) -> Self {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".ps1") || lower.ends_with(".psm1") || lower.ends_with(".psd1") {
            Shell::PowerShell
        } else {
            Shell::Posix
        }
    }

    fn language(&self) -> &'static str {
        match self {
            Shell::Posix => "shell",
            Shell::PowerShell => "powershell",
        }
    }

    fn function_regex(&self) -> &'static Regex {
        match self {
            Shell::Posix => &SH_FUNCTION,
            Shell::PowerShell => &PS_FUNCTION,
        }
    }

    fn test_regex(&self) -> &'static Regex {
        match self {
            Shell::Posix => &SH_TEST,
            Shell::PowerShell => &PS_TEST,
        }
    }

    fn import_regex(&self) -> &'static Regex {
        match self {
            Shell::Posix => &SH_SOURCE,
            Shell::PowerShell => &PS_IMPORT,
        }
    }

    fn is_keyword(&self, word: &str) -> bool {
        let lower = word.to_ascii_lowercase();
        match self {
            Shell::Posix => SH_KEYWORDS.contains(&word),
            Shell::PowerShell => PS_KEYWORDS.contains(&lower.as_str()),
        }
    }
}

/// Blank `#` comments, keeping offsets. `$#`, `${#x}` and `#` inside words
/// are left alone.
fn mask_hash_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let bytes = line.as_bytes();
        let cut = (0..bytes.len()).find(|&at| {
            bytes[at] == b'#' && (at == 0 || bytes[at - 1] == b' ' || bytes[at - 1] == b'\t' || bytes[at - 1] == b';')
        });
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

/// First word of every command in a body
fn command_words(body: &str, shell: Shell) -> Vec<(String, usize)> {
    let mut words = Vec::new();
    for (i, line) in body.lines().enumerate() {
        for command in line.split([';', '|', '&']) {
            let mut tokens = command.split_whitespace();
            let Some(mut word) = tokens.next() else { continue };
            // `VAR=value cmd` runs `cmd`
            while shell == Shell::Posix && word.contains('=') && !word.starts_with('=') {
                match tokens.next() {
                    Some(next) => word = next,
                    None => break,
                }
            }
            let word = word.trim_start_matches(['(', '{', '`']).trim_end_matches([')', '}', ';']);
            if word.is_empty() || word.contains('=') || shell.is_keyword(word) {
                continue;
            }
            let first = word.chars().next().unwrap_or(' ');
            if !(first.is_ascii_alphabetic() || first == '_') {
                continue;
            }
            if !word.chars().all(|c| c.is_ascii_alphanumeric() || "_-.:/".contains(c)) {
                continue;
            }
            words.push((word.to_string(), i));
        }
    }
    words
}

pub struct ScriptAdapter;

impl LanguageAdapter for ScriptAdapter {
    fn language_name(&self) -> &str {
        "script"
    }

    fn file_extensions(&self) -> &[&str] {
        &["sh", "bash", "zsh", "ksh", "bats", "ps1", "psm1"]
    }

    fn parse_code(&self, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        let policy = &request.policy;
        let shell = Shell::detect(&request.path);
        let file = request.file_name();
        let masked = mask_hash_comments(content);
        let mut lines = LineCounter::new(&masked);

        let mut result = ParseResult::new();
        result.add_entity(request.file_entity(content, shell.language()));

        // (start, kind, name, header end)
        let mut headers: Vec<(usize, EntityKind, String, usize)> = Vec::new();
        for caps in shell.function_regex().captures_iter(&masked) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(name) = caps.get(1).or(caps.get(2)) else { continue };
            headers.push((whole.start(), EntityKind::Method, name.as_str().to_string(), whole.end()));
        }
        for caps in shell.test_regex().captures_iter(&masked) {
            let Some(whole) = caps.get(0) else { continue };
            headers.push((whole.start(), EntityKind::Test, caps[1].to_string(), whole.end()));
        }
        headers.sort_by_key(|h| h.0);

        let mut consumed = 0usize;
        let mut emitted = 0usize;
        for (start, kind, name, header_end) in headers {
            if start < consumed {
                continue;
            }
            let Some(block) = brace_block(&masked, header_end.saturating_sub(1), MAX_BLOCK_SCAN) else {
                continue;
            };
            // The body brace must directly follow the header
            let gap = &masked[header_end.min(block.open)..block.open];
            if !gap.trim().is_empty() {
                continue;
            }
            consumed = block.end;
            if !policy.allows_item(emitted) {
                continue;
            }
            emitted += 1;

            let line = lines.line_at(start);
            let text = content.get(start..block.end).unwrap_or(&masked[start..block.end]);
            let entity = request
                .entity(kind, &name, line, text.trim())
                .with_meta("language", shell.language())
                .with_meta("endLine", line + text.trim_end().matches('\n').count() as u32);
            result.add_entity(entity);
            result.add_relationship(request.relationship(&file, &name, RelationshipKind::Defines).at_line(line));

            let body = block.inner(&masked);
            let body_line = lines.line_at(block.open);
            for (callee, offset) in command_words(body, shell) {
                if callee == name {
                    continue;
                }
                result.add_relationship(
                    request
                        .relationship(&name, callee, RelationshipKind::Calls)
                        .at_line(body_line + offset as u32),
                );
            }
        }

        for caps in shell.import_regex().captures_iter(&masked) {
            let Some(target) = caps.get(1) else { continue };
            let line = lines.line_at(target.start());
            result.add_relationship(
                request
                    .relationship(&file, target.as_str(), RelationshipKind::Imports)
                    .at_line(line),
            );
        }

        Ok(result)
    }
}

//! Shared helpers for the line/regex strategies.
//!
//! Block boundaries are found by raw delimiter counting. Delimiters inside
//! string literals or comments are not recognised, so adversarial input can
//! shift a boundary; an unterminated block always ends at end of input.

/// Largest block a strategy will scan past its opening delimiter
pub const MAX_BLOCK_SCAN: usize = 256 * 1024;

/// Converts byte offsets to 1-based line numbers with a rolling newline count.
///
/// Offsets are expected in ascending order (the order regex matches arrive
/// in); an offset behind the cursor restarts the count from the top.
pub struct LineCounter<'a> {
    text: &'a str,
    offset: usize,
    line: u32,
}

impl<'a> LineCounter<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            offset: 0,
            line: 1,
        }
    }

    /// 1-based line of the byte at `offset`
    pub fn line_at(&mut self, offset: usize) -> u32 {
        let offset = offset.min(self.text.len());
        if offset < self.offset {
            self.offset = 0;
            self.line = 1;
        }
        let newlines = self.text.as_bytes()[self.offset..offset]
            .iter()
            .filter(|b| **b == b'\n')
            .count();
        self.line += newlines as u32;
        self.offset = offset;
        self.line
    }
}

/// A delimited block located in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Offset of the opening delimiter
    pub open: usize,
    /// Offset just past the closing delimiter (or the scan limit)
    pub end: usize,
    /// False when input ended before the block closed
    pub terminated: bool,
}

impl Block {
    /// Text between the delimiters, exclusive
    pub fn inner<'a>(&self, text: &'a str) -> &'a str {
        let start = (self.open + 1).min(self.end);
        let stop = if self.terminated { self.end - 1 } else { self.end };
        &text[start..stop.max(start)]
    }
}

/// Find the block opened by the first `open` at or after `from`.
///
/// Scanning stops at the matching `close`, at end of input, or after
/// `max_len` bytes, whichever comes first. Returns `None` when no opening
/// delimiter exists before the limit.
pub fn delimited_block(text: &str, from: usize, open: u8, close: u8, max_len: usize) -> Option<Block> {
    let bytes = text.as_bytes();
    let limit = from.saturating_add(max_len).min(bytes.len());
    let open_at = (from..limit).find(|&i| bytes[i] == open)?;

    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().take(limit).skip(open_at) {
        if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(Block {
                    open: open_at,
                    end: i + 1,
                    terminated: true,
                });
            }
        }
    }

    let mut end = limit;
    while end > open_at && !text.is_char_boundary(end) {
        end -= 1;
    }
    Some(Block {
        open: open_at,
        end,
        terminated: false,
    })
}

/// Brace-delimited block starting at or after `from`
pub fn brace_block(text: &str, from: usize, max_len: usize) -> Option<Block> {
    delimited_block(text, from, b'{', b'}', max_len)
}

/// Leading whitespace width of a line (tabs count as one column)
pub fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Index of the last line belonging to the indentation block that starts at
/// `start`: every following non-blank line indented deeper than the header.
pub fn indent_block_end(lines: &[&str], start: usize) -> usize {
    if start >= lines.len() {
        return start;
    }

    let start_indent = indent_of(lines[start]);
    let mut last = start;
    for (i, line) in lines.iter().enumerate().skip(start + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if indent_of(line) <= start_indent {
            break;
        }
        last = i;
    }
    last
}

/// Blank out every `open ... close` comment span, keeping byte offsets and
/// newlines intact so positions found in the result are valid in the input.
pub fn mask_comments(text: &str, open: &str, close: &str) -> String {
    let mut bytes = text.as_bytes().to_vec();
    let mut pos = 0;
    while let Some(rel) = text[pos..].find(open) {
        let start = pos + rel;
        let end = text[start + open.len()..]
            .find(close)
            .map(|i| start + open.len() + i + close.len())
            .unwrap_or(text.len());
        for b in &mut bytes[start..end] {
            if *b != b'\n' {
                *b = b' ';
            }
        }
        pos = end;
    }
    // Only ASCII spaces were written over whole spans
    String::from_utf8(bytes).unwrap_or_else(|_| text.to_string())
}

/// Collapse every whitespace run to a single space
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byte offset where line `index` (0-based) starts
pub fn line_offsets(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

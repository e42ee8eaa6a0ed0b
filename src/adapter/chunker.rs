//! Document Chunker - Fallback coverage for plain-text formats
//!
//! Files with no structural strategy (Terraform, reStructuredText, XML, CSV,
//! build scripts, ...) are cut into paragraph-aligned chunks so their text
//! still reaches the index. Each chunk becomes a `Pattern` entity named
//! `file#chunk_N`.
//!
//! Chunking strategy:
//! - Pack whole paragraphs up to the chunk size
//! - Split oversized paragraphs at line, then word boundaries
//! - Merge a small trailing chunk into its predecessor

use super::framework::{LanguageAdapter, ParseRequest, ParseResult};
use crate::Result;
use crate::entity::EntityKind;
use crate::relationship::RelationshipKind;

/// Default chunk size in bytes
const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Chunks smaller than this are merged into their predecessor
const MIN_CHUNK_SIZE: usize = 100;

/// Document chunker for plain-text files
pub struct DocumentChunker {
    chunk_size: usize,
}

impl Default for DocumentChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentChunker {
    /// Create a new document chunker with default settings
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Create a chunker with a custom chunk size
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(MIN_CHUNK_SIZE),
        }
    }

    /// Split content into chunks preserving paragraph boundaries
    fn split_into_chunks(&self, content: &str, limit: usize) -> Vec<Chunk> {
        let limit = limit.max(MIN_CHUNK_SIZE);
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current: Option<Chunk> = None;

        for piece in pieces(content, limit) {
            match current.as_mut() {
                Some(chunk) if chunk.content.len() + piece.content.len() + 2 <= limit => {
                    chunk.content.push_str("\n\n");
                    chunk.content.push_str(&piece.content);
                    chunk.end_line = piece.end_line;
                }
                _ => {
                    if let Some(done) = current.take() {
                        chunks.push(done);
                    }
                    current = Some(piece);
                }
            }
        }
        if let Some(last) = current {
            match chunks.last_mut() {
                Some(prev) if last.content.len() < MIN_CHUNK_SIZE => {
                    prev.content.push_str("\n\n");
                    prev.content.push_str(&last.content);
                    prev.end_line = last.end_line;
                }
                _ => chunks.push(last),
            }
        }

        chunks
    }
}

/// Paragraphs of `content`, each cut down to at most `limit` bytes
fn pieces(content: &str, limit: usize) -> Vec<Chunk> {
    let mut out = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut start_line = 1u32;

    let lines: Vec<&str> = content.lines().collect();
    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx as u32 + 1;
        if line.trim().is_empty() {
            if !paragraph.is_empty() {
                split_paragraph(&paragraph, start_line, limit, &mut out);
                paragraph.clear();
            }
            continue;
        }
        if paragraph.is_empty() {
            start_line = line_no;
        }
        paragraph.push(line);
    }
    if !paragraph.is_empty() {
        split_paragraph(&paragraph, start_line, limit, &mut out);
    }
    out
}

fn split_paragraph(lines: &[&str], start_line: u32, limit: usize, out: &mut Vec<Chunk>) {
    let mut current = Chunk::empty(start_line);
    for (offset, line) in lines.iter().enumerate() {
        let line_no = start_line + offset as u32;
        if !current.content.is_empty() && current.content.len() + line.len() + 1 > limit {
            out.push(std::mem::replace(&mut current, Chunk::empty(line_no)));
        }

        let mut rest = *line;
        while rest.len() > limit {
            let cut = find_break_point(rest, limit);
            if !current.content.is_empty() {
                out.push(std::mem::replace(&mut current, Chunk::empty(line_no)));
            }
            out.push(Chunk {
                content: rest[..cut].trim_end().to_string(),
                start_line: line_no,
                end_line: line_no,
            });
            rest = rest[cut..].trim_start();
            current = Chunk::empty(line_no);
        }

        if !current.content.is_empty() {
            current.content.push('\n');
        }
        current.content.push_str(rest);
        current.end_line = line_no;
    }
    if !current.content.trim().is_empty() {
        out.push(current);
    }
}

/// Find a break point at or before `limit`, preferring word boundaries
fn find_break_point(text: &str, limit: usize) -> usize {
    let mut end = limit.min(text.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    match text[..end].rfind(' ') {
        Some(pos) if pos > limit / 2 => pos + 1,
        _ if end == 0 => text.chars().next().map(char::len_utf8).unwrap_or(text.len()),
        _ => end,
    }
}

impl LanguageAdapter for DocumentChunker {
    fn language_name(&self) -> &str {
        "text"
    }

    fn file_extensions(&self) -> &[&str] {
        &[
            // Documentation
            "txt", "text", "rst", "adoc", "asciidoc", "org", "tex",
            // Infrastructure
            "tf", "tfvars", "hcl", "nomad",
            // Data
            "csv", "tsv", "xml", "xsd", "xslt", "svg", "graphql", "gql", "proto",
            // Build
            "gradle", "kts", "cmake", "mk", "bazel", "bzl",
            // Shells without a dedicated strategy
            "fish", "bat", "cmd",
        ]
    }

    fn parse_code(&self, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        let policy = &request.policy;
        let file = request.file_name();
        let language = request
            .path
            .rsplit('.')
            .next()
            .filter(|ext| !ext.contains('/') && *ext != request.path)
            .unwrap_or("text")
            .to_ascii_lowercase();

        let mut result = ParseResult::new();
        result.add_entity(request.file_entity(content, &language));

        let chunks = self.split_into_chunks(content, self.chunk_size.min(policy.content_ceiling));
        let total = chunks.len();
        for (idx, chunk) in chunks.into_iter().enumerate() {
            if !policy.allows_item(idx) {
                tracing::debug!("{}: {} chunks, only {} kept", request.path, total, policy.max_items);
                break;
            }
            if policy.is_trivial(&chunk.content) {
                continue;
            }
            let name = format!("{}#chunk_{}", file, idx + 1);
            let entity = request
                .entity(EntityKind::Pattern, &name, chunk.start_line, &chunk.content)
                .with_meta("chunkIndex", idx + 1)
                .with_meta("chunkCount", total)
                .with_meta("endLine", chunk.end_line);
            result.add_entity(entity);
            result.add_relationship(
                request
                    .relationship(&file, name, RelationshipKind::Defines)
                    .at_line(chunk.start_line),
            );
        }

        Ok(result)
    }
}

/// A chunk of a document
#[derive(Debug, Clone)]
struct Chunk {
    content: String,
    start_line: u32,
    end_line: u32,
}

impl Chunk {
    fn empty(line: u32) -> Self {
        Self {
            content: String::new(),
            start_line: line,
            end_line: line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(result: &ParseResult) -> Vec<&crate::entity::CodeEntity> {
        result.entities_of(EntityKind::Pattern).collect()
    }

    #[test]
    fn test_small_file_single_chunk() {
        let chunker = DocumentChunker::new();
        let content = "variable \"region\" {\n  default = \"eu-west-1\"\n}\n";

        let result = chunker.parse_code(content, &ParseRequest::new("infra/main.tf")).unwrap();

        assert_eq!(result.entities[0].kind, EntityKind::File);
        assert_eq!(result.entities[0].meta("language").and_then(|v| v.as_text()), Some("tf"));
        let found = chunks(&result);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "main.tf#chunk_1");
        assert_eq!(found[0].line_number, 1);
        assert_eq!(found[0].meta("endLine").and_then(|v| v.as_int()), Some(3));
    }

    #[test]
    fn test_large_file_multiple_chunks() {
        let chunker = DocumentChunker::with_chunk_size(200);
        let content = (0..30)
            .map(|i| format!("Paragraph {} line one with some words\nand a second line\n\n", i))
            .collect::<String>();

        let result = chunker.parse_code(&content, &ParseRequest::new("notes.txt")).unwrap();

        let found = chunks(&result);
        assert!(found.len() > 1);
        for chunk in &found {
            assert!(chunk.content.len() <= 200 + MIN_CHUNK_SIZE);
            assert!(!chunk.content.starts_with('\n'));
        }
        assert_eq!(found[0].line_number, 1);
        // every chunk starts on the first line of a paragraph
        assert!(found.iter().all(|c| c.line_number % 3 == 1));
        let defines = result.relationships_of(RelationshipKind::Defines).count();
        assert_eq!(defines, found.len());
    }

    #[test]
    fn test_small_tail_is_merged() {
        let chunker = DocumentChunker::with_chunk_size(150);
        let big = "x".repeat(120);
        let content = format!("{}\n\n{}\n\ntail\n", big, big);

        let result = chunker.parse_code(&content, &ParseRequest::new("data.csv")).unwrap();

        let found = chunks(&result);
        assert_eq!(found.len(), 2);
        assert!(found[1].content.ends_with("tail"));
        assert_eq!(found[1].meta("endLine").and_then(|v| v.as_int()), Some(5));
    }

    #[test]
    fn test_long_line_is_split() {
        let chunker = DocumentChunker::with_chunk_size(100);
        let content = "word ".repeat(100);

        let result = chunker.parse_code(&content, &ParseRequest::new("blob.xml")).unwrap();

        let found = chunks(&result);
        assert!(found.len() >= 4);
        assert!(found.iter().all(|c| c.content.len() <= 100));
        assert!(found.iter().all(|c| c.line_number == 1));
    }

    #[test]
    fn test_empty_file() {
        let chunker = DocumentChunker::new();
        let result = chunker.parse_code("", &ParseRequest::new("empty.txt")).unwrap();

        assert_eq!(result.entities.len(), 1);
        assert!(result.relationships.is_empty());
    }
}

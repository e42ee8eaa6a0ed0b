//! Core adapter framework
//!
//! Defines the parse contract every extraction strategy implements and the
//! `ParseResult` envelope they all return.

use crate::Result;
use crate::cancel::CancellationToken;
use crate::entity::{CodeEntity, DEFAULT_CONTEXT, EntityKind, SENTINEL_LINE};
use crate::policy::ChunkingPolicy;
use crate::relationship::{Relationship, RelationshipKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Bytes inspected when sniffing for binary content
const BINARY_SNIFF_LEN: usize = 8 * 1024;

/// Result of one strategy invocation on one file.
///
/// Partial success is normal: `entities` may be non-empty while `errors`
/// carries diagnostics for the parts that could not be extracted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    /// Extracted entities, in discovery order
    pub entities: Vec<CodeEntity>,
    /// Extracted relationships, in discovery order
    pub relationships: Vec<Relationship>,
    /// Human-readable diagnostics
    pub errors: Vec<String>,
}

impl ParseResult {
    /// Create a new empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a result carrying a single diagnostic and nothing else
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            ..Self::default()
        }
    }

    /// True when no diagnostics were recorded
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }

    /// True when entities were extracted despite diagnostics
    pub fn is_partial(&self) -> bool {
        !self.entities.is_empty() && !self.errors.is_empty()
    }

    /// Add an entity
    pub fn add_entity(&mut self, entity: CodeEntity) {
        self.entities.push(entity);
    }

    /// Add a relationship
    pub fn add_relationship(&mut self, relationship: Relationship) {
        self.relationships.push(relationship);
    }

    /// Add a diagnostic
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Append everything from another result
    pub fn merge(&mut self, other: ParseResult) {
        self.entities.extend(other.entities);
        self.relationships.extend(other.relationships);
        self.errors.extend(other.errors);
    }

    /// Entities of one kind
    pub fn entities_of(&self, kind: EntityKind) -> impl Iterator<Item = &CodeEntity> {
        self.entities.iter().filter(move |e| e.kind == kind)
    }

    /// Relationships of one kind
    pub fn relationships_of(&self, kind: RelationshipKind) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(move |r| r.kind == kind)
    }

    /// Find an entity by name
    pub fn entity(&self, name: &str) -> Option<&CodeEntity> {
        self.entities.iter().find(|e| e.name == name)
    }
}

/// Everything a strategy needs to know about one parse invocation.
#[derive(Debug, Clone)]
pub struct ParseRequest {
    /// File path as given by the caller
    pub path: String,
    /// Logical grouping label
    pub context: String,
    /// Bounds to honor
    pub policy: ChunkingPolicy,
    /// Cooperative cancellation
    pub cancel: CancellationToken,
}

impl ParseRequest {
    /// Create a request with the default context and policy
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            context: DEFAULT_CONTEXT.to_string(),
            policy: ChunkingPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the context label; blank labels fall back to the default
    pub fn with_context(mut self, context: Option<&str>) -> Self {
        self.context = match context.map(str::trim) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => DEFAULT_CONTEXT.to_string(),
        };
        self
    }

    /// Set the chunking policy
    pub fn with_policy(mut self, policy: ChunkingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the cancellation token
    pub fn with_cancel(mut self, cancel: Option<&CancellationToken>) -> Self {
        if let Some(token) = cancel {
            self.cancel = token.clone();
        }
        self
    }

    /// The file name component of the path
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    /// Build an entity for this file, with content already truncated
    pub fn entity(
        &self,
        kind: EntityKind,
        name: impl Into<String>,
        line: u32,
        content: &str,
    ) -> CodeEntity {
        CodeEntity::new(
            kind,
            name,
            &self.path,
            &self.context,
            line,
            self.policy.truncate(content),
        )
    }

    /// Build a relationship in this request's context
    pub fn relationship(
        &self,
        from: impl Into<String>,
        to: impl Into<String>,
        kind: RelationshipKind,
    ) -> Relationship {
        Relationship::new(from, to, kind, &self.context)
    }

    /// Build the file-level entity every strategy emits first
    pub fn file_entity(&self, content: &str, language: &str) -> CodeEntity {
        self.entity(EntityKind::File, self.file_name(), SENTINEL_LINE, content)
            .with_meta("language", language)
            .with_meta("lineCount", content.lines().count())
            .with_meta("contentHash", blake3::hash(content.as_bytes()).to_hex().to_string())
            .with_meta("truncated", self.policy.exceeds_ceiling(content))
    }

    /// Best-effort result for content the strategy could not parse:
    /// the raw file as a single entity plus one diagnostic.
    pub fn raw_fallback(&self, content: &str, language: &str, error: impl std::fmt::Display) -> ParseResult {
        let mut result = ParseResult::new();
        result.add_entity(self.file_entity(content, language).with_meta("rawContent", true));
        result.add_error(format!("failed to parse {}: {}", self.path, error));
        result
    }
}

/// Trait for extraction strategies
///
/// Each strategy is responsible for:
/// 1. Identifying files it can parse
/// 2. Extracting entities (file first, then declarations/sections)
/// 3. Emitting name-keyed relationships
/// 4. Honoring the request's chunking policy
pub trait LanguageAdapter: Send + Sync {
    /// Get the language name (for display and metadata)
    fn language_name(&self) -> &str;

    /// Get file extensions this strategy handles (lower case, no dot)
    fn file_extensions(&self) -> &[&str];

    /// Check if this strategy can handle a file by extension
    fn can_handle(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.file_extensions().contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// Parse in-memory content that belongs to `request.path`
    fn parse_code(&self, content: &str, request: &ParseRequest) -> Result<ParseResult>;

    /// Parse content that was just read from `request.path`
    fn parse_loaded(&self, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        self.parse_code(content, request)
    }

    /// Parse a file from disk
    fn parse_file(&self, request: &ParseRequest) -> Result<ParseResult> {
        request.cancel.check()?;
        let content = read_source(Path::new(&request.path))?;
        self.parse_loaded(&content, request)
    }
}

/// Read a file as text, rejecting binary content and decoding lossily.
pub fn read_source(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    decode_source(&bytes)
}

/// Decode raw bytes as text, rejecting binary content.
pub fn decode_source(bytes: &[u8]) -> Result<String> {
    let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    if sniff.contains(&0) {
        return Err(crate::Error::Parse("binary content".to_string()));
    }
    let text = String::from_utf8_lossy(bytes);
    Ok(text.strip_prefix('\u{feff}').unwrap_or(&text).to_string())
}

/// The file name component of a path, or the path itself
pub fn file_name_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

//! # Codeweave - Polyglot Ingestion Pipeline
//!
//! Turns arbitrary source, markup, configuration and infrastructure files into
//! a normalized set of graph nodes ([`CodeEntity`]) and name-keyed graph edges
//! ([`Relationship`]) for a downstream memory/search backend.
//!
//! Codeweave provides:
//! - One entity/relationship schema shared by every extraction strategy
//! - Tree-sitter strategies for C#, Java, JavaScript, TypeScript, Go and Rust
//! - An out-of-process strategy for Python (the interpreter's own `ast`)
//! - Regex/line heuristics for stylesheets, markup, configs, manifests and scripts
//! - A chunking policy that bounds node size, nesting depth and fan-out
//! - A bounded worker pool that never lets one bad file abort a batch

pub mod adapter;
pub mod cancel;
pub mod config;
pub mod entity;
pub mod exclusion;
pub mod walk;
pub mod pipeline;
pub mod policy;
pub mod relationship;
pub mod resolver;
pub mod ui;

// Re-exports for convenient access
pub use adapter::{Dispatcher, LanguageAdapter, ParseResult};
pub use cancel::CancellationToken;
pub use config::IngestConfig;
pub use entity::{CodeEntity, EntityKind, MetaValue, Metadata};
pub use exclusion::ExclusionList;
pub use pipeline::{IngestMessage, IngestPipeline, IngestReport};
pub use policy::ChunkingPolicy;
pub use relationship::{Relationship, RelationshipKind};

/// Result type alias for Codeweave operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Codeweave operations.
///
/// These never escape a single file's parse: the dispatcher turns every one of
/// them into a diagnostic string on the returned [`ParseResult`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Strategy error: {0}")]
    Strategy(String),

    #[error("External worker failed: {0}")]
    Worker(String),

    #[error("External worker timed out after {0}s")]
    Timeout(u64),

    #[error("Parse cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

//! Extraction strategies
//!
//! Three families share one output contract: tree-sitter strategies for
//! languages with a grammar, an out-of-process strategy for Python, and
//! line/regex heuristics for everything else. The [`Dispatcher`] picks one
//! per file.

pub mod chunker;
pub mod dispatch;
pub mod dockerfile;
pub mod external;
pub mod framework;
pub mod grammar;
pub mod heuristic;
pub mod json_config;
pub mod manifest;
pub mod markup;
pub mod script;
pub mod settings;
pub mod sql;
pub mod stylesheet;
pub mod syntax_tree;
pub mod yaml;

pub use chunker::DocumentChunker;
pub use dispatch::Dispatcher;
pub use framework::{LanguageAdapter, ParseRequest, ParseResult};

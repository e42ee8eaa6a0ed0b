//! Exclusion list - generated and lock files that carry no source knowledge.
//!
//! Built once from static defaults plus configured extras and handed to the
//! dispatcher at construction; it is read-only afterwards.

use crate::resolver::exclusion_key;
use glob::Pattern;
use std::collections::HashSet;
use std::path::Path;

/// Exact file names (compared case-insensitively)
pub const DEFAULT_EXCLUDED_NAMES: &[&str] = &[
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "composer.lock",
    "gemfile.lock",
    "cargo.lock",
    "poetry.lock",
    "pipfile.lock",
    "packages.lock.json",
    "project.assets.json",
    "go.sum",
    ".ds_store",
    "thumbs.db",
];

/// File name globs (compared case-insensitively)
pub const DEFAULT_EXCLUDED_PATTERNS: &[&str] = &[
    "*.min.js",
    "*.min.css",
    "*.map",
    "*.designer.cs",
    "*.g.cs",
    "*.g.i.cs",
    "*.bundle.js",
];

/// Case-insensitive set of excluded file names and name patterns.
#[derive(Debug, Clone)]
pub struct ExclusionList {
    names: HashSet<String>,
    patterns: Vec<Pattern>,
}

impl Default for ExclusionList {
    fn default() -> Self {
        Self::new(&[], &[])
    }
}

impl ExclusionList {
    /// Build the list from the defaults plus extra names and glob patterns.
    ///
    /// Invalid extra patterns are skipped with a warning.
    pub fn new(extra_names: &[String], extra_patterns: &[String]) -> Self {
        let names = DEFAULT_EXCLUDED_NAMES
            .iter()
            .map(|n| exclusion_key(n))
            .chain(extra_names.iter().map(|n| exclusion_key(n)))
            .filter(|n| !n.is_empty())
            .collect();

        let mut patterns = Vec::new();
        let extras = extra_patterns.iter().map(String::as_str);
        for raw in DEFAULT_EXCLUDED_PATTERNS.iter().copied().chain(extras) {
            match Pattern::new(&exclusion_key(raw)) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => tracing::warn!("Ignoring invalid exclusion pattern {:?}: {}", raw, e),
            }
        }

        Self { names, patterns }
    }

    /// Check whether the file name of `path` is excluded
    pub fn is_excluded(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        let key = exclusion_key(&name);
        self.names.contains(&key) || self.patterns.iter().any(|p| p.matches(&key))
    }

    /// Number of exact names in the list
    pub fn name_count(&self) -> usize {
        self.names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names_case_insensitive() {
        let list = ExclusionList::default();
        assert!(list.is_excluded(Path::new("web/package-lock.json")));
        assert!(list.is_excluded(Path::new("Cargo.lock")));
        assert!(list.is_excluded(Path::new("YARN.LOCK")));
        assert!(!list.is_excluded(Path::new("package.json")));
    }

    #[test]
    fn test_default_patterns() {
        let list = ExclusionList::default();
        assert!(list.is_excluded(Path::new("dist/app.min.js")));
        assert!(list.is_excluded(Path::new("Form1.Designer.cs")));
        assert!(!list.is_excluded(Path::new("src/app.js")));
    }

    #[test]
    fn test_extras() {
        let list = ExclusionList::new(&["Generated.json".to_string()], &["*.snap".to_string()]);
        assert!(list.is_excluded(Path::new("generated.json")));
        assert!(list.is_excluded(Path::new("ui.test.js.snap")));
        assert_eq!(list.name_count(), DEFAULT_EXCLUDED_NAMES.len() + 1);
    }
}

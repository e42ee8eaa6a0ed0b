//! Chunking & truncation policy
//!
//! Four rules every strategy applies so one pathological input cannot produce
//! unbounded output:
//! - content ceiling: entity content is cut to a fixed size with a visible marker
//! - depth ceiling: nested structures stop producing entities past a fixed depth
//! - cardinality ceiling: repeated structures stop after a fixed count
//! - minimum content: near-empty fragments are dropped

use serde::{Deserialize, Serialize};

/// Default maximum entity content length, in bytes
pub const DEFAULT_CONTENT_CEILING: usize = 2000;

/// Default maximum nesting depth that still produces entities
pub const DEFAULT_MAX_DEPTH: usize = 4;

/// Default maximum number of per-element entities for a repeating structure
pub const DEFAULT_MAX_ITEMS: usize = 100;

/// Default minimum trimmed length for a fragment to be worth a node
pub const DEFAULT_MIN_CONTENT_LEN: usize = 3;

/// Marker appended to truncated content
pub const TRUNCATION_MARKER: &str = "...";

/// Bounds applied uniformly by every extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingPolicy {
    pub content_ceiling: usize,
    pub max_depth: usize,
    pub max_items: usize,
    pub min_content_len: usize,
}

impl Default for ChunkingPolicy {
    fn default() -> Self {
        Self {
            content_ceiling: DEFAULT_CONTENT_CEILING,
            max_depth: DEFAULT_MAX_DEPTH,
            max_items: DEFAULT_MAX_ITEMS,
            min_content_len: DEFAULT_MIN_CONTENT_LEN,
        }
    }
}

impl ChunkingPolicy {
    /// Cut `content` to the ceiling, ending it with [`TRUNCATION_MARKER`].
    ///
    /// The result is never longer than the ceiling (in bytes, hence also in
    /// chars) and is always cut on a char boundary.
    pub fn truncate(&self, content: &str) -> String {
        if content.len() <= self.content_ceiling {
            return content.to_string();
        }
        // A ceiling too small for the marker gets a bare cut
        let marker = if self.content_ceiling > TRUNCATION_MARKER.len() {
            TRUNCATION_MARKER
        } else {
            ""
        };
        let budget = self.content_ceiling - marker.len();
        let mut cut = budget.min(content.len());
        while cut > 0 && !content.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}{}", &content[..cut], marker)
    }

    /// Check whether content would be cut by [`ChunkingPolicy::truncate`]
    pub fn exceeds_ceiling(&self, content: &str) -> bool {
        content.len() > self.content_ceiling
    }

    /// Check whether a structure at `depth` (1 = top level) may become an entity
    pub fn allows_depth(&self, depth: usize) -> bool {
        depth <= self.max_depth
    }

    /// Check whether the element at zero-based `index` may become an entity
    pub fn allows_item(&self, index: usize) -> bool {
        index < self.max_items
    }

    /// Check whether a fragment is too small to be worth a node
    pub fn is_trivial(&self, fragment: &str) -> bool {
        fragment.trim().chars().count() < self.min_content_len
    }

    /// Keep at most `max_items` entries of a list
    pub fn cap<T>(&self, mut items: Vec<T>) -> Vec<T> {
        items.truncate(self.max_items);
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_content_untouched() {
        let policy = ChunkingPolicy::default();
        assert_eq!(policy.truncate("body { margin: 0 }"), "body { margin: 0 }");
    }

    #[test]
    fn test_truncation_respects_ceiling_and_marker() {
        let policy = ChunkingPolicy {
            content_ceiling: 20,
            ..Default::default()
        };
        let truncated = policy.truncate(&"x".repeat(100));
        assert_eq!(truncated.len(), 20);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncation_on_char_boundary() {
        let policy = ChunkingPolicy {
            content_ceiling: 10,
            ..Default::default()
        };
        let truncated = policy.truncate("ééééééééééééé");
        assert!(truncated.len() <= 10);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_tiny_ceiling_never_exceeded() {
        for ceiling in 0..=4 {
            let policy = ChunkingPolicy {
                content_ceiling: ceiling,
                ..Default::default()
            };
            let truncated = policy.truncate("abcdefgh");
            assert!(truncated.len() <= ceiling, "ceiling {} gave {:?}", ceiling, truncated);
        }
    }

    #[test]
    fn test_depth_and_items() {
        let policy = ChunkingPolicy::default();
        assert!(policy.allows_depth(DEFAULT_MAX_DEPTH));
        assert!(!policy.allows_depth(DEFAULT_MAX_DEPTH + 1));
        assert!(policy.allows_item(99));
        assert!(!policy.allows_item(100));
        assert_eq!(policy.cap((0..1000).collect::<Vec<_>>()).len(), 100);
    }

    #[test]
    fn test_trivial_fragments() {
        let policy = ChunkingPolicy::default();
        assert!(policy.is_trivial("  "));
        assert!(policy.is_trivial("a\n"));
        assert!(!policy.is_trivial("abc"));
    }
}

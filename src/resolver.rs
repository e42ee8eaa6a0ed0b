//! Relationship resolver - shared name normalization and edge post-processing
//!
//! The resolver never joins names to entities; edges stay name-keyed. It only
//! makes the names every strategy emits look alike and collapses duplicates,
//! so each strategy does not re-implement trimming and case rules.

use crate::adapter::ParseResult;
use crate::entity::MetaValue;
use crate::policy::ChunkingPolicy;
use crate::relationship::{Relationship, RelationshipKind};
use std::collections::HashMap;

/// Receivers that refer to the enclosing instance rather than a type
const SELF_RECEIVERS: &[&str] = &["this.", "self.", "base.", "super.", "me."];

/// Keyword prefixes that are not part of a callee name
const CALLEE_PREFIXES: &[&str] = &["await ", "new ", "yield ", "go ", "defer "];

/// Trim, strip one pair of surrounding quotes/backticks, collapse whitespace.
pub fn normalize_name(raw: &str) -> String {
    let mut name = raw.trim();
    for quote in ['"', '\'', '`'] {
        if name.len() >= 2 && name.starts_with(quote) && name.ends_with(quote) {
            name = &name[1..name.len() - 1];
            break;
        }
    }
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize the literal callee text of a call expression.
///
/// `await this.repo.Save<Order>()` becomes `repo.Save`; no attempt is made
/// to resolve aliases or overloads.
pub fn normalize_callee(raw: &str) -> String {
    let mut name = normalize_name(raw);

    loop {
        let before = name.len();
        for prefix in CALLEE_PREFIXES {
            if let Some(rest) = name.strip_prefix(prefix) {
                name = rest.trim_start().to_string();
            }
        }
        if name.len() == before {
            break;
        }
    }

    name = strip_generics(&name);
    // Parameter lists and optional-chaining noise
    if let Some(paren) = name.find('(') {
        name.truncate(paren);
    }
    name = name.replace("?.", ".").replace("!.", ".");
    name = name.trim_end_matches(['!', '?', '.']).trim().to_string();
    // Multi-line member chains: `builder\n  .add()` collapses to `builder .add`
    name = name.replace(" .", ".").replace(". ", ".");

    for receiver in SELF_RECEIVERS {
        if let Some(rest) = name.strip_prefix(receiver) {
            if !rest.is_empty() {
                name = rest.to_string();
            }
            break;
        }
    }
    name
}

/// Normalize a type reference: drop generic arguments, nullable and array
/// markers, pointer/reference sigils.
pub fn normalize_type(raw: &str) -> String {
    let name = normalize_name(raw);
    let name = strip_generics(&name);
    name.trim_start_matches(['&', '*'])
        .trim_start_matches("mut ")
        .trim_end_matches(['?', '*'])
        .trim_end_matches("[]")
        .trim()
        .to_string()
}

/// Key used for case-insensitive exclusion matching of a file name
pub fn exclusion_key(file_name: &str) -> String {
    file_name.trim().to_lowercase()
}

/// Remove every `<...>` generic argument list, tolerating unbalanced input
fn strip_generics(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut depth = 0usize;
    for c in name.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Normalize one relationship's endpoints according to its kind
fn normalize_relationship(mut rel: Relationship) -> Relationship {
    rel.from_name = normalize_name(&rel.from_name);
    rel.to_name = match rel.kind {
        RelationshipKind::Calls => normalize_callee(&rel.to_name),
        RelationshipKind::Inherits
        | RelationshipKind::Implements
        | RelationshipKind::Catches
        | RelationshipKind::Throws
        | RelationshipKind::ReturnsType => normalize_type(&rel.to_name),
        _ => normalize_name(&rel.to_name),
    };
    rel
}

/// Normalize, filter and de-duplicate relationships.
///
/// Duplicates on `(from, to, kind)` keep the first occurrence; when a
/// relationship was seen more than once it gains an `occurrences` count.
pub fn resolve_relationships(relationships: Vec<Relationship>) -> Vec<Relationship> {
    let mut resolved: Vec<Relationship> = Vec::with_capacity(relationships.len());
    let mut seen: HashMap<(String, String, RelationshipKind), usize> = HashMap::new();

    for rel in relationships.into_iter().map(normalize_relationship) {
        if rel.from_name.is_empty() || rel.to_name.is_empty() {
            tracing::trace!("dropping relationship with empty endpoint: {:?}", rel.kind);
            continue;
        }

        let key = (rel.from_name.clone(), rel.to_name.clone(), rel.kind);
        match seen.get(&key) {
            Some(&index) => {
                let entry = resolved[index]
                    .properties
                    .entry("occurrences".to_string())
                    .or_insert(MetaValue::Int(1));
                if let MetaValue::Int(count) = entry {
                    *count += 1;
                }
            }
            None => {
                seen.insert(key, resolved.len());
                resolved.push(rel);
            }
        }
    }

    resolved
}

/// Post-process a strategy's result before it leaves the dispatcher.
///
/// Re-applies the content ceiling to every entity so the bound holds even for
/// a strategy that forgot it, and resolves the relationships.
pub fn finalize(mut result: ParseResult, policy: &ChunkingPolicy) -> ParseResult {
    for entity in &mut result.entities {
        if policy.exceeds_ceiling(&entity.content) {
            entity.content = policy.truncate(&entity.content);
        }
        entity.name = normalize_name(&entity.name);
    }
    result.relationships = resolve_relationships(std::mem::take(&mut result.relationships));
    result
}

//! Relationship types - the edge half of the ingestion graph
//!
//! Edges are keyed by entity *name*, not by identity. A relationship may point
//! at a name that no strategy emitted in this pass (an external package, a
//! framework base class); joining names to nodes happens downstream over the
//! aggregated graph.

use crate::entity::{MetaValue, Metadata};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Universal relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationshipKind {
    Imports,
    Inherits,
    Implements,
    Calls,
    Defines,
    DependsOn,
    Catches,
    Throws,
    HasAttribute,
    Uses,
    ReturnsType,
}

impl RelationshipKind {
    /// Get the string representation of the relationship kind
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Imports => "Imports",
            RelationshipKind::Inherits => "Inherits",
            RelationshipKind::Implements => "Implements",
            RelationshipKind::Calls => "Calls",
            RelationshipKind::Defines => "Defines",
            RelationshipKind::DependsOn => "DependsOn",
            RelationshipKind::Catches => "Catches",
            RelationshipKind::Throws => "Throws",
            RelationshipKind::HasAttribute => "HasAttribute",
            RelationshipKind::Uses => "Uses",
            RelationshipKind::ReturnsType => "ReturnsType",
        }
    }

    /// Get all relationship kinds
    pub fn all() -> &'static [RelationshipKind] {
        &[
            RelationshipKind::Imports,
            RelationshipKind::Inherits,
            RelationshipKind::Implements,
            RelationshipKind::Calls,
            RelationshipKind::Defines,
            RelationshipKind::DependsOn,
            RelationshipKind::Catches,
            RelationshipKind::Throws,
            RelationshipKind::HasAttribute,
            RelationshipKind::Uses,
            RelationshipKind::ReturnsType,
        ]
    }

    /// Check if this relationship implies a dependency on the target
    pub fn is_dependency(&self) -> bool {
        matches!(
            self,
            RelationshipKind::Imports
                | RelationshipKind::Inherits
                | RelationshipKind::Implements
                | RelationshipKind::Calls
                | RelationshipKind::DependsOn
                | RelationshipKind::Uses
        )
    }
}

impl FromStr for RelationshipKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "imports" | "import" => Ok(RelationshipKind::Imports),
            "inherits" | "inherit" | "extends" => Ok(RelationshipKind::Inherits),
            "implements" | "implement" => Ok(RelationshipKind::Implements),
            "calls" | "call" => Ok(RelationshipKind::Calls),
            "defines" | "define" | "contains" => Ok(RelationshipKind::Defines),
            "dependson" | "depends" | "dependency" => Ok(RelationshipKind::DependsOn),
            "catches" | "catch" => Ok(RelationshipKind::Catches),
            "throws" | "throw" | "raises" => Ok(RelationshipKind::Throws),
            "hasattribute" | "attribute" | "decorator" | "annotation" => {
                Ok(RelationshipKind::HasAttribute)
            }
            "uses" | "use" | "references" => Ok(RelationshipKind::Uses),
            "returnstype" | "returns" => Ok(RelationshipKind::ReturnsType),
            _ => Err(crate::Error::Parse(format!("Unknown relationship kind: {}", s))),
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named, directed association between two entities.
///
/// `from_name` and `to_name` are non-owning, name-based references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Name of the source entity
    pub from_name: String,
    /// Name of the target entity (may not exist in this pass)
    pub to_name: String,
    /// Type of relationship
    pub kind: RelationshipKind,
    /// Logical grouping label, same as for entities
    pub context: String,
    /// Edge-specific detail: versions, line numbers, qualifiers
    pub properties: Metadata,
}

impl Relationship {
    /// Create a new relationship without properties
    pub fn new(
        from_name: impl Into<String>,
        to_name: impl Into<String>,
        kind: RelationshipKind,
        context: impl Into<String>,
    ) -> Self {
        Self {
            from_name: from_name.into(),
            to_name: to_name.into(),
            kind,
            context: context.into(),
            properties: Metadata::new(),
        }
    }

    /// Attach one property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Attach the source line the relationship was found on
    pub fn at_line(self, line: u32) -> Self {
        self.with_property("line", line)
    }

    /// Identity used for de-duplication
    pub fn key(&self) -> (&str, &str, RelationshipKind) {
        (&self.from_name, &self.to_name, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_kind_roundtrip() {
        for kind in RelationshipKind::all() {
            let parsed: RelationshipKind = kind.as_str().parse().unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn test_relationship_kind_aliases() {
        assert_eq!(
            RelationshipKind::from_str("depends_on").unwrap(),
            RelationshipKind::DependsOn
        );
        assert_eq!(
            RelationshipKind::from_str("HAS_ATTRIBUTE").unwrap(),
            RelationshipKind::HasAttribute
        );
        assert_eq!(RelationshipKind::from_str("raises").unwrap(), RelationshipKind::Throws);
        assert!(RelationshipKind::from_str("teleports").is_err());
    }

    #[test]
    fn test_relationship_builder() {
        let rel = Relationship::new("package.json", "react", RelationshipKind::DependsOn, "web")
            .with_property("version", "^18.2.0")
            .at_line(7);

        assert_eq!(rel.key(), ("package.json", "react", RelationshipKind::DependsOn));
        assert_eq!(rel.properties.get("line"), Some(&MetaValue::Int(7)));
        assert!(rel.kind.is_dependency());
    }
}

use serde::{Deserialize, Serialize};

/// Wildcard id accepted by tombstones to clear a whole collection.
pub const WILDCARD_ID: &str = "*";

///
/// RefKind
///
/// Discriminant of a tagged reference. Kind bytes are part of the canonical
/// hash encoding and must remain fixed.
///

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum RefKind {
    /// Link to a stored entity.
    Entity = 1,
    /// Collection-merge removal marker.
    Tombstone = 2,
    /// Transaction-level removal sentinel.
    Retract = 3,
}

impl RefKind {
    /// Stable wire/hash byte for this kind.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Tombstone => "tombstone",
            Self::Retract => "retract",
        }
    }
}

///
/// Reference
///
/// A tagged `(kind, id)` pair replacing a nested entity in storage. Plain
/// input objects with an `id` become entity references once normalized.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    kind: RefKind,
    id: String,
}

impl Reference {
    #[must_use]
    pub fn new(kind: RefKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Build a reference to a stored entity.
    #[must_use]
    pub fn entity(id: impl Into<String>) -> Self {
        Self::new(RefKind::Entity, id)
    }

    /// Build a collection-merge removal marker.
    #[must_use]
    pub fn tombstone(id: impl Into<String>) -> Self {
        Self::new(RefKind::Tombstone, id)
    }

    /// Build a transaction-level removal sentinel.
    #[must_use]
    pub fn retract(id: impl Into<String>) -> Self {
        Self::new(RefKind::Retract, id)
    }

    #[must_use]
    pub const fn kind(&self) -> RefKind {
        self.kind
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn is_entity(&self) -> bool {
        matches!(self.kind, RefKind::Entity)
    }

    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        matches!(self.kind, RefKind::Tombstone)
    }

    #[must_use]
    pub const fn is_retract(&self) -> bool {
        matches!(self.kind, RefKind::Retract)
    }

    /// Returns true when the id is the collection-clearing wildcard.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.id == WILDCARD_ID
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factories_tag_the_expected_kind() {
        assert!(Reference::entity("a").is_entity());
        assert!(Reference::tombstone("a").is_tombstone());
        assert!(Reference::retract("a").is_retract());
    }

    #[test]
    fn wildcard_is_id_based() {
        assert!(Reference::tombstone(WILDCARD_ID).is_wildcard());
        assert!(!Reference::tombstone("a").is_wildcard());
    }

    #[test]
    fn kind_bytes_are_frozen() {
        assert_eq!(RefKind::Entity.to_u8(), 1);
        assert_eq!(RefKind::Tombstone.to_u8(), 2);
        assert_eq!(RefKind::Retract.to_u8(), 3);
    }
}

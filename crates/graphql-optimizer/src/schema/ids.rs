use serde::{Deserialize, Serialize};

/// Index of an entity in the [`super::SchemaRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub(crate) u32);

impl From<EntityId> for u32 {
    fn from(value: EntityId) -> Self {
        value.0
    }
}

impl EntityId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a relation in the [`super::SchemaRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationId(pub(crate) u32);

impl From<RelationId> for u32 {
    fn from(value: RelationId) -> Self {
        value.0
    }
}

impl RelationId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

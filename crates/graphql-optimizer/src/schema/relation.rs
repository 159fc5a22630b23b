//! Relation metadata - how one entity reaches another

use serde::{Deserialize, Serialize};

use super::ids::EntityId;

/// Defines the kind of a relation between two entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// Foreign key on this entity pointing at the target (belongsTo)
    ToOneForward,
    /// Unique foreign key on the target pointing back at this entity (hasOne)
    ToOneReverse,
    /// Many-to-many through a pivot table declared on this entity
    ToManyForward,
    /// Foreign key on the target pointing back at this entity (hasMany)
    ToManyReverse,
}

impl RelationKind {
    /// Returns true if this relation yields at most one row per parent and
    /// can be fetched in the parent's statement with a join
    pub fn is_to_one(self) -> bool {
        matches!(self, Self::ToOneForward | Self::ToOneReverse)
    }

    /// Returns true if this relation yields a collection and needs a prefetch
    pub fn is_to_many(self) -> bool {
        !self.is_to_one()
    }

    /// Returns true if the foreign key lives on the target entity
    pub fn is_reverse(self) -> bool {
        matches!(self, Self::ToOneReverse | Self::ToManyReverse)
    }

    /// Returns true if this relation requires a pivot table
    pub fn requires_pivot(self) -> bool {
        matches!(self, Self::ToManyForward)
    }
}

/// Pivot table of a many-to-many relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughTable {
    /// Pivot table name
    pub table: String,
    /// Pivot column referencing the source entity
    pub source_column: String,
    /// Pivot column referencing the target entity
    pub target_column: String,
}

impl ThroughTable {
    pub fn new(
        table: impl Into<String>,
        source_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            source_column: source_column.into(),
            target_column: target_column.into(),
        }
    }
}

/// Static metadata for a single relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    /// Relation name on the source model; plans merge on this name
    pub name: String,
    pub kind: RelationKind,
    pub source: EntityId,
    pub target: EntityId,
    /// Foreign key column on the source entity (to-one forward)
    pub local_column: Option<String>,
    /// Foreign key column on the target entity referencing the source (reverse kinds)
    pub remote_column: Option<String>,
    /// Pivot table (to-many forward)
    pub through: Option<ThroughTable>,
}

impl RelationDescriptor {
    /// Check that the key columns present match what the relation kind needs.
    /// Returns a description of the inconsistency, if any.
    pub(crate) fn inconsistency(&self) -> Option<String> {
        match self.kind {
            RelationKind::ToOneForward if self.local_column.is_none() => Some(
                "to-one forward relation has no local foreign key column".to_string(),
            ),
            RelationKind::ToOneReverse | RelationKind::ToManyReverse
                if self.remote_column.is_none() =>
            {
                Some(format!(
                    "{:?} relation has no back-reference column on the target",
                    self.kind
                ))
            }
            RelationKind::ToManyForward if self.through.is_none() => {
                Some("to-many forward relation has no pivot table".to_string())
            }
            _ => None,
        }
    }

    /// Column on the prefetched rows used to re-associate them with their parents
    pub fn partition_column(&self) -> Option<&str> {
        match self.kind {
            RelationKind::ToManyReverse | RelationKind::ToOneReverse => {
                self.remote_column.as_deref()
            }
            RelationKind::ToManyForward => {
                self.through.as_ref().map(|through| through.source_column.as_str())
            }
            RelationKind::ToOneForward => None,
        }
    }
}

/// Relation as declared through the schema builder, before entity names are resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    pub(crate) name: String,
    pub(crate) kind: RelationKind,
    pub(crate) target: String,
    pub(crate) local_column: Option<String>,
    pub(crate) remote_column: Option<String>,
    pub(crate) through: Option<ThroughTable>,
}

impl RelationSpec {
    /// A relation of any kind with no key columns; finish it with the `with_*` methods
    pub fn new(name: impl Into<String>, kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            local_column: None,
            remote_column: None,
            through: None,
        }
    }

    /// `book.author_id -> author.id`
    pub fn to_one_forward(
        name: impl Into<String>,
        target: impl Into<String>,
        local_column: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationKind::ToOneForward, target).with_local_column(local_column)
    }

    /// `user <- profile.user_id` (unique)
    pub fn to_one_reverse(
        name: impl Into<String>,
        target: impl Into<String>,
        remote_column: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationKind::ToOneReverse, target).with_remote_column(remote_column)
    }

    /// `book <- book_tags -> tag`
    pub fn to_many_forward(
        name: impl Into<String>,
        target: impl Into<String>,
        through: ThroughTable,
    ) -> Self {
        Self::new(name, RelationKind::ToManyForward, target).with_through(through)
    }

    /// `book <- review.book_id`
    pub fn to_many_reverse(
        name: impl Into<String>,
        target: impl Into<String>,
        remote_column: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationKind::ToManyReverse, target).with_remote_column(remote_column)
    }

    pub fn with_local_column(mut self, column: impl Into<String>) -> Self {
        self.local_column = Some(column.into());
        self
    }

    pub fn with_remote_column(mut self, column: impl Into<String>) -> Self {
        self.remote_column = Some(column.into());
        self
    }

    pub fn with_through(mut self, through: ThroughTable) -> Self {
        self.through = Some(through);
        self
    }
}

//! Entity metadata - one GraphQL object type backed by one table

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::ids::{EntityId, RelationId};
use crate::plan::OrderBy;

/// How a GraphQL field on an entity is backed by the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Plain column
    Column(String),
    /// Resolver reading several columns of the same row
    Columns(Vec<String>),
    /// Computed in SQL and attached to each row under the field's name
    Annotation { expression: String },
    /// Resolved without database input
    Resolver,
    /// Another entity reached through a relation
    Relation {
        relation: RelationId,
        /// Relay connection shape (`edges { node { .. } }`) instead of a plain list
        connection: bool,
    },
}

/// A GraphQL field declared on an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// GraphQL field name
    pub name: String,
    pub kind: FieldKind,
}

/// An entity: its GraphQL type, its table and its fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub(crate) id: EntityId,
    /// GraphQL object type name
    pub(crate) name: String,
    pub(crate) table: String,
    /// Ordered primary key columns
    pub(crate) primary_key: Vec<String>,
    /// Interfaces the object type implements
    pub(crate) implements: Vec<String>,
    /// Ordering applied to paginated prefetches without an explicit `orderBy`
    pub(crate) default_ordering: Vec<OrderBy>,
    /// Keyed by GraphQL field name
    pub(crate) fields: IndexMap<String, FieldDescriptor>,
}

impl EntityDefinition {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn implements(&self) -> &[String] {
        &self.implements
    }

    pub fn default_ordering(&self) -> &[OrderBy] {
        &self.default_ordering
    }

    /// Look up a field by its GraphQL name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl ExactSizeIterator<Item = &FieldDescriptor> + '_ {
        self.fields.values()
    }

    /// Find the column backing a GraphQL field name, for ordering arguments
    pub fn column_for_field(&self, name: &str) -> Option<&str> {
        match &self.fields.get(name)?.kind {
            FieldKind::Column(column) => Some(column),
            _ => None,
        }
    }

    /// Returns true if a fragment type condition applies to this entity
    pub fn matches_type_condition(&self, type_name: &str) -> bool {
        self.name == type_name || self.implements.iter().any(|name| name == type_name)
    }

    /// Concrete type name of this entity's relay connection
    pub fn connection_type_name(&self) -> String {
        format!("{}Connection", self.name)
    }

    /// Concrete type name of this entity's relay edge
    pub fn edge_type_name(&self) -> String {
        format!("{}Edge", self.name)
    }
}

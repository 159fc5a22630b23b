//! Schema metadata consumed from the ORM mapping layer

pub mod entity;
pub mod ids;
pub mod registry;
pub mod relation;

pub use entity::{EntityDefinition, FieldDescriptor, FieldKind};
pub use ids::{EntityId, RelationId};
pub use registry::{EntityBuilder, SchemaRegistry, SchemaRegistryBuilder};
pub use relation::{RelationDescriptor, RelationKind, RelationSpec, ThroughTable};

//! Relation classifier
//!
//! Maps a selected field name to what the plan builder must do with it, using
//! only the static schema metadata.

use crate::error::{OptimizerError, OptimizerResult};
use crate::schema::{
    EntityDefinition, FieldKind, RelationDescriptor, RelationId, RelationKind, SchemaRegistry,
};

/// What a selected field needs from the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass<'a> {
    /// Add the column to the projection
    Column(&'a str),
    /// Add every column to the projection
    Columns(&'a [String]),
    /// Compute the expression in SQL
    Annotation(&'a str),
    /// Nothing to fetch
    Resolver,
    /// Join or prefetch the related entity
    Relation {
        id: RelationId,
        descriptor: &'a RelationDescriptor,
        connection: bool,
    },
}

/// Relation kind of `field_name` on `entity`, or `None` for fields that need
/// neither a join nor a prefetch
pub fn classify(
    field_name: &str,
    entity: &EntityDefinition,
    schema: &SchemaRegistry,
) -> OptimizerResult<Option<RelationKind>> {
    match classify_field(field_name, entity, schema)? {
        FieldClass::Relation { descriptor, .. } => Ok(Some(descriptor.kind)),
        _ => Ok(None),
    }
}

/// Classify a selected field, validating relation metadata on the way
pub fn classify_field<'a>(
    field_name: &str,
    entity: &'a EntityDefinition,
    schema: &'a SchemaRegistry,
) -> OptimizerResult<FieldClass<'a>> {
    let field = entity
        .field(field_name)
        .ok_or_else(|| OptimizerError::UnknownField {
            entity: entity.name().to_string(),
            field: field_name.to_string(),
        })?;

    let class = match &field.kind {
        FieldKind::Column(column) => FieldClass::Column(column),
        FieldKind::Columns(columns) => FieldClass::Columns(columns),
        FieldKind::Annotation { expression } => FieldClass::Annotation(expression),
        FieldKind::Resolver => FieldClass::Resolver,
        FieldKind::Relation {
            relation,
            connection,
        } => {
            let descriptor = schema.relation(*relation);

            if descriptor.source != entity.id() {
                return Err(OptimizerError::metadata(
                    entity.name(),
                    field_name,
                    format!(
                        "relation '{}' belongs to '{}'",
                        descriptor.name,
                        schema.entity(descriptor.source).name()
                    ),
                ));
            }

            if let Some(message) = descriptor.inconsistency() {
                return Err(OptimizerError::metadata(entity.name(), field_name, message));
            }

            if *connection && descriptor.kind.is_to_one() {
                return Err(OptimizerError::metadata(
                    entity.name(),
                    field_name,
                    "a to-one relation cannot be exposed as a connection",
                ));
            }

            FieldClass::Relation {
                id: *relation,
                descriptor,
                connection: *connection,
            }
        }
    };

    Ok(class)
}

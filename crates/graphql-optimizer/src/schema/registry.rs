//! Schema registry - read-only, index-addressed entity and relation metadata
//!
//! The registry is populated once through [`SchemaRegistryBuilder`] and never
//! mutated afterwards. Entities and relations refer to each other through
//! [`EntityId`] and [`RelationId`] indexes, so self-referential and mutually
//! recursive models need no shared ownership.

use std::collections::HashMap;

use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use super::entity::{EntityDefinition, FieldDescriptor, FieldKind};
use super::ids::{EntityId, RelationId};
use super::relation::{RelationDescriptor, RelationSpec};
use crate::error::{OptimizerError, OptimizerResult};
use crate::plan::OrderBy;

/// Entity and relation metadata for every GraphQL type backed by a table
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    entities: Vec<EntityDefinition>,
    relations: Vec<RelationDescriptor>,
    by_name: HashMap<String, EntityId>,
    /// Cyclic component of each entity, indexed by entity id
    cycles: Vec<Option<usize>>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::new()
    }

    pub fn entity(&self, id: EntityId) -> &EntityDefinition {
        &self.entities[id.index()]
    }

    pub fn relation(&self, id: RelationId) -> &RelationDescriptor {
        &self.relations[id.index()]
    }

    /// Find an entity by its GraphQL type name
    pub fn find_entity(&self, name: &str) -> Option<&EntityDefinition> {
        self.by_name.get(name).map(|id| self.entity(*id))
    }

    pub fn entities(&self) -> impl ExactSizeIterator<Item = &EntityDefinition> + '_ {
        self.entities.iter()
    }

    pub fn relations(&self) -> impl ExactSizeIterator<Item = &RelationDescriptor> + '_ {
        self.relations.iter()
    }

    /// Returns true if the entity can reach itself through relations
    pub fn is_cyclic(&self, id: EntityId) -> bool {
        self.cycles[id.index()].is_some()
    }

    /// The strongly connected component with a cycle the entity belongs to.
    /// Entities reachable from each other share a component.
    pub fn cycle_of(&self, id: EntityId) -> Option<usize> {
        self.cycles[id.index()]
    }

    /// Returns true if both entities lie on the same cycle of relations
    pub fn same_cycle(&self, source: EntityId, target: EntityId) -> bool {
        match (self.cycle_of(source), self.cycle_of(target)) {
            (Some(source), Some(target)) => source == target,
            _ => false,
        }
    }

    /// Returns true if any entity can reach itself through relations
    pub fn has_cycles(&self) -> bool {
        self.cycles.iter().any(Option::is_some)
    }
}

#[derive(Debug, Clone)]
enum PendingField {
    Ready(FieldKind),
    Relation { spec: RelationSpec, connection: bool },
}

/// Declares one entity; obtained from [`SchemaRegistryBuilder::entity`]
#[derive(Debug, Clone)]
pub struct EntityBuilder {
    name: String,
    table: String,
    primary_key: Vec<String>,
    implements: Vec<String>,
    default_ordering: Vec<String>,
    fields: IndexMap<String, PendingField>,
}

impl EntityBuilder {
    fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            primary_key: vec!["id".to_string()],
            implements: Vec::new(),
            default_ordering: Vec::new(),
            fields: IndexMap::new(),
        }
    }

    /// Set the primary key columns (defaults to `id`)
    pub fn primary_key<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Declare an interface the object type implements
    pub fn implements(&mut self, interface: &str) -> &mut Self {
        self.implements.push(interface.to_string());
        self
    }

    /// Default ordering as column names, `-` prefix for descending
    pub fn ordering<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_ordering = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn column(&mut self, field: &str, column: &str) -> &mut Self {
        self.ready(field, FieldKind::Column(column.to_string()))
    }

    pub fn columns<I, S>(&mut self, field: &str, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.into_iter().map(Into::into).collect();
        self.ready(field, FieldKind::Columns(columns))
    }

    pub fn annotation(&mut self, field: &str, expression: &str) -> &mut Self {
        self.ready(
            field,
            FieldKind::Annotation {
                expression: expression.to_string(),
            },
        )
    }

    pub fn resolver(&mut self, field: &str) -> &mut Self {
        self.ready(field, FieldKind::Resolver)
    }

    /// Relation exposed as a plain object or list field
    pub fn relation(&mut self, field: &str, spec: RelationSpec) -> &mut Self {
        self.fields.insert(
            field.to_string(),
            PendingField::Relation {
                spec,
                connection: false,
            },
        );
        self
    }

    /// Relation exposed as a relay connection field
    pub fn connection(&mut self, field: &str, spec: RelationSpec) -> &mut Self {
        self.fields.insert(
            field.to_string(),
            PendingField::Relation {
                spec,
                connection: true,
            },
        );
        self
    }

    fn ready(&mut self, field: &str, kind: FieldKind) -> &mut Self {
        self.fields.insert(field.to_string(), PendingField::Ready(kind));
        self
    }
}

/// Builder for [`SchemaRegistry`]
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistryBuilder {
    entities: Vec<EntityBuilder>,
}

impl SchemaRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entity, or continue declaring one with the same GraphQL name
    pub fn entity(&mut self, name: &str, table: &str) -> &mut EntityBuilder {
        let position = match self.entities.iter().position(|entity| entity.name == name) {
            Some(position) => position,
            None => {
                self.entities.push(EntityBuilder::new(name, table));
                self.entities.len() - 1
            }
        };

        &mut self.entities[position]
    }

    /// Resolve entity names and relation targets, and detect cycles
    pub fn build(self) -> OptimizerResult<SchemaRegistry> {
        let by_name: HashMap<String, EntityId> = self
            .entities
            .iter()
            .enumerate()
            .map(|(index, entity)| (entity.name.clone(), EntityId(index as u32)))
            .collect();

        let mut entities = Vec::with_capacity(self.entities.len());
        let mut relations: Vec<RelationDescriptor> = Vec::new();
        let mut relation_index: HashMap<(EntityId, String), RelationId> = HashMap::new();

        for (index, builder) in self.entities.into_iter().enumerate() {
            let source = EntityId(index as u32);

            if builder.primary_key.is_empty() {
                return Err(OptimizerError::metadata(
                    &builder.name,
                    "<primary key>",
                    "entity declares no primary key columns",
                ));
            }

            let mut fields = IndexMap::with_capacity(builder.fields.len());

            for (field_name, pending) in builder.fields {
                let kind = match pending {
                    PendingField::Ready(kind) => kind,
                    PendingField::Relation { spec, connection } => {
                        let target = *by_name.get(&spec.target).ok_or_else(|| {
                            OptimizerError::metadata(
                                &builder.name,
                                &field_name,
                                format!("relation targets unknown entity '{}'", spec.target),
                            )
                        })?;

                        let descriptor = RelationDescriptor {
                            name: spec.name.clone(),
                            kind: spec.kind,
                            source,
                            target,
                            local_column: spec.local_column,
                            remote_column: spec.remote_column,
                            through: spec.through,
                        };

                        let existing = relation_index.get(&(source, spec.name.clone())).copied();
                        let relation = match existing {
                            Some(existing) if relations[existing.index()] == descriptor => existing,
                            Some(_) => {
                                return Err(OptimizerError::metadata(
                                    &builder.name,
                                    &field_name,
                                    format!(
                                        "relation '{}' is declared twice with different metadata",
                                        spec.name
                                    ),
                                ));
                            }
                            None => {
                                let id = RelationId(relations.len() as u32);
                                relations.push(descriptor);
                                relation_index.insert((source, spec.name), id);
                                id
                            }
                        };

                        FieldKind::Relation {
                            relation,
                            connection,
                        }
                    }
                };

                fields.insert(
                    field_name.clone(),
                    FieldDescriptor {
                        name: field_name,
                        kind,
                    },
                );
            }

            entities.push(EntityDefinition {
                id: source,
                name: builder.name,
                table: builder.table,
                primary_key: builder.primary_key,
                implements: builder.implements,
                default_ordering: builder
                    .default_ordering
                    .iter()
                    .map(|column| OrderBy::parse(column))
                    .collect(),
                fields,
            });
        }

        let cycles = detect_cycles(entities.len(), &relations);

        tracing::debug!(
            "Schema registry built with {} entities and {} relations (cyclic: {})",
            entities.len(),
            relations.len(),
            cycles.iter().filter(|cycle| cycle.is_some()).count()
        );

        Ok(SchemaRegistry {
            entities,
            relations,
            by_name,
            cycles,
        })
    }
}

/// Number every strongly connected component with a cycle (either more than
/// one member, or a self-referential relation) and tag its members with it.
fn detect_cycles(entity_count: usize, relations: &[RelationDescriptor]) -> Vec<Option<usize>> {
    let mut graph = DiGraph::<(), ()>::with_capacity(entity_count, relations.len());
    for _ in 0..entity_count {
        graph.add_node(());
    }

    for relation in relations {
        graph.add_edge(
            NodeIndex::new(relation.source.index()),
            NodeIndex::new(relation.target.index()),
            (),
        );
    }

    let mut cycles = vec![None; entity_count];
    for (index, component) in tarjan_scc(&graph).into_iter().enumerate() {
        let self_loop = component.len() == 1 && graph.contains_edge(component[0], component[0]);
        if component.len() > 1 || self_loop {
            for node in component {
                cycles[node.index()] = Some(index);
            }
        }
    }

    cycles
}

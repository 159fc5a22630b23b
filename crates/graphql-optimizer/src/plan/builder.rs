//! Plan builder
//!
//! Composes a [`QueryPlan`] tree depth-first: every child plan is complete
//! before it is attached to its parent, and siblings on the same relation are
//! merged rather than duplicated.

use super::directive::QueryDirective;
use super::query::{Join, Prefetch, QueryPlan};
use crate::classifier::{classify_field, FieldClass};
use crate::config::OptimizerConfig;
use crate::error::{OptimizerError, OptimizerResult};
use crate::schema::{EntityDefinition, EntityId, RelationDescriptor, RelationId, RelationKind, SchemaRegistry};
use crate::selection::{FieldShape, SelectionNode};

/// A plan together with the row selection of the field it was built for
#[derive(Debug, Clone)]
pub struct BuiltPlan {
    pub plan: QueryPlan,
    pub directive: QueryDirective,
    /// A `totalCount` was selected on the connection
    pub with_count: bool,
}

/// Builds query plans against one schema and configuration
#[derive(Debug, Clone, Copy)]
pub struct PlanBuilder<'a> {
    schema: &'a SchemaRegistry,
    config: &'a OptimizerConfig,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(schema: &'a SchemaRegistry, config: &'a OptimizerConfig) -> Self {
        Self { schema, config }
    }

    /// Build the plan for a field returning `entity` as an object or plain list
    pub fn build(&self, selection: &SelectionNode, entity: EntityId) -> OptimizerResult<QueryPlan> {
        self.build_field(selection, entity, FieldShape::Entity)
            .map(|built| built.plan)
    }

    /// Build the plan and the field's own directive for a field of any shape
    pub fn build_field(
        &self,
        selection: &SelectionNode,
        entity: EntityId,
        shape: FieldShape,
    ) -> OptimizerResult<BuiltPlan> {
        let built = self.build_at(selection, entity, shape, 0)?;

        let complexity = built.plan.relation_count();
        if complexity > *self.config.get_max_complexity() {
            return Err(OptimizerError::ComplexityExceeded {
                complexity,
                max: *self.config.get_max_complexity(),
            });
        }

        tracing::debug!(
            "Built plan for '{}' on {} with {} relations ({})",
            selection.response_key(),
            built.plan.entity_name(),
            complexity,
            built.plan.fingerprint()
        );

        Ok(built)
    }

    fn build_at(
        &self,
        selection: &SelectionNode,
        entity: EntityId,
        shape: FieldShape,
        depth: usize,
    ) -> OptimizerResult<BuiltPlan> {
        let definition = self.schema.entity(entity);
        let directive = QueryDirective::from_arguments(
            &selection.arguments,
            definition,
            shape == FieldShape::Connection,
            *self.config.get_max_page_size(),
        )?;

        let mut plan = QueryPlan::new(definition);
        let mut with_count = false;

        match shape {
            FieldShape::Entity => self.collect(&mut plan, definition, &selection.children, depth)?,
            FieldShape::Connection => {
                for child in &selection.children {
                    match child.name.as_str() {
                        "edges" => {
                            for edge_child in &child.children {
                                match edge_child.name.as_str() {
                                    "node" => self.collect(
                                        &mut plan,
                                        definition,
                                        &edge_child.children,
                                        depth,
                                    )?,
                                    "cursor" => {}
                                    name if name.starts_with("__") => {}
                                    name => {
                                        return Err(OptimizerError::UnknownField {
                                            entity: definition.edge_type_name(),
                                            field: name.to_string(),
                                        })
                                    }
                                }
                            }
                        }
                        "totalCount" => with_count = true,
                        "pageInfo" => {}
                        name if name.starts_with("__") => {}
                        name => {
                            return Err(OptimizerError::UnknownField {
                                entity: definition.connection_type_name(),
                                field: name.to_string(),
                            })
                        }
                    }
                }
            }
        }

        Ok(BuiltPlan {
            plan,
            directive,
            with_count,
        })
    }

    fn collect(
        &self,
        plan: &mut QueryPlan,
        entity: &EntityDefinition,
        children: &[SelectionNode],
        depth: usize,
    ) -> OptimizerResult<()> {
        for child in children {
            // Introspection fields
            if child.name.starts_with("__") {
                continue;
            }

            match classify_field(&child.name, entity, self.schema)? {
                FieldClass::Column(column) => plan.add_column(column),
                FieldClass::Columns(columns) => {
                    for column in columns {
                        plan.add_column(column.as_str());
                    }
                }
                FieldClass::Annotation(expression) => plan.add_annotation(&child.name, expression),
                FieldClass::Resolver => {}
                FieldClass::Relation {
                    id,
                    descriptor,
                    connection,
                } => self.relation(plan, child, id, descriptor, connection, depth)?,
            }
        }

        Ok(())
    }

    fn relation(
        &self,
        plan: &mut QueryPlan,
        selection: &SelectionNode,
        id: RelationId,
        descriptor: &RelationDescriptor,
        connection: bool,
        depth: usize,
    ) -> OptimizerResult<()> {
        // Only consecutive hops inside one cycle count towards the limit
        let depth = if self.schema.same_cycle(descriptor.source, descriptor.target) {
            depth + 1
        } else if self.schema.is_cyclic(descriptor.target) {
            1
        } else {
            0
        };
        if depth > *self.config.get_max_cyclic_depth() {
            return Err(OptimizerError::RecursionLimit {
                entity: self.schema.entity(descriptor.target).name().to_string(),
                max: *self.config.get_max_cyclic_depth(),
            });
        }

        let shape = if connection {
            FieldShape::Connection
        } else {
            FieldShape::Entity
        };
        let BuiltPlan {
            plan: mut child,
            directive,
            with_count,
        } = self.build_at(selection, descriptor.target, shape, depth)?;

        // Key columns; presence is guaranteed by the classifier
        let partition_by = descriptor.partition_column().map(str::to_string);
        match descriptor.kind {
            RelationKind::ToOneForward => {
                if let Some(column) = &descriptor.local_column {
                    plan.add_column(column.as_str());
                }
            }
            RelationKind::ToOneReverse | RelationKind::ToManyReverse => {
                if let Some(column) = &descriptor.remote_column {
                    child.add_column(column.as_str());
                }
            }
            RelationKind::ToManyForward => {}
        }

        if descriptor.kind.is_to_one() {
            if !directive.is_empty() {
                return Err(OptimizerError::argument(
                    selection.arguments.keys().next().map_or("", String::as_str),
                    format!(
                        "to-one relation '{}' cannot filter, order or paginate its row",
                        descriptor.name
                    ),
                ));
            }

            plan.attach_join(
                &descriptor.name,
                Join {
                    relation: id,
                    partition_by,
                    plan: child,
                },
            )
        } else {
            plan.attach_prefetch(
                &descriptor.name,
                Prefetch {
                    relation: id,
                    partition_by,
                    directive,
                    with_count,
                    plan: child,
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfigBuilder;
    use crate::plan::{equivalent, OrderBy};
    use crate::schema::{RelationSpec, ThroughTable};
    use async_graphql_value::ConstValue;

    fn registry() -> SchemaRegistry {
        let mut builder = SchemaRegistry::builder();
        builder
            .entity("BookType", "books")
            .column("id", "id")
            .column("title", "title")
            .annotation("reviewCount", "COUNT(reviews.id)")
            .relation("author", RelationSpec::to_one_forward("author", "AuthorType", "author_id"))
            .relation("writer", RelationSpec::to_one_forward("author", "AuthorType", "author_id"))
            .relation("tags", RelationSpec::to_many_reverse("tags", "TagType", "book_id"))
            .relation(
                "shelves",
                RelationSpec::to_many_forward(
                    "shelves",
                    "ShelfType",
                    ThroughTable::new("book_shelves", "book_id", "shelf_id"),
                ),
            )
            .connection("reviews", RelationSpec::to_many_reverse("reviews", "ReviewType", "book_id"));
        builder
            .entity("AuthorType", "authors")
            .column("id", "id")
            .column("name", "name");
        builder
            .entity("TagType", "tags")
            .column("id", "id")
            .column("label", "label");
        builder.entity("ShelfType", "shelves").column("id", "id");
        builder
            .entity("ReviewType", "reviews")
            .ordering(["-id"])
            .column("id", "id")
            .column("rating", "rating");
        builder
            .entity("CategoryType", "categories")
            .column("id", "id")
            .relation("parent", RelationSpec::to_one_forward("parent", "CategoryType", "parent_id"));
        builder.build().unwrap()
    }

    fn book(registry: &SchemaRegistry) -> EntityId {
        registry.find_entity("BookType").unwrap().id()
    }

    fn columns(plan: &QueryPlan) -> Vec<&str> {
        plan.columns().collect()
    }

    #[test]
    fn test_to_one_forward_adds_foreign_key() {
        let registry = registry();
        let config = OptimizerConfig::default();
        let selection = SelectionNode::new("books")
            .with_fields(["id", "title"])
            .with_child(SelectionNode::new("author").with_fields(["id", "name"]));

        let plan = PlanBuilder::new(&registry, &config)
            .build(&selection, book(&registry))
            .unwrap();

        assert_eq!(columns(&plan), vec!["id", "title", "author_id"]);
        assert_eq!(columns(&plan.join("author").unwrap().plan), vec!["id", "name"]);
        assert!(plan.prefetches().is_empty());
    }

    #[test]
    fn test_to_many_reverse_adds_back_reference() {
        let registry = registry();
        let config = OptimizerConfig::default();
        let selection = SelectionNode::new("books")
            .with_fields(["id"])
            .with_child(SelectionNode::new("tags").with_fields(["id", "label"]));

        let plan = PlanBuilder::new(&registry, &config)
            .build(&selection, book(&registry))
            .unwrap();

        assert_eq!(columns(&plan), vec!["id"]);
        let tags = plan.prefetch("tags").unwrap();
        assert_eq!(columns(&tags.plan), vec!["id", "label", "book_id"]);
        assert_eq!(tags.partition_by.as_deref(), Some("book_id"));
        assert!(tags.directive.is_empty());
    }

    #[test]
    fn test_pivot_relation_is_prefetched() {
        let registry = registry();
        let config = OptimizerConfig::default();
        let selection = SelectionNode::new("books")
            .with_child(SelectionNode::new("shelves").with_fields(["id"]));

        let plan = PlanBuilder::new(&registry, &config)
            .build(&selection, book(&registry))
            .unwrap();

        let shelves = plan.prefetch("shelves").unwrap();
        assert_eq!(shelves.partition_by.as_deref(), Some("book_id"));
        assert_eq!(columns(&shelves.plan), vec!["id"]);
    }

    #[test]
    fn test_aliased_relations_are_merged() {
        let registry = registry();
        let config = OptimizerConfig::default();
        let selection = SelectionNode::new("books")
            .with_child(SelectionNode::new("author").with_fields(["id"]))
            .with_child(SelectionNode::new("writer").with_alias("by").with_fields(["name"]));

        let plan = PlanBuilder::new(&registry, &config)
            .build(&selection, book(&registry))
            .unwrap();

        assert_eq!(plan.joins().len(), 1);
        assert_eq!(columns(&plan.join("author").unwrap().plan), vec!["id", "name"]);
    }

    #[test]
    fn test_conflicting_orderings() {
        let registry = registry();
        let config = OptimizerConfig::default();
        let selection = SelectionNode::new("books")
            .with_child(
                SelectionNode::new("tags")
                    .with_argument("orderBy", ConstValue::String("label".into()))
                    .with_fields(["id"]),
            )
            .with_child(
                SelectionNode::new("tags")
                    .with_alias("reversed")
                    .with_argument("orderBy", ConstValue::String("-label".into()))
                    .with_fields(["id"]),
            );

        let err = PlanBuilder::new(&registry, &config)
            .build(&selection, book(&registry))
            .unwrap_err();

        assert!(matches!(err, OptimizerError::ConflictingPrefetchDirective { .. }));
    }

    #[test]
    fn test_connection_unwraps_edges() {
        let registry = registry();
        let config = OptimizerConfig::default();
        let selection = SelectionNode::new("books").with_child(
            SelectionNode::new("reviews")
                .with_argument("first", ConstValue::Number(5.into()))
                .with_fields(["totalCount", "pageInfo"])
                .with_child(
                    SelectionNode::new("edges")
                        .with_fields(["cursor"])
                        .with_child(SelectionNode::new("node").with_fields(["rating"])),
                ),
        );

        let plan = PlanBuilder::new(&registry, &config)
            .build(&selection, book(&registry))
            .unwrap();

        let reviews = plan.prefetch("reviews").unwrap();
        assert!(reviews.with_count);
        assert_eq!(columns(&reviews.plan), vec!["id", "rating", "book_id"]);
        assert_eq!(reviews.directive.order_by, vec![OrderBy::desc("id")]);
        assert_eq!(reviews.directive.pagination.unwrap().first, Some(5));
    }

    #[test]
    fn test_annotations_and_introspection() {
        let registry = registry();
        let config = OptimizerConfig::default();
        let selection = SelectionNode::new("books").with_fields(["__typename", "reviewCount"]);

        let plan = PlanBuilder::new(&registry, &config)
            .build(&selection, book(&registry))
            .unwrap();

        assert_eq!(columns(&plan), vec!["id"]);
        assert_eq!(plan.annotations()["reviewCount"], "COUNT(reviews.id)");
    }

    #[test]
    fn test_selection_order_does_not_change_fingerprint() {
        let registry = registry();
        let config = OptimizerConfig::default();
        let builder = PlanBuilder::new(&registry, &config);

        let forward = SelectionNode::new("books")
            .with_fields(["title", "id"])
            .with_child(SelectionNode::new("tags").with_fields(["label"]))
            .with_child(SelectionNode::new("author").with_fields(["name"]));
        let backward = SelectionNode::new("books")
            .with_child(SelectionNode::new("author").with_fields(["name"]))
            .with_child(SelectionNode::new("tags").with_fields(["label"]))
            .with_fields(["id", "title"]);

        let a = builder.build(&forward, book(&registry)).unwrap();
        let b = builder.build(&backward, book(&registry)).unwrap();
        assert!(equivalent(&a, &b));
    }

    #[test]
    fn test_complexity_limit() {
        let registry = registry();
        let config = OptimizerConfigBuilder::new().max_complexity(1).build().unwrap();
        let selection = SelectionNode::new("books")
            .with_child(SelectionNode::new("author").with_fields(["id"]))
            .with_child(SelectionNode::new("tags").with_fields(["id"]));

        let err = PlanBuilder::new(&registry, &config)
            .build(&selection, book(&registry))
            .unwrap_err();

        assert_eq!(err, OptimizerError::ComplexityExceeded { complexity: 2, max: 1 });
    }

    #[test]
    fn test_recursion_is_bounded_in_cyclic_schema() {
        let registry = registry();
        let config = OptimizerConfigBuilder::new().max_cyclic_depth(2).build().unwrap();
        let builder = PlanBuilder::new(&registry, &config);
        let category = registry.find_entity("CategoryType").unwrap().id();

        let nested = |levels: usize| {
            let mut selection = SelectionNode::new("parent").with_fields(["id"]);
            for _ in 1..levels {
                selection = SelectionNode::new("parent").with_child(selection);
            }
            SelectionNode::new("categories").with_child(selection)
        };

        assert!(builder.build(&nested(2), category).is_ok());
        assert!(matches!(
            builder.build(&nested(3), category),
            Err(OptimizerError::RecursionLimit { .. })
        ));
    }

    #[test]
    fn test_acyclic_prefix_does_not_count_towards_recursion_limit() {
        let mut schema = SchemaRegistry::builder();
        schema
            .entity("StoreType", "stores")
            .column("id", "id")
            .relation("shelf", RelationSpec::to_one_forward("shelf", "ShelfType", "shelf_id"));
        schema
            .entity("ShelfType", "shelves")
            .column("id", "id")
            .relation("category", RelationSpec::to_one_forward("category", "CategoryType", "category_id"));
        schema
            .entity("CategoryType", "categories")
            .column("id", "id")
            .relation("parent", RelationSpec::to_one_forward("parent", "CategoryType", "parent_id"));
        let registry = schema.build().unwrap();
        let config = OptimizerConfigBuilder::new().max_cyclic_depth(1).build().unwrap();
        let builder = PlanBuilder::new(&registry, &config);
        let store = registry.find_entity("StoreType").unwrap().id();

        let entered = SelectionNode::new("stores").with_child(
            SelectionNode::new("shelf")
                .with_child(SelectionNode::new("category").with_fields(["id"])),
        );
        let plan = builder.build(&entered, store).unwrap();
        assert!(plan.descend(&["shelf".to_string(), "category".to_string()]).is_some());

        let looped = SelectionNode::new("stores").with_child(
            SelectionNode::new("shelf").with_child(
                SelectionNode::new("category")
                    .with_child(SelectionNode::new("parent").with_fields(["id"])),
            ),
        );
        assert_eq!(
            builder.build(&looped, store).unwrap_err(),
            OptimizerError::RecursionLimit {
                entity: "CategoryType".to_string(),
                max: 1,
            }
        );
    }

    #[test]
    fn test_unknown_field() {
        let registry = registry();
        let config = OptimizerConfig::default();
        let selection = SelectionNode::new("books").with_fields(["isbn"]);

        let err = PlanBuilder::new(&registry, &config)
            .build(&selection, book(&registry))
            .unwrap_err();

        assert_eq!(
            err,
            OptimizerError::UnknownField {
                entity: "BookType".to_string(),
                field: "isbn".to_string(),
            }
        );
    }
}

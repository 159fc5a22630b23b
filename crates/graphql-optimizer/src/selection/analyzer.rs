//! Selection analyzer
//!
//! Turns the AST of one resolved field into a [`SelectionNode`] tree:
//! fragment spreads are inlined, `@skip`/`@include` are applied and argument
//! values are resolved against the request's variables. Type conditions must
//! name the concrete type of the enclosing selection (or an interface it
//! implements); anything else is rejected.

use async_graphql_parser::types::{
    DocumentOperations, ExecutableDocument, Field, OperationDefinition, Selection, SelectionSet,
};
use async_graphql_parser::{Pos, Positioned};
use indexmap::IndexMap;

use super::arguments::{ArgumentResolver, VariableValues};
use super::node::{FieldShape, SelectionNode};
use crate::error::{OptimizerError, OptimizerResult};
use crate::schema::{EntityDefinition, EntityId, FieldKind, SchemaRegistry};

/// A parsed request: the document, the operation being executed and its variables
#[derive(Debug, Clone, Copy)]
pub struct RequestDocument<'a> {
    document: &'a ExecutableDocument,
    operation: &'a OperationDefinition,
    variables: &'a VariableValues,
}

impl<'a> RequestDocument<'a> {
    /// Select the operation to execute, by name or as the only one in the document
    pub fn new(
        document: &'a ExecutableDocument,
        operation_name: Option<&str>,
        variables: &'a VariableValues,
    ) -> OptimizerResult<Self> {
        let operation = match (&document.operations, operation_name) {
            (DocumentOperations::Single(operation), _) => &operation.node,
            (DocumentOperations::Multiple(operations), Some(name)) => operations
                .iter()
                .find(|(candidate, _)| candidate.as_str() == name)
                .map(|(_, operation)| &operation.node)
                .ok_or_else(|| {
                    OptimizerError::argument(
                        "operationName",
                        format!("unknown operation named '{}'", name),
                    )
                })?,
            (DocumentOperations::Multiple(operations), None) if operations.len() == 1 => {
                operations
                    .values()
                    .next()
                    .map(|operation| &operation.node)
                    .ok_or_else(|| OptimizerError::argument("operationName", "document has no operations"))?
            }
            (DocumentOperations::Multiple(_), None) => {
                return Err(OptimizerError::argument(
                    "operationName",
                    "document contains several operations and none was named",
                ))
            }
        };

        Ok(Self {
            document,
            operation,
            variables,
        })
    }

    pub fn document(&self) -> &'a ExecutableDocument {
        self.document
    }

    pub fn operation(&self) -> &'a OperationDefinition {
        self.operation
    }

    pub fn variables(&self) -> &'a VariableValues {
        self.variables
    }

    /// Top-level field of the operation with the given response key. Only
    /// fields written directly in the operation's selection set are found.
    pub fn root_field(&self, response_key: &str) -> Option<&'a Positioned<Field>> {
        self.operation
            .selection_set
            .node
            .items
            .iter()
            .find_map(|item| match &item.node {
                Selection::Field(field) if response_key_of(&field.node) == response_key => {
                    Some(field)
                }
                _ => None,
            })
    }

    fn resolver(&self) -> ArgumentResolver<'a> {
        ArgumentResolver::new(&self.operation.variable_definitions, self.variables)
    }
}

/// The concrete type whose selection set is being walked
#[derive(Debug, Clone, Copy)]
enum Scope<'a> {
    Entity(&'a EntityDefinition),
    Connection(&'a EntityDefinition),
    Edge(&'a EntityDefinition),
    /// A type the schema registry does not describe (scalars, `pageInfo`, ...)
    Opaque,
}

impl<'a> Scope<'a> {
    fn for_shape(entity: &'a EntityDefinition, shape: FieldShape) -> Self {
        match shape {
            FieldShape::Entity => Scope::Entity(entity),
            FieldShape::Connection => Scope::Connection(entity),
        }
    }

    fn matches(&self, type_condition: &str) -> bool {
        match self {
            Scope::Entity(entity) => entity.matches_type_condition(type_condition),
            Scope::Connection(entity) => entity.connection_type_name() == type_condition,
            Scope::Edge(entity) => entity.edge_type_name() == type_condition,
            Scope::Opaque => true,
        }
    }

    fn type_name(&self) -> String {
        match self {
            Scope::Entity(entity) => entity.name().to_string(),
            Scope::Connection(entity) => entity.connection_type_name(),
            Scope::Edge(entity) => entity.edge_type_name(),
            Scope::Opaque => "<unknown>".to_string(),
        }
    }
}

/// Walks field ASTs of one request
#[derive(Debug, Clone, Copy)]
pub struct SelectionAnalyzer<'a> {
    schema: &'a SchemaRegistry,
    request: RequestDocument<'a>,
}

impl<'a> SelectionAnalyzer<'a> {
    pub fn new(schema: &'a SchemaRegistry, request: RequestDocument<'a>) -> Self {
        Self { schema, request }
    }

    /// Analyze a field returning `entity` in the given shape
    pub fn analyze(
        &self,
        field: &'a Positioned<Field>,
        entity: EntityId,
        shape: FieldShape,
    ) -> OptimizerResult<SelectionNode> {
        let scope = Scope::for_shape(self.schema.entity(entity), shape);
        let resolver = self.request.resolver();
        self.field(field, scope, &resolver, &mut Vec::new())
    }

    fn collect(
        &self,
        selection_set: &'a SelectionSet,
        scope: Scope<'a>,
        resolver: &ArgumentResolver<'a>,
        fragments: &mut Vec<&'a str>,
        out: &mut Vec<SelectionNode>,
    ) -> OptimizerResult<()> {
        for item in &selection_set.items {
            match &item.node {
                Selection::Field(field) => {
                    if !resolver.is_included(&field.node.directives)? {
                        continue;
                    }
                    let scope = self.child_scope(scope, field.node.name.node.as_str());
                    out.push(self.field(field, scope, resolver, fragments)?);
                }
                Selection::FragmentSpread(spread) => {
                    if !resolver.is_included(&spread.node.directives)? {
                        continue;
                    }

                    let name = spread.node.fragment_name.node.as_str();
                    if fragments.contains(&name) {
                        return Err(OptimizerError::unsupported(
                            spread.pos,
                            format!("fragment '{}' spreads itself", name),
                        ));
                    }

                    let fragment = self
                        .request
                        .document
                        .fragments
                        .get(&spread.node.fragment_name.node)
                        .ok_or_else(|| {
                            OptimizerError::unsupported(
                                spread.pos,
                                format!("unknown fragment '{}'", name),
                            )
                        })?;

                    check_type_condition(
                        &fragment.node.type_condition.node.on.node,
                        scope,
                        spread.pos,
                    )?;

                    fragments.push(name);
                    self.collect(
                        &fragment.node.selection_set.node,
                        scope,
                        resolver,
                        fragments,
                        out,
                    )?;
                    fragments.pop();
                }
                Selection::InlineFragment(fragment) => {
                    if !resolver.is_included(&fragment.node.directives)? {
                        continue;
                    }

                    if let Some(condition) = &fragment.node.type_condition {
                        check_type_condition(&condition.node.on.node, scope, fragment.pos)?;
                    }

                    self.collect(
                        &fragment.node.selection_set.node,
                        scope,
                        resolver,
                        fragments,
                        out,
                    )?;
                }
            }
        }

        Ok(())
    }

    /// `scope` is the type of the field's own selection set
    fn field(
        &self,
        field: &'a Positioned<Field>,
        scope: Scope<'a>,
        resolver: &ArgumentResolver<'a>,
        fragments: &mut Vec<&'a str>,
    ) -> OptimizerResult<SelectionNode> {
        let mut arguments = IndexMap::with_capacity(field.node.arguments.len());
        for (argument, value) in &field.node.arguments {
            arguments.insert(argument.node.to_string(), resolver.resolve(&value.node)?);
        }

        let mut node = SelectionNode {
            name: field.node.name.node.to_string(),
            alias: field.node.alias.as_ref().map(|alias| alias.node.to_string()),
            arguments,
            children: Vec::new(),
            pos: field.pos,
        };

        self.collect(
            &field.node.selection_set.node,
            scope,
            resolver,
            fragments,
            &mut node.children,
        )?;

        Ok(node)
    }

    fn child_scope(&self, scope: Scope<'a>, field_name: &str) -> Scope<'a> {
        match scope {
            Scope::Entity(entity) => match entity.field(field_name).map(|field| &field.kind) {
                Some(FieldKind::Relation {
                    relation,
                    connection,
                }) => {
                    let target = self.schema.entity(self.schema.relation(*relation).target);
                    if *connection {
                        Scope::Connection(target)
                    } else {
                        Scope::Entity(target)
                    }
                }
                _ => Scope::Opaque,
            },
            Scope::Connection(entity) if field_name == "edges" => Scope::Edge(entity),
            Scope::Edge(entity) if field_name == "node" => Scope::Entity(entity),
            _ => Scope::Opaque,
        }
    }
}

fn check_type_condition(type_condition: &str, scope: Scope<'_>, pos: Pos) -> OptimizerResult<()> {
    if scope.matches(type_condition) {
        return Ok(());
    }

    Err(OptimizerError::unsupported(
        pos,
        format!(
            "type condition '{}' does not match the concrete type '{}'",
            type_condition,
            scope.type_name()
        ),
    ))
}

/// Response key of a field AST: the alias if present, otherwise the name
pub fn response_key_of(field: &Field) -> &str {
    field
        .alias
        .as_ref()
        .map_or(field.name.node.as_str(), |alias| alias.node.as_str())
}

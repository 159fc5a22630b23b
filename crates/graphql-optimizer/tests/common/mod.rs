#![allow(dead_code)]

use std::sync::Arc;

use async_graphql_parser::parse_query;
use async_graphql_parser::types::{ExecutableDocument, Field, Selection};
use async_graphql_parser::Positioned;
use elif_graphql_optimizer::selection::response_key_of;
use elif_graphql_optimizer::{
    FieldShape, OptimizerConfig, OptimizerResult, PlanBuilder, QueryPlan, RelationSpec,
    RequestDocument, SchemaRegistry, SelectionAnalyzer, SelectionNode, ThroughTable,
    VariableValues,
};

/// Host-side operation object; only its identity matters to the optimizer
#[derive(Debug, Default)]
pub struct Operation {
    pub name: String,
}

impl Operation {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

/// A small library: books with authors, tags, covers, shelves and reviews,
/// plus a self-referential category tree
pub fn library_schema() -> SchemaRegistry {
    let mut builder = SchemaRegistry::builder();

    builder
        .entity("BookType", "library_book")
        .implements("Node")
        .ordering(["title"])
        .column("id", "id")
        .column("title", "title")
        .column("isbn", "isbn")
        .columns("fullTitle", ["title", "subtitle"])
        .annotation("reviewCount", "COUNT(library_review.id)")
        .resolver("shareUrl")
        .relation("author", RelationSpec::to_one_forward("author", "AuthorType", "author_id"))
        .relation("writer", RelationSpec::to_one_forward("author", "AuthorType", "author_id"))
        .relation("cover", RelationSpec::to_one_reverse("cover", "CoverType", "book_id"))
        .relation("tags", RelationSpec::to_many_reverse("tags", "TagType", "book_id"))
        .relation(
            "shelves",
            RelationSpec::to_many_forward(
                "shelves",
                "ShelfType",
                ThroughTable::new("library_book_shelves", "book_id", "shelf_id"),
            ),
        )
        .connection("reviews", RelationSpec::to_many_reverse("reviews", "ReviewType", "book_id"));

    builder
        .entity("AuthorType", "library_author")
        .implements("Node")
        .column("id", "id")
        .column("name", "name")
        .annotation("bookCount", "COUNT(library_book.id)")
        .relation("publisher", RelationSpec::to_one_forward("publisher", "PublisherType", "publisher_id"))
        .relation("profile", RelationSpec::to_one_reverse("profile", "ProfileType", "author_id"));

    builder
        .entity("PublisherType", "library_publisher")
        .column("id", "id")
        .column("name", "name");

    builder
        .entity("ProfileType", "library_profile")
        .column("id", "id")
        .column("bio", "bio");

    builder
        .entity("CoverType", "library_cover")
        .column("id", "id")
        .column("url", "url");

    builder
        .entity("TagType", "library_tag")
        .ordering(["label"])
        .column("id", "id")
        .column("label", "label");

    builder
        .entity("ShelfType", "library_shelf")
        .column("id", "id")
        .column("name", "name");

    builder
        .entity("ReviewType", "library_review")
        .ordering(["-id"])
        .column("id", "id")
        .column("rating", "rating")
        .column("body", "body");

    builder
        .entity("CategoryType", "library_category")
        .column("id", "id")
        .column("name", "name")
        .relation("parent", RelationSpec::to_one_forward("parent", "CategoryType", "parent_id"))
        .relation("children", RelationSpec::to_many_reverse("children", "CategoryType", "parent_id"));

    builder.build().expect("library schema is valid")
}

pub fn library() -> Arc<SchemaRegistry> {
    Arc::new(library_schema())
}

pub fn parse(query: &str) -> ExecutableDocument {
    parse_query(query).expect("query parses")
}

/// Analyze the root field `root` of a query, returning `entity`
pub fn analyze(
    schema: &SchemaRegistry,
    query: &str,
    variables: &VariableValues,
    root: &str,
    entity: &str,
    shape: FieldShape,
) -> OptimizerResult<SelectionNode> {
    let document = parse(query);
    let request = RequestDocument::new(&document, None, variables)?;
    let field = request.root_field(root).expect("root field exists");
    let entity = schema.find_entity(entity).expect("entity exists").id();
    SelectionAnalyzer::new(schema, request).analyze(field, entity, shape)
}

/// Analyze and plan the `books` root field of a query
pub fn plan_books(schema: &SchemaRegistry, query: &str) -> OptimizerResult<QueryPlan> {
    plan_books_with(schema, query, &OptimizerConfig::default())
}

pub fn plan_books_with(
    schema: &SchemaRegistry,
    query: &str,
    config: &OptimizerConfig,
) -> OptimizerResult<QueryPlan> {
    let selection = analyze(
        schema,
        query,
        &VariableValues::new(),
        "books",
        "BookType",
        FieldShape::Entity,
    )?;
    let book = schema.find_entity("BookType").expect("entity exists").id();
    PlanBuilder::new(schema, config).build(&selection, book)
}

/// A field selected directly below `field`, by response key
pub fn child_field<'a>(field: &'a Positioned<Field>, key: &str) -> &'a Positioned<Field> {
    field
        .node
        .selection_set
        .node
        .items
        .iter()
        .find_map(|selection| match &selection.node {
            Selection::Field(child) if response_key_of(&child.node) == key => Some(child),
            _ => None,
        })
        .expect("child field exists")
}

pub fn columns(plan: &QueryPlan) -> Vec<&str> {
    plan.columns().collect()
}

pub fn sorted_columns(plan: &QueryPlan) -> Vec<&str> {
    let mut columns = columns(plan);
    columns.sort_unstable();
    columns
}

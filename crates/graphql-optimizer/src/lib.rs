//! # elif-graphql-optimizer
//!
//! Compiles GraphQL selections into query plans for the elif.rs ORM, so a
//! resolver tree can be served without per-row ("N+1") queries.
//!
//! ## Features
//!
//! - **Selection analysis**: fragments inlined, `@skip`/`@include` applied, variables resolved
//! - **Relation classification**: joins for to-one relations, prefetches for to-many relations
//! - **Plan identity**: order-independent fingerprints for deduplicating and merging plans
//! - **Operation-scoped cache**: plans live only while the operation's registry is held
//! - **Relay pagination**: `first`/`last`/`after`/`before`/`offset` with page size limits
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use async_graphql_parser::parse_query;
//! use elif_graphql_optimizer::{
//!     FieldShape, OptimizerConfig, QueryOptimizer, RelationSpec, RequestDocument, SchemaRegistry,
//!     VariableValues,
//! };
//!
//! let mut builder = SchemaRegistry::builder();
//! builder
//!     .entity("BookType", "books")
//!     .column("id", "id")
//!     .column("title", "title")
//!     .relation("author", RelationSpec::to_one_forward("author", "AuthorType", "author_id"));
//! builder
//!     .entity("AuthorType", "authors")
//!     .column("id", "id")
//!     .column("name", "name");
//! let schema = Arc::new(builder.build().unwrap());
//!
//! struct Operation;
//! let optimizer: QueryOptimizer<Operation> =
//!     QueryOptimizer::new(schema, OptimizerConfig::default()).unwrap();
//!
//! let document = parse_query("{ books { title author { name } } }").unwrap();
//! let variables = VariableValues::new();
//! let request = RequestDocument::new(&document, None, &variables).unwrap();
//! let field = request.root_field("books").unwrap();
//!
//! let operation = Arc::new(Operation);
//! let query = optimizer
//!     .optimize(&operation, &request, field, "BookType", FieldShape::Entity)
//!     .unwrap();
//!
//! let directives = query.compile(optimizer.config());
//! assert_eq!(directives.select_related, vec!["author"]);
//! assert_eq!(
//!     directives.only.unwrap(),
//!     vec!["id", "title", "author_id", "author.id", "author.name"]
//! );
//! ```

pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod optimizer;
pub mod pagination;
pub mod plan;
pub mod schema;
pub mod selection;

pub use cache::{OperationCache, PlanHandle, PlanRegistry, RegistryStats, RootFieldKey};
pub use classifier::{classify, classify_field, FieldClass};
pub use config::{OptimizerConfig, OptimizerConfigBuilder};
pub use error::{OptimizerError, OptimizerResult};
pub use optimizer::{OptimizedQuery, QueryOptimizer};
pub use pagination::{cursor_to_offset, offset_to_cursor, PaginationArgs};
pub use plan::{
    equivalent, fingerprint, BuiltPlan, Fingerprint, Join, OrderBy, OrderDirection, PlanBuilder,
    Prefetch, PrefetchDirectives, QueryDirective, QueryDirectives, QueryPlan,
};
pub use schema::{
    EntityDefinition, EntityId, FieldDescriptor, FieldKind, RelationDescriptor, RelationId,
    RelationKind, RelationSpec, SchemaRegistry, SchemaRegistryBuilder, ThroughTable,
};
pub use selection::{FieldShape, RequestDocument, SelectionAnalyzer, SelectionNode, VariableValues};

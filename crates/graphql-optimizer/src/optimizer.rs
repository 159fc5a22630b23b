//! Query optimizer facade
//!
//! Runs the whole pipeline for one resolver field: analyze the field AST,
//! build its plan, and store it in the registry of the enclosing operation.

use std::sync::Arc;

use async_graphql_parser::types::Field;
use async_graphql_parser::Positioned;

use crate::cache::{OperationCache, PlanHandle, PlanRegistry, RootFieldKey};
use crate::config::OptimizerConfig;
use crate::error::{OptimizerError, OptimizerResult};
use crate::plan::{BuiltPlan, PlanBuilder, QueryDirective, QueryDirectives, QueryPlan};
use crate::schema::{EntityId, SchemaRegistry};
use crate::selection::{response_key_of, FieldShape, RequestDocument, SelectionAnalyzer};

/// The plan a resolver should execute. Holding it keeps the operation's
/// plan registry alive.
#[derive(Debug, Clone)]
pub struct OptimizedQuery {
    registry: Arc<PlanRegistry>,
    key: RootFieldKey,
    handle: PlanHandle,
    directive: QueryDirective,
    with_count: bool,
}

impl OptimizedQuery {
    /// Registry key the plan is stored under
    pub fn key(&self) -> &RootFieldKey {
        &self.key
    }

    /// Relation path of the plan within the stored root plan
    pub fn path(&self) -> &[String] {
        self.handle.path()
    }

    pub fn plan(&self) -> &QueryPlan {
        self.handle.plan()
    }

    /// The stored root plan this query is part of
    pub fn root(&self) -> &Arc<QueryPlan> {
        self.handle.root()
    }

    /// Registry of the operation the plan was stored in
    pub fn registry(&self) -> &Arc<PlanRegistry> {
        &self.registry
    }

    /// Row selection of the field itself
    pub fn directive(&self) -> &QueryDirective {
        &self.directive
    }

    pub fn with_count(&self) -> bool {
        self.with_count
    }

    pub fn compile(&self, config: &OptimizerConfig) -> QueryDirectives {
        self.plan().compile_with(self.directive.clone(), config)
    }
}

/// Plans resolver fields against one schema, caching plans per operation.
/// `K` is the host's operation type; only its identity is used.
pub struct QueryOptimizer<K: ?Sized> {
    schema: Arc<SchemaRegistry>,
    config: OptimizerConfig,
    cache: OperationCache<K>,
}

impl<K: ?Sized> std::fmt::Debug for QueryOptimizer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptimizer")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish()
    }
}

impl<K: ?Sized> QueryOptimizer<K> {
    pub fn new(schema: Arc<SchemaRegistry>, config: OptimizerConfig) -> OptimizerResult<Self> {
        config.validate()?;

        Ok(Self {
            schema,
            config,
            cache: OperationCache::new(),
        })
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn cache(&self) -> &OperationCache<K> {
        &self.cache
    }

    /// The plan registry of an operation. The optimizer holds registries
    /// weakly: the host keeps the returned registry for as long as the
    /// operation runs so that all of its resolvers share plans.
    pub fn registry(&self, operation: &Arc<K>) -> Arc<PlanRegistry> {
        self.cache.get_or_create(operation)
    }

    /// Plan a top-level field returning `entity_name` and store it under the
    /// field's response key
    pub fn optimize(
        &self,
        operation: &Arc<K>,
        request: &RequestDocument<'_>,
        field: &Positioned<Field>,
        entity_name: &str,
        shape: FieldShape,
    ) -> OptimizerResult<OptimizedQuery> {
        let entity = self.entity(entity_name, field)?;
        let BuiltPlan {
            plan,
            directive,
            with_count,
        } = self.build(request, field, entity, shape)?;

        let key = RootFieldKey::new(response_key_of(&field.node));
        let registry = self.cache.get_or_create(operation);
        let root = registry.store(key.clone(), plan)?;

        tracing::debug!("Optimized root field '{}' ({})", key, root.fingerprint());

        Ok(OptimizedQuery {
            registry,
            key,
            handle: PlanHandle::from_root(root),
            directive,
            with_count,
        })
    }

    /// Plan a field nested below the root field `parent` at relation `path`.
    /// When an ancestor already planned that path, its plan is reused and
    /// extended in place; otherwise the field's plan is stored as a root of
    /// its own.
    #[allow(clippy::too_many_arguments)]
    pub fn optimize_nested(
        &self,
        operation: &Arc<K>,
        request: &RequestDocument<'_>,
        field: &Positioned<Field>,
        parent: &RootFieldKey,
        path: &[String],
        entity_name: &str,
        shape: FieldShape,
    ) -> OptimizerResult<OptimizedQuery> {
        let entity = self.entity(entity_name, field)?;
        let built = self.build(request, field, entity, shape)?;
        let registry = self.cache.get_or_create(operation);

        if let Some(ancestor) = registry.find_path(parent, path) {
            let prefetch = ancestor.root().prefetch_at(path);

            if let Some(prefetch) = prefetch {
                if prefetch.directive != built.directive {
                    let owner = ancestor.root().descend(&path[..path.len() - 1]);
                    return Err(OptimizerError::ConflictingPrefetchDirective {
                        entity: owner.map_or_else(String::new, |owner| owner.entity_name().to_string()),
                        relation: path[path.len() - 1].clone(),
                    });
                }
            }

            let with_count = built.with_count || prefetch.map_or(false, |prefetch| prefetch.with_count);
            let directive = built.directive;
            let handle = registry.store_at(parent, path, built.plan)?.unwrap_or(ancestor);

            tracing::debug!(
                "Reused plan of '{}' at '{}' ({})",
                parent,
                path.join("."),
                handle.plan().fingerprint()
            );

            return Ok(OptimizedQuery {
                registry,
                key: parent.clone(),
                handle,
                directive,
                with_count,
            });
        }

        let key = parent.child(&path.join("."));
        let root = registry.store(key.clone(), built.plan)?;

        tracing::debug!("Optimized nested field '{}' ({})", key, root.fingerprint());

        Ok(OptimizedQuery {
            registry,
            key,
            handle: PlanHandle::from_root(root),
            directive: built.directive,
            with_count: built.with_count,
        })
    }

    fn entity(&self, entity_name: &str, field: &Positioned<Field>) -> OptimizerResult<EntityId> {
        self.schema
            .find_entity(entity_name)
            .map(|entity| entity.id())
            .ok_or_else(|| {
                OptimizerError::metadata(
                    entity_name,
                    field.node.name.node.as_str(),
                    "field returns an entity the schema registry does not describe",
                )
            })
    }

    fn build(
        &self,
        request: &RequestDocument<'_>,
        field: &Positioned<Field>,
        entity: EntityId,
        shape: FieldShape,
    ) -> OptimizerResult<BuiltPlan> {
        let selection = SelectionAnalyzer::new(&self.schema, *request).analyze(field, entity, shape)?;
        PlanBuilder::new(&self.schema, &self.config).build_field(&selection, entity, shape)
    }
}

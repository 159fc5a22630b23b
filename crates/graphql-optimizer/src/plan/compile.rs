//! Translation of a plan into query-builder directives
//!
//! Joins are flattened into separator-joined paths on the query that owns
//! them; prefetches become nested queries of their own. A joined plan that
//! carries annotations cannot be expressed in its parent's statement and is
//! prefetched instead.

use indexmap::IndexMap;
use serde::Serialize;

use super::directive::QueryDirective;
use super::query::QueryPlan;
use crate::config::OptimizerConfig;

/// Directives for one query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDirectives {
    pub table: String,
    /// Column projection including joined columns; `None` when projection is disabled
    pub only: Option<Vec<String>>,
    /// Join paths
    pub select_related: Vec<String>,
    pub prefetch_related: Vec<PrefetchDirectives>,
    /// Field name to annotation expression
    pub annotations: IndexMap<String, String>,
    /// Ordering, window and filters of this query's rows
    pub directive: QueryDirective,
}

/// One prefetch query and how to attach its rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrefetchDirectives {
    /// Relation path from the owning query, through any joins
    pub path: String,
    /// Relation name on the entity that owns the prefetch
    pub relation: String,
    /// Column grouping the rows by parent, used for per-parent windows
    pub partition_by: Option<String>,
    pub with_count: bool,
    pub query: QueryDirectives,
}

impl QueryPlan {
    /// Compile this plan for a query with no row selection of its own
    pub fn compile(&self, config: &OptimizerConfig) -> QueryDirectives {
        self.compile_with(QueryDirective::default(), config)
    }

    /// Compile this plan for a query with the given row selection
    pub fn compile_with(&self, directive: QueryDirective, config: &OptimizerConfig) -> QueryDirectives {
        let mut directives = QueryDirectives {
            table: self.table().to_string(),
            only: Some(self.columns().map(str::to_string).collect()),
            select_related: Vec::new(),
            prefetch_related: Vec::new(),
            annotations: self.annotations().clone(),
            directive,
        };

        compile_relations(self, None, config, &mut directives);

        if !*config.get_project_columns() {
            directives.only = None;
        }

        directives
    }
}

fn compile_relations(
    plan: &QueryPlan,
    prefix: Option<&str>,
    config: &OptimizerConfig,
    out: &mut QueryDirectives,
) {
    let path_of = |name: &str| match prefix {
        Some(prefix) => config.join_path(prefix, name),
        None => name.to_string(),
    };

    for (name, join) in plan.joins() {
        let path = path_of(name);

        if !join.plan.annotations().is_empty() {
            out.prefetch_related.push(PrefetchDirectives {
                path,
                relation: name.clone(),
                partition_by: join.partition_by.clone(),
                with_count: false,
                query: join.plan.compile(config),
            });
            continue;
        }

        if let Some(only) = out.only.as_mut() {
            only.extend(join.plan.columns().map(|column| config.join_path(&path, column)));
        }
        out.select_related.push(path.clone());
        compile_relations(&join.plan, Some(&path), config, out);
    }

    for (name, prefetch) in plan.prefetches() {
        out.prefetch_related.push(PrefetchDirectives {
            path: path_of(name),
            relation: name.clone(),
            partition_by: prefetch.partition_by.clone(),
            with_count: prefetch.with_count,
            query: prefetch.plan.compile_with(prefetch.directive.clone(), config),
        });
    }
}

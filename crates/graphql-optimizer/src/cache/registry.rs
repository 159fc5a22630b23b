//! Per-operation plan registry
//!
//! Stored plans are immutable: extending a plan replaces the stored `Arc` with
//! a merged copy, so handles given out earlier never change underneath their
//! holders. Each read-modify-write holds the entry lock of its root field, so
//! concurrent resolvers cannot lose each other's merges.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::OptimizerResult;
use crate::plan::{equivalent, QueryPlan};

/// Identity of a root field within an operation: its response key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootFieldKey(String);

impl RootFieldKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a plan rooted below this field, at a relation path
    pub fn child(&self, segment: &str) -> Self {
        Self(format!("{}/{}", self.0, segment))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RootFieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RootFieldKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RootFieldKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub merges: u64,
}

impl RegistryStats {
    pub fn hit_ratio(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

/// A stored root plan and the relation path of the part a resolver needs
#[derive(Debug, Clone)]
pub struct PlanHandle {
    root: Arc<QueryPlan>,
    path: Vec<String>,
}

impl PlanHandle {
    /// Handle on a whole root plan
    pub fn from_root(root: Arc<QueryPlan>) -> Self {
        Self {
            root,
            path: Vec::new(),
        }
    }

    fn new(root: Arc<QueryPlan>, path: &[String]) -> Option<Self> {
        root.descend(path)?;
        Some(Self {
            root,
            path: path.to_vec(),
        })
    }

    /// The plan at the handle's path
    pub fn plan(&self) -> &QueryPlan {
        // The root is immutable and the path was checked on creation
        self.root.descend(&self.path).unwrap_or(&self.root)
    }

    pub fn root(&self) -> &Arc<QueryPlan> {
        &self.root
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }
}

/// Root-field plans of one operation
#[derive(Debug, Default)]
pub struct PlanRegistry {
    plans: DashMap<RootFieldKey, Arc<QueryPlan>>,
    stats: Mutex<RegistryStats>,
}

impl PlanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &RootFieldKey) -> Option<Arc<QueryPlan>> {
        let plan = self.plans.get(key).map(|plan| Arc::clone(plan.value()));
        self.record_lookup(plan.is_some());
        plan
    }

    /// Store a plan for a root field. Returns the stored plan: the existing
    /// one when it already covers `plan`, otherwise the merge of both.
    pub fn store(&self, key: RootFieldKey, plan: QueryPlan) -> OptimizerResult<Arc<QueryPlan>> {
        match self.plans.entry(key) {
            Entry::Vacant(entry) => {
                tracing::trace!("Storing plan for root field '{}'", entry.key());
                let plan = Arc::new(plan);
                entry.insert(Arc::clone(&plan));
                self.stats.lock().inserts += 1;
                Ok(plan)
            }
            Entry::Occupied(mut entry) => {
                if equivalent(entry.get(), &plan) {
                    self.stats.lock().hits += 1;
                    return Ok(Arc::clone(entry.get()));
                }

                let mut merged = QueryPlan::clone(entry.get());
                merged.merge(plan)?;

                // The stored plan already covers the new one
                if merged.fingerprint() == entry.get().fingerprint() {
                    self.stats.lock().hits += 1;
                    return Ok(Arc::clone(entry.get()));
                }

                tracing::debug!(
                    "Merged plan for root field '{}' ({})",
                    entry.key(),
                    merged.fingerprint()
                );

                let merged = Arc::new(merged);
                entry.insert(Arc::clone(&merged));
                self.stats.lock().merges += 1;
                Ok(merged)
            }
        }
    }

    /// Find the part of a stored plan at a relation path
    pub fn lookup_path(&self, key: &RootFieldKey, path: &[String]) -> Option<PlanHandle> {
        let handle = self.find_path(key, path);
        self.record_lookup(handle.is_some());
        handle
    }

    /// Like [`Self::lookup_path`], for callers that go on to `store_at` and
    /// let the store count the access
    pub(crate) fn find_path(&self, key: &RootFieldKey, path: &[String]) -> Option<PlanHandle> {
        self.plans
            .get(key)
            .and_then(|root| PlanHandle::new(Arc::clone(root.value()), path))
    }

    /// Extend the part of a stored plan at a relation path. Returns `None`
    /// when there is no stored plan with that path.
    pub fn store_at(
        &self,
        key: &RootFieldKey,
        path: &[String],
        plan: QueryPlan,
    ) -> OptimizerResult<Option<PlanHandle>> {
        let mut root = match self.plans.get_mut(key) {
            Some(root) => root,
            None => return Ok(None),
        };

        let existing = match root.descend(path) {
            Some(existing) => existing,
            None => return Ok(None),
        };

        if equivalent(existing, &plan) {
            self.stats.lock().hits += 1;
            return Ok(PlanHandle::new(Arc::clone(root.value()), path));
        }

        let mut merged = QueryPlan::clone(root.value());
        if let Some(target) = merged.descend_mut(path) {
            target.merge(plan)?;
        }

        if merged.fingerprint() == root.fingerprint() {
            self.stats.lock().hits += 1;
            return Ok(PlanHandle::new(Arc::clone(root.value()), path));
        }

        tracing::debug!(
            "Extended plan for root field '{}' at '{}'",
            key,
            path.join(".")
        );

        let merged = Arc::new(merged);
        *root = Arc::clone(&merged);
        self.stats.lock().merges += 1;
        Ok(PlanHandle::new(merged, path))
    }

    pub fn contains(&self, key: &RootFieldKey) -> bool {
        self.plans.contains_key(key)
    }

    pub fn keys(&self) -> Vec<RootFieldKey> {
        self.plans.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        *self.stats.lock()
    }

    fn record_lookup(&self, hit: bool) {
        let mut stats = self.stats.lock();
        if hit {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OptimizerError;
    use crate::plan::{Prefetch, QueryDirective};
    use crate::schema::{RelationId, SchemaRegistry};

    fn registry() -> SchemaRegistry {
        let mut builder = SchemaRegistry::builder();
        builder
            .entity("BookType", "books")
            .column("id", "id")
            .column("title", "title");
        builder
            .entity("TagType", "tags")
            .column("id", "id")
            .column("label", "label");
        builder.build().unwrap()
    }

    fn book_plan(schema: &SchemaRegistry, columns: &[&str]) -> QueryPlan {
        let mut plan = QueryPlan::new(schema.find_entity("BookType").unwrap());
        for column in columns {
            plan.add_column(*column);
        }
        plan
    }

    fn with_tags(schema: &SchemaRegistry, mut plan: QueryPlan, column: &str) -> QueryPlan {
        let mut tags = QueryPlan::new(schema.find_entity("TagType").unwrap());
        tags.add_column(column);
        plan.attach_prefetch(
            "tags",
            Prefetch {
                relation: RelationId(0),
                partition_by: Some("book_id".to_string()),
                directive: QueryDirective::default(),
                with_count: false,
                plan: tags,
            },
        )
        .unwrap();
        plan
    }

    #[test]
    fn test_equivalent_store_is_a_no_op() {
        let schema = registry();
        let registry = PlanRegistry::new();
        let key = RootFieldKey::new("books");

        let first = registry.store(key.clone(), book_plan(&schema, &["title"])).unwrap();
        let second = registry.store(key.clone(), book_plan(&schema, &["title"])).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.stats().inserts, 1);
        assert_eq!(registry.stats().hits, 1);
    }

    #[test]
    fn test_store_merges_copy_on_write() {
        let schema = registry();
        let registry = PlanRegistry::new();
        let key = RootFieldKey::new("books");

        let first = registry.store(key.clone(), book_plan(&schema, &[])).unwrap();
        let merged = registry.store(key.clone(), book_plan(&schema, &["title"])).unwrap();

        assert!(!first.has_column("title"));
        assert!(merged.has_column("title"));
        assert!(Arc::ptr_eq(&merged, &registry.lookup(&key).unwrap()));
        assert_eq!(registry.stats().merges, 1);
    }

    #[test]
    fn test_store_of_covered_plan_keeps_existing() {
        let schema = registry();
        let registry = PlanRegistry::new();
        let key = RootFieldKey::new("books");

        let wide = registry.store(key.clone(), book_plan(&schema, &["title"])).unwrap();
        let narrow = registry.store(key.clone(), book_plan(&schema, &[])).unwrap();

        assert!(Arc::ptr_eq(&wide, &narrow));
        assert_eq!(registry.stats().merges, 0);
    }

    #[test]
    fn test_store_rejects_other_entity() {
        let schema = registry();
        let registry = PlanRegistry::new();
        let key = RootFieldKey::new("books");

        registry.store(key.clone(), book_plan(&schema, &[])).unwrap();
        let tags = QueryPlan::new(schema.find_entity("TagType").unwrap());

        assert!(matches!(
            registry.store(key, tags),
            Err(OptimizerError::PlanMismatch { .. })
        ));
    }

    #[test]
    fn test_lookup_and_store_at_path() {
        let schema = registry();
        let registry = PlanRegistry::new();
        let key = RootFieldKey::new("books");
        let path = vec!["tags".to_string()];

        assert!(registry.lookup_path(&key, &path).is_none());
        registry
            .store(key.clone(), with_tags(&schema, book_plan(&schema, &[]), "label"))
            .unwrap();

        let handle = registry.lookup_path(&key, &path).unwrap();
        assert!(handle.plan().has_column("label"));

        let mut extension = QueryPlan::new(schema.find_entity("TagType").unwrap());
        extension.add_column("color");
        let extended = registry.store_at(&key, &path, extension).unwrap().unwrap();

        assert!(extended.plan().has_column("label"));
        assert!(extended.plan().has_column("color"));
        assert!(!handle.plan().has_column("color"));
        assert!(registry
            .store_at(&key, &["missing".to_string()], book_plan(&schema, &[]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_root_field_keys() {
        let key = RootFieldKey::from("books");
        assert_eq!(key.child("tags").as_str(), "books/tags");
        assert_eq!(key.to_string(), "books");
    }
}

//! Operation-scoped side table
//!
//! Registries are keyed by the address of the host's operation object. An
//! entry holds only [`Weak`] references, to the operation and to its
//! registry, so the table never keeps either alive. The registry is owned by
//! whoever holds it: the host for the duration of the operation, and every
//! [`crate::OptimizedQuery`] handed out from it. A held `Weak<K>` also keeps
//! the operation's allocation reserved, so an address cannot be reused by a
//! new operation while its old entry exists.

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use super::registry::{PlanRegistry, RootFieldKey};
use crate::error::OptimizerResult;
use crate::plan::QueryPlan;

struct OperationEntry<K: ?Sized> {
    operation: Weak<K>,
    registry: Weak<PlanRegistry>,
}

impl<K: ?Sized> OperationEntry<K> {
    fn is_alive(&self) -> bool {
        self.operation.strong_count() > 0 && self.registry.strong_count() > 0
    }
}

/// Plan registries keyed by operation identity
pub struct OperationCache<K: ?Sized> {
    entries: DashMap<usize, OperationEntry<K>>,
}

impl<K: ?Sized> Default for OperationCache<K> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K: ?Sized> std::fmt::Debug for OperationCache<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<K: ?Sized> OperationCache<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The operation's registry, created empty when nobody holds one. The
    /// caller shares ownership of the returned registry.
    pub fn get_or_create(&self, operation: &Arc<K>) -> Arc<PlanRegistry> {
        self.purge();

        let mut entry = self
            .entries
            .entry(identity(operation))
            .or_insert_with(|| OperationEntry {
                operation: Arc::downgrade(operation),
                registry: Weak::new(),
            });

        if let Some(registry) = entry.registry.upgrade() {
            return registry;
        }

        tracing::trace!("Creating plan registry for operation {:#x}", identity(operation));
        let registry = Arc::new(PlanRegistry::new());
        entry.registry = Arc::downgrade(&registry);
        registry
    }

    /// The operation's registry, if one is still held
    pub fn registry(&self, operation: &Arc<K>) -> Option<Arc<PlanRegistry>> {
        self.entries
            .get(&identity(operation))
            .filter(|entry| entry.operation.strong_count() > 0)
            .and_then(|entry| entry.registry.upgrade())
    }

    pub fn lookup(&self, operation: &Arc<K>, key: &RootFieldKey) -> Option<Arc<QueryPlan>> {
        self.registry(operation)?.lookup(key)
    }

    /// Store a plan in the operation's registry. The plan is kept only while
    /// someone holds that registry.
    pub fn store(
        &self,
        operation: &Arc<K>,
        key: RootFieldKey,
        plan: QueryPlan,
    ) -> OptimizerResult<Arc<QueryPlan>> {
        self.get_or_create(operation).store(key, plan)
    }

    /// Drop the entries of finished operations and released registries.
    /// Returns the number removed.
    pub fn purge(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let alive = entry.is_alive();
            if !alive {
                removed += 1;
            }
            alive
        });

        if removed > 0 {
            tracing::trace!("Purged {} plan registries of finished operations", removed);
        }

        removed
    }

    /// Number of live operations with a held registry
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_alive()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn identity<K: ?Sized>(operation: &Arc<K>) -> usize {
    Arc::as_ptr(operation) as *const () as usize
}

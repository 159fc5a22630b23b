use indexmap::map::Entry;
use indexmap::{IndexMap, IndexSet};
use once_cell::sync::OnceCell;
use serde::Serialize;

use super::directive::QueryDirective;
use super::fingerprint::{self, Fingerprint};
use crate::error::{OptimizerError, OptimizerResult};
use crate::schema::{EntityDefinition, EntityId, RelationId};

/// A to-one relation fetched in the parent's statement
#[derive(Debug, Clone, Serialize)]
pub struct Join {
    pub relation: RelationId,
    /// Column of the joined rows referencing the parent, for reverse relations
    pub partition_by: Option<String>,
    pub plan: QueryPlan,
}

/// A to-many relation fetched with one extra query and re-associated by key
#[derive(Debug, Clone, Serialize)]
pub struct Prefetch {
    pub relation: RelationId,
    /// Column of the prefetched rows used to group them by parent
    pub partition_by: Option<String>,
    pub directive: QueryDirective,
    /// A `totalCount` was selected on the connection
    pub with_count: bool,
    pub plan: QueryPlan,
}

/// Columns, joins and prefetches needed to resolve one level of a selection
/// without further round trips
#[derive(Debug, Clone, Serialize)]
pub struct QueryPlan {
    entity: EntityId,
    entity_name: String,
    table: String,
    primary_key: Vec<String>,
    /// Always starts with the primary key
    columns: IndexSet<String>,
    /// Field name to annotation expression
    annotations: IndexMap<String, String>,
    joins: IndexMap<String, Join>,
    prefetches: IndexMap<String, Prefetch>,
    #[serde(skip)]
    fingerprint: OnceCell<Fingerprint>,
}

impl QueryPlan {
    /// An empty plan for `entity`, selecting only its primary key
    pub fn new(entity: &EntityDefinition) -> Self {
        Self {
            entity: entity.id(),
            entity_name: entity.name().to_string(),
            table: entity.table().to_string(),
            primary_key: entity.primary_key().to_vec(),
            columns: entity.primary_key().iter().cloned().collect(),
            annotations: IndexMap::new(),
            joins: IndexMap::new(),
            prefetches: IndexMap::new(),
            fingerprint: OnceCell::new(),
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn columns(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.columns.iter().map(String::as_str)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn annotations(&self) -> &IndexMap<String, String> {
        &self.annotations
    }

    pub fn joins(&self) -> &IndexMap<String, Join> {
        &self.joins
    }

    pub fn prefetches(&self) -> &IndexMap<String, Prefetch> {
        &self.prefetches
    }

    pub fn join(&self, relation: &str) -> Option<&Join> {
        self.joins.get(relation)
    }

    pub fn prefetch(&self, relation: &str) -> Option<&Prefetch> {
        self.prefetches.get(relation)
    }

    /// Structural fingerprint, computed on first use
    pub fn fingerprint(&self) -> Fingerprint {
        *self.fingerprint.get_or_init(|| fingerprint::compute(self))
    }

    /// Number of join and prefetch edges in the whole tree
    pub fn relation_count(&self) -> usize {
        self.joins
            .values()
            .map(|join| 1 + join.plan.relation_count())
            .chain(
                self.prefetches
                    .values()
                    .map(|prefetch| 1 + prefetch.plan.relation_count()),
            )
            .sum()
    }

    pub fn add_column(&mut self, column: impl Into<String>) {
        if self.columns.insert(column.into()) {
            self.invalidate();
        }
    }

    pub fn add_annotation(&mut self, name: impl Into<String>, expression: impl Into<String>) {
        self.annotations.insert(name.into(), expression.into());
        self.invalidate();
    }

    /// Attach a join child, merging into an existing join on the same relation
    pub fn attach_join(&mut self, name: &str, join: Join) -> OptimizerResult<()> {
        if self.prefetches.contains_key(name) {
            return Err(self.dual_classification(name));
        }

        match self.joins.entry(name.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(join);
            }
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if existing.plan.fingerprint() != join.plan.fingerprint() {
                    existing.plan.merge(join.plan)?;
                }
            }
        }

        self.invalidate();
        Ok(())
    }

    /// Attach a prefetch child. Two prefetches of the same relation must
    /// select the same rows.
    pub fn attach_prefetch(&mut self, name: &str, prefetch: Prefetch) -> OptimizerResult<()> {
        if self.joins.contains_key(name) {
            return Err(self.dual_classification(name));
        }

        match self.prefetches.entry(name.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(prefetch);
            }
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if existing.directive != prefetch.directive {
                    return Err(OptimizerError::ConflictingPrefetchDirective {
                        entity: self.entity_name.clone(),
                        relation: name.to_string(),
                    });
                }

                existing.with_count |= prefetch.with_count;
                if existing.plan.fingerprint() != prefetch.plan.fingerprint() {
                    existing.plan.merge(prefetch.plan)?;
                }
            }
        }

        self.invalidate();
        Ok(())
    }

    /// Merge another plan for the same entity into this one. Columns are
    /// unioned; joins and prefetches are merged recursively by relation name.
    pub fn merge(&mut self, other: QueryPlan) -> OptimizerResult<()> {
        if self.entity != other.entity {
            return Err(OptimizerError::PlanMismatch {
                left: self.entity_name.clone(),
                right: other.entity_name,
            });
        }

        self.columns.extend(other.columns);
        self.annotations.extend(other.annotations);

        for (name, join) in other.joins {
            self.attach_join(&name, join)?;
        }

        for (name, prefetch) in other.prefetches {
            self.attach_prefetch(&name, prefetch)?;
        }

        self.invalidate();
        Ok(())
    }

    /// Follow a relation path through joins and prefetches
    pub fn descend<S: AsRef<str>>(&self, path: &[S]) -> Option<&QueryPlan> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => self.child(head.as_ref())?.descend(rest),
        }
    }

    /// The prefetch edge that ends a relation path, if the path ends in one
    pub fn prefetch_at<S: AsRef<str>>(&self, path: &[S]) -> Option<&Prefetch> {
        let (last, parent) = path.split_last()?;
        self.descend(parent)?.prefetch(last.as_ref())
    }

    /// Mutable access to the plan at a relation path. Every plan along the
    /// path loses its cached fingerprint.
    pub(crate) fn descend_mut<S: AsRef<str>>(&mut self, path: &[S]) -> Option<&mut QueryPlan> {
        self.invalidate();
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => {
                let name = head.as_ref();
                let child = match self.joins.get_mut(name) {
                    Some(join) => &mut join.plan,
                    None => &mut self.prefetches.get_mut(name)?.plan,
                };
                child.descend_mut(rest)
            }
        }
    }

    fn child(&self, name: &str) -> Option<&QueryPlan> {
        self.joins
            .get(name)
            .map(|join| &join.plan)
            .or_else(|| self.prefetches.get(name).map(|prefetch| &prefetch.plan))
    }

    fn invalidate(&mut self) {
        self.fingerprint.take();
    }

    fn dual_classification(&self, name: &str) -> OptimizerError {
        OptimizerError::metadata(
            &self.entity_name,
            name,
            "relation is used both as a join and as a prefetch",
        )
    }
}

impl PartialEq for QueryPlan {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for QueryPlan {}

//! Order-independent structural identity of query plans
//!
//! Columns, annotations and child relations are sorted before hashing, so two
//! plans built from the same selections in a different order share a
//! fingerprint. Every variable-length item is length-prefixed.

use std::fmt;

use async_graphql_value::ConstValue;
use blake3::Hasher;

use super::directive::QueryDirective;
use super::query::QueryPlan;

/// Structural hash of a [`QueryPlan`]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

/// Fingerprint of a plan
pub fn fingerprint(plan: &QueryPlan) -> Fingerprint {
    plan.fingerprint()
}

/// Two plans are equivalent when their fingerprints are equal
pub fn equivalent(a: &QueryPlan, b: &QueryPlan) -> bool {
    a.fingerprint() == b.fingerprint()
}

pub(crate) fn compute(plan: &QueryPlan) -> Fingerprint {
    let mut hasher = Hasher::new();

    write_str(&mut hasher, plan.table());

    // Key order is significant
    write_len(&mut hasher, plan.primary_key().len());
    for column in plan.primary_key() {
        write_str(&mut hasher, column);
    }

    let mut columns: Vec<&str> = plan.columns().collect();
    columns.sort_unstable();
    write_len(&mut hasher, columns.len());
    for column in columns {
        write_str(&mut hasher, column);
    }

    let mut annotations: Vec<(&String, &String)> = plan.annotations().iter().collect();
    annotations.sort_unstable();
    write_len(&mut hasher, annotations.len());
    for (name, expression) in annotations {
        write_str(&mut hasher, name);
        write_str(&mut hasher, expression);
    }

    let mut joins: Vec<_> = plan.joins().iter().collect();
    joins.sort_unstable_by(|a, b| a.0.cmp(b.0));
    write_len(&mut hasher, joins.len());
    for (name, join) in joins {
        write_str(&mut hasher, name);
        hasher.update(join.plan.fingerprint().as_bytes());
    }

    let mut prefetches: Vec<_> = plan.prefetches().iter().collect();
    prefetches.sort_unstable_by(|a, b| a.0.cmp(b.0));
    write_len(&mut hasher, prefetches.len());
    for (name, prefetch) in prefetches {
        write_str(&mut hasher, name);
        write_directive(&mut hasher, &prefetch.directive);
        hasher.update(&[prefetch.with_count as u8]);
        hasher.update(prefetch.plan.fingerprint().as_bytes());
    }

    Fingerprint(*hasher.finalize().as_bytes())
}

fn write_directive(hasher: &mut Hasher, directive: &QueryDirective) {
    write_len(hasher, directive.order_by.len());
    for order in &directive.order_by {
        write_str(hasher, &order.to_string());
    }

    match &directive.pagination {
        None => {
            hasher.update(&[0]);
        }
        Some(pagination) => {
            hasher.update(&[1]);
            for bound in [
                pagination.first,
                pagination.last,
                pagination.after,
                pagination.before,
            ] {
                write_optional(hasher, bound);
            }
        }
    }

    // BTreeMap iterates in key order
    write_len(hasher, directive.filters.len());
    for (name, value) in &directive.filters {
        write_str(hasher, name);
        write_value(hasher, value);
    }
}

fn write_value(hasher: &mut Hasher, value: &ConstValue) {
    match value {
        ConstValue::List(items) => {
            hasher.update(b"[");
            write_len(hasher, items.len());
            for item in items {
                write_value(hasher, item);
            }
        }
        ConstValue::Object(fields) => {
            let mut fields: Vec<_> = fields.iter().collect();
            fields.sort_unstable_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
            hasher.update(b"{");
            write_len(hasher, fields.len());
            for (name, value) in fields {
                write_str(hasher, name.as_str());
                write_value(hasher, value);
            }
        }
        scalar => {
            hasher.update(b"=");
            write_str(hasher, &scalar.to_string());
        }
    }
}

fn write_optional(hasher: &mut Hasher, value: Option<u64>) {
    match value {
        Some(value) => {
            hasher.update(&[1]);
            hasher.update(&value.to_le_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

fn write_len(hasher: &mut Hasher, len: usize) {
    hasher.update(&(len as u64).to_le_bytes());
}

fn write_str(hasher: &mut Hasher, value: &str) {
    write_len(hasher, value.len());
    hasher.update(value.as_bytes());
}

pub mod builder;
pub mod compile;
pub mod directive;
pub mod fingerprint;
pub mod query;

pub use builder::{BuiltPlan, PlanBuilder};
pub use compile::{PrefetchDirectives, QueryDirectives};
pub use directive::{OrderBy, OrderDirection, QueryDirective};
pub use fingerprint::{equivalent, fingerprint, Fingerprint};
pub use query::{Join, Prefetch, QueryPlan};

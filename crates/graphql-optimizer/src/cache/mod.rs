pub mod operation;
pub mod registry;

pub use operation::OperationCache;
pub use registry::{PlanHandle, PlanRegistry, RegistryStats, RootFieldKey};

pub mod analyzer;
pub mod arguments;
pub mod node;

pub use analyzer::{response_key_of, RequestDocument, SelectionAnalyzer};
pub use arguments::VariableValues;
pub use node::{FieldShape, SelectionNode};

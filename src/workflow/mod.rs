pub mod duplication;
pub mod spec;
pub mod store;
pub mod validation;

pub use duplication::{content_fingerprint, duplicate_definition, topology_fingerprint};
pub use spec::{StateSpec, TransitionSpec, WorkflowSpec};
pub use store::DefinitionStore;
pub use validation::{collect_problems, reachable_states, validate_definition};

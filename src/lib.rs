//! Workflow engine for incidents, requests, complaints and queries.
//!
//! Each incident type is governed by a versioned [`WorkflowDefinition`]: a
//! graph of states with optional SLAs and transitions gated by a permission,
//! requirements and actions. The [`TransitionEngine`] moves incidents along
//! that graph, one committed transition at a time, leaving an append-only
//! audit trail.

pub mod actions;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod requirements;
pub mod sla;
pub mod state;
pub mod workflow;

pub use config::Config;
pub use engine::{TransitionEngine, TransitionOutcome, TransitionPayload};
pub use error::{AppError, Result};
pub use models::{Actor, FieldValue, Incident, RevisionEntry, WorkflowDefinition};
pub use sla::{SlaState, SlaStatus};
pub use workflow::DefinitionStore;

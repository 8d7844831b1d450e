pub mod store;
pub mod sled_store;
pub mod factory;

pub use store::*;
pub use sled_store::SledStore;
pub use factory::{create_store, create_in_memory_store};

use crate::error::Result;
use crate::models::{FieldEdit, Incident, RevisionEntry, WorkflowDefinition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Instant;
use uuid::Uuid;

/// Transactional persistence for incidents, their audit trail and published
/// workflow definitions.
///
/// Implementations must make `create_incident`, `commit_transition` and
/// `commit_field_edit` all-or-nothing, and must finish them without yielding between the
/// concurrency check and the last write, so a dropped future never leaves a
/// partial commit behind.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Insert a new incident together with its creation revision
    async fn create_incident(&self, incident: &Incident, creation: &RevisionEntry) -> Result<()>;

    /// Get an incident by ID (soft-deleted incidents included)
    async fn get_incident(&self, id: &Uuid) -> Result<Option<Incident>>;

    /// List incidents with filtering
    async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Incident>>;

    /// Count incidents matching filter
    async fn count_incidents(&self, filter: &IncidentFilter) -> Result<u64>;

    /// Atomically replace the incident and append its revision entry.
    ///
    /// Fails with `Conflict` when the stored revision differs from
    /// `expected_revision`, and with `Timeout` when the deadline has passed
    /// before anything was written.
    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<()>;

    /// Atomically replace the incident and append to its field-edit log.
    ///
    /// Same revision and deadline checks as `commit_transition`; the revision
    /// trail is left alone.
    async fn commit_field_edit(&self, commit: &FieldEditCommit) -> Result<()>;

    /// Mark an incident deleted; its revisions are kept
    async fn soft_delete_incident(&self, id: &Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Audit trail of an incident ordered by sequence
    async fn list_revisions(&self, incident_id: &Uuid) -> Result<Vec<RevisionEntry>>;

    /// Field edits of an incident ordered by revision
    async fn list_field_edits(&self, incident_id: &Uuid) -> Result<Vec<FieldEdit>>;

    /// Persist a published workflow definition
    async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<()>;

    /// All persisted workflow definitions
    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>>;
}

/// One unit of work produced by a successful transition
#[derive(Debug, Clone)]
pub struct TransitionCommit {
    /// Incident after the transition has been applied
    pub incident: Incident,

    /// Revision the transition was computed against
    pub expected_revision: u64,

    /// Audit entry to append
    pub revision: RevisionEntry,

    /// Latest instant at which writing may start
    pub deadline: Instant,
}

/// One unit of work produced by a field edit
#[derive(Debug, Clone)]
pub struct FieldEditCommit {
    pub incident: Incident,
    pub expected_revision: u64,
    pub edit: FieldEdit,
    pub deadline: Instant,
}

/// Filter for querying incidents
#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub incident_types: Vec<String>,
    pub states: Vec<Uuid>,
    pub department: Option<String>,
    pub include_deleted: bool,
}

impl IncidentFilter {
    /// Only incidents not soft-deleted
    pub fn active() -> Self {
        Self::default()
    }

    pub fn matches(&self, incident: &Incident) -> bool {
        let type_match = self.incident_types.is_empty()
            || self.incident_types.contains(&incident.incident_type);

        let state_match =
            self.states.is_empty() || self.states.contains(&incident.current_state());

        let department_match = self
            .department
            .as_ref()
            .map_or(true, |d| incident.department.as_ref() == Some(d));

        let deleted_match = self.include_deleted || !incident.is_deleted();

        type_match && state_match && department_match && deleted_match
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::incident::{FieldValue, Incident};

/// One immutable audit record.
///
/// Sequence numbers start at 1 with the synthetic creation entry and
/// increase by one per committed transition. Field edits are not revisions;
/// see [`FieldEdit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionEntry {
    pub id: Uuid,
    pub incident_id: Uuid,
    pub sequence: u64,
    /// `None` for the creation entry
    pub from_state: Option<Uuid>,
    pub to_state: Uuid,
    /// `None` for the creation entry
    pub transition_id: Option<Uuid>,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub comment: Option<String>,
    pub deltas: Vec<FieldDelta>,
}

impl RevisionEntry {
    /// Synthetic entry written alongside a newly created incident
    pub(crate) fn creation(incident: &Incident, actor: &str) -> Self {
        Self {
            id: Uuid::now_v7(),
            incident_id: incident.id,
            sequence: incident.sequence,
            from_state: None,
            to_state: incident.current_state,
            transition_id: None,
            actor: actor.to_string(),
            timestamp: incident.created_at,
            comment: None,
            deltas: Vec::new(),
        }
    }

    /// Entry for a committed transition; `updated` is the post-commit incident
    pub(crate) fn for_transition(
        updated: &Incident,
        from_state: Uuid,
        transition_id: Uuid,
        actor: &str,
        comment: Option<String>,
        deltas: Vec<FieldDelta>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            incident_id: updated.id,
            sequence: updated.sequence,
            from_state: Some(from_state),
            to_state: updated.current_state,
            transition_id: Some(transition_id),
            actor: actor.to_string(),
            timestamp: updated.state_entered_at,
            comment,
            deltas,
        }
    }

    pub fn is_creation(&self) -> bool {
        self.from_state.is_none()
    }
}

/// Field change made outside a transition, logged apart from the revision
/// trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEdit {
    pub id: Uuid,
    pub incident_id: Uuid,
    /// Incident revision produced by the edit
    pub revision: u64,
    /// State the incident was in
    pub state: Uuid,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub deltas: Vec<FieldDelta>,
}

impl FieldEdit {
    /// `updated` is the post-commit incident
    pub(crate) fn new(updated: &Incident, actor: &str, deltas: Vec<FieldDelta>) -> Self {
        Self {
            id: Uuid::now_v7(),
            incident_id: updated.id,
            revision: updated.revision,
            state: updated.current_state,
            actor: actor.to_string(),
            timestamp: updated.updated_at,
            deltas,
        }
    }
}

/// A change applied to an incident by a transition action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDelta {
    Field {
        key: String,
        before: Option<FieldValue>,
        after: Option<FieldValue>,
    },
    Department {
        before: Option<String>,
        after: Option<String>,
    },
    Assignee {
        before: Option<String>,
        after: Option<String>,
    },
}

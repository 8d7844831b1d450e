use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::action::Action;
use super::requirement::Requirement;

/// Lifecycle of a workflow definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DefinitionStatus {
    /// Freely editable, never bound to incidents
    Draft,
    /// Frozen; incidents may bind to it
    Published,
}

/// State machine graph governing incidents of one type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,

    /// Incident type this workflow governs
    pub incident_type: String,

    /// Display name
    pub name: String,

    /// Version number, assigned on publish (0 while draft)
    pub version: u32,

    pub status: DefinitionStatus,

    /// Ordered states
    pub states: Vec<State>,

    pub transitions: Vec<Transition>,

    pub created_at: DateTime<Utc>,

    pub published_at: Option<DateTime<Utc>>,

    /// Source definition when created by duplication
    pub duplicated_from: Option<Uuid>,
}

impl WorkflowDefinition {
    /// Create an empty draft
    pub fn new_draft(incident_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            incident_type: incident_type.into(),
            name: name.into(),
            version: 0,
            status: DefinitionStatus::Draft,
            states: Vec::new(),
            transitions: Vec::new(),
            created_at: Utc::now(),
            published_at: None,
            duplicated_from: None,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == DefinitionStatus::Published
    }

    pub fn state(&self, id: Uuid) -> Option<&State> {
        self.states.iter().find(|s| s.id == id)
    }

    pub fn state_by_name(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn initial_state(&self) -> Option<&State> {
        self.states.iter().find(|s| s.initial)
    }

    pub fn transition(&self, id: Uuid) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.id == id)
    }

    /// Transitions leaving a state
    pub fn transitions_from(&self, state_id: Uuid) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.from == state_id)
    }

    /// Find a transition by source state name and transition name
    pub fn find_transition(&self, from_state: &str, name: &str) -> Option<&Transition> {
        let from = self.state_by_name(from_state)?;
        self.transitions_from(from.id).find(|t| t.name == name)
    }

    /// Name of a state, or its id when it is not part of this definition
    pub fn state_name(&self, id: Uuid) -> String {
        self.state(id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

/// A node of the workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub id: Uuid,

    /// Unique within the definition; used for name-based topology
    pub name: String,

    /// Human label
    pub label: String,

    /// Time budget in this state; `None` means no deadline
    pub sla_minutes: Option<u32>,

    pub initial: bool,

    pub terminal: bool,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            label: name.clone(),
            name,
            sla_minutes: None,
            initial: false,
            terminal: false,
        }
    }

    pub fn sla_duration(&self) -> Option<chrono::Duration> {
        self.sla_minutes
            .map(|minutes| chrono::Duration::minutes(minutes as i64))
    }
}

/// An edge of the workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: Uuid,

    /// Unique among the transitions leaving the same state
    pub name: String,

    pub from: Uuid,

    pub to: Uuid,

    /// Permission code the actor must hold
    pub permission: String,

    /// Evaluated in full; all must hold
    #[serde(default)]
    pub requirements: Vec<Requirement>,

    /// Applied in order
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Transition {
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};
use uuid::Uuid;

use super::revision::FieldDelta;
use super::workflow::WorkflowDefinition;
use crate::error::{AppError, Result};

static FIELD_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,63}$").expect("field key pattern compiles"));

/// Check whether a string is a usable field key
pub fn is_valid_field_key(key: &str) -> bool {
    FIELD_KEY_PATTERN.is_match(key)
}

/// A tracked incident (incident, request, complaint or query) bound to one
/// published workflow definition.
///
/// `current_state`, `state_entered_at`, `revision` and `sequence` only change
/// through the transition engine's commit path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    /// Unique identifier
    pub id: Uuid,

    /// Incident type; selects the workflow
    pub incident_type: String,

    /// Bound workflow definition
    pub definition_id: Uuid,

    /// Version of the bound workflow definition
    pub definition_version: u32,

    /// Current workflow state
    pub(crate) current_state: Uuid,

    /// When the current state was entered
    pub(crate) state_entered_at: DateTime<Utc>,

    /// Optimistic concurrency counter, bumped by every commit
    pub(crate) revision: u64,

    /// Sequence of the latest revision entry; moves only on transitions
    pub(crate) sequence: u64,

    /// Typed per-type field bag
    pub fields: HashMap<String, FieldValue>,

    /// Owning department
    pub department: Option<String>,

    /// Current assignee
    pub assignee: Option<String>,

    /// Actor who raised the incident
    pub reporter: String,

    /// Number of attachments, supplied by the attachment subsystem
    pub attachment_count: u32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Incident {
    /// Create a new incident in the initial state of a published definition
    pub fn new(definition: &WorkflowDefinition, reporter: impl Into<String>) -> Result<Self> {
        if !definition.is_published() {
            return Err(AppError::Validation(format!(
                "Incidents cannot bind to draft definition {}",
                definition.id
            )));
        }

        let initial = definition.initial_state().ok_or_else(|| {
            AppError::Validation(format!("Definition {} has no initial state", definition.id))
        })?;

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            incident_type: definition.incident_type.clone(),
            definition_id: definition.id,
            definition_version: definition.version,
            current_state: initial.id,
            state_entered_at: now,
            revision: 1,
            sequence: 1,
            fields: HashMap::new(),
            department: None,
            assignee: None,
            reporter: reporter.into(),
            attachment_count: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    pub fn current_state(&self) -> Uuid {
        self.current_state
    }

    pub fn state_entered_at(&self) -> DateTime<Utc> {
        self.state_entered_at
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of revision entries written so far
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Check if incident has been soft-deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Get a field value
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Builder-style field setter
    pub fn with_field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Apply one action delta
    pub(crate) fn apply_delta(&mut self, delta: &FieldDelta) {
        match delta {
            FieldDelta::Field { key, after, .. } => match after {
                Some(value) => {
                    self.fields.insert(key.clone(), value.clone());
                }
                None => {
                    self.fields.remove(key);
                }
            },
            FieldDelta::Department { after, .. } => self.department = after.clone(),
            FieldDelta::Assignee { after, .. } => self.assignee = after.clone(),
        }
    }

    /// Record a field edit; the state and the revision trail stay put
    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
        self.revision += 1;
    }

    /// Move into a state at the given commit time
    pub(crate) fn enter_state(&mut self, state: Uuid, at: DateTime<Utc>) {
        self.current_state = state;
        self.state_entered_at = at;
        self.updated_at = at;
        self.revision += 1;
        self.sequence += 1;
    }
}

/// Typed value held in an incident's field bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(DateTime<Utc>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    /// Kind of this value
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Number(_) => FieldKind::Number,
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Date(_) => FieldKind::Date,
        }
    }

    /// Text values that are empty or whitespace only
    pub fn is_blank(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.trim().is_empty())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Render for message templates
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Date(d) => d.to_rfc3339(),
        }
    }
}

/// Declared kind of a field value
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Bool,
    Date,
}

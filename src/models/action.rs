use serde::{Deserialize, Serialize};

use super::incident::{FieldKind, FieldValue};

/// Side effect applied as part of a committed transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Set a field to a fixed value
    SetField { field: String, value: FieldValue },

    /// Copy a value of the declared kind out of the transition payload
    SetFieldFromPayload {
        field: String,
        payload_key: String,
        kind: FieldKind,
    },

    /// Remove a field
    ClearField { field: String },

    /// Reassign the owning department
    AssignDepartment { department: String },

    /// Assign the incident to the requesting actor
    AssignToActor,

    /// Remove the assignee
    Unassign,

    /// Send a templated message through the notifier
    Notify {
        channel: String,
        template: String,
        #[serde(default)]
        best_effort: bool,
    },

    #[serde(other)]
    Unsupported,
}

impl Action {
    /// Field key this action writes, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            Action::SetField { field, .. }
            | Action::SetFieldFromPayload { field, .. }
            | Action::ClearField { field } => Some(field),
            _ => None,
        }
    }
}

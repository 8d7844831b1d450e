use serde::{Deserialize, Serialize};

use super::incident::{FieldKind, FieldValue};

/// Precondition gating a transition.
///
/// Kinds this build does not know deserialize to `Unsupported` and always
/// evaluate as unmet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
    /// Field is present, of the declared kind and (for text) not blank
    FieldPresent { field: String, kind: FieldKind },

    /// Field holds exactly this value
    FieldEquals { field: String, value: FieldValue },

    /// Numeric field is at least `min`
    NumberAtLeast { field: String, min: f64 },

    /// Actor carries the named role
    ActorHasRole { role: String },

    /// Actor belongs to the incident's owning department
    ActorInOwningDepartment,

    /// Incident has at least `min` attachments
    AttachmentCountAtLeast { min: u32 },

    /// Incident has an assignee
    AssigneePresent,

    #[serde(other)]
    Unsupported,
}

impl Requirement {
    /// Short human-readable form used in error listings
    pub fn describe(&self) -> String {
        match self {
            Requirement::FieldPresent { field, kind } => format!("field_present({field}: {kind})"),
            Requirement::FieldEquals { field, value } => {
                format!("field_equals({field} = {})", value.render())
            }
            Requirement::NumberAtLeast { field, min } => format!("number_at_least({field} >= {min})"),
            Requirement::ActorHasRole { role } => format!("actor_has_role({role})"),
            Requirement::ActorInOwningDepartment => "actor_in_owning_department".to_string(),
            Requirement::AttachmentCountAtLeast { min } => {
                format!("attachment_count_at_least({min})")
            }
            Requirement::AssigneePresent => "assignee_present".to_string(),
            Requirement::Unsupported => "unsupported".to_string(),
        }
    }

    /// Field key this requirement reads, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            Requirement::FieldPresent { field, .. }
            | Requirement::FieldEquals { field, .. }
            | Requirement::NumberAtLeast { field, .. } => Some(field),
            _ => None,
        }
    }
}

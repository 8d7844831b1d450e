use crate::models::{Actor, FieldKind, FieldValue, Incident, Requirement};
use serde::{Deserialize, Serialize};

/// Outcome of one requirement check
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub satisfied: bool,
    pub reason: Option<String>,
}

impl Evaluation {
    fn met() -> Self {
        Self {
            satisfied: true,
            reason: None,
        }
    }

    fn unmet(reason: impl Into<String>) -> Self {
        Self {
            satisfied: false,
            reason: Some(reason.into()),
        }
    }
}

/// A requirement that failed, with the user-facing reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmetRequirement {
    pub requirement: String,
    pub reason: String,
}

/// Evaluate one requirement against an incident snapshot and actor.
///
/// Pure: reads only its arguments. Unknown kinds and kind mismatches fail
/// closed.
pub fn evaluate(requirement: &Requirement, incident: &Incident, actor: &Actor) -> Evaluation {
    match requirement {
        Requirement::FieldPresent { field, kind } => match incident.field(field) {
            None => Evaluation::unmet(format!("field '{}' is missing", field)),
            Some(value) if value.kind() != *kind => kind_mismatch(field, *kind, value),
            Some(value) if value.is_blank() => {
                Evaluation::unmet(format!("field '{}' is empty", field))
            }
            Some(_) => Evaluation::met(),
        },

        Requirement::FieldEquals { field, value: expected } => match incident.field(field) {
            None => Evaluation::unmet(format!("field '{}' is missing", field)),
            Some(value) if value.kind() != expected.kind() => {
                kind_mismatch(field, expected.kind(), value)
            }
            Some(value) if value == expected => Evaluation::met(),
            Some(value) => Evaluation::unmet(format!(
                "field '{}' is '{}', expected '{}'",
                field,
                value.render(),
                expected.render()
            )),
        },

        Requirement::NumberAtLeast { field, min } => match incident.field(field) {
            None => Evaluation::unmet(format!("field '{}' is missing", field)),
            Some(value) => match value.as_number() {
                None => kind_mismatch(field, FieldKind::Number, value),
                Some(n) if n >= *min => Evaluation::met(),
                Some(n) => Evaluation::unmet(format!(
                    "field '{}' is {}, must be at least {}",
                    field, n, min
                )),
            },
        },

        Requirement::ActorHasRole { role } => {
            if actor.has_role(role) {
                Evaluation::met()
            } else {
                Evaluation::unmet(format!("actor '{}' lacks role '{}'", actor.id, role))
            }
        }

        Requirement::ActorInOwningDepartment => match (&incident.department, &actor.department) {
            (None, _) => Evaluation::unmet("incident has no owning department"),
            (Some(owner), Some(dept)) if owner == dept => Evaluation::met(),
            (Some(owner), _) => Evaluation::unmet(format!(
                "actor '{}' is not in owning department '{}'",
                actor.id, owner
            )),
        },

        Requirement::AttachmentCountAtLeast { min } => {
            if incident.attachment_count >= *min {
                Evaluation::met()
            } else {
                Evaluation::unmet(format!(
                    "incident has {} attachment(s), at least {} required",
                    incident.attachment_count, min
                ))
            }
        }

        Requirement::AssigneePresent => {
            if incident.assignee.is_some() {
                Evaluation::met()
            } else {
                Evaluation::unmet("incident has no assignee")
            }
        }

        Requirement::Unsupported => Evaluation::unmet("unsupported requirement"),
    }
}

fn kind_mismatch(field: &str, expected: FieldKind, actual: &FieldValue) -> Evaluation {
    Evaluation::unmet(format!(
        "field '{}' is {}, expected {}",
        field,
        actual.kind(),
        expected
    ))
}

/// Evaluate every requirement (no short-circuit) and list the unmet ones
pub fn evaluate_all(
    requirements: &[Requirement],
    incident: &Incident,
    actor: &Actor,
) -> Vec<UnmetRequirement> {
    requirements
        .iter()
        .filter_map(|requirement| {
            let evaluation = evaluate(requirement, incident, actor);
            if evaluation.satisfied {
                None
            } else {
                Some(UnmetRequirement {
                    requirement: requirement.describe(),
                    reason: evaluation
                        .reason
                        .unwrap_or_else(|| "requirement not met".to_string()),
                })
            }
        })
        .collect()
}

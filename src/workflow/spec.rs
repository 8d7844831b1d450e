//! Declarative, name-based workflow description (YAML).

use crate::error::{AppError, Result};
use crate::models::{Action, Requirement, State, Transition, WorkflowDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;
use validator::Validate;

/// Workflow described with state names instead of identities
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WorkflowSpec {
    #[validate(length(min = 1, max = 100))]
    pub incident_type: String,

    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[validate(length(min = 1))]
    pub states: Vec<StateSpec>,

    #[serde(default)]
    pub transitions: Vec<TransitionSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSpec {
    pub name: String,
    pub label: Option<String>,
    pub sla_minutes: Option<u32>,
    #[serde(default)]
    pub initial: bool,
    #[serde(default)]
    pub terminal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub name: String,
    pub from: String,
    pub to: String,
    pub permission: String,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl WorkflowSpec {
    pub fn from_yaml(source: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Read a spec from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&source)
    }

    /// Build a draft definition, resolving state names to fresh identities
    pub fn into_draft(&self) -> Result<WorkflowDefinition> {
        self.validate()?;

        let mut def = WorkflowDefinition::new_draft(&self.incident_type, &self.name);
        let mut ids: HashMap<&str, Uuid> = HashMap::new();

        for spec in &self.states {
            let mut state = State::new(&spec.name);
            if let Some(label) = &spec.label {
                state.label = label.clone();
            }
            state.sla_minutes = spec.sla_minutes;
            state.initial = spec.initial;
            state.terminal = spec.terminal;

            ids.insert(spec.name.as_str(), state.id);
            def.states.push(state);
        }

        let mut unknown = Vec::new();
        for spec in &self.transitions {
            let from = ids.get(spec.from.as_str()).copied();
            let to = ids.get(spec.to.as_str()).copied();

            match (from, to) {
                (Some(from), Some(to)) => def.transitions.push(Transition {
                    id: Uuid::new_v4(),
                    name: spec.name.clone(),
                    from,
                    to,
                    permission: spec.permission.clone(),
                    requirements: spec.requirements.clone(),
                    actions: spec.actions.clone(),
                }),
                _ => {
                    for name in [&spec.from, &spec.to] {
                        if !ids.contains_key(name.as_str()) {
                            unknown.push(format!(
                                "transition '{}' references unknown state '{}'",
                                spec.name, name
                            ));
                        }
                    }
                }
            }
        }

        if !unknown.is_empty() {
            return Err(AppError::Validation(unknown.join("; ")));
        }

        Ok(def)
    }
}

use crate::models::Incident;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([a-z][a-z0-9_]*)\}\}").expect("placeholder pattern compiles"));

/// Variables available to `{{name}}` placeholders in notification templates
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    variables: HashMap<String, String>,
}

impl TemplateContext {
    /// Built-in incident attributes plus every field, rendered as text.
    ///
    /// Fields never shadow the built-ins.
    pub fn from_incident(incident: &Incident) -> Self {
        let mut variables: HashMap<String, String> = incident
            .fields
            .iter()
            .map(|(key, value)| (key.clone(), value.render()))
            .collect();

        variables.insert("id".to_string(), incident.id.to_string());
        variables.insert("incident_type".to_string(), incident.incident_type.clone());
        variables.insert("reporter".to_string(), incident.reporter.clone());
        variables.insert(
            "assignee".to_string(),
            incident.assignee.clone().unwrap_or_default(),
        );
        variables.insert(
            "department".to_string(),
            incident.department.clone().unwrap_or_default(),
        );

        Self { variables }
    }

    /// Replace every known `{{name}}` in one left-to-right pass.
    ///
    /// Substituted values are never rescanned; unknown placeholders stay as
    /// written.
    pub fn render(&self, template: &str) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                self.variables
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

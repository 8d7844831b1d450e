//! Workflow duplication and topology comparison.

use crate::error::Result;
use crate::models::{DefinitionStatus, State, Transition, WorkflowDefinition};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

/// Deep-copy a definition into a new draft.
///
/// Every state and transition gets a fresh identity; references are
/// rewritten through an explicit old-id to new-id table. Requirements and
/// actions are copied by value.
pub fn duplicate_definition(source: &WorkflowDefinition) -> WorkflowDefinition {
    let state_ids: HashMap<Uuid, Uuid> = source
        .states
        .iter()
        .map(|s| (s.id, Uuid::new_v4()))
        .collect();

    let states = source
        .states
        .iter()
        .map(|s| State {
            id: state_ids[&s.id],
            ..s.clone()
        })
        .collect();

    // Dangling references in a draft source stay dangling (fresh ids) so
    // publish-time validation still catches them.
    let remap = |id: Uuid| state_ids.get(&id).copied().unwrap_or_else(Uuid::new_v4);

    let transitions = source
        .transitions
        .iter()
        .map(|t| Transition {
            id: Uuid::new_v4(),
            from: remap(t.from),
            to: remap(t.to),
            ..t.clone()
        })
        .collect();

    WorkflowDefinition {
        id: Uuid::new_v4(),
        incident_type: source.incident_type.clone(),
        name: source.name.clone(),
        version: 0,
        status: DefinitionStatus::Draft,
        states,
        transitions,
        created_at: Utc::now(),
        published_at: None,
        duplicated_from: Some(source.id),
    }
}

/// Identity-independent fingerprint of a workflow graph.
///
/// Two definitions with the same states (names, flags, SLAs) and the same
/// named edges between them produce the same digest.
pub fn topology_fingerprint(def: &WorkflowDefinition) -> String {
    let mut lines = state_lines(def);
    lines.extend(def.transitions.iter().map(|t| edge_line(def, t)));
    digest(lines)
}

/// Topology plus everything a transition enforces or does: permission
/// codes, requirements and actions.
pub fn content_fingerprint(def: &WorkflowDefinition) -> Result<String> {
    let mut lines = state_lines(def);
    for t in &def.transitions {
        lines.push(format!(
            "{}:{}:{}:{}",
            edge_line(def, t),
            t.permission,
            serde_json::to_string(&t.requirements)?,
            serde_json::to_string(&t.actions)?
        ));
    }
    Ok(digest(lines))
}

fn state_lines(def: &WorkflowDefinition) -> Vec<String> {
    def.states
        .iter()
        .map(|s| {
            format!(
                "state:{}:{}:{}:{}",
                s.name,
                s.initial,
                s.terminal,
                s.sla_minutes.map(|m| m.to_string()).unwrap_or_default()
            )
        })
        .collect()
}

fn edge_line(def: &WorkflowDefinition, t: &Transition) -> String {
    format!(
        "edge:{}:{}:{}",
        def.state_name(t.from),
        t.name,
        def.state_name(t.to)
    )
}

fn digest(mut lines: Vec<String>) -> String {
    lines.sort();

    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }

    format!("{:x}", hasher.finalize())
}

//! Publish-time checks for workflow definitions.
//!
//! Every problem is collected so a single `Validation` error reports the
//! whole list rather than the first failure.

use crate::error::{AppError, Result};
use crate::models::{is_valid_field_key, Action, Requirement, WorkflowDefinition};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// Validate a definition against the invariants required for publishing
pub fn validate_definition(def: &WorkflowDefinition) -> Result<()> {
    let problems = collect_problems(def);

    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(problems.join("; ")))
    }
}

/// Every problem preventing publication, in a stable order
pub fn collect_problems(def: &WorkflowDefinition) -> Vec<String> {
    let mut problems = Vec::new();

    if def.incident_type.trim().is_empty() {
        problems.push("incident type must not be empty".to_string());
    }

    // States
    let initial: Vec<_> = def.states.iter().filter(|s| s.initial).collect();
    match initial.len() {
        0 => problems.push("no initial state".to_string()),
        1 => {}
        n => problems.push(format!("{} initial states, expected exactly one", n)),
    }

    if !def.states.iter().any(|s| s.terminal) {
        problems.push("no terminal state".to_string());
    }

    let mut names = HashSet::new();
    let mut seen_state_ids = HashSet::new();
    for state in &def.states {
        if !seen_state_ids.insert(state.id) {
            problems.push(format!("duplicate state id {}", state.id));
        }
        if state.name.trim().is_empty() {
            problems.push(format!("state {} has an empty name", state.id));
        } else if !names.insert(state.name.as_str()) {
            problems.push(format!("duplicate state name '{}'", state.name));
        }
        if state.sla_minutes == Some(0) {
            problems.push(format!("state '{}' has a zero SLA", state.name));
        }
    }

    // Transitions
    let state_ids: HashSet<Uuid> = def.states.iter().map(|s| s.id).collect();
    let terminal_ids: HashSet<Uuid> = def
        .states
        .iter()
        .filter(|s| s.terminal)
        .map(|s| s.id)
        .collect();
    let initial_ids: HashSet<Uuid> = initial.iter().map(|s| s.id).collect();
    let mut edge_names = HashSet::new();
    let mut seen_transition_ids = HashSet::new();

    for transition in &def.transitions {
        let label = format!("transition '{}'", transition.name);

        if !seen_transition_ids.insert(transition.id) {
            problems.push(format!("{} reuses transition id {}", label, transition.id));
        }

        if transition.name.trim().is_empty() {
            problems.push(format!("transition {} has an empty name", transition.id));
        }
        if transition.permission.trim().is_empty() {
            problems.push(format!("{} has no permission code", label));
        }
        if !state_ids.contains(&transition.from) {
            problems.push(format!("{} references unknown source state {}", label, transition.from));
        }
        if !state_ids.contains(&transition.to) {
            problems.push(format!("{} references unknown target state {}", label, transition.to));
        }
        if initial_ids.contains(&transition.to) {
            problems.push(format!("{} targets the initial state", label));
        }
        if terminal_ids.contains(&transition.from) {
            problems.push(format!("{} leaves terminal state '{}'", label, def.state_name(transition.from)));
        }
        if !edge_names.insert((transition.from, transition.name.as_str())) {
            problems.push(format!(
                "duplicate {} out of state '{}'",
                label,
                def.state_name(transition.from)
            ));
        }

        for field in transition
            .requirements
            .iter()
            .filter_map(Requirement::field)
            .chain(transition.actions.iter().filter_map(Action::field))
        {
            if !is_valid_field_key(field) {
                problems.push(format!("{} uses invalid field key '{}'", label, field));
            }
        }
        for action in &transition.actions {
            if let Action::SetFieldFromPayload { payload_key, .. } = action {
                if !is_valid_field_key(payload_key) {
                    problems.push(format!("{} uses invalid payload key '{}'", label, payload_key));
                }
            }
        }
    }

    // Reachability is only meaningful with a single start
    if let [start] = initial.as_slice() {
        let reachable = reachable_states(def, start.id);
        for state in &def.states {
            if !reachable.contains(&state.id) {
                problems.push(format!("state '{}' is unreachable from '{}'", state.name, start.name));
            }
        }
    }

    problems
}

/// Breadth-first walk of the transition graph from `start`
pub fn reachable_states(def: &WorkflowDefinition, start: Uuid) -> HashSet<Uuid> {
    let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for transition in &def.transitions {
        adjacency.entry(transition.from).or_default().push(transition.to);
    }

    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        for next in adjacency.get(&current).into_iter().flatten() {
            if seen.insert(*next) {
                queue.push_back(*next);
            }
        }
    }

    seen
}

//! Shared fixtures for the integration tests

#![allow(dead_code)]

use incident_workflow::actions::{LoggingNotifier, Notifier};
use incident_workflow::config::EngineConfig;
use incident_workflow::models::{Actor, ActorPermissions};
use incident_workflow::state::IncidentStore;
use incident_workflow::workflow::{DefinitionStore, WorkflowSpec};
use incident_workflow::{TransitionEngine, WorkflowDefinition};
use std::sync::Arc;
use uuid::Uuid;

/// `new --submit--> review --approve--> closed`, 24h SLA on review, plus a
/// `note` self-loop on review
pub const COMPLAINT_SPEC: &str = r#"
incident_type: complaint
name: Complaint handling
states:
  - name: new
    initial: true
  - name: review
    sla_minutes: 1440
  - name: closed
    terminal: true
transitions:
  - name: submit
    from: new
    to: review
    permission: complaint.submit
    requirements:
      - type: field_present
        field: description
        kind: text
    actions:
      - type: assign_to_actor
  - name: note
    from: review
    to: review
    permission: complaint.submit
    actions:
      - type: set_field_from_payload
        field: last_note
        payload_key: note
        kind: text
  - name: approve
    from: review
    to: closed
    permission: complaint.approve
"#;

/// Parse, import and publish a YAML spec
pub async fn publish_spec(definitions: &DefinitionStore, yaml: &str) -> Arc<WorkflowDefinition> {
    let spec = WorkflowSpec::from_yaml(yaml).expect("spec parses");
    let draft = definitions.import_spec(&spec).expect("spec imports");
    definitions.publish(&draft.id).await.expect("spec publishes")
}

pub struct Harness {
    pub engine: Arc<TransitionEngine>,
    pub definitions: Arc<DefinitionStore>,
    pub store: Arc<dyn IncidentStore>,
    pub workflow: Arc<WorkflowDefinition>,
}

impl Harness {
    pub async fn new(store: Arc<dyn IncidentStore>) -> Self {
        Self::with(store, Arc::new(LoggingNotifier), EngineConfig::default(), COMPLAINT_SPEC).await
    }

    pub async fn with(
        store: Arc<dyn IncidentStore>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
        spec: &str,
    ) -> Self {
        let definitions = Arc::new(DefinitionStore::with_persistence(store.clone()));
        let workflow = publish_spec(&definitions, spec).await;
        let engine = Arc::new(TransitionEngine::new(
            store.clone(),
            definitions.clone(),
            Arc::new(ActorPermissions),
            notifier,
            config,
        ));

        Self {
            engine,
            definitions,
            store,
            workflow,
        }
    }

    /// Transition id by source state and name
    pub fn transition(&self, from: &str, name: &str) -> Uuid {
        self.workflow
            .find_transition(from, name)
            .unwrap_or_else(|| panic!("no transition {from}/{name}"))
            .id
    }

    pub fn state(&self, name: &str) -> Uuid {
        self.workflow
            .state_by_name(name)
            .unwrap_or_else(|| panic!("no state {name}"))
            .id
    }
}

pub fn reporter() -> Actor {
    Actor::new("reporter-1")
}

pub fn agent() -> Actor {
    Actor::new("agent-1").with_permission("complaint.submit")
}

pub fn supervisor() -> Actor {
    Actor::new("supervisor-1")
        .with_role("supervisor")
        .with_permission("complaint.submit")
        .with_permission("complaint.approve")
}

use crate::actions::{ActionExecutor, Notifier};
use crate::config::EngineConfig;
use crate::engine::locks::IncidentLocks;
use crate::error::{AppError, Result};
use crate::metrics::{INCIDENTS_CREATED_TOTAL, TRANSITIONS_TOTAL, TRANSITION_DURATION_SECONDS};
use crate::models::{
    is_valid_field_key, Actor, FieldDelta, FieldEdit, FieldValue, Incident, PermissionProvider,
    RevisionEntry, Transition, WorkflowDefinition,
};
use crate::requirements::evaluate_all;
use crate::sla::{status, SlaStatus};
use crate::state::{FieldEditCommit, IncidentStore, TransitionCommit};
use crate::workflow::DefinitionStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Caller-supplied data accompanying a transition request
#[derive(Debug, Clone, Default)]
pub struct TransitionPayload {
    /// Values readable by `set_field_from_payload` actions
    pub values: HashMap<String, FieldValue>,

    /// Free text stored on the revision entry
    pub comment: Option<String>,
}

impl TransitionPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Result of a committed transition
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub incident: Incident,
    pub revision: RevisionEntry,
    pub sla: SlaStatus,
}

/// Drives incidents through their bound workflow definitions
pub struct TransitionEngine {
    store: Arc<dyn IncidentStore>,
    definitions: Arc<DefinitionStore>,
    permissions: Arc<dyn PermissionProvider>,
    executor: ActionExecutor,
    locks: IncidentLocks,
    config: EngineConfig,
}

impl TransitionEngine {
    pub fn new(
        store: Arc<dyn IncidentStore>,
        definitions: Arc<DefinitionStore>,
        permissions: Arc<dyn PermissionProvider>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            definitions,
            permissions,
            executor: ActionExecutor::new(notifier, config.notify_timeout()),
            locks: IncidentLocks::new(),
            config,
        }
    }

    pub fn definitions(&self) -> &Arc<DefinitionStore> {
        &self.definitions
    }

    /// Open an incident against the latest published workflow of its type
    pub async fn create_incident(
        &self,
        incident_type: &str,
        actor: &Actor,
        fields: HashMap<String, FieldValue>,
        department: Option<String>,
    ) -> Result<Incident> {
        validate_field_keys(&fields)?;

        let definition = self.definitions.get(incident_type, None)?;

        let mut incident = Incident::new(&definition, actor.id.clone())?;
        incident.fields = fields;
        incident.department = department;

        let creation = RevisionEntry::creation(&incident, &actor.id);
        self.store.create_incident(&incident, &creation).await?;

        INCIDENTS_CREATED_TOTAL.inc();
        info!(
            incident_id = %incident.id,
            incident_type = %incident.incident_type,
            definition_version = incident.definition_version,
            actor = %actor.id,
            "Incident created"
        );

        Ok(incident)
    }

    /// Non-deleted incident by id
    pub async fn get_incident(&self, incident_id: &Uuid) -> Result<Incident> {
        match self.store.get_incident(incident_id).await? {
            Some(incident) if !incident.is_deleted() => Ok(incident),
            _ => Err(AppError::NotFound(format!(
                "Incident {} not found",
                incident_id
            ))),
        }
    }

    /// Move an incident along one transition of its bound workflow.
    ///
    /// Checks run in order: terminal state, transition lookup, permission,
    /// requirements, actions. Nothing is persisted unless all pass and the
    /// commit lands before the configured timeout.
    pub async fn request_transition(
        &self,
        incident_id: Uuid,
        transition_id: Uuid,
        actor: &Actor,
        payload: TransitionPayload,
    ) -> Result<TransitionOutcome> {
        let start = Instant::now();
        let result = self
            .run_transition(incident_id, transition_id, actor, payload)
            .await;

        TRANSITION_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());
        TRANSITIONS_TOTAL
            .with_label_values(&[outcome_label(&result)])
            .inc();

        if let Err(e) = &result {
            warn!(
                incident_id = %incident_id,
                transition_id = %transition_id,
                actor = %actor.id,
                error_code = e.error_code(),
                error = %e,
                "Transition rejected"
            );
        }

        result
    }

    async fn run_transition(
        &self,
        incident_id: Uuid,
        transition_id: Uuid,
        actor: &Actor,
        payload: TransitionPayload,
    ) -> Result<TransitionOutcome> {
        let _guard = self.locks.try_acquire(incident_id)?;

        let incident = self.get_incident(&incident_id).await?;
        let definition = self.definitions.get_by_id(&incident.definition_id)?;

        let current = definition.state(incident.current_state()).ok_or_else(|| {
            AppError::Internal(format!(
                "Incident {} is in state {} which its workflow does not define",
                incident_id,
                incident.current_state()
            ))
        })?;

        if current.terminal {
            return Err(AppError::TerminalState {
                incident_id: incident_id.to_string(),
                state: current.name.clone(),
            });
        }

        let transition = definition
            .transition(transition_id)
            .filter(|t| t.from == current.id)
            .ok_or_else(|| {
                AppError::InvalidTransition(format!(
                    "transition {} is not available from state '{}'",
                    transition_id, current.name
                ))
            })?;

        if !self.permissions.has_permission(actor, &transition.permission) {
            return Err(AppError::PermissionDenied {
                actor: actor.id.clone(),
                permission: transition.permission.clone(),
            });
        }

        let unmet = evaluate_all(&transition.requirements, &incident, actor);
        if !unmet.is_empty() {
            return Err(AppError::RequirementsNotMet { unmet });
        }

        let deltas = self
            .executor
            .execute(
                incident_id,
                &transition.actions,
                &incident,
                actor,
                &payload.values,
            )
            .await?;

        let mut next = incident.clone();
        for delta in &deltas {
            next.apply_delta(delta);
        }
        let committed_at = Utc::now();
        next.enter_state(transition.to, committed_at);

        let revision = RevisionEntry::for_transition(
            &next,
            current.id,
            transition.id,
            &actor.id,
            payload.comment,
            deltas,
        );

        let commit = self.commit(next, incident.revision(), revision).await?;

        info!(
            incident_id = %incident_id,
            transition = %transition.name,
            from = %current.name,
            to = %definition.state_name(transition.to),
            revision = commit.revision.sequence,
            actor = %actor.id,
            "Transition committed"
        );

        let sla = status(
            &commit.incident,
            &definition,
            committed_at,
            self.config.at_risk_ratio,
        );

        Ok(TransitionOutcome {
            incident: commit.incident,
            revision: commit.revision,
            sla,
        })
    }

    /// Set or overwrite fields outside a transition.
    ///
    /// Recorded in the field-edit log, not the revision trail; the state and
    /// its SLA clock stay put. Incidents in terminal states are frozen.
    pub async fn update_fields(
        &self,
        incident_id: Uuid,
        actor: &Actor,
        fields: HashMap<String, FieldValue>,
    ) -> Result<Incident> {
        validate_field_keys(&fields)?;

        let _guard = self.locks.try_acquire(incident_id)?;
        let incident = self.get_incident(&incident_id).await?;
        let definition = self.definitions.get_by_id(&incident.definition_id)?;

        if is_terminal(&definition, &incident) {
            return Err(AppError::TerminalState {
                incident_id: incident_id.to_string(),
                state: definition.state_name(incident.current_state()),
            });
        }

        let mut keys: Vec<_> = fields.into_iter().collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0));

        let deltas: Vec<FieldDelta> = keys
            .into_iter()
            .filter(|(key, value)| incident.field(key) != Some(value))
            .map(|(key, value)| FieldDelta::Field {
                before: incident.field(&key).cloned(),
                key,
                after: Some(value),
            })
            .collect();

        if deltas.is_empty() {
            return Ok(incident);
        }

        let mut next = incident.clone();
        for delta in &deltas {
            next.apply_delta(delta);
        }
        next.touch(Utc::now());

        let commit = FieldEditCommit {
            edit: FieldEdit::new(&next, &actor.id, deltas),
            incident: next,
            expected_revision: incident.revision(),
            deadline: Instant::now() + self.config.commit_timeout(),
        };
        self.bounded(incident_id, self.store.commit_field_edit(&commit))
            .await?;

        info!(
            incident_id = %incident_id,
            revision = commit.edit.revision,
            fields = commit.edit.deltas.len(),
            actor = %actor.id,
            "Incident fields updated"
        );

        Ok(commit.incident)
    }

    /// Persist a transition through the store's CAS commit
    async fn commit(
        &self,
        incident: Incident,
        expected_revision: u64,
        revision: RevisionEntry,
    ) -> Result<TransitionCommit> {
        let incident_id = incident.id;
        let commit = TransitionCommit {
            incident,
            expected_revision,
            revision,
            deadline: Instant::now() + self.config.commit_timeout(),
        };

        self.bounded(incident_id, self.store.commit_transition(&commit))
            .await?;
        Ok(commit)
    }

    /// Run a store write under the commit timeout
    async fn bounded<F>(&self, incident_id: Uuid, write: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        let timeout = self.config.commit_timeout();
        match tokio::time::timeout(timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "commit for incident {} exceeded {:?}",
                incident_id, timeout
            ))),
        }
    }

    pub async fn get_sla_status(&self, incident_id: &Uuid) -> Result<SlaStatus> {
        self.get_sla_status_at(incident_id, Utc::now()).await
    }

    /// SLA status as of an explicit instant
    pub async fn get_sla_status_at(
        &self,
        incident_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<SlaStatus> {
        let incident = self.get_incident(incident_id).await?;
        let definition = self.definitions.get_by_id(&incident.definition_id)?;
        Ok(status(&incident, &definition, now, self.config.at_risk_ratio))
    }

    /// Transitions leaving the current state that the actor may trigger.
    ///
    /// Requirements are not evaluated. Terminal states yield nothing.
    pub async fn get_available_transitions(
        &self,
        incident_id: &Uuid,
        actor: &Actor,
    ) -> Result<Vec<Transition>> {
        let incident = self.get_incident(incident_id).await?;
        let definition = self.definitions.get_by_id(&incident.definition_id)?;

        if is_terminal(&definition, &incident) {
            return Ok(Vec::new());
        }

        Ok(definition
            .transitions_from(incident.current_state())
            .filter(|t| self.permissions.has_permission(actor, &t.permission))
            .cloned()
            .collect())
    }

    /// Audit trail in sequence order; kept for soft-deleted incidents
    pub async fn list_revisions(&self, incident_id: &Uuid) -> Result<Vec<RevisionEntry>> {
        if self.store.get_incident(incident_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Incident {} not found",
                incident_id
            )));
        }
        self.store.list_revisions(incident_id).await
    }

    /// Field edits made outside transitions, oldest first
    pub async fn list_field_edits(&self, incident_id: &Uuid) -> Result<Vec<FieldEdit>> {
        if self.store.get_incident(incident_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Incident {} not found",
                incident_id
            )));
        }
        self.store.list_field_edits(incident_id).await
    }

    /// Soft delete; repeated calls are no-ops
    pub async fn delete_incident(&self, incident_id: &Uuid) -> Result<()> {
        self.store.soft_delete_incident(incident_id, Utc::now()).await?;
        info!(incident_id = %incident_id, "Incident deleted");
        Ok(())
    }

    /// New draft copied from an existing definition
    pub fn duplicate_workflow(&self, definition_id: &Uuid) -> Result<WorkflowDefinition> {
        let copy = self.definitions.duplicate(definition_id)?;
        debug!(source_id = %definition_id, definition_id = %copy.id, "Workflow duplicated");
        Ok(copy)
    }

    /// Publish a draft; running incidents stay on their versions
    pub async fn publish_workflow(&self, draft_id: &Uuid) -> Result<Arc<WorkflowDefinition>> {
        self.definitions.publish(draft_id).await
    }
}

fn validate_field_keys(fields: &HashMap<String, FieldValue>) -> Result<()> {
    let mut invalid: Vec<&str> = fields
        .keys()
        .filter(|key| !is_valid_field_key(key))
        .map(String::as_str)
        .collect();
    if invalid.is_empty() {
        return Ok(());
    }
    invalid.sort_unstable();
    Err(AppError::Validation(format!(
        "invalid field key(s): {}",
        invalid.join(", ")
    )))
}

fn is_terminal(definition: &WorkflowDefinition, incident: &Incident) -> bool {
    definition
        .state(incident.current_state())
        .map_or(false, |state| state.terminal)
}

fn outcome_label(result: &Result<TransitionOutcome>) -> &'static str {
    match result {
        Ok(_) => "committed",
        Err(AppError::InvalidTransition(_)) => "invalid_transition",
        Err(AppError::TerminalState { .. }) => "terminal_state",
        Err(AppError::PermissionDenied { .. }) => "permission_denied",
        Err(AppError::RequirementsNotMet { .. }) => "requirements_not_met",
        Err(AppError::Action(_)) => "action_failed",
        Err(AppError::Conflict(_)) => "conflict",
        Err(AppError::Timeout(_)) => "timeout",
        Err(_) => "error",
    }
}

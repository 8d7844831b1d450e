use crate::error::{AppError, Result};
use crate::models::{DefinitionStatus, State, Transition, WorkflowDefinition};
use crate::state::IncidentStore;
use crate::workflow::duplication::duplicate_definition;
use crate::workflow::spec::WorkflowSpec;
use crate::workflow::validation::validate_definition;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Registry of workflow definitions.
///
/// Drafts are mutable and private to the store. Published definitions are
/// frozen and shared as `Arc`s, so an incident bound to a version keeps
/// seeing exactly that graph.
pub struct DefinitionStore {
    drafts: Arc<DashMap<Uuid, WorkflowDefinition>>,
    published: Arc<DashMap<Uuid, Arc<WorkflowDefinition>>>,
    persistence: Option<Arc<dyn IncidentStore>>,
    publish_lock: Mutex<()>,
}

impl DefinitionStore {
    /// Store that keeps published definitions in memory only
    pub fn new() -> Self {
        Self {
            drafts: Arc::new(DashMap::new()),
            published: Arc::new(DashMap::new()),
            persistence: None,
            publish_lock: Mutex::new(()),
        }
    }

    /// Store that writes every published definition through `persistence`
    pub fn with_persistence(persistence: Arc<dyn IncidentStore>) -> Self {
        Self {
            persistence: Some(persistence),
            ..Self::new()
        }
    }

    /// Load previously published definitions from the persistence backend
    pub async fn hydrate(&self) -> Result<usize> {
        let Some(persistence) = &self.persistence else {
            return Ok(0);
        };

        let mut loaded = 0;
        for definition in persistence.list_definitions().await? {
            if !definition.is_published() {
                warn!(definition_id = %definition.id, "Skipping persisted draft definition");
                continue;
            }
            self.published.insert(definition.id, Arc::new(definition));
            loaded += 1;
        }

        info!(count = loaded, "Hydrated published workflow definitions");
        Ok(loaded)
    }

    /// Published definition for an incident type; latest when `version` is `None`
    pub fn get(&self, incident_type: &str, version: Option<u32>) -> Result<Arc<WorkflowDefinition>> {
        let candidates = self
            .published
            .iter()
            .filter(|entry| entry.incident_type == incident_type)
            .map(|entry| entry.value().clone());

        let found = match version {
            Some(version) => candidates.into_iter().find(|def| def.version == version),
            None => candidates.max_by_key(|def| def.version),
        };

        found.ok_or_else(|| match version {
            Some(version) => AppError::NotFound(format!(
                "No published workflow for '{}' at version {}",
                incident_type, version
            )),
            None => AppError::NotFound(format!(
                "No published workflow for '{}'",
                incident_type
            )),
        })
    }

    /// Published definition by id
    pub fn get_by_id(&self, id: &Uuid) -> Result<Arc<WorkflowDefinition>> {
        self.published
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("Published workflow {} not found", id)))
    }

    /// Snapshot of a draft
    pub fn get_draft(&self, id: &Uuid) -> Result<WorkflowDefinition> {
        if let Some(draft) = self.drafts.get(id) {
            return Ok(draft.clone());
        }
        Err(self.missing_draft(id))
    }

    /// Published versions of an incident type, ascending
    pub fn list(&self, incident_type: &str) -> Vec<Arc<WorkflowDefinition>> {
        let mut versions: Vec<_> = self
            .published
            .iter()
            .filter(|entry| entry.incident_type == incident_type)
            .map(|entry| entry.value().clone())
            .collect();
        versions.sort_by_key(|def| def.version);
        versions
    }

    /// Start an empty draft
    pub fn create_draft(
        &self,
        incident_type: impl Into<String>,
        name: impl Into<String>,
    ) -> WorkflowDefinition {
        let draft = WorkflowDefinition::new_draft(incident_type, name);
        debug!(definition_id = %draft.id, incident_type = %draft.incident_type, "Draft created");
        self.drafts.insert(draft.id, draft.clone());
        draft
    }

    /// Turn a declarative spec into a draft
    pub fn import_spec(&self, spec: &WorkflowSpec) -> Result<WorkflowDefinition> {
        let draft = spec.into_draft()?;
        info!(
            definition_id = %draft.id,
            incident_type = %draft.incident_type,
            states = draft.states.len(),
            transitions = draft.transitions.len(),
            "Imported workflow spec"
        );
        self.drafts.insert(draft.id, draft.clone());
        Ok(draft)
    }

    pub fn add_state(&self, draft_id: &Uuid, state: State) -> Result<Uuid> {
        self.edit_draft(draft_id, |draft| {
            if draft.state(state.id).is_some() {
                return Err(AppError::Validation(format!(
                    "State {} already exists",
                    state.id
                )));
            }
            let id = state.id;
            draft.states.push(state);
            Ok(id)
        })
    }

    /// Replace a state, keeping its id
    pub fn update_state(&self, draft_id: &Uuid, state: State) -> Result<()> {
        self.edit_draft(draft_id, |draft| {
            let slot = draft
                .states
                .iter_mut()
                .find(|s| s.id == state.id)
                .ok_or_else(|| AppError::NotFound(format!("State {} not found", state.id)))?;
            *slot = state;
            Ok(())
        })
    }

    /// Remove a state together with every transition touching it
    pub fn remove_state(&self, draft_id: &Uuid, state_id: &Uuid) -> Result<()> {
        self.edit_draft(draft_id, |draft| {
            let before = draft.states.len();
            draft.states.retain(|s| s.id != *state_id);
            if draft.states.len() == before {
                return Err(AppError::NotFound(format!("State {} not found", state_id)));
            }
            draft
                .transitions
                .retain(|t| t.from != *state_id && t.to != *state_id);
            Ok(())
        })
    }

    /// Add a transition; both endpoints must already exist in the draft
    pub fn add_transition(&self, draft_id: &Uuid, transition: Transition) -> Result<Uuid> {
        self.edit_draft(draft_id, |draft| {
            if draft.transition(transition.id).is_some() {
                return Err(AppError::Validation(format!(
                    "Transition {} already exists",
                    transition.id
                )));
            }
            for endpoint in [transition.from, transition.to] {
                if draft.state(endpoint).is_none() {
                    return Err(AppError::Validation(format!(
                        "Transition '{}' references unknown state {}",
                        transition.name, endpoint
                    )));
                }
            }
            let id = transition.id;
            draft.transitions.push(transition);
            Ok(id)
        })
    }

    pub fn remove_transition(&self, draft_id: &Uuid, transition_id: &Uuid) -> Result<()> {
        self.edit_draft(draft_id, |draft| {
            let before = draft.transitions.len();
            draft.transitions.retain(|t| t.id != *transition_id);
            if draft.transitions.len() == before {
                return Err(AppError::NotFound(format!(
                    "Transition {} not found",
                    transition_id
                )));
            }
            Ok(())
        })
    }

    /// Validate, version and freeze a draft.
    ///
    /// The draft is withdrawn for the duration of the call; edits racing with
    /// a publish see `NotFound`. On failure the draft is put back untouched.
    pub async fn publish(&self, draft_id: &Uuid) -> Result<Arc<WorkflowDefinition>> {
        let _guard = self.publish_lock.lock().await;

        let (_, draft) = self
            .drafts
            .remove(draft_id)
            .ok_or_else(|| self.missing_draft(draft_id))?;

        if let Err(e) = validate_definition(&draft) {
            warn!(definition_id = %draft_id, error = %e, "Workflow failed validation");
            self.drafts.insert(*draft_id, draft);
            return Err(e);
        }

        let version = self
            .published
            .iter()
            .filter(|entry| entry.incident_type == draft.incident_type)
            .map(|entry| entry.version)
            .max()
            .unwrap_or(0)
            + 1;

        let mut definition = draft.clone();
        definition.version = version;
        definition.status = DefinitionStatus::Published;
        definition.published_at = Some(Utc::now());

        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save_definition(&definition).await {
                self.drafts.insert(*draft_id, draft);
                return Err(e);
            }
        }

        let definition = Arc::new(definition);
        self.published.insert(definition.id, definition.clone());

        info!(
            definition_id = %definition.id,
            incident_type = %definition.incident_type,
            version = version,
            "Workflow published"
        );

        Ok(definition)
    }

    /// Copy a draft or published definition into a new draft
    pub fn duplicate(&self, source_id: &Uuid) -> Result<WorkflowDefinition> {
        let copy = if let Some(source) = self.published.get(source_id) {
            duplicate_definition(source.value())
        } else if let Some(source) = self.drafts.get(source_id) {
            duplicate_definition(source.value())
        } else {
            return Err(AppError::NotFound(format!("Workflow {} not found", source_id)));
        };

        debug!(source_id = %source_id, definition_id = %copy.id, "Workflow duplicated");
        self.drafts.insert(copy.id, copy.clone());
        Ok(copy)
    }

    fn edit_draft<T>(
        &self,
        draft_id: &Uuid,
        edit: impl FnOnce(&mut WorkflowDefinition) -> Result<T>,
    ) -> Result<T> {
        match self.drafts.get_mut(draft_id) {
            Some(mut draft) => edit(draft.value_mut()),
            None => Err(self.missing_draft(draft_id)),
        }
    }

    fn missing_draft(&self, id: &Uuid) -> AppError {
        if self.published.contains_key(id) {
            AppError::ImmutableDefinition(format!("Workflow {} is published", id))
        } else {
            AppError::NotFound(format!("Draft workflow {} not found", id))
        }
    }
}

impl Default for DefinitionStore {
    fn default() -> Self {
        Self::new()
    }
}

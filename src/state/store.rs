use crate::error::{AppError, Result};
use crate::models::{FieldEdit, Incident, RevisionEntry, WorkflowDefinition};
use crate::state::{FieldEditCommit, IncidentFilter, IncidentStore, TransitionCommit};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Incident row with its audit logs; all change under one shard lock
#[derive(Debug, Clone)]
struct IncidentRecord {
    incident: Incident,
    revisions: Vec<RevisionEntry>,
    field_edits: Vec<FieldEdit>,
}

impl IncidentRecord {
    /// Deadline, liveness and revision checks shared by every commit
    fn check_commit(&self, expected_revision: u64, deadline: Instant) -> Result<()> {
        let incident_id = self.incident.id;

        if Instant::now() > deadline {
            return Err(AppError::Timeout(format!(
                "Commit deadline passed for incident {}",
                incident_id
            )));
        }

        if self.incident.is_deleted() {
            return Err(AppError::NotFound(format!("Incident {} was deleted", incident_id)));
        }

        if self.incident.revision() != expected_revision {
            return Err(AppError::Conflict(format!(
                "Incident {} is at revision {}, change was computed against {}",
                incident_id,
                self.incident.revision(),
                expected_revision
            )));
        }

        Ok(())
    }
}

/// In-memory incident store (for development and testing)
#[derive(Clone)]
pub struct InMemoryStore {
    incidents: Arc<DashMap<Uuid, IncidentRecord>>,
    definitions: Arc<DashMap<Uuid, WorkflowDefinition>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            incidents: Arc::new(DashMap::new()),
            definitions: Arc::new(DashMap::new()),
        }
    }

    fn filtered(&self, filter: &IncidentFilter) -> Vec<Incident> {
        self.incidents
            .iter()
            .map(|entry| entry.value().incident.clone())
            .filter(|incident| filter.matches(incident))
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IncidentStore for InMemoryStore {
    async fn create_incident(&self, incident: &Incident, creation: &RevisionEntry) -> Result<()> {
        match self.incidents.entry(incident.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "Incident {} already exists",
                incident.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(IncidentRecord {
                    incident: incident.clone(),
                    revisions: vec![creation.clone()],
                    field_edits: Vec::new(),
                });
                tracing::debug!(incident_id = %incident.id, "Incident saved");
                Ok(())
            }
        }
    }

    async fn get_incident(&self, id: &Uuid) -> Result<Option<Incident>> {
        Ok(self.incidents.get(id).map(|entry| entry.incident.clone()))
    }

    async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Incident>> {
        let mut incidents = self.filtered(filter);

        // Sort by creation time (newest first)
        incidents.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let start = (page as usize).saturating_mul(page_size as usize);

        Ok(incidents
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect())
    }

    async fn count_incidents(&self, filter: &IncidentFilter) -> Result<u64> {
        Ok(self
            .incidents
            .iter()
            .filter(|entry| filter.matches(&entry.incident))
            .count() as u64)
    }

    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<()> {
        let incident_id = commit.incident.id;

        let mut record = self
            .incidents
            .get_mut(&incident_id)
            .ok_or_else(|| AppError::NotFound(format!("Incident {} not found", incident_id)))?;

        record.check_commit(commit.expected_revision, commit.deadline)?;
        record.incident = commit.incident.clone();
        record.revisions.push(commit.revision.clone());

        tracing::debug!(
            incident_id = %incident_id,
            revision = commit.revision.sequence,
            "Transition committed"
        );
        Ok(())
    }

    async fn commit_field_edit(&self, commit: &FieldEditCommit) -> Result<()> {
        let incident_id = commit.incident.id;

        let mut record = self
            .incidents
            .get_mut(&incident_id)
            .ok_or_else(|| AppError::NotFound(format!("Incident {} not found", incident_id)))?;

        record.check_commit(commit.expected_revision, commit.deadline)?;
        record.incident = commit.incident.clone();
        record.field_edits.push(commit.edit.clone());

        tracing::debug!(
            incident_id = %incident_id,
            revision = commit.edit.revision,
            "Field edit committed"
        );
        Ok(())
    }

    async fn soft_delete_incident(&self, id: &Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut record = self
            .incidents
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Incident {} not found", id)))?;

        if record.incident.deleted_at.is_none() {
            record.incident.deleted_at = Some(at);
            record.incident.updated_at = at;
            tracing::debug!(incident_id = %id, "Incident soft-deleted");
        }
        Ok(())
    }

    async fn list_revisions(&self, incident_id: &Uuid) -> Result<Vec<RevisionEntry>> {
        Ok(self
            .incidents
            .get(incident_id)
            .map(|entry| entry.revisions.clone())
            .unwrap_or_default())
    }

    async fn list_field_edits(&self, incident_id: &Uuid) -> Result<Vec<FieldEdit>> {
        Ok(self
            .incidents
            .get(incident_id)
            .map(|entry| entry.field_edits.clone())
            .unwrap_or_default())
    }

    async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<()> {
        self.definitions.insert(definition.id, definition.clone());
        Ok(())
    }

    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>> {
        Ok(self
            .definitions
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::workflow::tests::sample_definition;
    use std::time::Duration;

    fn commit_for(incident: &Incident, expected: u64, deadline: Instant) -> TransitionCommit {
        let mut next = incident.clone();
        let from = next.current_state();
        next.enter_state(from, Utc::now());
        let revision =
            RevisionEntry::for_transition(&next, from, Uuid::new_v4(), "agent-1", None, vec![]);
        TransitionCommit {
            incident: next,
            expected_revision: expected,
            revision,
            deadline,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_incident() {
        let store = InMemoryStore::new();
        let incident = Incident::new(&sample_definition(), "reporter-1").unwrap();
        let creation = RevisionEntry::creation(&incident, "reporter-1");
        store.create_incident(&incident, &creation).await.unwrap();

        let retrieved = store.get_incident(&incident.id).await.unwrap();
        assert_eq!(retrieved.unwrap().id, incident.id);

        let revisions = store.list_revisions(&incident.id).await.unwrap();
        assert_eq!(revisions.len(), 1);
        assert!(revisions[0].is_creation());
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = InMemoryStore::new();
        let incident = Incident::new(&sample_definition(), "reporter-1").unwrap();
        let creation = RevisionEntry::creation(&incident, "reporter-1");

        store.create_incident(&incident, &creation).await.unwrap();
        let second = store.create_incident(&incident, &creation).await;
        assert!(matches!(second, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_commit_checks_revision() {
        let store = InMemoryStore::new();
        let incident = Incident::new(&sample_definition(), "reporter-1").unwrap();
        store
            .create_incident(&incident, &RevisionEntry::creation(&incident, "reporter-1"))
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        store
            .commit_transition(&commit_for(&incident, 1, deadline))
            .await
            .unwrap();

        // Same snapshot again: stale
        let stale = store
            .commit_transition(&commit_for(&incident, 1, deadline))
            .await;
        assert!(matches!(stale, Err(AppError::Conflict(_))));

        let revisions = store.list_revisions(&incident.id).await.unwrap();
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[1].sequence, 2);
    }

    #[tokio::test]
    async fn test_commit_after_deadline_changes_nothing() {
        let store = InMemoryStore::new();
        let incident = Incident::new(&sample_definition(), "reporter-1").unwrap();
        store
            .create_incident(&incident, &RevisionEntry::creation(&incident, "reporter-1"))
            .await
            .unwrap();

        let expired = Instant::now() - Duration::from_millis(1);
        let result = store
            .commit_transition(&commit_for(&incident, 1, expired))
            .await;
        assert!(matches!(result, Err(AppError::Timeout(_))));

        let stored = store.get_incident(&incident.id).await.unwrap().unwrap();
        assert_eq!(stored.revision(), 1);
        assert_eq!(store.list_revisions(&incident.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_field_edit_bypasses_revision_trail() {
        let store = InMemoryStore::new();
        let incident = Incident::new(&sample_definition(), "reporter-1").unwrap();
        store
            .create_incident(&incident, &RevisionEntry::creation(&incident, "reporter-1"))
            .await
            .unwrap();

        let mut edited = incident.clone();
        edited.touch(Utc::now());
        let edit = FieldEdit::new(&edited, "reporter-1", vec![]);
        let commit = FieldEditCommit {
            incident: edited,
            expected_revision: 1,
            edit,
            deadline: Instant::now() + Duration::from_secs(5),
        };
        store.commit_field_edit(&commit).await.unwrap();

        // Replaying the same edit is stale
        assert!(matches!(
            store.commit_field_edit(&commit).await,
            Err(AppError::Conflict(_))
        ));

        assert_eq!(store.list_revisions(&incident.id).await.unwrap().len(), 1);
        let edits = store.list_field_edits(&incident.id).await.unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].revision, 2);

        // A later transition continues the trail at sequence 2
        let stored = store.get_incident(&incident.id).await.unwrap().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        store
            .commit_transition(&commit_for(&stored, 2, deadline))
            .await
            .unwrap();
        let revisions = store.list_revisions(&incident.id).await.unwrap();
        assert_eq!(
            revisions.iter().map(|r| r.sequence).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn test_far_page_is_empty() {
        let store = InMemoryStore::new();
        let incident = Incident::new(&sample_definition(), "reporter-1").unwrap();
        store
            .create_incident(&incident, &RevisionEntry::creation(&incident, "reporter-1"))
            .await
            .unwrap();

        let page = store
            .list_incidents(&IncidentFilter::active(), u32::MAX, u32::MAX)
            .await
            .unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_revisions() {
        let store = InMemoryStore::new();
        let incident = Incident::new(&sample_definition(), "reporter-1").unwrap();
        store
            .create_incident(&incident, &RevisionEntry::creation(&incident, "reporter-1"))
            .await
            .unwrap();

        store.soft_delete_incident(&incident.id, Utc::now()).await.unwrap();

        assert_eq!(store.count_incidents(&IncidentFilter::active()).await.unwrap(), 0);
        let all = IncidentFilter {
            include_deleted: true,
            ..Default::default()
        };
        assert_eq!(store.count_incidents(&all).await.unwrap(), 1);
        assert_eq!(store.list_revisions(&incident.id).await.unwrap().len(), 1);
    }
}

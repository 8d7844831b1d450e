use crate::error::{AppError, Result};
use crate::models::{FieldEdit, Incident, RevisionEntry, WorkflowDefinition};
use crate::state::{FieldEditCommit, IncidentFilter, IncidentStore, TransitionCommit};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    Transactional, TransactionalTree,
};
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Persistent incident store using Sled embedded database.
///
/// Incidents, revisions and field edits live in separate trees; each commit
/// writes the incident and one log entry inside a multi-tree transaction.
/// Log keys are the incident id followed by a big-endian counter (sequence
/// or revision), so a prefix scan yields entries in order.
#[derive(Clone)]
pub struct SledStore {
    db: Arc<Db>,
    incidents_tree: sled::Tree,
    revisions_tree: sled::Tree,
    field_edits_tree: sled::Tree,
    definitions_tree: sled::Tree,
}

impl SledStore {
    /// Create a new Sled store at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            AppError::Database(format!("Failed to open Sled database: {}", e))
        })?;

        let incidents_tree = db.open_tree("incidents")?;
        let revisions_tree = db.open_tree("revisions")?;
        let field_edits_tree = db.open_tree("field_edits")?;
        let definitions_tree = db.open_tree("definitions")?;

        tracing::info!("Initialized Sled store at {:?}", path.as_ref());

        Ok(Self {
            db: Arc::new(db),
            incidents_tree,
            revisions_tree,
            field_edits_tree,
            definitions_tree,
        })
    }

    fn serialize_incident(incident: &Incident) -> Result<Vec<u8>> {
        bincode::serialize(incident).map_err(|e| {
            AppError::Serialization(format!("Failed to serialize incident: {}", e))
        })
    }

    fn deserialize_incident(bytes: &[u8]) -> Result<Incident> {
        bincode::deserialize(bytes).map_err(|e| {
            AppError::Serialization(format!("Failed to deserialize incident: {}", e))
        })
    }

    fn incident_key(id: &Uuid) -> Vec<u8> {
        id.as_bytes().to_vec()
    }

    fn log_key(incident_id: &Uuid, counter: u64) -> Vec<u8> {
        let mut key = Self::incident_key(incident_id);
        key.extend_from_slice(&counter.to_be_bytes());
        key
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(|e| {
            AppError::Database(format!("Failed to flush database: {}", e))
        })?;
        Ok(())
    }

    /// Get database size in bytes
    pub fn size_on_disk(&self) -> Result<u64> {
        Ok(self.db.size_on_disk()?)
    }

    fn scan_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>> {
        let mut incidents = Vec::new();
        for item in self.incidents_tree.iter() {
            let (_, value) = item?;
            let incident = Self::deserialize_incident(&value)?;
            if filter.matches(&incident) {
                incidents.push(incident);
            }
        }
        Ok(incidents)
    }
}

/// Deadline, liveness and revision checks run inside a commit transaction
fn check_commit(
    incidents: &TransactionalTree,
    key: &[u8],
    incident_id: Uuid,
    expected_revision: u64,
    deadline: Instant,
) -> ConflictableTransactionResult<(), AppError> {
    if Instant::now() > deadline {
        return Err(abort(AppError::Timeout(format!(
            "Commit deadline passed for incident {}",
            incident_id
        ))));
    }

    let stored = incidents.get(key)?.ok_or_else(|| {
        abort(AppError::NotFound(format!("Incident {} not found", incident_id)))
    })?;
    let stored = SledStore::deserialize_incident(&stored).map_err(abort)?;

    if stored.is_deleted() {
        return Err(abort(AppError::NotFound(format!(
            "Incident {} was deleted",
            incident_id
        ))));
    }

    if stored.revision() != expected_revision {
        return Err(abort(AppError::Conflict(format!(
            "Incident {} is at revision {}, change was computed against {}",
            incident_id,
            stored.revision(),
            expected_revision
        ))));
    }

    Ok(())
}

fn abort(err: AppError) -> ConflictableTransactionError<AppError> {
    ConflictableTransactionError::Abort(err)
}

fn unwrap_transaction<T>(result: std::result::Result<T, TransactionError<AppError>>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(err.into()),
    }
}

#[async_trait]
impl IncidentStore for SledStore {
    async fn create_incident(&self, incident: &Incident, creation: &RevisionEntry) -> Result<()> {
        let key = Self::incident_key(&incident.id);
        let value = Self::serialize_incident(incident)?;
        let revision_key = Self::log_key(&incident.id, creation.sequence);
        let revision_value = bincode::serialize(creation)?;

        let result = (&self.incidents_tree, &self.revisions_tree).transaction(
            |(incidents, revisions)| {
                if incidents.get(key.as_slice())?.is_some() {
                    return Err(abort(AppError::Conflict(format!(
                        "Incident {} already exists",
                        incident.id
                    ))));
                }
                incidents.insert(key.as_slice(), value.as_slice())?;
                revisions.insert(revision_key.as_slice(), revision_value.as_slice())?;
                Ok(())
            },
        );
        unwrap_transaction(result)?;

        tracing::debug!(incident_id = %incident.id, "Incident saved");
        Ok(())
    }

    async fn get_incident(&self, id: &Uuid) -> Result<Option<Incident>> {
        match self.incidents_tree.get(Self::incident_key(id))? {
            Some(bytes) => Ok(Some(Self::deserialize_incident(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Incident>> {
        let mut incidents = self.scan_incidents(filter)?;

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
        Ok(self.scan_incidents(filter)?.len() as u64)
    }

    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<()> {
        let incident_id = commit.incident.id;
        let key = Self::incident_key(&incident_id);
        let value = Self::serialize_incident(&commit.incident)?;
        let revision_key = Self::log_key(&incident_id, commit.revision.sequence);
        let revision_value = bincode::serialize(&commit.revision)?;

        let result = (&self.incidents_tree, &self.revisions_tree).transaction(
            |(incidents, revisions)| {
                check_commit(
                    incidents,
                    &key,
                    incident_id,
                    commit.expected_revision,
                    commit.deadline,
                )?;
                incidents.insert(key.as_slice(), value.as_slice())?;
                revisions.insert(revision_key.as_slice(), revision_value.as_slice())?;
                Ok(())
            },
        );
        unwrap_transaction(result)?;

        tracing::debug!(
            incident_id = %incident_id,
            revision = commit.revision.sequence,
            "Transition committed"
        );
        Ok(())
    }

    async fn commit_field_edit(&self, commit: &FieldEditCommit) -> Result<()> {
        let incident_id = commit.incident.id;
        let key = Self::incident_key(&incident_id);
        let value = Self::serialize_incident(&commit.incident)?;
        let edit_key = Self::log_key(&incident_id, commit.edit.revision);
        let edit_value = bincode::serialize(&commit.edit)?;

        let result = (&self.incidents_tree, &self.field_edits_tree).transaction(
            |(incidents, edits)| {
                check_commit(
                    incidents,
                    &key,
                    incident_id,
                    commit.expected_revision,
                    commit.deadline,
                )?;
                incidents.insert(key.as_slice(), value.as_slice())?;
                edits.insert(edit_key.as_slice(), edit_value.as_slice())?;
                Ok(())
            },
        );
        unwrap_transaction(result)?;

        tracing::debug!(
            incident_id = %incident_id,
            revision = commit.edit.revision,
            "Field edit committed"
        );
        Ok(())
    }

    async fn soft_delete_incident(&self, id: &Uuid, at: DateTime<Utc>) -> Result<()> {
        let key = Self::incident_key(id);

        let result = self.incidents_tree.transaction(|incidents| {
            let stored = incidents.get(key.as_slice())?.ok_or_else(|| {
                abort(AppError::NotFound(format!("Incident {} not found", id)))
            })?;
            let mut incident = Self::deserialize_incident(&stored).map_err(abort)?;

            if incident.deleted_at.is_none() {
                incident.deleted_at = Some(at);
                incident.updated_at = at;
                let value = Self::serialize_incident(&incident).map_err(abort)?;
                incidents.insert(key.as_slice(), value)?;
            }
            Ok(())
        });
        unwrap_transaction(result)?;

        tracing::debug!(incident_id = %id, "Incident soft-deleted");
        Ok(())
    }

    async fn list_revisions(&self, incident_id: &Uuid) -> Result<Vec<RevisionEntry>> {
        let mut revisions = Vec::new();
        for item in self.revisions_tree.scan_prefix(Self::incident_key(incident_id)) {
            let (_, value) = item?;
            revisions.push(bincode::deserialize(&value)?);
        }
        Ok(revisions)
    }

    async fn list_field_edits(&self, incident_id: &Uuid) -> Result<Vec<FieldEdit>> {
        let mut edits = Vec::new();
        for item in self.field_edits_tree.scan_prefix(Self::incident_key(incident_id)) {
            let (_, value) = item?;
            edits.push(bincode::deserialize(&value)?);
        }
        Ok(edits)
    }

    // Definitions carry internally tagged enums, which bincode cannot decode
    async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<()> {
        let value = serde_json::to_vec(definition)?;
        self.definitions_tree
            .insert(Self::incident_key(&definition.id), value)?;
        Ok(())
    }

    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>> {
        let mut definitions = Vec::new();
        for item in self.definitions_tree.iter() {
            let (_, value) = item?;
            definitions.push(serde_json::from_slice(&value)?);
        }
        Ok(definitions)
    }
}

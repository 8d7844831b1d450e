mod common;

use common::{agent, reporter, supervisor, Harness};
use incident_workflow::actions::LoggingNotifier;
use incident_workflow::config::{EngineConfig, StateBackend, StateConfig};
use incident_workflow::models::{ActorPermissions, FieldValue};
use incident_workflow::state::{
    create_in_memory_store, create_store, IncidentFilter, IncidentStore, SledStore,
};
use incident_workflow::workflow::DefinitionStore;
use incident_workflow::{TransitionEngine, TransitionPayload};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn described() -> HashMap<String, FieldValue> {
    let mut fields = HashMap::new();
    fields.insert("description".to_string(), FieldValue::text("Wrong invoice"));
    fields
}

/// Drives a full lifecycle and a few queries against any backend
async fn exercise_store(store: Arc<dyn IncidentStore>) {
    let h = Harness::new(store.clone()).await;

    let first = h
        .engine
        .create_incident("complaint", &reporter(), described(), Some("billing".into()))
        .await
        .unwrap();
    let second = h
        .engine
        .create_incident("complaint", &reporter(), described(), None)
        .await
        .unwrap();

    h.engine
        .request_transition(
            first.id,
            h.transition("new", "submit"),
            &agent(),
            TransitionPayload::new(),
        )
        .await
        .unwrap();
    h.engine
        .request_transition(
            first.id,
            h.transition("review", "approve"),
            &supervisor(),
            TransitionPayload::new().with_comment("refund issued"),
        )
        .await
        .unwrap();

    let revisions = store.list_revisions(&first.id).await.unwrap();
    assert_eq!(
        revisions.iter().map(|r| r.sequence).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(revisions[2].comment.as_deref(), Some("refund issued"));

    let billing = IncidentFilter {
        department: Some("billing".to_string()),
        ..IncidentFilter::default()
    };
    assert_eq!(store.count_incidents(&billing).await.unwrap(), 1);

    let in_new = IncidentFilter {
        states: vec![h.state("new")],
        ..IncidentFilter::default()
    };
    let listed = store.list_incidents(&in_new, 0, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, second.id);

    h.engine.delete_incident(&second.id).await.unwrap();
    assert_eq!(store.count_incidents(&IncidentFilter::active()).await.unwrap(), 1);

    let everything = IncidentFilter {
        include_deleted: true,
        ..IncidentFilter::default()
    };
    assert_eq!(store.count_incidents(&everything).await.unwrap(), 2);
    assert_eq!(store.list_revisions(&second.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_in_memory_store() {
    exercise_store(create_in_memory_store()).await;
}

#[tokio::test]
async fn test_sled_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = SledStore::new(temp_dir.path()).unwrap();
    exercise_store(Arc::new(store)).await;
}

#[tokio::test]
async fn test_sled_restart_resumes_workflow() {
    let temp_dir = TempDir::new().unwrap();
    let config = StateConfig {
        backend: StateBackend::Sled,
        path: Some(temp_dir.path().to_path_buf()),
    };

    let (incident_id, approve) = {
        let store = create_store(&config).await.unwrap();
        let h = Harness::new(store).await;
        let incident = h
            .engine
            .create_incident("complaint", &reporter(), described(), None)
            .await
            .unwrap();
        h.engine
            .request_transition(
                incident.id,
                h.transition("new", "submit"),
                &agent(),
                TransitionPayload::new(),
            )
            .await
            .unwrap();
        (incident.id, h.transition("review", "approve"))
    };

    // Fresh process: definitions come back from the store
    let store = create_store(&config).await.unwrap();
    let definitions = Arc::new(DefinitionStore::with_persistence(store.clone()));
    assert_eq!(definitions.hydrate().await.unwrap(), 1);

    let engine = TransitionEngine::new(
        store,
        definitions,
        Arc::new(ActorPermissions),
        Arc::new(LoggingNotifier),
        EngineConfig::default(),
    );

    let outcome = engine
        .request_transition(incident_id, approve, &supervisor(), TransitionPayload::new())
        .await
        .unwrap();
    assert_eq!(outcome.incident.revision(), 3);
    assert_eq!(outcome.incident.assignee.as_deref(), Some("agent-1"));
    assert_eq!(engine.list_revisions(&incident_id).await.unwrap().len(), 3);
}

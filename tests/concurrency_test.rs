mod common;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{agent, reporter, Harness};
use incident_workflow::actions::Notifier;
use incident_workflow::config::EngineConfig;
use incident_workflow::models::{
    ActorPermissions, FieldEdit, FieldValue, Incident, RevisionEntry, WorkflowDefinition,
};
use incident_workflow::state::{
    create_in_memory_store, FieldEditCommit, IncidentFilter, IncidentStore, TransitionCommit,
};
use incident_workflow::{AppError, Result, TransitionEngine, TransitionPayload};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

/// Two ways out of `new`; `submit` sends a notification
const GATED_SPEC: &str = r#"
incident_type: query
name: Query handling
states:
  - name: new
    initial: true
  - name: answered
    terminal: true
  - name: escalated
    terminal: true
transitions:
  - name: submit
    from: new
    to: answered
    permission: complaint.submit
    actions:
      - type: notify
        channel: ops
        template: "Query {{id}} answered"
  - name: escalate
    from: new
    to: escalated
    permission: complaint.submit
"#;

/// Parks every notification until the test releases it
#[derive(Default)]
struct GateNotifier {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl Notifier for GateNotifier {
    async fn notify(&self, _channel: &str, _message: &str) -> Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

/// Delegating store whose commits take longer than any sane timeout
struct SlowCommitStore {
    inner: Arc<dyn IncidentStore>,
    delay: Duration,
}

#[async_trait]
impl IncidentStore for SlowCommitStore {
    async fn create_incident(&self, incident: &Incident, creation: &RevisionEntry) -> Result<()> {
        self.inner.create_incident(incident, creation).await
    }

    async fn get_incident(&self, id: &Uuid) -> Result<Option<Incident>> {
        self.inner.get_incident(id).await
    }

    async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Incident>> {
        self.inner.list_incidents(filter, page, page_size).await
    }

    async fn count_incidents(&self, filter: &IncidentFilter) -> Result<u64> {
        self.inner.count_incidents(filter).await
    }

    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.commit_transition(commit).await
    }

    async fn commit_field_edit(&self, commit: &FieldEditCommit) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.commit_field_edit(commit).await
    }

    async fn soft_delete_incident(&self, id: &Uuid, at: DateTime<Utc>) -> Result<()> {
        self.inner.soft_delete_incident(id, at).await
    }

    async fn list_revisions(&self, incident_id: &Uuid) -> Result<Vec<RevisionEntry>> {
        self.inner.list_revisions(incident_id).await
    }

    async fn list_field_edits(&self, incident_id: &Uuid) -> Result<Vec<FieldEdit>> {
        self.inner.list_field_edits(incident_id).await
    }

    async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<()> {
        self.inner.save_definition(definition).await
    }

    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>> {
        self.inner.list_definitions().await
    }
}

#[tokio::test]
async fn test_second_request_in_flight_conflicts() {
    let notifier = Arc::new(GateNotifier::default());
    let h = Harness::with(
        create_in_memory_store(),
        notifier.clone(),
        EngineConfig::default(),
        GATED_SPEC,
    )
    .await;

    let incident = h
        .engine
        .create_incident("query", &reporter(), HashMap::new(), None)
        .await
        .unwrap();

    let submit = h.transition("new", "submit");
    let escalate = h.transition("new", "escalate");

    let first = {
        let engine = h.engine.clone();
        let id = incident.id;
        tokio::spawn(async move {
            engine
                .request_transition(id, submit, &agent(), TransitionPayload::new())
                .await
        })
    };

    // First request is now parked inside its notify action
    notifier.entered.notified().await;

    let second = h
        .engine
        .request_transition(incident.id, escalate, &agent(), TransitionPayload::new())
        .await;
    match second {
        Err(e @ AppError::Conflict(_)) => assert!(e.is_retryable()),
        other => panic!("expected conflict, got {:?}", other),
    }

    notifier.release.notify_one();
    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome.incident.current_state(), h.state("answered"));

    let revisions = h.engine.list_revisions(&incident.id).await.unwrap();
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[1].transition_id, Some(submit));
}

#[tokio::test]
async fn test_stale_snapshot_loses_at_commit() {
    // Two engines over one store stand in for two processes: no shared lock pool
    let notifier = Arc::new(GateNotifier::default());
    let h = Harness::with(
        create_in_memory_store(),
        notifier.clone(),
        EngineConfig::default(),
        GATED_SPEC,
    )
    .await;

    let other_engine = Arc::new(TransitionEngine::new(
        h.store.clone(),
        h.definitions.clone(),
        Arc::new(ActorPermissions),
        Arc::new(incident_workflow::actions::LoggingNotifier),
        EngineConfig::default(),
    ));

    let incident = h
        .engine
        .create_incident("query", &reporter(), HashMap::new(), None)
        .await
        .unwrap();

    let submit = h.transition("new", "submit");
    let escalate = h.transition("new", "escalate");

    let slow = {
        let engine = h.engine.clone();
        let id = incident.id;
        tokio::spawn(async move {
            engine
                .request_transition(id, submit, &agent(), TransitionPayload::new())
                .await
        })
    };
    notifier.entered.notified().await;

    let fast = other_engine
        .request_transition(incident.id, escalate, &agent(), TransitionPayload::new())
        .await
        .unwrap();
    assert_eq!(fast.incident.current_state(), h.state("escalated"));

    notifier.release.notify_one();
    let result = slow.await.unwrap();
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let revisions = h.engine.list_revisions(&incident.id).await.unwrap();
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[1].transition_id, Some(escalate));
}

#[tokio::test]
async fn test_commit_timeout_changes_nothing() {
    let store: Arc<dyn IncidentStore> = Arc::new(SlowCommitStore {
        inner: create_in_memory_store(),
        delay: Duration::from_millis(500),
    });
    let config = EngineConfig {
        commit_timeout_ms: 20,
        ..EngineConfig::default()
    };
    let h = Harness::with(
        store,
        Arc::new(incident_workflow::actions::LoggingNotifier),
        config,
        common::COMPLAINT_SPEC,
    )
    .await;

    let mut fields = HashMap::new();
    fields.insert("description".to_string(), FieldValue::text("slow disk"));
    let incident = h
        .engine
        .create_incident("complaint", &reporter(), fields, None)
        .await
        .unwrap();

    let err = h
        .engine
        .request_transition(
            incident.id,
            h.transition("new", "submit"),
            &agent(),
            TransitionPayload::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Timeout(_)));
    assert!(err.is_retryable());

    // Give a leaked commit, if any, time to land before checking
    tokio::time::sleep(Duration::from_millis(600)).await;

    let stored = h.engine.get_incident(&incident.id).await.unwrap();
    assert_eq!(stored.revision(), 1);
    assert_eq!(stored.current_state(), h.state("new"));
    assert_eq!(h.engine.list_revisions(&incident.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_parallel_requests_yield_exactly_one_winner() {
    let h = Harness::with(
        create_in_memory_store(),
        Arc::new(incident_workflow::actions::LoggingNotifier),
        EngineConfig::default(),
        GATED_SPEC,
    )
    .await;

    let incident = h
        .engine
        .create_incident("query", &reporter(), HashMap::new(), None)
        .await
        .unwrap();
    let escalate = h.transition("new", "escalate");

    let attempts = (0..8).map(|_| {
        let engine = h.engine.clone();
        let id = incident.id;
        tokio::spawn(async move {
            engine
                .request_transition(id, escalate, &agent(), TransitionPayload::new())
                .await
        })
    });

    let results: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            result,
            Err(AppError::Conflict(_)) | Err(AppError::TerminalState { .. })
        ));
    }

    assert_eq!(h.engine.list_revisions(&incident.id).await.unwrap().len(), 2);
}

/// Never answers
struct SilentNotifier;

#[async_trait]
impl Notifier for SilentNotifier {
    async fn notify(&self, _channel: &str, _message: &str) -> Result<()> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_silent_notifier_does_not_hold_the_incident() {
    let config = EngineConfig {
        notify_timeout_ms: 20,
        ..EngineConfig::default()
    };
    let h = Harness::with(
        create_in_memory_store(),
        Arc::new(SilentNotifier),
        config,
        GATED_SPEC,
    )
    .await;

    let incident = h
        .engine
        .create_incident("query", &reporter(), HashMap::new(), None)
        .await
        .unwrap();

    let err = h
        .engine
        .request_transition(
            incident.id,
            h.transition("new", "submit"),
            &agent(),
            TransitionPayload::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Action(_)), "{:?}", err);

    // The lock was released; the other way out still works
    let outcome = h
        .engine
        .request_transition(
            incident.id,
            h.transition("new", "escalate"),
            &agent(),
            TransitionPayload::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.incident.current_state(), h.state("escalated"));
    assert_eq!(h.engine.list_revisions(&incident.id).await.unwrap().len(), 2);
}

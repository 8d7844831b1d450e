use crate::actions::notifier::Notifier;
use crate::actions::template::TemplateContext;
use crate::error::{AppError, Result};
use crate::models::{Action, Actor, FieldDelta, FieldValue, Incident};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// A rendered message waiting to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct PendingNotification {
    pub channel: String,
    pub message: String,
    pub best_effort: bool,
}

/// What a single action does to the working copy
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEffect {
    Delta(FieldDelta),
    Notify(PendingNotification),
    Unchanged,
}

/// Deltas and notifications produced by a transition's action list
#[derive(Debug, Clone, Default)]
pub struct ActionPlan {
    pub deltas: Vec<FieldDelta>,
    pub notifications: Vec<PendingNotification>,
}

/// Compute the effect of one action on an incident snapshot
pub fn apply(
    action: &Action,
    incident: &Incident,
    actor: &Actor,
    payload: &HashMap<String, FieldValue>,
) -> Result<ActionEffect> {
    let effect = match action {
        Action::SetField { field, value } => field_change(incident, field, Some(value.clone())),

        Action::SetFieldFromPayload {
            field,
            payload_key,
            kind,
        } => {
            let value = payload.get(payload_key).ok_or_else(|| {
                AppError::Action(format!("payload key '{}' is missing", payload_key))
            })?;
            if value.kind() != *kind {
                return Err(AppError::Action(format!(
                    "payload key '{}' is {}, expected {}",
                    payload_key,
                    value.kind(),
                    kind
                )));
            }
            field_change(incident, field, Some(value.clone()))
        }

        Action::ClearField { field } => field_change(incident, field, None),

        Action::AssignDepartment { department } => {
            if incident.department.as_deref() == Some(department.as_str()) {
                ActionEffect::Unchanged
            } else {
                ActionEffect::Delta(FieldDelta::Department {
                    before: incident.department.clone(),
                    after: Some(department.clone()),
                })
            }
        }

        Action::AssignToActor => assignee_change(incident, Some(actor.id.clone())),

        Action::Unassign => assignee_change(incident, None),

        Action::Notify {
            channel,
            template,
            best_effort,
        } => ActionEffect::Notify(PendingNotification {
            channel: channel.clone(),
            message: TemplateContext::from_incident(incident).render(template),
            best_effort: *best_effort,
        }),

        Action::Unsupported => {
            return Err(AppError::Action("unsupported action".to_string()));
        }
    };

    Ok(effect)
}

fn field_change(incident: &Incident, key: &str, after: Option<FieldValue>) -> ActionEffect {
    let before = incident.field(key).cloned();
    if before == after {
        return ActionEffect::Unchanged;
    }
    ActionEffect::Delta(FieldDelta::Field {
        key: key.to_string(),
        before,
        after,
    })
}

fn assignee_change(incident: &Incident, after: Option<String>) -> ActionEffect {
    if incident.assignee == after {
        return ActionEffect::Unchanged;
    }
    ActionEffect::Delta(FieldDelta::Assignee {
        before: incident.assignee.clone(),
        after,
    })
}

/// Run a list of actions in order against a working copy.
///
/// Later actions see earlier deltas. Nothing is returned unless every action
/// succeeds, and the input snapshot is never touched.
pub fn plan_actions(
    actions: &[Action],
    incident: &Incident,
    actor: &Actor,
    payload: &HashMap<String, FieldValue>,
) -> Result<ActionPlan> {
    let mut working = incident.clone();
    let mut plan = ActionPlan::default();

    for (index, action) in actions.iter().enumerate() {
        let effect = apply(action, &working, actor, payload).map_err(|e| match e {
            AppError::Action(reason) => {
                AppError::Action(format!("action #{} failed: {}", index + 1, reason))
            }
            other => other,
        })?;

        match effect {
            ActionEffect::Delta(delta) => {
                working.apply_delta(&delta);
                plan.deltas.push(delta);
            }
            ActionEffect::Notify(notification) => plan.notifications.push(notification),
            ActionEffect::Unchanged => {}
        }
    }

    Ok(plan)
}

/// Plans actions and delivers their notifications
pub struct ActionExecutor {
    notifier: Arc<dyn Notifier>,
    notify_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(notifier: Arc<dyn Notifier>, notify_timeout: Duration) -> Self {
        Self {
            notifier,
            notify_timeout,
        }
    }

    /// Deliver one notification, giving up after the configured timeout
    async fn deliver(&self, notification: &PendingNotification) -> Result<()> {
        let delivery = self
            .notifier
            .notify(&notification.channel, &notification.message);

        match tokio::time::timeout(self.notify_timeout, delivery).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "no answer from channel '{}' within {:?}",
                notification.channel, self.notify_timeout
            ))),
        }
    }

    /// Execute a transition's actions, returning the deltas to commit.
    ///
    /// Notifications go out only after every delta was computed. A failed or
    /// timed-out delivery aborts unless the action is best effort.
    pub async fn execute(
        &self,
        incident_id: Uuid,
        actions: &[Action],
        incident: &Incident,
        actor: &Actor,
        payload: &HashMap<String, FieldValue>,
    ) -> Result<Vec<FieldDelta>> {
        let plan = plan_actions(actions, incident, actor, payload)?;

        for notification in &plan.notifications {
            match self.deliver(notification).await {
                Ok(()) => {
                    debug!(
                        incident_id = %incident_id,
                        channel = %notification.channel,
                        "Notification sent"
                    );
                }
                Err(e) if notification.best_effort => {
                    warn!(
                        incident_id = %incident_id,
                        channel = %notification.channel,
                        error = %e,
                        "Best-effort notification failed"
                    );
                }
                Err(e) => {
                    return Err(AppError::Action(format!(
                        "notification to '{}' failed: {}",
                        notification.channel, e
                    )));
                }
            }
        }

        Ok(plan.deltas)
    }
}

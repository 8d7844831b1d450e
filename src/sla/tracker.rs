use crate::models::{Incident, WorkflowDefinition};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Ratio of the SLA after which an incident is reported at risk
pub const DEFAULT_AT_RISK_RATIO: f64 = 0.8;

/// SLA classification of an incident in its current state
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SlaState {
    OnTrack,
    AtRisk,
    Breached,
}

impl SlaState {
    pub const ALL: [SlaState; 3] = [SlaState::OnTrack, SlaState::AtRisk, SlaState::Breached];
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlaStatus {
    pub state: SlaState,

    /// Time spent in the current state so far
    pub elapsed: Duration,

    /// Time left before breach, clamped at zero; `None` without an SLA
    pub remaining: Option<Duration>,

    /// Breach instant; `None` without an SLA
    pub deadline: Option<DateTime<Utc>>,
}

/// Classify an incident against the SLA of its current state.
///
/// Depends only on `now`, the incident's `state_entered_at` and the state's
/// SLA, so it is stable for a fixed `now`. States without an SLA are always
/// on track.
pub fn status(
    incident: &Incident,
    definition: &WorkflowDefinition,
    now: DateTime<Utc>,
    at_risk_ratio: f64,
) -> SlaStatus {
    let elapsed = (now - incident.state_entered_at()).max(Duration::zero());

    let Some(budget) = definition
        .state(incident.current_state())
        .and_then(|state| state.sla_duration())
    else {
        return SlaStatus {
            state: SlaState::OnTrack,
            elapsed,
            remaining: None,
            deadline: None,
        };
    };

    let at_risk_after =
        Duration::milliseconds((budget.num_milliseconds() as f64 * at_risk_ratio) as i64);

    let state = if elapsed > budget {
        SlaState::Breached
    } else if elapsed > at_risk_after {
        SlaState::AtRisk
    } else {
        SlaState::OnTrack
    };

    SlaStatus {
        state,
        elapsed,
        remaining: Some((budget - elapsed).max(Duration::zero())),
        deadline: Some(incident.state_entered_at() + budget),
    }
}

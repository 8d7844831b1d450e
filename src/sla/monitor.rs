use crate::error::Result;
use crate::metrics::SLA_INCIDENTS;
use crate::sla::tracker::{status, SlaState};
use crate::state::{IncidentFilter, IncidentStore};
use crate::workflow::DefinitionStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

const SCAN_PAGE_SIZE: u32 = 500;

/// Result of one monitor pass
#[derive(Debug, Clone, Default)]
pub struct SlaReport {
    pub scanned: usize,
    pub counts: HashMap<SlaState, usize>,
    /// Incidents that were not breached at the previous scan
    pub newly_breached: Vec<Uuid>,
}

impl SlaReport {
    pub fn count(&self, state: SlaState) -> usize {
        self.counts.get(&state).copied().unwrap_or(0)
    }
}

/// Periodically classifies every active incident against its SLA
pub struct SlaMonitor {
    store: Arc<dyn IncidentStore>,
    definitions: Arc<DefinitionStore>,
    at_risk_ratio: f64,
    interval_secs: u64,
    breached: Mutex<HashSet<Uuid>>,
}

impl SlaMonitor {
    pub fn new(
        store: Arc<dyn IncidentStore>,
        definitions: Arc<DefinitionStore>,
        at_risk_ratio: f64,
    ) -> Self {
        Self {
            store,
            definitions,
            at_risk_ratio,
            interval_secs: 60,
            breached: Mutex::new(HashSet::new()),
        }
    }

    /// Set the scan interval
    pub fn with_interval(mut self, interval_secs: u64) -> Self {
        self.interval_secs = interval_secs;
        self
    }

    /// Classify all non-deleted incidents outside terminal states as of `now`
    pub async fn scan(&self, now: DateTime<Utc>) -> Result<SlaReport> {
        let filter = IncidentFilter::active();
        let mut report = SlaReport::default();
        let mut breached_now = HashSet::new();
        let mut page = 0;

        loop {
            let incidents = self
                .store
                .list_incidents(&filter, page, SCAN_PAGE_SIZE)
                .await?;
            let fetched = incidents.len();

            for incident in incidents {
                let definition = match self.definitions.get_by_id(&incident.definition_id) {
                    Ok(definition) => definition,
                    Err(e) => {
                        tracing::warn!(
                            incident_id = %incident.id,
                            definition_id = %incident.definition_id,
                            error = %e,
                            "Skipping incident with unknown workflow"
                        );
                        continue;
                    }
                };

                let terminal = definition
                    .state(incident.current_state())
                    .map_or(false, |state| state.terminal);
                if terminal {
                    continue;
                }

                let sla = status(&incident, &definition, now, self.at_risk_ratio);
                report.scanned += 1;
                *report.counts.entry(sla.state).or_insert(0) += 1;

                if sla.state == SlaState::Breached {
                    breached_now.insert(incident.id);
                }
            }

            if fetched < SCAN_PAGE_SIZE as usize {
                break;
            }
            page += 1;
        }

        {
            let mut previous = self.breached.lock();
            report.newly_breached = breached_now
                .iter()
                .filter(|id| !previous.contains(*id))
                .copied()
                .collect();
            *previous = breached_now;
        }

        for incident_id in &report.newly_breached {
            tracing::warn!(incident_id = %incident_id, "SLA breached");
        }

        for state in SlaState::ALL {
            SLA_INCIDENTS
                .with_label_values(&[state.to_string().as_str()])
                .set(report.count(state) as f64);
        }

        Ok(report)
    }

    /// Run the monitor loop forever
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            check_interval = self.interval_secs,
            "Starting SLA monitor"
        );

        loop {
            match self.scan(Utc::now()).await {
                Ok(report) => tracing::debug!(
                    scanned = report.scanned,
                    breached = report.count(SlaState::Breached),
                    at_risk = report.count(SlaState::AtRisk),
                    "SLA scan complete"
                ),
                Err(e) => tracing::error!(error = %e, "SLA scan failed"),
            }

            sleep(Duration::from_secs(self.interval_secs)).await;
        }
    }
}

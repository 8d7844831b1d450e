//! Prometheus metrics for the workflow engine.
//!
//! All metrics live in one process-wide registry. Call [`init_metrics`] once
//! at startup; recording into an unregistered metric is harmless but it will
//! not show up in [`gather_metrics`].
//!
//! # Example
//! ```no_run
//! use incident_workflow::metrics::TRANSITIONS_TOTAL;
//!
//! TRANSITIONS_TOTAL.with_label_values(&["committed"]).inc();
//! ```

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, GaugeVec, Histogram, HistogramOpts, Opts, Registry};

const NAMESPACE: &str = "incident_workflow";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    /// Transition requests by outcome
    ///
    /// Labels: outcome (committed, invalid_transition, terminal_state,
    /// permission_denied, requirements_not_met, action_failed, conflict,
    /// timeout, error)
    pub static ref TRANSITIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("transitions_total", "Total number of transition requests")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create TRANSITIONS_TOTAL metric");

    /// End-to-end transition request duration in seconds
    pub static ref TRANSITION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "transition_duration_seconds",
            "Transition request duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0])
    ).expect("Failed to create TRANSITION_DURATION_SECONDS metric");

    /// Incidents created
    pub static ref INCIDENTS_CREATED_TOTAL: Counter = Counter::with_opts(
        Opts::new("incidents_created_total", "Total number of incidents created")
            .namespace(NAMESPACE)
    ).expect("Failed to create INCIDENTS_CREATED_TOTAL metric");

    /// Active incidents per SLA status, as of the last monitor scan
    ///
    /// Labels: status (on_track, at_risk, breached)
    pub static ref SLA_INCIDENTS: GaugeVec = GaugeVec::new(
        Opts::new("sla_incidents", "Active incidents by SLA status")
            .namespace(NAMESPACE),
        &["status"]
    ).expect("Failed to create SLA_INCIDENTS metric");
}

/// Register every metric with the global registry
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(TRANSITIONS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(TRANSITION_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(INCIDENTS_CREATED_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SLA_INCIDENTS.clone()))?;

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_after_init() {
        // The registry is global; a second registration in the same process errors
        let _ = init_metrics();

        TRANSITIONS_TOTAL.with_label_values(&["committed"]).inc();
        SLA_INCIDENTS.with_label_values(&["breached"]).set(2.0);

        let output = gather_metrics();
        assert!(output.contains("incident_workflow_transitions_total"));
        assert!(output.contains("incident_workflow_sla_incidents"));
    }
}

use incident_workflow::{
    actions::LoggingNotifier,
    config::Config,
    models::ActorPermissions,
    sla::SlaMonitor,
    state::create_store,
    workflow::{content_fingerprint, DefinitionStore, WorkflowSpec},
    WorkflowDefinition,
    TransitionEngine,
};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    init_tracing(&config);

    tracing::info!("Starting incident workflow engine v{}", env!("CARGO_PKG_VERSION"));

    if config.observability.prometheus_enabled {
        if let Err(e) = incident_workflow::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
        }
    } else {
        tracing::info!("Prometheus metrics disabled in configuration");
    }

    tracing::info!("Storage backend: {:?}", config.state.backend);
    let store = create_store(&config.state).await?;

    let definitions = Arc::new(DefinitionStore::with_persistence(store.clone()));
    definitions.hydrate().await?;

    if let Some(dir) = &config.definitions.path {
        load_workflow_specs(&definitions, dir).await;
    }

    let engine = Arc::new(TransitionEngine::new(
        store.clone(),
        definitions.clone(),
        Arc::new(ActorPermissions),
        Arc::new(LoggingNotifier),
        config.engine.clone(),
    ));
    tracing::info!("Transition engine ready");

    if config.sla.monitor_enabled {
        let monitor = Arc::new(
            SlaMonitor::new(store.clone(), engine.definitions().clone(), config.engine.at_risk_ratio)
                .with_interval(config.sla.monitor_interval_secs),
        );
        tokio::spawn(monitor.run());
        tracing::info!("SLA monitor started");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("incident_workflow={}", config.observability.log_level).into()
    });

    if config.observability.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Import and publish every YAML spec that differs from its latest published version
async fn load_workflow_specs(definitions: &DefinitionStore, dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = ?dir, error = %e, "Cannot read workflow directory");
            return;
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    paths.sort();

    for path in paths {
        match load_workflow_spec(definitions, &path).await {
            Ok(Some(published)) => tracing::info!(
                path = ?path,
                incident_type = %published.incident_type,
                version = published.version,
                "Workflow loaded"
            ),
            Ok(None) => tracing::debug!(path = ?path, "Workflow unchanged since last publish"),
            Err(e) => tracing::error!(path = ?path, error = %e, "Failed to load workflow spec"),
        }
    }
}

async fn load_workflow_spec(
    definitions: &DefinitionStore,
    path: &Path,
) -> incident_workflow::Result<Option<Arc<WorkflowDefinition>>> {
    let spec = WorkflowSpec::load(path)?;

    let fingerprint = content_fingerprint(&spec.into_draft()?)?;
    if let Ok(latest) = definitions.get(&spec.incident_type, None) {
        if content_fingerprint(&latest)? == fingerprint {
            return Ok(None);
        }
    }

    let draft = definitions.import_spec(&spec)?;
    Ok(Some(definitions.publish(&draft.id).await?))
}

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use incident_workflow::workflow::{collect_problems, topology_fingerprint, WorkflowSpec};
use incident_workflow::WorkflowDefinition;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wf-cli")]
#[command(about = "Inspect and check workflow definition files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a YAML workflow spec against the publish rules
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the topology fingerprint of a YAML workflow spec
    Fingerprint {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print each state with its outgoing transitions
    Graph {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn load(file: &PathBuf) -> anyhow::Result<WorkflowDefinition> {
    let spec = WorkflowSpec::load(file)
        .with_context(|| format!("failed to read workflow spec {}", file.display()))?;
    let draft = spec
        .into_draft()
        .with_context(|| format!("workflow spec {} is malformed", file.display()))?;
    Ok(draft)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { file } => {
            let draft = load(&file)?;
            let problems = collect_problems(&draft);

            if !problems.is_empty() {
                for problem in &problems {
                    eprintln!("  - {}", problem);
                }
                bail!("{} problem(s) found in {}", problems.len(), file.display());
            }

            println!(
                "{}: ok ({} states, {} transitions)",
                file.display(),
                draft.states.len(),
                draft.transitions.len()
            );
        }

        Commands::Fingerprint { file } => {
            let draft = load(&file)?;
            println!("{}", topology_fingerprint(&draft));
        }

        Commands::Graph { file } => {
            let draft = load(&file)?;
            println!("{} ({})", draft.name, draft.incident_type);

            for state in &draft.states {
                let mut flags = Vec::new();
                if state.initial {
                    flags.push("initial".to_string());
                }
                if state.terminal {
                    flags.push("terminal".to_string());
                }
                if let Some(minutes) = state.sla_minutes {
                    flags.push(format!("sla {}m", minutes));
                }

                if flags.is_empty() {
                    println!("{}", state.name);
                } else {
                    println!("{} [{}]", state.name, flags.join(", "));
                }

                for transition in draft.transitions_from(state.id) {
                    println!(
                        "  --{}--> {}  (permission: {})",
                        transition.name,
                        draft.state_name(transition.to),
                        transition.permission
                    );
                }
            }
        }
    }

    Ok(())
}

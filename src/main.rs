use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use nodeflow_core::config::AppConfig;
use nodeflow_core::event::EventBus;
use nodeflow_core::types::RuntimeEvent;
use nodeflow_nodes::{BuiltinDeps, NodeRegistry};
use nodeflow_runtime::{Dispatcher, Workflow, WorkflowRunner};

#[derive(Parser)]
#[command(name = "nodeflow", version, about = "Node execution runtime for visual workflows")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "nodeflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered node types by category
    List,
    /// Search node types by type, label, description, or category
    Search {
        term: String,
    },
    /// Show the definition and presentation of a node type
    Describe {
        node_type: String,
    },
    /// Execute a single node and print its result envelope
    Run {
        node_type: String,
        /// Node config as JSON
        #[arg(long = "config", default_value = "{}")]
        node_config: String,
        /// Node input as JSON
        #[arg(long, default_value = "{}")]
        input: String,
    },
    /// Execute a workflow document
    Workflow {
        /// Path to the workflow JSON file
        file: PathBuf,
        /// Input for the entry node as JSON
        #[arg(long, default_value = "{}")]
        input: String,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "nodeflow", &mut std::io::stdout());
        return Ok(());
    }

    let config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    // Logs go to stderr; stdout carries JSON results.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let event_bus = Arc::new(EventBus::new(config.events.capacity));
    spawn_event_logger(&event_bus);

    let deps = BuiltinDeps::from_config(&config)?.with_events(event_bus.clone());
    let registry = Arc::new(NodeRegistry::with_builtins(&deps)?);
    info!(node_types = registry.len(), "Registry ready");

    match cli.command {
        Commands::List => {
            let groups: Value = registry
                .group_by_category()
                .into_iter()
                .map(|(category, defs)| {
                    let types: Vec<Value> = defs
                        .iter()
                        .map(|d| json!({"type": d.node_type, "label": d.label}))
                        .collect();
                    (category.to_string(), Value::Array(types))
                })
                .collect::<serde_json::Map<_, _>>()
                .into();
            print_json(&groups)?;
        }
        Commands::Search { term } => {
            let hits: Vec<Value> = registry
                .search(&term)
                .into_iter()
                .map(|d| {
                    json!({
                        "type": d.node_type,
                        "label": d.label,
                        "category": d.category,
                        "description": d.description,
                    })
                })
                .collect();
            print_json(&hits)?;
        }
        Commands::Describe { node_type } => {
            let entry = registry
                .lookup(&node_type)
                .with_context(|| format!("Unknown node type: {}", node_type))?;
            print_json(&json!({
                "definition": entry.definition,
                "presentation": entry.presentation,
            }))?;
        }
        Commands::Run {
            node_type,
            node_config,
            input,
        } => {
            let node_config = parse_json_arg("--config", &node_config)?;
            let input = parse_json_arg("--input", &input)?;
            let dispatcher = Dispatcher::new(registry).with_events(event_bus);
            let envelope = dispatcher.execute(&node_type, node_config, input).await;
            print_json(&envelope)?;
            if !envelope.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Workflow { file, input } => {
            let workflow = Workflow::load(&file)
                .with_context(|| format!("loading workflow {}", file.display()))?;
            let input = parse_json_arg("--input", &input)?;
            let runner = WorkflowRunner::new(Dispatcher::new(registry).with_events(event_bus.clone()))
                .with_events(event_bus);
            let report = runner.run(&workflow, input).await?;
            print_json(&report)?;
            if !report.succeeded {
                std::process::exit(1);
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn parse_json_arg(flag: &str, raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("{} is not valid JSON", flag))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Mirror runtime events into the debug log.
fn spawn_event_logger(bus: &EventBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event logger lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            match event {
                RuntimeEvent::DispatchStarted {
                    execution_id,
                    node_type,
                } => debug!(%execution_id, %node_type, "event: dispatch started"),
                RuntimeEvent::DispatchFinished {
                    execution_id,
                    node_type,
                    status,
                    elapsed_ms,
                } => debug!(%execution_id, %node_type, %status, elapsed_ms, "event: dispatch finished"),
                RuntimeEvent::VerificationAttempt {
                    resource_type,
                    attempt,
                    max_attempts,
                    found,
                } => debug!(%resource_type, attempt, max_attempts, found, "event: verification attempt"),
                RuntimeEvent::WorkflowStepCompleted {
                    node_id,
                    node_type,
                    status,
                } => debug!(%node_id, %node_type, %status, "event: workflow step"),
            }
        }
    });
}

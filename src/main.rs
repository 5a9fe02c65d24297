use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fuschia_engine::{ExecutionContext, WorkflowRunner};
use fuschia_node::NodeRegistry;
use fuschia_value::Item;
use fuschia_workflow::Workflow;

/// Fuschia - a queue-based workflow automation engine
#[derive(Parser)]
#[command(name = "fuschia")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow or a single node from one
  Run {
    #[command(subcommand)]
    target: RunTarget,
  },
  /// Start the HTTP server (webhook triggers, workflow CRUD, event stream)
  Serve {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 8080)]
    port: u16,
  },
}

#[derive(Subcommand)]
enum RunTarget {
  /// Run an entire workflow from its default start node
  Workflow {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },
  /// Run a single node from a workflow in isolation
  Task {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
    /// The node name to execute
    #[arg(long)]
    node: String,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt().with_target(false).with_level(true).init();

  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Run { target }) => match target {
      RunTarget::Workflow { workflow_file } => run_workflow(workflow_file).await?,
      RunTarget::Task { workflow_file, node } => run_task(workflow_file, node).await?,
    },
    Some(Commands::Serve { host, port }) => serve(host, port).await?,
    None => {
      println!("fuschia - use --help to see available commands");
    }
  }

  Ok(())
}

fn registry() -> NodeRegistry {
  let mut registry = NodeRegistry::new();
  fuschia_nodes::register_all(&mut registry);
  registry
}

async fn load_workflow(workflow_file: &PathBuf) -> Result<Workflow> {
  let content = tokio::fs::read_to_string(workflow_file).await.with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;
  let workflow: Workflow = serde_json::from_str(&content).with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))?;
  workflow.validate().context("workflow failed validation")?;
  Ok(workflow)
}

async fn run_workflow(workflow_file: PathBuf) -> Result<()> {
  let workflow = load_workflow(&workflow_file).await?;
  eprintln!("Loaded workflow: {} ({} nodes)", workflow.name, workflow.nodes.len());

  let payload = read_payload_from_stdin()?;
  eprintln!("Payload: {payload}");
  let trigger = Item::new(payload);

  let runner = WorkflowRunner::new(std::sync::Arc::new(registry()));
  let mut ctx = ExecutionContext::new("manual", reqwest::Client::new());
  ctx.registry_for_subworkflow = Some(runner.registry.clone());

  let outcome = runner.run(&workflow, vec![trigger], &ctx).await.context("workflow execution failed")?;

  eprintln!("Execution completed: {}", outcome.execution_id);
  eprintln!("Nodes executed: {}", outcome.node_states.len());

  let output: serde_json::Map<String, serde_json::Value> =
    outcome.node_states.into_iter().map(|(name, items)| (name, serde_json::Value::Array(items.into_iter().map(|i| i.json).collect()))).collect();

  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

async fn run_task(workflow_file: PathBuf, node_name: String) -> Result<()> {
  let workflow = load_workflow(&workflow_file).await?;
  workflow.node(&node_name).with_context(|| format!("node '{node_name}' not found in workflow"))?;

  eprintln!("Running node: {node_name}");
  let payload = read_payload_from_stdin()?;
  eprintln!("Payload: {payload}");
  let trigger = Item::new(payload);

  let runner = WorkflowRunner::new(std::sync::Arc::new(registry()));
  let mut ctx = ExecutionContext::new("manual", reqwest::Client::new());
  ctx.registry_for_subworkflow = Some(runner.registry.clone());

  let outcome = runner.run_from(&workflow, &node_name, vec![trigger], &ctx).await.context("node execution failed")?;
  eprintln!("Node execution completed");

  let items = outcome.node_states.get(&node_name).cloned().unwrap_or_default();
  let output: Vec<serde_json::Value> = items.into_iter().map(|i| i.json).collect();
  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

async fn serve(host: String, port: u16) -> Result<()> {
  let state = fuschia_webhook::AppState::new();
  let app = fuschia_webhook::app(state);

  let bind_addr = format!("{host}:{port}");
  let listener = tokio::net::TcpListener::bind(&bind_addr).await.with_context(|| format!("failed to bind {bind_addr}"))?;
  tracing::info!("fuschia listening on http://{bind_addr}");
  axum::serve(listener, app.into_make_service()).await.context("server error")?;
  Ok(())
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::json!({}));
  }
  let mut input = String::new();
  io::stdin().read_to_string(&mut input).context("failed to read payload from stdin")?;
  if input.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
  }
}

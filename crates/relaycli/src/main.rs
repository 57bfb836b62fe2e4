// crates/relaycli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use relaycore::memory::{
    EchoAdapterExecution, EchoUtilityExecution, MemoryAdapterRegistry, MemoryDeploymentStore,
    MemoryFlowStore, MemoryRunStore, NullScheduler,
};
use relaycore::{
    Adapter, AdapterDirection, ExecutionEvent, FlowDefinition, FlowNode, FlowStore, NodeKind,
    RunStore, TriggerType, Value,
};
use relayruntime::{EngineSettings, HandlerRegistry, RelayRuntime, Services};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Relay integration engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy and execute a flow file against in-memory adapters
    Run {
        /// Path to flow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Path to adapters JSON file (array of adapter records)
        #[arg(short, long)]
        adapters: PathBuf,

        /// Trigger payload as JSON string
        #[arg(short, long)]
        input: Option<String>,

        /// Show execution events while the flow runs
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a flow file
    Validate {
        /// Path to flow JSON file
        file: PathBuf,
    },

    /// List available node kinds
    Nodes,

    /// Create an example flow and adapter set
    Init {
        /// Output file path for the flow
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,

        /// Output file path for the adapters
        #[arg(short, long, default_value = "adapters.json")]
        adapters: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay=info,relaycore=info,relayruntime=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            file,
            adapters,
            input,
            verbose,
        } => run_flow(file, adapters, input, verbose).await,
        Commands::Validate { file } => validate_flow(file),
        Commands::Nodes => list_nodes(),
        Commands::Init { output, adapters } => init_example(output, adapters),
    }
}

async fn run_flow(
    file: PathBuf,
    adapters_file: PathBuf,
    input: Option<String>,
    verbose: bool,
) -> Result<()> {
    let flow: FlowDefinition = read_json(&file)?;
    let adapters: Vec<Adapter> = read_json(&adapters_file)?;

    let validation = flow.validate();
    if !validation.is_valid() {
        for error in &validation.errors {
            eprintln!("error: {}", error);
        }
        bail!("flow '{}' is invalid", flow.name);
    }

    let adapter_registry = MemoryAdapterRegistry::new();
    for adapter in adapters {
        adapter_registry.insert(adapter).await;
    }
    let services = Arc::new(Services {
        adapters: Arc::new(adapter_registry),
        flows: Arc::new(MemoryFlowStore::new()),
        deployments: Arc::new(MemoryDeploymentStore::new()),
        runs: Arc::new(MemoryRunStore::new()),
        adapter_exec: Arc::new(EchoAdapterExecution),
        utility_exec: Arc::new(EchoUtilityExecution),
        scheduler: Arc::new(NullScheduler),
    });
    services.flows.put(flow.clone()).await?;

    let mut registry = HandlerRegistry::new();
    relaynodes::register_builtin(&mut registry);
    let runtime = RelayRuntime::with_registry(
        services.clone(),
        Arc::new(registry),
        EngineSettings::from_env(),
    );

    if verbose {
        let mut events = runtime.subscribe_events();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                print_event(&event);
            }
        });
    }

    let summary = runtime.deploy(flow.id, "relay-cli").await?;
    println!(
        "Deployed flow '{}' v{} ({} adapters started)",
        flow.name,
        summary.flow_version,
        summary.adapters_started.len()
    );

    let payload = match input {
        Some(raw) => parse_payload(&raw)?,
        None => HashMap::new(),
    };
    let execution = runtime
        .execute(flow.id, TriggerType::Manual, payload)
        .await?;

    println!();
    println!("Execution {}", execution.id);
    println!("  status:   {}", execution.status);
    println!("  duration: {}ms", execution.duration_ms.unwrap_or(0));
    println!(
        "  metrics:  {} files, {} bytes",
        execution.files_processed, execution.bytes_processed
    );
    if let Some(error) = &execution.error {
        println!("  error:    {}", error);
    }

    let steps = services.runs.steps_for_execution(execution.id).await?;
    println!("  steps:");
    for step in steps {
        println!(
            "    {:>3}. {:<20} {:<14} {:?}",
            step.sequence, step.node_name, step.node_kind, step.status
        );
    }

    let undeploy = runtime.undeploy(flow.id, "relay-cli").await?;
    println!(
        "Undeployed ({}/{} adapters stopped, {} deployments removed)",
        undeploy.adapters_stopped, undeploy.adapters_referenced, undeploy.deployments_removed
    );
    Ok(())
}

fn validate_flow(file: PathBuf) -> Result<()> {
    let flow: FlowDefinition = read_json(&file)?;
    let validation = flow.validate();
    for warning in &validation.warnings {
        println!("warning: {}", warning);
    }
    if validation.is_valid() {
        println!(
            "Flow '{}' is valid ({} nodes, {} edges, {} referenced adapters)",
            flow.name,
            flow.nodes.len(),
            flow.edges.len(),
            flow.referenced_adapter_ids().len()
        );
        Ok(())
    } else {
        for error in &validation.errors {
            eprintln!("error: {}", error);
        }
        bail!("flow '{}' is invalid", flow.name);
    }
}

fn list_nodes() -> Result<()> {
    let mut registry = HandlerRegistry::new();
    relaynodes::register_builtin(&mut registry);
    println!("Available node kinds:");
    let mut handlers: Vec<_> = registry.handlers().collect();
    handlers.sort_by_key(|h| h.kind().to_string());
    for handler in handlers {
        println!("  {:<16} {}", handler.kind().to_string(), handler.describe());
    }
    Ok(())
}

fn init_example(output: PathBuf, adapters_path: PathBuf) -> Result<()> {
    let sender = Adapter::new("inbound-sftp", AdapterDirection::Sender)
        .with_config("host", "sftp.example.com")
        .with_config("path", "/outbox");
    let receiver = Adapter::new("archive-share", AdapterDirection::Receiver)
        .with_config("host", "files.example.com")
        .with_config("path", "/archive");
    let notify = Adapter::new("ops-mailbox", AdapterDirection::Receiver)
        .with_config("recipient", "ops@example.com");

    let mut flow = FlowDefinition::new("example-transfer");
    flow.description = Some("Pick up files, archive them, notify operations".to_string());
    flow.add_node(
        FlowNode::new("start", NodeKind::Start)
            .with_name("Pickup")
            .with_data("senderAdapterId", sender.id.to_string()),
    );
    flow.add_node(FlowNode::new("split", NodeKind::ParallelSplit).with_name("Fan out"));
    flow.add_node(
        FlowNode::new("archive", NodeKind::Adapter)
            .with_name("Archive")
            .with_data("adapterId", receiver.id.to_string()),
    );
    flow.add_node(FlowNode::new("archive-done", NodeKind::End).with_name("Archived"));
    flow.add_node(
        FlowNode::new("compress", NodeKind::Utility)
            .with_name("Compress")
            .with_data("utilityType", "ZIP"),
    );
    flow.add_node(
        FlowNode::new("notify", NodeKind::MessageEnd)
            .with_name("Notify ops")
            .with_data("receiverAdapterId", notify.id.to_string())
            .with_data("eventType", "transfer-complete"),
    );
    flow.connect("start", "split");
    flow.connect("split", "archive");
    flow.connect("split", "compress");
    flow.connect("archive", "archive-done");
    flow.connect("compress", "notify");

    std::fs::write(&output, serde_json::to_string_pretty(&flow)?)
        .with_context(|| format!("writing {}", output.display()))?;
    std::fs::write(
        &adapters_path,
        serde_json::to_string_pretty(&vec![sender, receiver, notify])?,
    )
    .with_context(|| format!("writing {}", adapters_path.display()))?;

    println!(
        "Wrote {} and {}",
        output.display(),
        adapters_path.display()
    );
    println!("Try: relay run -f {} -a {} -v", output.display(), adapters_path.display());
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn parse_payload(raw: &str) -> Result<HashMap<String, Value>> {
    let json: serde_json::Value = serde_json::from_str(raw).context("parsing --input")?;
    match json {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, value)| (key, json_to_value(value)))
            .collect()),
        _ => bail!("--input must be a JSON object"),
    }
}

/// Convert plain JSON into the engine's Value representation
fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                Value::Number(f)
            } else {
                Value::String(n.to_string())
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, json_to_value(value)))
                .collect(),
        ),
    }
}

fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::StepStarted {
            node_id, sequence, ..
        } => {
            println!("  [{}] -> {}", sequence, node_id);
        }
        ExecutionEvent::StepFinished {
            node_id, status, ..
        } => {
            println!("       <- {} {:?}", node_id, status);
        }
        ExecutionEvent::StepEvent { node_id, event, .. } => {
            println!("       {} {:?}", node_id, event);
        }
        ExecutionEvent::AdapterStatusChanged {
            adapter_id, status, ..
        } => {
            println!("  adapter {} -> {}", adapter_id, status);
        }
        _ => {}
    }
}

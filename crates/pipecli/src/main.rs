use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipebuild::{FactoryConfig, FlowFactory, FlowRegistry};
use pipecore::{
    FlowDocument, FlowGraph, FlowState, GraphNode, NodeIdentity, OperatorFactory, ResourceFactory,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pipe")]
#[command(about = "Flow graph builder CLI", long_about = None)]
struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Factory configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a flow and print the resulting task graph
    Build {
        /// Flow document or bare flow graph (JSON)
        file: PathBuf,
    },

    /// Check that a flow resolves and is structurally sound, without building it
    Validate {
        file: PathBuf,
    },

    /// List registered operators and resources
    Types,

    /// Show the lifecycle transitions allowed from a state
    Lifecycle {
        state: FlowState,

        /// Check a single transition instead of listing them
        #[arg(long)]
        to: Option<FlowState>,
    },

    /// Write an example chat flow
    Init {
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Build { file } => {
            let factory = factory(cli.config.as_deref())?;
            build_flow(&factory, &file)?;
        }
        Commands::Validate { file } => {
            let factory = factory(cli.config.as_deref())?;
            validate_flow(&factory, &file)?;
        }
        Commands::Types => {
            let registry = registry()?;
            list_types(&registry);
        }
        Commands::Lifecycle { state, to } => {
            show_lifecycle(state, to);
        }
        Commands::Init { output } => {
            create_example_flow(&output)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn registry() -> Result<Arc<FlowRegistry>> {
    let registry = pipebuild::init_global(|registry| pipeops::register_all(registry))?;
    Ok(registry)
}

fn factory(config: Option<&Path>) -> Result<FlowFactory> {
    let config = match config {
        Some(path) => FactoryConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => FactoryConfig::default(),
    };
    Ok(FlowFactory::with_config(registry()?, config))
}

/// Reads a stored flow document, or wraps a bare graph in a new one
fn load_flow(file: &Path) -> Result<FlowDocument> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    if let Ok(doc) = serde_json::from_str::<FlowDocument>(&text) {
        return Ok(doc);
    }
    let graph: FlowGraph =
        serde_json::from_str(&text).context("File is neither a flow document nor a flow graph")?;
    let name = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "flow".to_string());
    Ok(FlowDocument::new(name, graph))
}

fn build_flow(factory: &FlowFactory, file: &Path) -> Result<()> {
    let mut doc = load_flow(file)?;
    println!("🔧 Building flow: {} ({})", doc.name, doc.state);
    if !doc.is_version_compatible() {
        tracing::warn!("Flow format {} may not be compatible", doc.version);
    }

    let dag = match factory.build(&doc.flow_data) {
        Ok(dag) => dag,
        Err(e) => {
            doc.mark_load_failed(e.to_string());
            println!("❌ Build failed during {}: {}", e.stage(), e);
            println!("   Flow state: {}", doc.state);
            return Err(e.into());
        }
    };

    println!("✅ Built graph {} at {}", dag.id(), dag.built_at());
    println!("   Tasks: {}", dag.len());
    println!("   Resources: {}", dag.resources().len());
    println!("   Sources: {}", dag.sources().join(", "));
    println!("   Sinks: {}", dag.sinks().join(", "));
    println!();
    for task in dag.tasks() {
        let next = dag.downstream(task.id());
        println!("  • {} [{:?}]", task.id(), task.operator().operator_kind());
        if !next.is_empty() {
            println!("      → {}", next.join(", "));
        }
    }
    for resource in dag.resources() {
        let kind = if resource.is_class() { "class" } else { "instance" };
        println!("  ◦ {} ({})", resource.node_id(), kind);
    }
    Ok(())
}

fn validate_flow(factory: &FlowFactory, file: &Path) -> Result<()> {
    let doc = load_flow(file)?;
    println!("🔍 Validating flow: {}", doc.name);

    if let Err(errors) = factory.preload_requirements(&doc.flow_data) {
        println!("❌ {} unresolved nodes:", errors.len());
        for e in &errors {
            println!("   {}", e);
        }
        anyhow::bail!("Flow {} has unresolved nodes", doc.name);
    }

    let plan = factory.plan(&doc.flow_data)?;
    let category = factory.infer_category(&doc.flow_data)?;
    println!("✅ Flow is valid:");
    println!("   Operators: {}", plan.operators().len());
    println!("   Resources: {}", plan.resource_count());
    println!("   Category: {:?}", category);
    println!("   Order: {}", plan.order().join(" → "));
    Ok(())
}

fn list_types(registry: &FlowRegistry) {
    println!("📦 Registered types:");
    println!();
    for metadata in registry.list_metadata() {
        println!(
            "  • {} [{}] {}",
            metadata.label(),
            metadata.category_label(),
            metadata.flow_key()
        );
        for param in metadata.parameters() {
            let required = if param.optional { "" } else { " (required)" };
            println!("      - {}: {}{}", param.name, param.type_name, required);
        }
    }
}

fn show_lifecycle(state: FlowState, to: Option<FlowState>) {
    match to {
        Some(to) if state.can_transition_to(to) => println!("✅ {} → {} is allowed", state, to),
        Some(to) => println!("❌ {} → {} is not allowed", state, to),
        None => {
            let next: Vec<String> = state.next_states().iter().map(|s| s.to_string()).collect();
            println!("{} → {}", state, next.join(", "));
        }
    }
}

fn operator_node(factory: &dyn OperatorFactory) -> GraphNode {
    let meta = factory.metadata();
    GraphNode::operator(NodeIdentity::new(meta.flow_key(), 0).to_string(), meta)
}

fn resource_node(factory: &dyn ResourceFactory) -> GraphNode {
    let meta = factory.metadata();
    GraphNode::resource(NodeIdentity::new(meta.flow_key(), 0).to_string(), meta)
}

fn create_example_flow(output: &Path) -> Result<()> {
    use pipeops::*;

    let mut graph = FlowGraph::new();
    let input = graph.add_node(operator_node(&TextInputFactory).with_position(100.0, 100.0));
    let prompt = graph.add_node(operator_node(&PromptBuildFactory).with_position(300.0, 100.0));
    let llm = graph.add_node(operator_node(&LlmCallFactory).with_position(500.0, 100.0));
    let out = graph.add_node(operator_node(&CollectOutputFactory).with_position(700.0, 100.0));

    let config = graph.add_node(
        resource_node(&ModelConfigFactory)
            .with_value("model", "tiny-chat")
            .with_position(300.0, 300.0),
    );
    let client = graph.add_node(resource_node(&ChatClientFactory).with_position(500.0, 300.0));
    let template = graph.add_node(
        resource_node(&PromptTemplateFactory)
            .with_value("template", "Answer briefly: {input}")
            .with_position(300.0, -100.0),
    );

    graph.connect(&input, 0, &prompt, 0);
    graph.connect(&prompt, 0, &llm, 0);
    graph.connect(&llm, 0, &out, 0);
    graph.connect(&config, 0, &client, 0);
    graph.connect(&client, 0, &llm, 0);
    graph.connect(&template, 0, &prompt, 0);

    let doc = FlowDocument::new("example_chat", graph)
        .with_description("Renders a prompt and sends it to a chat model");
    let json = serde_json::to_string_pretty(&doc)?;
    std::fs::write(output, json)?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Build it with:");
    println!("  pipe build {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_types_accepts_shared_registry() {
        let registry = registry().unwrap();
        assert!(!registry.is_empty());
        list_types(&registry);
    }

    #[test]
    fn test_example_flow_builds() {
        let path = std::env::temp_dir().join(format!("pipe-example-{}.json", std::process::id()));
        create_example_flow(&path).unwrap();

        let factory = factory(None).unwrap();
        validate_flow(&factory, &path).unwrap();
        build_flow(&factory, &path).unwrap();
        std::fs::remove_file(&path).unwrap();
    }
}

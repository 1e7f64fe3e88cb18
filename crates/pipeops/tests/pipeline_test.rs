use pipebuild::{FactoryConfig, FlowFactory, FlowRegistry};
use pipecore::{
    FlowCategory, FlowDocument, FlowGraph, FlowState, GraphNode, NodeIdentity, OperatorFactory,
    ResourceFactory,
};
use pipeops::*;
use std::sync::Arc;

fn registry() -> Arc<FlowRegistry> {
    let mut registry = FlowRegistry::new();
    register_all(&mut registry).expect("standard library registers cleanly");
    Arc::new(registry)
}

fn operator(factory: &dyn OperatorFactory) -> GraphNode {
    let meta = factory.metadata();
    GraphNode::operator(NodeIdentity::new(meta.flow_key(), 0).to_string(), meta)
}

fn resource(factory: &dyn ResourceFactory) -> GraphNode {
    let meta = factory.metadata();
    GraphNode::resource(NodeIdentity::new(meta.flow_key(), 0).to_string(), meta)
}

/// input -> prompt -> llm -> output, with the model, prompt and history
/// resources feeding in
fn chat_graph() -> FlowGraph {
    let mut graph = FlowGraph::new();
    let input = graph.add_node(operator(&TextInputFactory));
    let prompt = graph.add_node(operator(&PromptBuildFactory));
    let llm = graph.add_node(operator(&LlmCallFactory));
    let output = graph.add_node(operator(&CollectOutputFactory));

    let config = graph.add_node(resource(&ModelConfigFactory).with_value("model", "tiny-chat"));
    let client = graph.add_node(resource(&ChatClientFactory));
    let template = graph.add_node(
        resource(&PromptTemplateFactory).with_value("template", "You are helpful. {input}"),
    );
    let history = graph.add_node(resource(&InMemoryHistoryFactory));

    graph.connect(&input, 0, &prompt, 0);
    graph.connect(&prompt, 0, &llm, 0);
    graph.connect(&llm, 0, &output, 0);
    graph.connect(&config, 0, &client, 0);
    graph.connect(&client, 0, &llm, 0);
    graph.connect(&history, 0, &llm, 1);
    graph.connect(&template, 0, &prompt, 0);
    graph
}

fn task<'a, T: 'static>(dag: &'a pipebuild::ExecutableGraph, prefix: &str) -> &'a T {
    dag.tasks()
        .find(|t| t.id().starts_with(prefix))
        .and_then(|t| t.downcast_ref::<T>())
        .unwrap_or_else(|| panic!("no task starting with {prefix}"))
}

#[test]
fn test_register_all_is_idempotent() {
    let mut registry = FlowRegistry::new();
    register_all(&mut registry).unwrap();
    let count = registry.len();
    register_all(&mut registry).unwrap();
    assert_eq!(registry.len(), count);
    assert_eq!(count, 10);
}

#[test]
fn test_chat_pipeline_builds() {
    let config = FactoryConfig {
        check_resource_types: true,
        ..FactoryConfig::default()
    };
    let factory = FlowFactory::with_config(registry(), config);
    let graph = chat_graph();

    assert!(factory.preload_requirements(&graph).is_ok());
    let dag = factory.build(&graph).expect("chat pipeline builds");

    assert_eq!(dag.len(), 4);
    assert_eq!(dag.resources().len(), 4);
    assert_eq!(dag.sources().len(), 1);
    assert!(dag.sources()[0].starts_with("operator_text_input"));
    assert!(dag.sinks()[0].starts_with("operator_collect_output"));

    let prompt = task::<PromptBuild>(&dag, "operator_prompt_build");
    assert_eq!(prompt.build("hi"), "You are helpful. hi");

    let llm = task::<LlmCall>(&dag, "operator_llm_call");
    assert!(llm.has_history());
    let first = llm.request("one");
    let second = llm.request("two");
    assert_eq!(first.model, "tiny-chat");
    assert_eq!(first.temperature, 0.7);
    assert_eq!(second.messages, ["one", "two"]);

    assert_eq!(factory.infer_category(&graph).unwrap(), FlowCategory::ChatFlow);
}

#[test]
fn test_branch_routes_by_operator_name() {
    let mut graph = FlowGraph::new();
    let input = graph.add_node(operator(&TextInputFactory));
    let branch = graph.add_node(operator(&NonEmptyBranchFactory));
    let join = graph.add_node(operator(&JoinTextsFactory));
    let output = graph.add_node(operator(&CollectOutputFactory));
    graph.connect(&input, 0, &branch, 0);
    graph.connect(&branch, 1, &output, 0);
    graph.connect(&branch, 0, &join, 0);

    let dag = FlowFactory::new(registry()).build(&graph).unwrap();
    let branch_op = task::<NonEmptyBranch>(&dag, "operator_non_empty_branch");
    assert_eq!(branch_op.route("hello"), "join_texts");
    assert_eq!(branch_op.route(""), "collect_output");
    assert_eq!(dag.downstream(&branch), [join.as_str(), output.as_str()]);

    let joiner = task::<JoinTexts>(&dag, "operator_join_texts");
    assert_eq!(joiner.join(&["a", "b"]), "a\nb");
}

#[test]
fn test_stored_document_rebuilds() {
    let mut doc = FlowDocument::new("chat", chat_graph()).with_description("demo chat");
    assert!(doc.transition(FlowState::Developing).is_applied());

    let json = serde_json::to_string(&doc).unwrap();
    let restored: FlowDocument = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.uid, doc.uid);
    assert_eq!(restored.state, FlowState::Developing);
    assert!(restored.is_version_compatible());

    let factory = FlowFactory::new(registry());
    let first = factory.build(&doc.flow_data).unwrap();
    let second = factory.build(&restored.flow_data).unwrap();
    assert_eq!(first.adjacency(), second.adjacency());
}

#[test]
fn test_missing_model_fails_the_build() {
    let mut graph = chat_graph();
    let config = graph
        .nodes
        .iter_mut()
        .find(|n| n.id.contains("ModelConfig"))
        .unwrap();
    *config = resource(&ModelConfigFactory);

    let err = FlowFactory::new(registry()).build(&graph).unwrap_err();
    assert!(err.to_string().contains("'model'"), "{err}");
}

mod common;

use common::*;
use pipebuild::{FactoryConfig, FlowFactory};
use pipecore::{
    Argument, BuildError, BuildStage, ConstructError, FlowGraph, FlowKey, ResourceFactory, Value,
};
use std::sync::Arc;

fn factory() -> FlowFactory {
    FlowFactory::new(registry())
}

/// cfg -> cli -> echo, the resource chain every LLM flow starts with
fn client_graph() -> FlowGraph {
    let mut graph = FlowGraph::new();
    graph.add_node(res("cfg", ModelConfigFactory.metadata()).with_value("model", "tiny"));
    graph.add_node(res("cli", ClientFactory.metadata()));
    graph.add_node(op("echo", echo()));
    graph.connect("cfg", 0, "cli", 0);
    graph.connect("cli", 0, "echo", 0);
    graph
}

#[test]
fn test_resource_instance_reaches_operator() {
    let dag = factory().build(&client_graph()).unwrap();

    assert_eq!(dag.len(), 1, "Resources are not tasks");
    assert_eq!(dag.resources().len(), 2);

    let echo = recorded(&dag, "echo");
    assert_eq!(echo.task_name, "echo");
    let client = echo.args.require_resource::<Client>("client").unwrap();
    assert_eq!(client.config.model, "tiny");
    assert_eq!(client.config.temperature, 0.7, "Registry default applies");

    let built = dag.resource("cli").and_then(|r| r.downcast::<Client>()).unwrap();
    assert!(Arc::ptr_eq(&built, &client), "Operator receives the built instance");
    assert_eq!(echo.args.literal("prefix"), Some(&Value::from("")));
}

#[test]
fn test_single_resource_into_operator() {
    let mut graph = FlowGraph::new();
    graph.add_node(res("R", MarkerFactory.metadata()));
    graph.add_node(op("O", op1()));
    graph.connect("R", 0, "O", 0);

    let dag = factory().build(&graph).unwrap();
    assert_eq!(dag.len(), 1);
    let task = dag.task("O").unwrap();
    assert_eq!(task.flow_key().to_string(), "op1___$$___common___$$___v1");

    let received = recorded(&dag, "O").args.require_resource::<Marker>("x").unwrap();
    let built = dag.resource("R").and_then(|r| r.downcast::<Marker>()).unwrap();
    assert!(Arc::ptr_eq(&received, &built));
}

#[test]
fn test_operator_chain_wiring() {
    let mut graph = FlowGraph::new();
    graph.add_node(op("a", plain("source")));
    graph.add_node(op("b", plain("left")));
    graph.connect("a", 0, "b", 0);

    let dag = factory().build(&graph).unwrap();
    assert_eq!(dag.downstream("a"), ["b"]);
    assert_eq!(dag.upstream("b"), ["a"]);
    assert_eq!(dag.sources(), ["a"]);
    assert_eq!(dag.sinks(), ["b"]);
    assert!(dag.downstream("b").is_empty());
}

#[test]
fn test_isolated_operator_is_a_task() {
    let mut graph = FlowGraph::new();
    graph.add_node(op("alone", plain("other")));

    let dag = factory().build(&graph).unwrap();
    assert_eq!(dag.sources(), ["alone"]);
    assert_eq!(dag.sinks(), ["alone"]);
}

#[test]
fn test_duplicate_node_id() {
    let mut graph = FlowGraph::new();
    graph.add_node(op("a", plain("source")));
    graph.add_node(op("a", plain("left")));

    let err = factory().build(&graph).unwrap_err();
    assert!(matches!(&err, BuildError::DuplicateNodeId { node_id } if node_id == "a"));
    assert_eq!(err.stage(), BuildStage::Partition);
}

#[test]
fn test_cycle_is_rejected() {
    let mut graph = FlowGraph::new();
    graph.add_node(op("a", plain("left")));
    graph.add_node(op("b", plain("right")));
    graph.connect("a", 0, "b", 0);
    graph.connect("b", 0, "a", 0);

    match factory().build(&graph) {
        Err(BuildError::CycleDetected { nodes }) => assert_eq!(nodes, ["a", "b"]),
        other => panic!("Expected a cycle, got {other:?}"),
    }
}

#[test]
fn test_resource_cycle_is_rejected() {
    let mut graph = FlowGraph::new();
    graph.add_node(res("c1", ClientFactory.metadata()));
    graph.add_node(res("c2", ClientFactory.metadata()));
    graph.connect("c1", 0, "c2", 0);
    graph.connect("c2", 0, "c1", 0);

    let err = factory().build(&graph).unwrap_err();
    assert_eq!(err.stage(), BuildStage::Ordering);
    match err {
        BuildError::CycleDetected { nodes } => assert_eq!(nodes, ["c1", "c2"]),
        other => panic!("Expected a cycle, got {other:?}"),
    }
}

#[test]
fn test_operator_cannot_feed_resource() {
    let mut graph = client_graph();
    graph.add_node(op("src", plain("source")));
    graph.connect("src", 0, "cli", 0);

    let err = factory().build(&graph).unwrap_err();
    assert!(matches!(err, BuildError::InvalidConnection { ref node_id, .. } if node_id == "cli"));
    assert_eq!(err.stage(), BuildStage::Binding);
}

#[test]
fn test_resource_edge_into_common_parameter() {
    let mut graph = client_graph();
    graph.add_node(res("cli2", ClientFactory.metadata()));
    graph.connect("cfg", 0, "cli2", 0);
    graph.connect("cli2", 0, "echo", 2);

    let err = factory().build(&graph).unwrap_err();
    assert!(err.to_string().contains("'prefix' does not take a resource"), "{err}");
}

#[test]
fn test_branch_parameters_name_downstream_operators() {
    let mut graph = FlowGraph::new();
    graph.add_node(op("r", router()));
    graph.add_node(op("l", plain("left")));
    graph.add_node(op("x", plain("right")));
    // declared out of order on purpose
    graph.connect("r", 1, "x", 0);
    graph.connect("r", 0, "l", 0);

    let dag = factory().build(&graph).unwrap();
    let router = recorded(&dag, "r");
    assert_eq!(router.args.literal("yes"), Some(&Value::from("left")));
    assert_eq!(router.args.literal("no"), Some(&Value::from("right")));
    assert_eq!(dag.downstream("r"), ["l", "x"]);
}

#[test]
fn test_branch_arity_mismatch() {
    let mut graph = FlowGraph::new();
    graph.add_node(op("r", router()));
    let targets = [("l", "left"), ("x", "right"), ("o", "other")];
    for (i, (id, name)) in targets.into_iter().enumerate() {
        graph.add_node(op(id, plain(name)));
        graph.connect("r", i, id, 0);
    }

    match factory().build(&graph) {
        Err(BuildError::BranchArityMismatch {
            node_id,
            expected,
            actual,
        }) => {
            assert_eq!(node_id, "r");
            assert_eq!((expected, actual), (2, 3));
        }
        other => panic!("Expected arity mismatch, got {other:?}"),
    }
}

#[test]
fn test_three_way_branch() {
    let mut graph = FlowGraph::new();
    graph.add_node(op("r", router3()));
    graph.add_node(op("l", plain("left")));
    graph.add_node(op("x", plain("right")));
    graph.connect("r", 2, "l", 0);
    graph.connect("r", 0, "x", 0);

    let err = factory().build(&graph).unwrap_err();
    assert!(
        matches!(err, BuildError::BranchArityMismatch { expected: 3, actual: 2, .. }),
        "{err}"
    );

    graph.add_node(op("o", plain("other")));
    graph.connect("r", 1, "o", 0);
    let dag = factory().build(&graph).unwrap();
    let args = &recorded(&dag, "r").args;
    let names: Vec<&str> = ["first", "second", "third"]
        .iter()
        .filter_map(|p| args.literal(p).and_then(Value::as_str))
        .collect();
    assert_eq!(names, ["right", "other", "left"]);
}

#[test]
fn test_branch_outputs_need_distinct_orders() {
    let mut graph = FlowGraph::new();
    graph.add_node(op("r", router()));
    graph.add_node(op("l", plain("left")));
    graph.add_node(op("x", plain("right")));
    graph.connect("r", 0, "l", 0);
    graph.connect("r", 0, "x", 0);

    let err = factory().build(&graph).unwrap_err();
    assert!(matches!(err, BuildError::InvalidConnection { .. }), "{err}");
    assert_eq!(err.stage(), BuildStage::OperatorInstantiation);
}

#[test]
fn test_rebuild_is_independent_and_equal() {
    let factory = factory();
    let mut graph = client_graph();
    graph.add_node(op("src", plain("source")));
    graph.connect("src", 0, "echo", 0);

    let first = factory.build(&graph).unwrap();
    let second = factory.build(&graph).unwrap();

    assert_eq!(first.adjacency(), second.adjacency());
    assert_ne!(first.id(), second.id());
    let a = recorded(&first, "echo").args.require_resource::<Client>("client").unwrap();
    let b = recorded(&second, "echo").args.require_resource::<Client>("client").unwrap();
    assert!(!Arc::ptr_eq(&a, &b), "Each build constructs its own instances");
}

#[test]
fn test_missing_required_literal() {
    let mut graph = client_graph();
    graph.nodes[0] = res("cfg", ModelConfigFactory.metadata());

    match factory().build(&graph) {
        Err(BuildError::MissingRequiredParameter {
            stage,
            node_id,
            parameter,
            ..
        }) => {
            assert_eq!(stage, BuildStage::ResourceInstantiation);
            assert_eq!((node_id.as_str(), parameter.as_str()), ("cfg", "model"));
        }
        other => panic!("Expected missing parameter, got {other:?}"),
    }
}

#[test]
fn test_missing_required_resource() {
    let mut graph = FlowGraph::new();
    graph.add_node(res("cli", ClientFactory.metadata()));

    let err = factory().build(&graph).unwrap_err();
    assert!(
        matches!(&err, BuildError::MissingRequiredParameter { parameter, .. } if parameter == "config"),
        "{err}"
    );
}

#[test]
fn test_literals_are_coerced() {
    let mut graph = client_graph();
    graph.nodes[0] = res("cfg", ModelConfigFactory.metadata())
        .with_value("model", "tiny")
        .with_value("temperature", "0.25");

    let dag = factory().build(&graph).unwrap();
    let config = dag.resource("cfg").and_then(|r| r.downcast::<ModelConfig>()).unwrap();
    assert_eq!(config.temperature, 0.25);

    graph.nodes[0] = res("cfg", ModelConfigFactory.metadata())
        .with_value("model", "tiny")
        .with_value("temperature", "warm");
    let err = factory().build(&graph).unwrap_err();
    assert!(matches!(err, BuildError::InvalidMetadata { .. }), "{err}");
}

#[test]
fn test_class_resource_is_passed_by_type() {
    let mut graph = FlowGraph::new();
    graph.add_node(res("mem", MemoryFactory.metadata()));
    graph.add_node(op("echo", echo()));
    graph.connect("mem", 0, "echo", 1);

    let dag = factory().build(&graph).unwrap();
    assert!(dag.resource("mem").unwrap().is_class());

    let echo = recorded(&dag, "echo");
    let class = echo.args.class("memory").unwrap();
    assert_eq!(class.type_identifier.as_str(), "test.Memory");
    assert!(class.instantiate(&Default::default()).is_ok());
    assert!(echo.args.get("client").is_none(), "Unbound optional resource is absent");
}

#[test]
fn test_unregistered_flow_key() {
    let mut graph = FlowGraph::new();
    graph.add_node(op("old", plain("echo_legacy")));

    let err = factory().build(&graph).unwrap_err();
    assert!(matches!(err, BuildError::FlowKeyNotFound { .. }), "{err}");
}

#[test]
fn test_compat_alias_resolves_legacy_key() {
    let legacy = FlowKey::operator("echo_legacy", "common", "v1");
    let current = FlowKey::operator("left", "common", "v1");
    let config = FactoryConfig::default().with_alias(legacy.to_string(), current.to_string());
    let factory = FlowFactory::with_config(registry(), config);

    let mut graph = FlowGraph::new();
    graph.add_node(op("old", plain("echo_legacy")));
    let dag = factory.build(&graph).unwrap();
    assert_eq!(dag.task("old").unwrap().flow_key(), &legacy);
}

#[test]
fn test_constructor_failure_is_wrapped() {
    let mut graph = FlowGraph::new();
    graph.add_node(op("b", broken()));

    match factory().build(&graph) {
        Err(BuildError::OperatorInstantiation { node_id, source, .. }) => {
            assert_eq!(node_id, "b");
            assert!(matches!(source, ConstructError::InitializationFailed(_)));
        }
        other => panic!("Expected instantiation failure, got {other:?}"),
    }
}

#[test]
fn test_list_resources_arrive_in_edge_order() {
    use pipecore::{OperatorKind, OperatorMetadata, Parameter};
    use pipebuild::{FlowRegistry, Registrar};

    let fan_in = OperatorMetadata::new("fan_in", "common", "test.fan_in", OperatorKind::Join)
        .with_parameter(Parameter::resource("configs", "test.ModelConfig").list());
    let mut registry = FlowRegistry::new();
    registry.register_resource(ModelConfigFactory).unwrap();
    registry.register_operator(RecordingFactory::new(fan_in.clone())).unwrap();

    let mut graph = FlowGraph::new();
    graph.add_node(res("c2", ModelConfigFactory.metadata()).with_value("model", "second"));
    graph.add_node(res("c1", ModelConfigFactory.metadata()).with_value("model", "first"));
    graph.add_node(op("join", fan_in));
    graph.connect("c1", 0, "join", 0);
    graph.connect("c2", 0, "join", 0);

    let dag = FlowFactory::new(Arc::new(registry)).build(&graph).unwrap();
    let join = recorded(&dag, "join");
    assert!(matches!(join.args.get("configs"), Some(Argument::Resources(items)) if items.len() == 2));
    let models: Vec<String> = join
        .args
        .resources::<ModelConfig>("configs")
        .unwrap()
        .iter()
        .map(|c| c.model.clone())
        .collect();
    assert_eq!(models, ["first", "second"]);
}

#![allow(dead_code)]

use pipebuild::{FlowRegistry, Registrar};
use pipecore::{
    Arguments, ConstructError, GraphNode, Operator, OperatorFactory, OperatorKind,
    OperatorMetadata, Parameter, ResourceFactory, ResourceMetadata, ResourceObject,
};
use std::any::Any;
use std::sync::Arc;

#[derive(Debug, PartialEq)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f64,
}

#[derive(Debug)]
pub struct Client {
    pub config: Arc<ModelConfig>,
}

pub struct ModelConfigFactory;

impl ResourceFactory for ModelConfigFactory {
    fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata::new("model_config", "llm", "test.ModelConfig")
            .with_parameter(Parameter::common("model", "str"))
            .with_parameter(Parameter::common("temperature", "float").with_default(0.7))
    }

    fn create(&self, args: &Arguments) -> Result<ResourceObject, ConstructError> {
        Ok(Arc::new(ModelConfig {
            model: args.require_str("model")?.to_string(),
            temperature: args.f64_or("temperature", 0.7),
        }))
    }
}

pub struct ClientFactory;

impl ResourceFactory for ClientFactory {
    fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata::new("client", "llm", "test.Client")
            .with_parameter(Parameter::resource("config", "test.ModelConfig"))
    }

    fn create(&self, args: &Arguments) -> Result<ResourceObject, ConstructError> {
        Ok(Arc::new(Client {
            config: args.require_resource::<ModelConfig>("config")?,
        }))
    }
}

pub struct MemoryFactory;

impl ResourceFactory for MemoryFactory {
    fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata::new("memory", "memory", "test.Memory").class_kind()
    }

    fn create(&self, _args: &Arguments) -> Result<ResourceObject, ConstructError> {
        Ok(Arc::new(Vec::<String>::new()))
    }
}

/// Parameterless resource type
#[derive(Debug)]
pub struct Marker;

pub struct MarkerFactory;

impl ResourceFactory for MarkerFactory {
    fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata::new("marker", "common", "test.X")
    }

    fn create(&self, _args: &Arguments) -> Result<ResourceObject, ConstructError> {
        Ok(Arc::new(Marker))
    }
}

/// Operator that keeps the arguments it was built with
#[derive(Debug)]
pub struct Recorded {
    pub task_name: String,
    pub kind: OperatorKind,
    pub args: Arguments,
}

impl Operator for Recorded {
    fn task_name(&self) -> &str {
        &self.task_name
    }

    fn operator_kind(&self) -> OperatorKind {
        self.kind
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct RecordingFactory {
    meta: OperatorMetadata,
    fail: bool,
}

impl RecordingFactory {
    pub fn new(meta: OperatorMetadata) -> Self {
        Self { meta, fail: false }
    }

    pub fn failing(meta: OperatorMetadata) -> Self {
        Self { meta, fail: true }
    }
}

impl OperatorFactory for RecordingFactory {
    fn metadata(&self) -> OperatorMetadata {
        self.meta.clone()
    }

    fn create(&self, task_name: &str, args: &Arguments) -> Result<Box<dyn Operator>, ConstructError> {
        if self.fail {
            return Err(ConstructError::InitializationFailed("backend unavailable".into()));
        }
        Ok(Box::new(Recorded {
            task_name: task_name.to_string(),
            kind: self.meta.operator_kind,
            args: args.clone(),
        }))
    }
}

pub fn plain(name: &str) -> OperatorMetadata {
    OperatorMetadata::new(name, "common", format!("test.{name}"), OperatorKind::Map)
}

pub fn echo() -> OperatorMetadata {
    plain("echo")
        .with_parameter(Parameter::resource("client", "test.Client").nullable())
        .with_parameter(Parameter::resource("memory", "test.Memory").class_kind().nullable())
        .with_parameter(Parameter::common("prefix", "str").with_default(""))
}

pub fn router() -> OperatorMetadata {
    OperatorMetadata::new("router", "common", "test.router", OperatorKind::Branch)
        .with_parameter(Parameter::common("yes", "str"))
        .with_parameter(Parameter::common("no", "str"))
}

pub fn router3() -> OperatorMetadata {
    OperatorMetadata::new("router3", "common", "test.router3", OperatorKind::Branch)
        .with_parameter(Parameter::common("first", "str"))
        .with_parameter(Parameter::common("second", "str"))
        .with_parameter(Parameter::common("third", "str"))
}

pub fn op1() -> OperatorMetadata {
    plain("op1").with_parameter(Parameter::resource("x", "test.X"))
}

pub fn broken() -> OperatorMetadata {
    plain("broken")
}

pub fn registry() -> Arc<FlowRegistry> {
    let mut registry = FlowRegistry::new();
    registry.register_resource(ModelConfigFactory).unwrap();
    registry.register_resource(ClientFactory).unwrap();
    registry.register_resource(MemoryFactory).unwrap();
    registry.register_resource(MarkerFactory).unwrap();
    registry.register_operator(RecordingFactory::new(echo())).unwrap();
    registry.register_operator(RecordingFactory::new(router())).unwrap();
    registry.register_operator(RecordingFactory::new(router3())).unwrap();
    registry.register_operator(RecordingFactory::new(op1())).unwrap();
    for name in ["source", "left", "right", "other"] {
        registry.register_operator(RecordingFactory::new(plain(name))).unwrap();
    }
    registry.register_operator(RecordingFactory::failing(broken())).unwrap();
    Arc::new(registry)
}

pub fn op(id: &str, meta: OperatorMetadata) -> GraphNode {
    GraphNode::operator(id, meta)
}

pub fn res(id: &str, meta: ResourceMetadata) -> GraphNode {
    GraphNode::resource(id, meta)
}

pub fn recorded<'a>(dag: &'a pipebuild::ExecutableGraph, id: &str) -> &'a Recorded {
    dag.task(id)
        .and_then(|task| task.downcast_ref::<Recorded>())
        .unwrap_or_else(|| panic!("no task {id}"))
}

use crate::binding::BuildPlan;
use crate::category;
use crate::dag::{BuiltResource, ExecutableGraph, Task};
use crate::registry::{FlowEntry, Resolver, RuntimeType};
use crate::FactoryConfig;
use pipecore::{
    Argument, Arguments, BuildError, BuildStage, FlowCategory, FlowGraph, FlowKey, GraphNode,
    Metadata, OperatorKind, OperatorMetadata, Parameter, ResourceKind, TypeIdentifier, Value,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Turns declarative flow graphs into executable graphs.
///
/// A factory holds no per-build state; one instance can serve concurrent
/// builds over the same shared registry.
pub struct FlowFactory {
    resolver: Arc<dyn Resolver>,
    config: FactoryConfig,
}

/// Resources built so far in one build, by node id
#[derive(Default)]
struct ResourceSet {
    built: Vec<BuiltResource>,
    index: HashMap<String, usize>,
}

impl ResourceSet {
    fn insert(&mut self, resource: BuiltResource) {
        self.index.insert(resource.node_id().to_string(), self.built.len());
        self.built.push(resource);
    }

    fn get(&self, node_id: &str) -> Option<&BuiltResource> {
        self.index.get(node_id).and_then(|&i| self.built.get(i))
    }
}

impl FlowFactory {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self::with_config(resolver, FactoryConfig::default())
    }

    pub fn with_config(resolver: Arc<dyn Resolver>, config: FactoryConfig) -> Self {
        Self { resolver, config }
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }

    /// Builds an executable graph, or fails with the first error found.
    /// Instances created before a failure are dropped.
    pub fn build(&self, graph: &FlowGraph) -> Result<ExecutableGraph, BuildError> {
        tracing::info!(
            "Building flow graph: {} nodes, {} edges",
            graph.nodes.len(),
            graph.edges.len()
        );
        match self.build_graph(graph) {
            Ok(dag) => {
                tracing::info!(
                    "Built flow graph {} with {} tasks and {} resources",
                    dag.id(),
                    dag.len(),
                    dag.resources().len()
                );
                Ok(dag)
            }
            Err(e) => {
                tracing::error!(
                    stage = %e.stage(),
                    node = e.node_id().unwrap_or("-"),
                    "Flow build failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    fn build_graph(&self, graph: &FlowGraph) -> Result<ExecutableGraph, BuildError> {
        let plan = self.plan(graph)?;
        let resources = self.instantiate_resources(&plan)?;
        let tasks = self.instantiate_operators(&plan, &resources)?;
        Ok(ExecutableGraph::assemble(tasks, plan.links(), resources.built))
    }

    /// Structural checks only: partition, binding and ordering
    pub fn plan<'g>(&self, graph: &'g FlowGraph) -> Result<BuildPlan<'g>, BuildError> {
        BuildPlan::new(graph, &self.config)
    }

    /// Checks that every node's implementation is registered without
    /// building anything. Reports every unresolvable node, not just the first.
    pub fn preload_requirements(&self, graph: &FlowGraph) -> Result<(), Vec<BuildError>> {
        let mut errors = Vec::new();
        for node in &graph.nodes {
            let flow_key = node.data.flow_key();
            let resolved = self
                .lookup(&flow_key, &node.id, BuildStage::Preload)
                .map_err(|e| e.to_string())
                .and_then(|entry| {
                    self.resolver
                        .resolve(entry.metadata.type_identifier())
                        .map_err(|e| e.to_string())
                });
            if let Err(reason) = resolved {
                errors.push(BuildError::ClassResolution {
                    node_id: node.id.clone(),
                    type_identifier: node.data.type_identifier().to_string(),
                    reason,
                });
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            tracing::warn!("Preload found {} unresolvable nodes", errors.len());
            Err(errors)
        }
    }

    pub fn infer_category(&self, graph: &FlowGraph) -> Result<FlowCategory, BuildError> {
        let plan = self.plan(graph)?;
        Ok(category::infer_category(&plan))
    }

    /// Registry entry for `flow_key`, falling back to its configured alias
    fn lookup(
        &self,
        flow_key: &FlowKey,
        node_id: &str,
        stage: BuildStage,
    ) -> Result<&FlowEntry, BuildError> {
        if let Ok(entry) = self.resolver.lookup_flow(flow_key) {
            return Ok(entry);
        }
        if let Some(alias) = self.config.compat_aliases.get(&flow_key.to_string()) {
            let current: FlowKey = alias.parse().map_err(|source| BuildError::InvalidMetadata {
                stage,
                node_id: node_id.to_string(),
                source,
            })?;
            if let Ok(entry) = self.resolver.lookup_flow(&current) {
                tracing::info!("Resolved {} through alias {}", flow_key, current);
                return Ok(entry);
            }
        }
        Err(BuildError::FlowKeyNotFound {
            stage,
            node_id: node_id.to_string(),
            flow_key: flow_key.to_string(),
        })
    }

    fn resolve_type(
        &self,
        type_identifier: &TypeIdentifier,
        node_id: &str,
        stage: BuildStage,
    ) -> Result<&RuntimeType, BuildError> {
        self.resolver
            .resolve(type_identifier)
            .map_err(|_| unknown_type(type_identifier, node_id, stage))
    }

    fn instantiate_resources(&self, plan: &BuildPlan<'_>) -> Result<ResourceSet, BuildError> {
        let stage = BuildStage::ResourceInstantiation;
        let mut resources = ResourceSet::default();

        for node in plan.ordered_resources() {
            let flow_key = node.data.flow_key();
            let entry = self.lookup(&flow_key, &node.id, stage)?;
            let Metadata::Resource(registered) = &entry.metadata else {
                return Err(unknown_type(node.data.type_identifier(), &node.id, stage));
            };
            let type_identifier = &registered.type_identifier;
            let class = self
                .resolve_type(type_identifier, &node.id, stage)?
                .as_class(type_identifier)
                .ok_or_else(|| unknown_type(type_identifier, &node.id, stage))?;

            let built = if registered.resource_kind == ResourceKind::Class {
                tracing::debug!("Passing class-kind resource {} by type", node.id);
                BuiltResource::class_only(node.id.as_str(), flow_key, class)
            } else {
                let args = self.resolve_arguments(
                    node,
                    &flow_key,
                    &registered.parameters,
                    plan,
                    &resources,
                    stage,
                )?;
                let object = class.instantiate(&args).map_err(|source| {
                    BuildError::ResourceInstantiation {
                        node_id: node.id.clone(),
                        flow_key: flow_key.to_string(),
                        source,
                    }
                })?;
                tracing::debug!("Instantiated resource {} ({})", node.id, flow_key);
                BuiltResource::instance(node.id.as_str(), flow_key, class, object)
            };
            resources.insert(built);
        }
        Ok(resources)
    }

    fn instantiate_operators(
        &self,
        plan: &BuildPlan<'_>,
        resources: &ResourceSet,
    ) -> Result<Vec<Task>, BuildError> {
        let stage = BuildStage::OperatorInstantiation;
        let mut tasks = Vec::with_capacity(plan.operators().len());

        for node in plan.operators() {
            let flow_key = node.data.flow_key();
            let entry = self.lookup(&flow_key, &node.id, stage)?;
            let Metadata::Operator(registered) = &entry.metadata else {
                return Err(unknown_type(node.data.type_identifier(), &node.id, stage));
            };
            let factory = self
                .resolve_type(&registered.type_identifier, &node.id, stage)?
                .as_operator()
                .ok_or_else(|| unknown_type(&registered.type_identifier, &node.id, stage))?;

            let args = if registered.operator_kind == OperatorKind::Branch {
                branch_arguments(node, registered, plan)?
            } else {
                self.resolve_arguments(
                    node,
                    &flow_key,
                    &registered.parameters,
                    plan,
                    resources,
                    stage,
                )?
            };
            let operator = factory.create(&node.id, &args).map_err(|source| {
                BuildError::OperatorInstantiation {
                    node_id: node.id.clone(),
                    flow_key: flow_key.to_string(),
                    source,
                }
            })?;
            tracing::debug!("Instantiated operator {} ({})", node.id, flow_key);
            tasks.push(Task::new(node.id.as_str(), flow_key, operator));
        }
        Ok(tasks)
    }

    /// Resolves every registered parameter of `node`. Resource parameters
    /// take what is bound to them; common parameters take the node's
    /// literal, then the registered default.
    fn resolve_arguments(
        &self,
        node: &GraphNode,
        flow_key: &FlowKey,
        parameters: &[Parameter],
        plan: &BuildPlan<'_>,
        resources: &ResourceSet,
        stage: BuildStage,
    ) -> Result<Arguments, BuildError> {
        let missing = |param: &Parameter| BuildError::MissingRequiredParameter {
            stage,
            node_id: node.id.clone(),
            flow_key: flow_key.to_string(),
            parameter: param.name.clone(),
        };
        let mut args = Arguments::new();

        for param in parameters {
            if param.is_resource() {
                let bindings = plan.bindings(&node.id, &param.name);
                if bindings.is_empty() {
                    if param.optional {
                        continue;
                    }
                    return Err(missing(param));
                }

                let mut objects = Vec::with_capacity(bindings.len());
                let mut classes = Vec::with_capacity(bindings.len());
                for binding in bindings {
                    let invalid = |reason: String| BuildError::InvalidConnection {
                        stage,
                        edge_id: binding.edge_id.clone(),
                        node_id: node.id.clone(),
                        reason,
                    };
                    let resource = resources.get(&binding.source).ok_or_else(|| {
                        invalid(format!("resource '{}' was not built", binding.source))
                    })?;
                    match param.resource_kind {
                        ResourceKind::Class => classes.push(resource.class().clone()),
                        ResourceKind::Instance => {
                            let object = resource.object().cloned().ok_or_else(|| {
                                invalid(format!(
                                    "parameter '{}' needs an instance but '{}' is a class-kind resource",
                                    param.name, binding.source
                                ))
                            })?;
                            objects.push(object);
                        }
                    }
                }

                let arg = match (param.resource_kind, param.is_list) {
                    (ResourceKind::Class, true) => Argument::Classes(classes),
                    (ResourceKind::Instance, true) => Argument::Resources(objects),
                    (ResourceKind::Class, false) => {
                        Argument::Class(classes.pop().ok_or_else(|| missing(param))?)
                    }
                    (ResourceKind::Instance, false) => {
                        Argument::Resource(objects.pop().ok_or_else(|| missing(param))?)
                    }
                };
                args.insert(param.name.as_str(), arg);
                continue;
            }

            let literal = node
                .value_of(&param.name)
                .filter(|v| !v.is_null())
                .or(param.default.as_ref());
            match literal {
                Some(value) => {
                    let value = if self.config.coerce_literals {
                        param
                            .to_runtime_value(value)
                            .map_err(|source| BuildError::InvalidMetadata {
                                stage,
                                node_id: node.id.clone(),
                                source,
                            })?
                    } else {
                        value.clone()
                    };
                    args.insert(param.name.as_str(), Argument::Literal(value));
                }
                None if param.optional => {}
                None => return Err(missing(param)),
            }
        }
        Ok(args)
    }
}

/// A branch operator's parameters name its downstream operators, matched
/// positionally after sorting the outgoing links by source_order.
fn branch_arguments(
    node: &GraphNode,
    registered: &OperatorMetadata,
    plan: &BuildPlan<'_>,
) -> Result<Arguments, BuildError> {
    let mut links: Vec<_> = plan.downstream(&node.id).collect();
    links.sort_by_key(|link| link.source_order);

    if let Some(pair) = links
        .windows(2)
        .find(|pair| pair[0].source_order == pair[1].source_order)
    {
        return Err(BuildError::InvalidConnection {
            stage: BuildStage::OperatorInstantiation,
            edge_id: pair[1].edge_id.clone(),
            node_id: node.id.clone(),
            reason: format!(
                "branch outputs '{}' and '{}' share source_order {}",
                pair[0].target, pair[1].target, pair[0].source_order
            ),
        });
    }
    if links.len() != registered.parameters.len() {
        return Err(BuildError::BranchArityMismatch {
            node_id: node.id.clone(),
            expected: registered.parameters.len(),
            actual: links.len(),
        });
    }

    let mut args = Arguments::new();
    for (param, link) in registered.parameters.iter().zip(links) {
        let target = plan
            .node(&link.target)
            .map(|n| n.data.name())
            .unwrap_or(link.target.as_str());
        args.insert(param.name.as_str(), Argument::Literal(Value::from(target)));
    }
    Ok(args)
}

fn unknown_type(type_identifier: &TypeIdentifier, node_id: &str, stage: BuildStage) -> BuildError {
    BuildError::UnknownType {
        stage,
        node_id: node_id.to_string(),
        type_identifier: type_identifier.to_string(),
    }
}

//! Structural half of a build: partitions the nodes, classifies every edge,
//! binds resources to the parameters they satisfy and orders the graph.
//! Nothing here touches the registry.

use crate::ordering::topological_order;
use crate::FactoryConfig;
use pipecore::{
    BuildError, BuildStage, FlowGraph, GraphEdge, GraphNode, Metadata, NodeKind, ResourceKind,
    ResourceMetadata,
};
use std::collections::HashMap;

/// An operator-to-operator edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorLink {
    pub edge_id: String,
    pub source: String,
    pub source_order: usize,
    pub target: String,
    pub target_order: usize,
}

/// A resource node wired into one parameter of its target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBinding {
    pub edge_id: String,
    pub source: String,
}

/// Validated structure of one flow graph, ready for instantiation
#[derive(Debug)]
pub struct BuildPlan<'g> {
    nodes: HashMap<&'g str, &'g GraphNode>,
    operators: Vec<&'g GraphNode>,
    resources: Vec<&'g GraphNode>,
    links: Vec<OperatorLink>,
    downstream: HashMap<&'g str, Vec<usize>>,
    upstream: HashMap<&'g str, Vec<usize>>,
    /// target node id -> parameter name -> bound resources
    bindings: HashMap<&'g str, HashMap<&'g str, Vec<ResourceBinding>>>,
    order: Vec<&'g str>,
}

impl<'g> BuildPlan<'g> {
    pub fn new(graph: &'g FlowGraph, config: &FactoryConfig) -> Result<Self, BuildError> {
        let mut plan = Self::partition(graph)?;
        let dependencies = plan.classify_edges(&graph.edges, config)?;

        let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        plan.order = topological_order(&ids, &dependencies)?;

        tracing::debug!(
            "Planned {} operators, {} resources, {} operator links",
            plan.operators.len(),
            plan.resources.len(),
            plan.links.len()
        );
        Ok(plan)
    }

    fn partition(graph: &'g FlowGraph) -> Result<Self, BuildError> {
        let mut plan = BuildPlan {
            nodes: HashMap::with_capacity(graph.nodes.len()),
            operators: Vec::new(),
            resources: Vec::new(),
            links: Vec::new(),
            downstream: HashMap::new(),
            upstream: HashMap::new(),
            bindings: HashMap::new(),
            order: Vec::new(),
        };
        for node in &graph.nodes {
            if plan.nodes.insert(node.id.as_str(), node).is_some() {
                return Err(BuildError::DuplicateNodeId {
                    node_id: node.id.clone(),
                });
            }
            match node.kind() {
                NodeKind::Operator => plan.operators.push(node),
                NodeKind::Resource => plan.resources.push(node),
            }
        }
        Ok(plan)
    }

    /// Returns every edge as a `(source, target)` dependency for ordering
    fn classify_edges(
        &mut self,
        edges: &'g [GraphEdge],
        config: &FactoryConfig,
    ) -> Result<Vec<(&'g str, &'g str)>, BuildError> {
        let mut dependencies = Vec::with_capacity(edges.len());
        for edge in edges {
            let source = self.endpoint(edge, &edge.source, &edge.target)?;
            let target = self.endpoint(edge, &edge.target, &edge.target)?;

            match (&source.data, &target.data) {
                (Metadata::Operator(_), Metadata::Operator(_)) => {
                    let link = self.links.len();
                    self.links.push(OperatorLink {
                        edge_id: edge.id.clone(),
                        source: source.id.clone(),
                        source_order: edge.source_order,
                        target: target.id.clone(),
                        target_order: edge.target_order,
                    });
                    self.downstream.entry(source.id.as_str()).or_default().push(link);
                    self.upstream.entry(target.id.as_str()).or_default().push(link);
                }
                (Metadata::Resource(resource), _) => {
                    self.bind_resource(edge, source, resource, target, config)?;
                }
                (Metadata::Operator(_), Metadata::Resource(_)) => {
                    return Err(invalid_connection(
                        edge,
                        target,
                        format!("operator '{}' cannot feed a resource", source.id),
                    ));
                }
            }
            dependencies.push((source.id.as_str(), target.id.as_str()));
        }
        Ok(dependencies)
    }

    fn endpoint(
        &self,
        edge: &GraphEdge,
        id: &str,
        target_id: &str,
    ) -> Result<&'g GraphNode, BuildError> {
        self.nodes
            .get(id)
            .copied()
            .ok_or_else(|| BuildError::InvalidConnection {
                stage: BuildStage::Binding,
                edge_id: edge.id.clone(),
                node_id: target_id.to_string(),
                reason: format!("edge references unknown node '{id}'"),
            })
    }

    fn bind_resource(
        &mut self,
        edge: &GraphEdge,
        source: &'g GraphNode,
        resource: &'g ResourceMetadata,
        target: &'g GraphNode,
        config: &FactoryConfig,
    ) -> Result<(), BuildError> {
        let param = target
            .data
            .parameters()
            .get(edge.target_order)
            .ok_or_else(|| {
                invalid_connection(
                    edge,
                    target,
                    format!("no parameter at position {}", edge.target_order),
                )
            })?;

        if !param.is_resource() {
            return Err(invalid_connection(
                edge,
                target,
                format!("parameter '{}' does not take a resource", param.name),
            ));
        }
        if param.resource_kind == ResourceKind::Instance
            && resource.resource_kind == ResourceKind::Class
        {
            return Err(invalid_connection(
                edge,
                target,
                format!(
                    "parameter '{}' needs an instance but '{}' is a class-kind resource",
                    param.name, source.id
                ),
            ));
        }
        if config.check_resource_types && !resource.provides(&param.type_identifier) {
            return Err(invalid_connection(
                edge,
                target,
                format!(
                    "parameter '{}' expects {} but '{}' provides {}",
                    param.name, param.type_identifier, source.id, resource.type_identifier
                ),
            ));
        }

        let slot = self
            .bindings
            .entry(target.id.as_str())
            .or_default()
            .entry(param.name.as_str())
            .or_default();
        if !param.is_list {
            if let Some(existing) = slot.first() {
                return Err(invalid_connection(
                    edge,
                    target,
                    format!(
                        "parameter '{}' is already bound to '{}'",
                        param.name, existing.source
                    ),
                ));
            }
        }
        slot.push(ResourceBinding {
            edge_id: edge.id.clone(),
            source: source.id.clone(),
        });
        Ok(())
    }

    /// Node ids, dependencies first
    pub fn order(&self) -> &[&'g str] {
        &self.order
    }

    pub fn node(&self, id: &str) -> Option<&'g GraphNode> {
        self.nodes.get(id).copied()
    }

    /// Operator nodes in declaration order
    pub fn operators(&self) -> &[&'g GraphNode] {
        &self.operators
    }

    /// Resource nodes in dependency order
    pub fn ordered_resources(&self) -> impl Iterator<Item = &'g GraphNode> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id).copied())
            .filter(|node| node.kind() == NodeKind::Resource)
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn links(&self) -> &[OperatorLink] {
        &self.links
    }

    pub fn downstream(&self, id: &str) -> impl Iterator<Item = &OperatorLink> {
        link_refs(&self.links, self.downstream.get(id))
    }

    pub fn upstream(&self, id: &str) -> impl Iterator<Item = &OperatorLink> {
        link_refs(&self.links, self.upstream.get(id))
    }

    /// Resources bound to `parameter` of node `id`, in edge order
    pub fn bindings(&self, id: &str, parameter: &str) -> &[ResourceBinding] {
        self.bindings
            .get(id)
            .and_then(|params| params.get(parameter))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn link_refs<'s>(
    links: &'s [OperatorLink],
    indices: Option<&'s Vec<usize>>,
) -> impl Iterator<Item = &'s OperatorLink> + 's {
    indices.into_iter().flatten().filter_map(move |&i| links.get(i))
}

fn invalid_connection(edge: &GraphEdge, target: &GraphNode, reason: String) -> BuildError {
    BuildError::InvalidConnection {
        stage: BuildStage::Binding,
        edge_id: edge.id.clone(),
        node_id: target.id.clone(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipecore::{OperatorKind, OperatorMetadata, Parameter};

    fn op(id: &str) -> GraphNode {
        GraphNode::operator(
            id,
            OperatorMetadata::new(id, "common", format!("test.{id}"), OperatorKind::Map)
                .with_parameter(Parameter::common("n", "int").with_default(1i64))
                .with_parameter(Parameter::resource("client", "test.Client"))
                .with_parameter(Parameter::resource("tools", "test.Tool").list().nullable()),
        )
    }

    fn res(id: &str, ty: &str) -> GraphNode {
        GraphNode::resource(id, ResourceMetadata::new(id, "common", ty))
    }

    #[test]
    fn operator_links_feed_both_adjacency_maps() {
        let mut graph = FlowGraph::new();
        graph.add_node(op("a"));
        graph.add_node(op("b"));
        graph.connect("a", 0, "b", 1);

        let plan = BuildPlan::new(&graph, &FactoryConfig::default()).unwrap();
        let down: Vec<_> = plan.downstream("a").collect();
        assert_eq!(down.len(), 1);
        assert_eq!((down[0].target.as_str(), down[0].target_order), ("b", 1));
        assert_eq!(plan.upstream("b").count(), 1);
        assert_eq!(plan.upstream("a").count(), 0);
        assert_eq!(plan.order(), ["a", "b"]);
    }

    #[test]
    fn list_parameters_accept_several_resources() {
        let mut graph = FlowGraph::new();
        graph.add_node(op("a"));
        graph.add_node(res("t1", "test.Tool"));
        graph.add_node(res("t2", "test.Tool"));
        graph.connect("t1", 0, "a", 2);
        graph.connect("t2", 0, "a", 2);

        let plan = BuildPlan::new(&graph, &FactoryConfig::default()).unwrap();
        let bound: Vec<&str> = plan.bindings("a", "tools").iter().map(|b| b.source.as_str()).collect();
        assert_eq!(bound, ["t1", "t2"]);
        assert_eq!(plan.order().last(), Some(&"a"));
    }

    #[test]
    fn scalar_resource_parameter_binds_once() {
        let mut graph = FlowGraph::new();
        graph.add_node(op("a"));
        graph.add_node(res("c1", "test.Client"));
        graph.add_node(res("c2", "test.Client"));
        graph.connect("c1", 0, "a", 1);
        graph.connect("c2", 0, "a", 1);

        let err = BuildPlan::new(&graph, &FactoryConfig::default()).unwrap_err();
        assert!(matches!(err, BuildError::InvalidConnection { .. }), "{err}");
    }

    #[test]
    fn unknown_endpoint_is_an_invalid_connection() {
        let mut graph = FlowGraph::new();
        graph.add_node(op("a"));
        graph.connect("ghost", 0, "a", 0);

        let err = BuildPlan::new(&graph, &FactoryConfig::default()).unwrap_err();
        assert!(err.to_string().contains("unknown node 'ghost'"), "{err}");
    }

    #[test]
    fn resource_types_are_checked_when_enabled() {
        let mut graph = FlowGraph::new();
        graph.add_node(op("a"));
        graph.add_node(res("c", "test.NotAClient"));
        graph.connect("c", 0, "a", 1);

        assert!(BuildPlan::new(&graph, &FactoryConfig::default()).is_ok());

        let strict = FactoryConfig {
            check_resource_types: true,
            ..FactoryConfig::default()
        };
        let err = BuildPlan::new(&graph, &strict).unwrap_err();
        assert!(err.to_string().contains("expects test.Client"), "{err}");

        let mut graph = FlowGraph::new();
        graph.add_node(op("a"));
        graph.add_node(GraphNode::resource(
            "c",
            ResourceMetadata::new("c", "common", "test.OpenClient").with_ancestor("test.Client"),
        ));
        graph.connect("c", 0, "a", 1);
        assert!(BuildPlan::new(&graph, &strict).is_ok());
    }

    #[test]
    fn class_resource_cannot_fill_an_instance_parameter() {
        let mut graph = FlowGraph::new();
        graph.add_node(op("a"));
        graph.add_node(GraphNode::resource(
            "cls",
            ResourceMetadata::new("cls", "common", "test.Client").class_kind(),
        ));
        graph.connect("cls", 0, "a", 1);

        let err = BuildPlan::new(&graph, &FactoryConfig::default()).unwrap_err();
        assert!(err.to_string().contains("class-kind"), "{err}");
    }
}

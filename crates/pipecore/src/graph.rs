use crate::{Handle, Metadata, MetadataError, NodeKind, OperatorMetadata, ResourceMetadata, Value};
use serde::{Deserialize, Serialize};

/// Declarative node/edge graph a flow is authored as
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: GraphNode) -> String {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Adds an edge, deriving its id from the endpoints
    pub fn connect(
        &mut self,
        source: impl Into<String>,
        source_order: usize,
        target: impl Into<String>,
        target_order: usize,
    ) {
        self.edges
            .push(GraphEdge::new(source, source_order, target, target_order));
    }

    pub fn find_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Position in the visual editor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One operator or resource occurrence in a flow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub position: Position,
    /// Node kind and metadata; `{"type": ..., "data": ...}` on the wire
    #[serde(flatten)]
    pub data: Metadata,
}

impl GraphNode {
    pub fn operator(id: impl Into<String>, metadata: OperatorMetadata) -> Self {
        Self {
            id: id.into(),
            position: Position::default(),
            data: Metadata::Operator(metadata),
        }
    }

    pub fn resource(id: impl Into<String>, metadata: ResourceMetadata) -> Self {
        Self {
            id: id.into(),
            position: Position::default(),
            data: Metadata::Resource(metadata),
        }
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    /// Sets the literal value of a declared parameter on this node's copy of
    /// the metadata. Unknown parameter names are ignored.
    pub fn with_value(mut self, parameter: &str, value: impl Into<Value>) -> Self {
        let params = self.data.parameters_mut();
        if let Some(param) = params.iter_mut().find(|p| p.name == parameter) {
            param.value = Some(value.into());
        }
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    /// Literal value carried for `parameter`, if any
    pub fn value_of(&self, parameter: &str) -> Option<&Value> {
        self.data
            .parameters()
            .iter()
            .find(|p| p.name == parameter)
            .and_then(|p| p.value.as_ref())
    }
}

/// Wiring between two nodes.
///
/// `source_order` selects one of the source's outputs and `target_order` one
/// of the target's inputs, or, for edges leaving a resource, one of the
/// target's declared parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEdge")]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub source_order: usize,
    pub target: String,
    pub target_order: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

#[derive(Deserialize)]
struct RawEdge {
    id: Option<String>,
    source: String,
    source_order: Option<usize>,
    source_handle: Option<String>,
    target: String,
    target_order: Option<usize>,
    target_handle: Option<String>,
}

fn edge_order(order: Option<usize>, handle: Option<&str>) -> Result<usize, MetadataError> {
    match (order, handle) {
        (Some(order), _) => Ok(order),
        (None, Some(handle)) => Ok(handle.parse::<Handle>()?.index),
        (None, None) => Ok(0),
    }
}

impl TryFrom<RawEdge> for GraphEdge {
    type Error = MetadataError;

    fn try_from(raw: RawEdge) -> Result<Self, Self::Error> {
        let source_order = edge_order(raw.source_order, raw.source_handle.as_deref())?;
        let target_order = edge_order(raw.target_order, raw.target_handle.as_deref())?;
        let id = raw.id.unwrap_or_else(|| {
            edge_id(&raw.source, source_order, &raw.target, target_order)
        });
        Ok(GraphEdge {
            id,
            source: raw.source,
            source_order,
            target: raw.target,
            target_order,
            source_handle: raw.source_handle,
            target_handle: raw.target_handle,
        })
    }
}

fn edge_id(source: &str, source_order: usize, target: &str, target_order: usize) -> String {
    format!("{source}|{source_order}-{target}|{target_order}")
}

impl GraphEdge {
    pub fn new(
        source: impl Into<String>,
        source_order: usize,
        target: impl Into<String>,
        target_order: usize,
    ) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: edge_id(&source, source_order, &target, target_order),
            source,
            source_order,
            target,
            target_order,
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

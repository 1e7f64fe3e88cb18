use std::fmt;
use thiserror::Error;

/// Build phase an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStage {
    Partition,
    Binding,
    Ordering,
    ResourceInstantiation,
    OperatorInstantiation,
    Preload,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Partition => "partition",
            BuildStage::Binding => "binding",
            BuildStage::Ordering => "ordering",
            BuildStage::ResourceInstantiation => "resource instantiation",
            BuildStage::OperatorInstantiation => "operator instantiation",
            BuildStage::Preload => "preload",
        };
        f.write_str(name)
    }
}

/// Root of every failure `FlowFactory::build` can return.
///
/// A build never yields a partial graph: the first error aborts it and
/// drops every instance created so far.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Duplicate node id: {node_id}")]
    DuplicateNodeId { node_id: String },

    #[error("Invalid connection on edge '{edge_id}' into node '{node_id}': {reason}")]
    InvalidConnection {
        stage: BuildStage,
        edge_id: String,
        node_id: String,
        reason: String,
    },

    #[error("Cycle detected among nodes: {}", nodes.join(", "))]
    CycleDetected { nodes: Vec<String> },

    #[error("Node '{node_id}' ({flow_key}) is missing required parameter '{parameter}'")]
    MissingRequiredParameter {
        stage: BuildStage,
        node_id: String,
        flow_key: String,
        parameter: String,
    },

    #[error(
        "Branch operator '{node_id}' declares {expected} parameters but has {actual} downstream operators"
    )]
    BranchArityMismatch {
        node_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Flow key not registered: {flow_key} (node '{node_id}')")]
    FlowKeyNotFound {
        stage: BuildStage,
        node_id: String,
        flow_key: String,
    },

    #[error("Unknown type '{type_identifier}' (node '{node_id}')")]
    UnknownType {
        stage: BuildStage,
        node_id: String,
        type_identifier: String,
    },

    #[error("Cannot resolve type '{type_identifier}' for node '{node_id}': {reason}")]
    ClassResolution {
        node_id: String,
        type_identifier: String,
        reason: String,
    },

    #[error("Failed to instantiate resource '{node_id}' ({flow_key}): {source}")]
    ResourceInstantiation {
        node_id: String,
        flow_key: String,
        #[source]
        source: ConstructError,
    },

    #[error("Failed to instantiate operator '{node_id}' ({flow_key}): {source}")]
    OperatorInstantiation {
        node_id: String,
        flow_key: String,
        #[source]
        source: ConstructError,
    },

    #[error("Invalid metadata on node '{node_id}': {source}")]
    InvalidMetadata {
        stage: BuildStage,
        node_id: String,
        #[source]
        source: MetadataError,
    },
}

impl BuildError {
    pub fn stage(&self) -> BuildStage {
        match self {
            BuildError::DuplicateNodeId { .. } => BuildStage::Partition,
            BuildError::CycleDetected { .. } => BuildStage::Ordering,
            BuildError::BranchArityMismatch { .. } => BuildStage::OperatorInstantiation,
            BuildError::ClassResolution { .. } => BuildStage::Preload,
            BuildError::ResourceInstantiation { .. } => BuildStage::ResourceInstantiation,
            BuildError::OperatorInstantiation { .. } => BuildStage::OperatorInstantiation,
            BuildError::InvalidConnection { stage, .. }
            | BuildError::MissingRequiredParameter { stage, .. }
            | BuildError::FlowKeyNotFound { stage, .. }
            | BuildError::UnknownType { stage, .. }
            | BuildError::InvalidMetadata { stage, .. } => *stage,
        }
    }

    /// Node the error is attributed to, if it concerns a single node
    pub fn node_id(&self) -> Option<&str> {
        match self {
            BuildError::CycleDetected { .. } => None,
            BuildError::DuplicateNodeId { node_id }
            | BuildError::InvalidConnection { node_id, .. }
            | BuildError::MissingRequiredParameter { node_id, .. }
            | BuildError::BranchArityMismatch { node_id, .. }
            | BuildError::FlowKeyNotFound { node_id, .. }
            | BuildError::UnknownType { node_id, .. }
            | BuildError::ClassResolution { node_id, .. }
            | BuildError::ResourceInstantiation { node_id, .. }
            | BuildError::OperatorInstantiation { node_id, .. }
            | BuildError::InvalidMetadata { node_id, .. } => Some(node_id),
        }
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Type '{type_identifier}' is already registered to {existing}, refusing {attempted}")]
    DuplicateType {
        type_identifier: String,
        existing: String,
        attempted: String,
    },

    #[error("Flow key '{flow_key}' is already registered with different content")]
    DuplicateFlowKey { flow_key: String },

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Flow key not found: {0}")]
    FlowKeyNotFound(String),

    #[error("Invalid metadata for '{flow_key}': {source}")]
    InvalidMetadata {
        flow_key: String,
        #[source]
        source: MetadataError,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetadataError {
    #[error("Class-kind resource '{0}' cannot declare construction parameters")]
    ClassResourceWithParameters(String),

    #[error("Required parameter '{0}' cannot carry a default value")]
    RequiredParameterWithDefault(String),

    #[error("Parameter '{0}' is declared more than once")]
    DuplicateParameter(String),

    #[error("Parameter '{parameter}' expects {expected}, got {actual}")]
    InvalidLiteral {
        parameter: String,
        expected: String,
        actual: String,
    },

    #[error("Malformed flow key: {0}")]
    InvalidFlowKey(String),

    #[error("Malformed handle: {0}")]
    InvalidHandle(String),

    #[error("Malformed node id: {0}")]
    InvalidNodeId(String),
}

/// Failure reported by an operator or resource constructor
#[derive(Error, Debug, Clone)]
pub enum ConstructError {
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("Invalid argument type for '{name}': expected {expected}, got {actual}")]
    InvalidArgument {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
}

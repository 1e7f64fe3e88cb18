//! Core types for declarative flow graphs
//!
//! This crate holds everything the registry and the builder share: the
//! metadata model, structured keys, the node/edge wire types, the
//! construction traits implementations plug into, the lifecycle of stored
//! flow documents and the error taxonomy. It builds nothing by itself.

mod error;
mod graph;
mod key;
mod lifecycle;
mod metadata;
mod operator;
mod value;

pub use error::{BuildError, BuildStage, ConstructError, MetadataError, RegistryError};
pub use graph::{FlowGraph, GraphEdge, GraphNode, Position};
pub use key::{FlowKey, Handle, NodeIdentity, NodeKind, TypeIdentifier, FLOW_KEY_SEPARATOR};
pub use lifecycle::{
    is_version_compatible, FlowCategory, FlowDocument, FlowState, Transition, FLOW_FORMAT_VERSION,
};
pub use metadata::{
    category_label, IOField, Metadata, OperatorKind, OperatorMetadata, OptionValue, Parameter,
    ParameterCategory, ResourceKind, ResourceMetadata, CHAT_REQUEST_TYPE, CHAT_RESPONSE_TYPE,
    CHAT_STREAM_TYPE, DEFAULT_VERSION,
};
pub use operator::{
    Argument, Arguments, Operator, OperatorFactory, ResourceClass, ResourceFactory, ResourceObject,
};
pub use value::Value;

/// Result type for flow graph builds
pub type Result<T> = std::result::Result<T, BuildError>;

//! Structured identifiers: type identifiers, flow keys, graph node ids and
//! edge handles, each with a `Display` / `FromStr` pair.

use crate::MetadataError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Token joining the parts of an operator flow key
pub const FLOW_KEY_SEPARATOR: &str = "___$$___";

/// Globally unique name of a runtime type, e.g. `pipeops.resources.ModelConfig`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeIdentifier(String);

impl TypeIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeIdentifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TypeIdentifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for TypeIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kind of a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Operator,
    Resource,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Operator => "operator",
            NodeKind::Resource => "resource",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key an implementation is registered under.
///
/// Operators are keyed by `name`, `category` and `version`; resources by
/// their type identifier. None of the operator parts may contain
/// [`FLOW_KEY_SEPARATOR`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum FlowKey {
    Operator {
        name: String,
        category: String,
        version: String,
    },
    Resource(TypeIdentifier),
}

impl FlowKey {
    pub fn operator(
        name: impl Into<String>,
        category: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        FlowKey::Operator {
            name: name.into(),
            category: category.into(),
            version: version.into(),
        }
    }

    pub fn resource(type_identifier: impl Into<TypeIdentifier>) -> Self {
        FlowKey::Resource(type_identifier.into())
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            FlowKey::Operator { .. } => NodeKind::Operator,
            FlowKey::Resource(_) => NodeKind::Resource,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKey::Operator {
                name,
                category,
                version,
            } => write!(
                f,
                "{name}{FLOW_KEY_SEPARATOR}{category}{FLOW_KEY_SEPARATOR}{version}"
            ),
            FlowKey::Resource(id) => f.write_str(id.as_str()),
        }
    }
}

impl FromStr for FlowKey {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(FLOW_KEY_SEPARATOR).collect();
        match parts.as_slice() {
            [id] if !id.is_empty() => Ok(FlowKey::resource(*id)),
            [name, category, version]
                if !name.is_empty() && !category.is_empty() && !version.is_empty() =>
            {
                Ok(FlowKey::operator(*name, *category, *version))
            }
            _ => Err(MetadataError::InvalidFlowKey(s.to_string())),
        }
    }
}

impl From<FlowKey> for String {
    fn from(key: FlowKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for FlowKey {
    type Error = MetadataError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Conventional graph node id: `<kind>_<flow key>_<index>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeIdentity {
    pub kind: NodeKind,
    pub flow_key: FlowKey,
    pub index: usize,
}

impl NodeIdentity {
    pub fn new(flow_key: FlowKey, index: usize) -> Self {
        Self {
            kind: flow_key.kind(),
            flow_key,
            index,
        }
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.kind, self.flow_key, self.index)
    }
}

impl FromStr for NodeIdentity {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MetadataError::InvalidNodeId(s.to_string());
        let (kind, rest) = if let Some(rest) = s.strip_prefix("operator_") {
            (NodeKind::Operator, rest)
        } else if let Some(rest) = s.strip_prefix("resource_") {
            (NodeKind::Resource, rest)
        } else {
            return Err(invalid());
        };
        let (key, index) = rest.rsplit_once('_').ok_or_else(invalid)?;
        let index = index.parse().map_err(|_| invalid())?;
        let flow_key: FlowKey = key.parse().map_err(|_| invalid())?;
        if flow_key.kind() != kind {
            return Err(invalid());
        }
        Ok(Self {
            kind,
            flow_key,
            index,
        })
    }
}

/// Compound edge handle `"<anything>|<index>"`; the index selects one of a
/// node's outputs or parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    pub prefix: String,
    pub index: usize,
}

impl Handle {
    pub fn new(prefix: impl Into<String>, index: usize) -> Self {
        Self {
            prefix: prefix.into(),
            index,
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.prefix, self.index)
    }
}

impl FromStr for Handle {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, index) = s
            .rsplit_once('|')
            .ok_or_else(|| MetadataError::InvalidHandle(s.to_string()))?;
        let index = index
            .trim()
            .parse()
            .map_err(|_| MetadataError::InvalidHandle(s.to_string()))?;
        Ok(Handle::new(prefix, index))
    }
}

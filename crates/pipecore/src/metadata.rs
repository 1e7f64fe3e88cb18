//! Declarative description of operators and resources.
//!
//! Metadata values deserialize from the wire form through raw intermediate
//! structs so that missing labels, versions and type names are filled in and
//! the structural rules are checked before a value exists. Values built in
//! code go through the `with_*` builders and are checked by [`Metadata::validate`]
//! when they are registered.

use crate::{FlowKey, MetadataError, TypeIdentifier, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Type identifier of the request payload chat flows start from
pub const CHAT_REQUEST_TYPE: &str = "pipecore.chat.ChatRequest";
/// Type identifier of a complete chat answer
pub const CHAT_RESPONSE_TYPE: &str = "pipecore.chat.ChatResponse";
/// Type identifier of a streamed chat answer
pub const CHAT_STREAM_TYPE: &str = "pipecore.chat.ChatStream";

pub const DEFAULT_VERSION: &str = "v1";

const KNOWN_CATEGORIES: &[(&str, &str)] = &[
    ("trigger", "Trigger"),
    ("sender", "Sender"),
    ("llm", "LLM"),
    ("conversion", "Conversion"),
    ("output", "Output Parser"),
    ("common", "Common"),
    ("agent", "Agent"),
    ("rag", "RAG"),
    ("prompt", "Prompt"),
    ("embeddings", "Embeddings"),
    ("vector_store", "Vector Store"),
    ("knowledge", "Knowledge"),
    ("database", "Database"),
    ("storage", "Storage"),
    ("http_body", "HTTP Body"),
    ("example", "Example"),
    ("experimental", "Experimental"),
];

/// Display label for a category; unknown categories are title-cased
pub fn category_label(category: &str) -> String {
    if let Some((_, label)) = KNOWN_CATEGORIES.iter().find(|(name, _)| *name == category) {
        return label.to_string();
    }
    category
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterCategory {
    /// Plain value: string, number, bool or a collection of them
    #[default]
    Common,
    /// Satisfied by another resource node
    Resource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A constructed instance is needed
    #[default]
    Instance,
    /// Only the type itself is needed
    Class,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Map,
    Reduce,
    Join,
    Branch,
    Input,
    Streamify,
    UnStreamify,
    TransformStream,
}

/// One choice a UI may offer for a parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionValue {
    pub label: String,
    pub name: String,
    pub value: Value,
}

/// One constructor argument of an operator or resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParameter")]
pub struct Parameter {
    pub name: String,
    pub label: String,
    pub description: Option<String>,
    pub type_name: String,
    pub type_identifier: TypeIdentifier,
    pub category: ParameterCategory,
    pub is_list: bool,
    pub optional: bool,
    pub default: Option<Value>,
    pub resource_kind: ResourceKind,
    pub options: Vec<OptionValue>,
    /// Literal override carried by one graph node
    pub value: Option<Value>,
}

#[derive(Deserialize)]
struct RawParameter {
    name: String,
    label: Option<String>,
    description: Option<String>,
    type_name: Option<String>,
    type_identifier: Option<TypeIdentifier>,
    #[serde(default)]
    category: ParameterCategory,
    #[serde(default)]
    is_list: bool,
    #[serde(default)]
    optional: bool,
    default: Option<Value>,
    #[serde(default)]
    resource_kind: ResourceKind,
    #[serde(default)]
    options: Vec<OptionValue>,
    value: Option<Value>,
}

impl TryFrom<RawParameter> for Parameter {
    type Error = MetadataError;

    fn try_from(raw: RawParameter) -> Result<Self, Self::Error> {
        let (type_name, type_identifier) = match (raw.type_name, raw.type_identifier) {
            (Some(name), Some(id)) => (name, id),
            (Some(name), None) => {
                let id = TypeIdentifier::new(name.clone());
                (name, id)
            }
            (None, Some(id)) => (short_type_name(&id), id),
            (None, None) => ("str".to_string(), TypeIdentifier::new("str")),
        };
        let param = Parameter {
            label: raw.label.unwrap_or_else(|| raw.name.clone()),
            name: raw.name,
            description: raw.description,
            type_name,
            type_identifier,
            category: raw.category,
            is_list: raw.is_list,
            optional: raw.optional,
            default: raw.default,
            resource_kind: raw.resource_kind,
            options: raw.options,
            value: raw.value,
        };
        param.validate()?;
        Ok(param)
    }
}

impl Parameter {
    /// Plain-valued parameter of the given type name (`str`, `int`, `float`, `bool`, ...)
    pub fn common(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let name = name.into();
        let type_name = type_name.into();
        Self {
            label: name.clone(),
            name,
            description: None,
            type_identifier: TypeIdentifier::new(type_name.clone()),
            type_name,
            category: ParameterCategory::Common,
            is_list: false,
            optional: false,
            default: None,
            resource_kind: ResourceKind::Instance,
            options: Vec::new(),
            value: None,
        }
    }

    /// Parameter satisfied by a resource node of the given type
    pub fn resource(name: impl Into<String>, type_identifier: impl Into<TypeIdentifier>) -> Self {
        let type_identifier = type_identifier.into();
        let mut param = Self::common(name, short_type_name(&type_identifier));
        param.type_identifier = type_identifier;
        param.category = ParameterCategory::Resource;
        param
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Makes the parameter optional with the given default
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.optional = true;
        self.default = Some(default.into());
        self
    }

    /// Makes the parameter optional without a default
    pub fn nullable(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn list(mut self) -> Self {
        self.is_list = true;
        self
    }

    pub fn class_kind(mut self) -> Self {
        self.resource_kind = ResourceKind::Class;
        self
    }

    pub fn with_option(mut self, label: impl Into<String>, value: impl Into<Value>) -> Self {
        let label = label.into();
        self.options.push(OptionValue {
            name: label.clone(),
            label,
            value: value.into(),
        });
        self
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn is_resource(&self) -> bool {
        self.category == ParameterCategory::Resource
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        if !self.optional && self.default.is_some() {
            return Err(MetadataError::RequiredParameterWithDefault(self.name.clone()));
        }
        Ok(())
    }

    /// Converts a literal to the declared `type_name`.
    ///
    /// Unknown type names pass the value through untouched, as does `null`.
    pub fn to_runtime_value(&self, value: &Value) -> Result<Value, MetadataError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Array(items) if self.is_list => items
                .iter()
                .map(|item| self.coerce_scalar(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => self.coerce_scalar(other),
        }
    }

    fn coerce_scalar(&self, value: &Value) -> Result<Value, MetadataError> {
        let mismatch = |expected: &str| MetadataError::InvalidLiteral {
            parameter: self.name.clone(),
            expected: expected.to_string(),
            actual: value.kind().to_string(),
        };
        match self.type_name.to_ascii_lowercase().as_str() {
            "str" | "string" => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Int(n) => Ok(Value::String(n.to_string())),
                Value::Float(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err(mismatch("str")),
            },
            "int" | "integer" => match value {
                Value::Int(_) => Ok(value.clone()),
                Value::Float(n) if n.fract() == 0.0 && in_i64_range(*n) => {
                    Ok(Value::Int(*n as i64))
                }
                Value::String(s) => s.trim().parse().map(Value::Int).map_err(|_| mismatch("int")),
                _ => Err(mismatch("int")),
            },
            "float" | "number" => match value {
                Value::Float(_) => Ok(value.clone()),
                Value::Int(n) => Ok(Value::Float(*n as f64)),
                Value::String(s) => s.trim().parse().map(Value::Float).map_err(|_| mismatch("float")),
                _ => Err(mismatch("float")),
            },
            "bool" | "boolean" => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::Int(0) => Ok(Value::Bool(false)),
                Value::Int(1) => Ok(Value::Bool(true)),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => Ok(Value::Bool(true)),
                    "false" | "0" | "no" => Ok(Value::Bool(false)),
                    _ => Err(mismatch("bool")),
                },
                _ => Err(mismatch("bool")),
            },
            _ => Ok(value.clone()),
        }
    }
}

/// One operator input or output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IOField {
    pub name: String,
    #[serde(default)]
    pub label: String,
    pub type_name: String,
    pub type_identifier: TypeIdentifier,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_list: bool,
}

impl IOField {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        type_identifier: impl Into<TypeIdentifier>,
    ) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            type_name: type_name.into(),
            type_identifier: type_identifier.into(),
            description: None,
            is_list: false,
        }
    }

    pub fn list(mut self) -> Self {
        self.is_list = true;
        self
    }
}

fn check_parameters(params: &[Parameter]) -> Result<(), MetadataError> {
    let mut seen = HashSet::new();
    for param in params {
        param.validate()?;
        if !seen.insert(param.name.as_str()) {
            return Err(MetadataError::DuplicateParameter(param.name.clone()));
        }
    }
    Ok(())
}

/// Whole floats at or beyond 2^63 would saturate when cast
fn in_i64_range(n: f64) -> bool {
    (i64::MIN as f64..i64::MAX as f64).contains(&n)
}

fn short_type_name(id: &TypeIdentifier) -> String {
    id.as_str()
        .rsplit(['.', ':'])
        .next()
        .unwrap_or(id.as_str())
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOperatorMetadata")]
pub struct OperatorMetadata {
    pub label: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub category_label: String,
    pub version: String,
    pub type_name: String,
    pub type_identifier: TypeIdentifier,
    pub operator_kind: OperatorKind,
    pub inputs: Vec<IOField>,
    pub outputs: Vec<IOField>,
    pub parameters: Vec<Parameter>,
}

#[derive(Deserialize)]
struct RawOperatorMetadata {
    label: Option<String>,
    name: String,
    #[serde(default)]
    description: String,
    category: String,
    category_label: Option<String>,
    version: Option<String>,
    type_name: Option<String>,
    type_identifier: TypeIdentifier,
    operator_kind: OperatorKind,
    #[serde(default)]
    inputs: Vec<IOField>,
    #[serde(default)]
    outputs: Vec<IOField>,
    #[serde(default)]
    parameters: Vec<Parameter>,
}

impl TryFrom<RawOperatorMetadata> for OperatorMetadata {
    type Error = MetadataError;

    fn try_from(raw: RawOperatorMetadata) -> Result<Self, Self::Error> {
        let meta = OperatorMetadata {
            label: raw.label.unwrap_or_else(|| raw.name.clone()),
            category_label: raw
                .category_label
                .unwrap_or_else(|| category_label(&raw.category)),
            type_name: raw
                .type_name
                .unwrap_or_else(|| short_type_name(&raw.type_identifier)),
            version: raw.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            name: raw.name,
            description: raw.description,
            category: raw.category,
            type_identifier: raw.type_identifier,
            operator_kind: raw.operator_kind,
            inputs: raw.inputs,
            outputs: raw.outputs,
            parameters: raw.parameters,
        };
        meta.validate()?;
        Ok(meta)
    }
}

impl OperatorMetadata {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        type_identifier: impl Into<TypeIdentifier>,
        operator_kind: OperatorKind,
    ) -> Self {
        let name = name.into();
        let category = category.into();
        let type_identifier = type_identifier.into();
        Self {
            label: name.clone(),
            name,
            description: String::new(),
            category_label: category_label(&category),
            category,
            version: DEFAULT_VERSION.to_string(),
            type_name: short_type_name(&type_identifier),
            type_identifier,
            operator_kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            parameters: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_input(mut self, field: IOField) -> Self {
        self.inputs.push(field);
        self
    }

    pub fn with_output(mut self, field: IOField) -> Self {
        self.outputs.push(field);
        self
    }

    pub fn with_parameter(mut self, param: Parameter) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn flow_key(&self) -> FlowKey {
        FlowKey::operator(&self.name, &self.category, &self.version)
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        check_parameters(&self.parameters)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResourceMetadata")]
pub struct ResourceMetadata {
    pub label: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub category_label: String,
    pub type_name: String,
    pub type_identifier: TypeIdentifier,
    pub resource_kind: ResourceKind,
    pub parameters: Vec<Parameter>,
    /// Types this resource can stand in for
    pub ancestors: Vec<TypeIdentifier>,
}

#[derive(Deserialize)]
struct RawResourceMetadata {
    label: Option<String>,
    name: String,
    #[serde(default)]
    description: String,
    category: String,
    category_label: Option<String>,
    type_name: Option<String>,
    type_identifier: TypeIdentifier,
    #[serde(default)]
    resource_kind: ResourceKind,
    #[serde(default)]
    parameters: Vec<Parameter>,
    #[serde(default)]
    ancestors: Vec<TypeIdentifier>,
}

impl TryFrom<RawResourceMetadata> for ResourceMetadata {
    type Error = MetadataError;

    fn try_from(raw: RawResourceMetadata) -> Result<Self, Self::Error> {
        let meta = ResourceMetadata {
            label: raw.label.unwrap_or_else(|| raw.name.clone()),
            category_label: raw
                .category_label
                .unwrap_or_else(|| category_label(&raw.category)),
            type_name: raw
                .type_name
                .unwrap_or_else(|| short_type_name(&raw.type_identifier)),
            name: raw.name,
            description: raw.description,
            category: raw.category,
            type_identifier: raw.type_identifier,
            resource_kind: raw.resource_kind,
            parameters: raw.parameters,
            ancestors: raw.ancestors,
        };
        meta.validate()?;
        Ok(meta)
    }
}

impl ResourceMetadata {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        type_identifier: impl Into<TypeIdentifier>,
    ) -> Self {
        let name = name.into();
        let category = category.into();
        let type_identifier = type_identifier.into();
        Self {
            label: name.clone(),
            name,
            description: String::new(),
            category_label: category_label(&category),
            category,
            type_name: short_type_name(&type_identifier),
            type_identifier,
            resource_kind: ResourceKind::Instance,
            parameters: Vec::new(),
            ancestors: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameter(mut self, param: Parameter) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn with_ancestor(mut self, ancestor: impl Into<TypeIdentifier>) -> Self {
        self.ancestors.push(ancestor.into());
        self
    }

    pub fn class_kind(mut self) -> Self {
        self.resource_kind = ResourceKind::Class;
        self
    }

    pub fn flow_key(&self) -> FlowKey {
        FlowKey::Resource(self.type_identifier.clone())
    }

    /// Whether this resource may satisfy a parameter declared with `wanted`
    pub fn provides(&self, wanted: &TypeIdentifier) -> bool {
        &self.type_identifier == wanted || self.ancestors.contains(wanted)
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.resource_kind == ResourceKind::Class && !self.parameters.is_empty() {
            return Err(MetadataError::ClassResourceWithParameters(self.name.clone()));
        }
        check_parameters(&self.parameters)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Metadata {
    Operator(OperatorMetadata),
    Resource(ResourceMetadata),
}

impl Metadata {
    pub fn flow_key(&self) -> FlowKey {
        match self {
            Metadata::Operator(meta) => meta.flow_key(),
            Metadata::Resource(meta) => meta.flow_key(),
        }
    }

    pub fn kind(&self) -> crate::NodeKind {
        match self {
            Metadata::Operator(_) => crate::NodeKind::Operator,
            Metadata::Resource(_) => crate::NodeKind::Resource,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Metadata::Operator(meta) => &meta.name,
            Metadata::Resource(meta) => &meta.name,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Metadata::Operator(meta) => &meta.label,
            Metadata::Resource(meta) => &meta.label,
        }
    }

    pub fn category_label(&self) -> &str {
        match self {
            Metadata::Operator(meta) => &meta.category_label,
            Metadata::Resource(meta) => &meta.category_label,
        }
    }

    pub fn type_identifier(&self) -> &TypeIdentifier {
        match self {
            Metadata::Operator(meta) => &meta.type_identifier,
            Metadata::Resource(meta) => &meta.type_identifier,
        }
    }

    pub fn parameters(&self) -> &[Parameter] {
        match self {
            Metadata::Operator(meta) => &meta.parameters,
            Metadata::Resource(meta) => &meta.parameters,
        }
    }

    pub fn parameters_mut(&mut self) -> &mut Vec<Parameter> {
        match self {
            Metadata::Operator(meta) => &mut meta.parameters,
            Metadata::Resource(meta) => &mut meta.parameters,
        }
    }

    pub fn as_operator(&self) -> Option<&OperatorMetadata> {
        match self {
            Metadata::Operator(meta) => Some(meta),
            Metadata::Resource(_) => None,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceMetadata> {
        match self {
            Metadata::Resource(meta) => Some(meta),
            Metadata::Operator(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        match self {
            Metadata::Operator(meta) => meta.validate(),
            Metadata::Resource(meta) => meta.validate(),
        }
    }
}

impl From<OperatorMetadata> for Metadata {
    fn from(meta: OperatorMetadata) -> Self {
        Metadata::Operator(meta)
    }
}

impl From<ResourceMetadata> for Metadata {
    fn from(meta: ResourceMetadata) -> Self {
        Metadata::Resource(meta)
    }
}

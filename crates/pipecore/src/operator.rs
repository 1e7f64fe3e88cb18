use crate::{ConstructError, OperatorKind, OperatorMetadata, ResourceMetadata, TypeIdentifier, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A constructed resource, shared with every node that depends on it
pub type ResourceObject = Arc<dyn Any + Send + Sync>;

/// A task of the executable graph
pub trait Operator: Send + Sync + fmt::Debug {
    /// Deterministic task name, the graph node id it was built from
    fn task_name(&self) -> &str;

    fn operator_kind(&self) -> OperatorKind;

    fn as_any(&self) -> &dyn Any;
}

/// Constructs one operator implementation
pub trait OperatorFactory: Send + Sync {
    fn metadata(&self) -> OperatorMetadata;

    fn create(&self, task_name: &str, args: &Arguments) -> Result<Box<dyn Operator>, ConstructError>;
}

/// Constructs one resource implementation.
///
/// Class-kind resources are never constructed by the builder; their factory
/// is handed to dependents as a [`ResourceClass`] instead.
pub trait ResourceFactory: Send + Sync {
    fn metadata(&self) -> ResourceMetadata;

    fn create(&self, args: &Arguments) -> Result<ResourceObject, ConstructError>;
}

/// A resource type passed by itself rather than as an instance
#[derive(Clone)]
pub struct ResourceClass {
    pub type_identifier: TypeIdentifier,
    pub factory: Arc<dyn ResourceFactory>,
}

impl ResourceClass {
    pub fn instantiate(&self, args: &Arguments) -> Result<ResourceObject, ConstructError> {
        self.factory.create(args)
    }
}

impl fmt::Debug for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceClass")
            .field("type_identifier", &self.type_identifier)
            .finish_non_exhaustive()
    }
}

/// Resolved value of one declared parameter
#[derive(Clone)]
pub enum Argument {
    Literal(Value),
    Resource(ResourceObject),
    Resources(Vec<ResourceObject>),
    Class(ResourceClass),
    Classes(Vec<ResourceClass>),
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Argument::Resource(_) => f.write_str("Resource(..)"),
            Argument::Resources(items) => write!(f, "Resources({} items)", items.len()),
            Argument::Class(class) => f.debug_tuple("Class").field(&class.type_identifier).finish(),
            Argument::Classes(items) => f
                .debug_tuple("Classes")
                .field(&items.iter().map(|c| &c.type_identifier).collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// Constructor arguments in declaration order.
///
/// Optional parameters without a value or default are absent.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    entries: Vec<(String, Argument)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, arg: Argument) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = arg,
            None => self.entries.push((name, arg)),
        }
    }

    pub fn with_literal(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, Argument::Literal(value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Arguments in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Argument)> {
        self.entries.iter().map(|(n, a)| (n.as_str(), a))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn literal(&self, name: &str) -> Option<&Value> {
        match self.get(name) {
            Some(Argument::Literal(v)) => Some(v),
            _ => None,
        }
    }

    pub fn require_literal(&self, name: &str) -> Result<&Value, ConstructError> {
        match self.get(name) {
            Some(Argument::Literal(v)) => Ok(v),
            Some(other) => Err(invalid(name, "literal", other)),
            None => Err(ConstructError::MissingArgument(name.to_string())),
        }
    }

    pub fn require_str(&self, name: &str) -> Result<&str, ConstructError> {
        let value = self.require_literal(name)?;
        value.as_str().ok_or_else(|| ConstructError::InvalidArgument {
            name: name.to_string(),
            expected: "str".to_string(),
            actual: value.kind().to_string(),
        })
    }

    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.literal(name).and_then(Value::as_str).unwrap_or(default)
    }

    pub fn f64_or(&self, name: &str, default: f64) -> f64 {
        self.literal(name).and_then(Value::as_f64).unwrap_or(default)
    }

    /// Resource instance bound to `name`, downcast to its concrete type
    pub fn require_resource<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, ConstructError> {
        match self.get(name) {
            Some(Argument::Resource(obj)) => downcast::<T>(name, obj),
            Some(other) => Err(invalid(name, "resource instance", other)),
            None => Err(ConstructError::MissingArgument(name.to_string())),
        }
    }

    /// Resource instances bound to a list parameter; empty if unbound
    pub fn resources<T: Any + Send + Sync>(&self, name: &str) -> Result<Vec<Arc<T>>, ConstructError> {
        match self.get(name) {
            Some(Argument::Resources(items)) => items.iter().map(|obj| downcast::<T>(name, obj)).collect(),
            Some(Argument::Resource(obj)) => Ok(vec![downcast::<T>(name, obj)?]),
            Some(other) => Err(invalid(name, "resource list", other)),
            None => Ok(Vec::new()),
        }
    }

    pub fn class(&self, name: &str) -> Option<&ResourceClass> {
        match self.get(name) {
            Some(Argument::Class(class)) => Some(class),
            _ => None,
        }
    }
}

fn downcast<T: Any + Send + Sync>(name: &str, obj: &ResourceObject) -> Result<Arc<T>, ConstructError> {
    Arc::clone(obj)
        .downcast::<T>()
        .map_err(|_| ConstructError::InvalidArgument {
            name: name.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            actual: "another resource type".to_string(),
        })
}

fn invalid(name: &str, expected: &str, actual: &Argument) -> ConstructError {
    let actual = match actual {
        Argument::Literal(v) => v.kind(),
        Argument::Resource(_) => "resource instance",
        Argument::Resources(_) => "resource list",
        Argument::Class(_) | Argument::Classes(_) => "resource class",
    };
    ConstructError::InvalidArgument {
        name: name.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

use pipecore::{
    FlowKey, Metadata, NodeKind, OperatorFactory, RegistryError, ResourceClass, ResourceFactory,
    TypeIdentifier,
};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// The implementation a type identifier names
#[derive(Clone)]
pub struct RuntimeType {
    type_id: TypeId,
    type_name: &'static str,
    constructor: Constructor,
}

#[derive(Clone)]
pub enum Constructor {
    Operator(Arc<dyn OperatorFactory>),
    Resource(Arc<dyn ResourceFactory>),
}

impl RuntimeType {
    pub fn operator<F: OperatorFactory + 'static>(factory: F) -> Self {
        Self {
            type_id: TypeId::of::<F>(),
            type_name: std::any::type_name::<F>(),
            constructor: Constructor::Operator(Arc::new(factory)),
        }
    }

    pub fn resource<F: ResourceFactory + 'static>(factory: F) -> Self {
        Self {
            type_id: TypeId::of::<F>(),
            type_name: std::any::type_name::<F>(),
            constructor: Constructor::Resource(Arc::new(factory)),
        }
    }

    /// Rust type name of the factory, for diagnostics
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn same_type(&self, other: &RuntimeType) -> bool {
        self.type_id == other.type_id
    }

    pub fn constructor(&self) -> &Constructor {
        &self.constructor
    }

    pub fn as_operator(&self) -> Option<&Arc<dyn OperatorFactory>> {
        match &self.constructor {
            Constructor::Operator(factory) => Some(factory),
            Constructor::Resource(_) => None,
        }
    }

    pub fn as_resource(&self) -> Option<&Arc<dyn ResourceFactory>> {
        match &self.constructor {
            Constructor::Resource(factory) => Some(factory),
            Constructor::Operator(_) => None,
        }
    }

    /// The resource type as a value, for class-kind parameters
    pub fn as_class(&self, type_identifier: &TypeIdentifier) -> Option<ResourceClass> {
        self.as_resource().map(|factory| ResourceClass {
            type_identifier: type_identifier.clone(),
            factory: Arc::clone(factory),
        })
    }
}

impl fmt::Debug for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.constructor {
            Constructor::Operator(_) => "operator",
            Constructor::Resource(_) => "resource",
        };
        f.debug_struct("RuntimeType")
            .field("type_name", &self.type_name)
            .field("kind", &kind)
            .finish()
    }
}

/// What a flow key resolves to
#[derive(Debug, Clone)]
pub struct FlowEntry {
    pub runtime_type: RuntimeType,
    pub metadata: Metadata,
}

/// Write side of the registry, used once at startup
pub trait Registrar {
    /// Maps a type identifier to its implementation. Registering the same
    /// pair twice is a no-op.
    fn register(
        &mut self,
        type_identifier: TypeIdentifier,
        runtime_type: RuntimeType,
    ) -> Result<(), RegistryError>;

    /// Maps a flow key to the implementation and metadata the builder uses
    fn register_flow(
        &mut self,
        flow_key: FlowKey,
        runtime_type: RuntimeType,
        metadata: Metadata,
    ) -> Result<(), RegistryError>;

    /// Registers an operator under its type identifier and derived flow key
    fn register_operator<F>(&mut self, factory: F) -> Result<FlowKey, RegistryError>
    where
        F: OperatorFactory + 'static,
        Self: Sized,
    {
        let metadata = factory.metadata();
        let runtime_type = RuntimeType::operator(factory);
        let flow_key = metadata.flow_key();
        self.register(metadata.type_identifier.clone(), runtime_type.clone())?;
        self.register_flow(flow_key.clone(), runtime_type, Metadata::Operator(metadata))?;
        Ok(flow_key)
    }

    /// Registers a resource; its flow key is its type identifier
    fn register_resource<F>(&mut self, factory: F) -> Result<FlowKey, RegistryError>
    where
        F: ResourceFactory + 'static,
        Self: Sized,
    {
        let metadata = factory.metadata();
        let runtime_type = RuntimeType::resource(factory);
        let flow_key = metadata.flow_key();
        self.register(metadata.type_identifier.clone(), runtime_type.clone())?;
        self.register_flow(flow_key.clone(), runtime_type, Metadata::Resource(metadata))?;
        Ok(flow_key)
    }
}

/// Read side of the registry, shared by concurrent builds
pub trait Resolver: Send + Sync {
    fn resolve(&self, type_identifier: &TypeIdentifier) -> Result<&RuntimeType, RegistryError>;

    fn lookup_flow(&self, flow_key: &FlowKey) -> Result<&FlowEntry, RegistryError>;

    /// Every registered flow key, sorted by its text form
    fn flow_keys(&self) -> Vec<FlowKey>;
}

/// Append-only table of registered implementations.
///
/// Mutated only while it is exclusively owned; once wrapped in an `Arc` and
/// shared it is read without locking.
#[derive(Debug, Default)]
pub struct FlowRegistry {
    types: HashMap<TypeIdentifier, RuntimeType>,
    flows: HashMap<FlowKey, FlowEntry>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn contains(&self, flow_key: &FlowKey) -> bool {
        self.flows.contains_key(flow_key)
    }

    /// Registered metadata, operators first, each group sorted by flow key
    pub fn list_metadata(&self) -> Vec<&Metadata> {
        let mut entries: Vec<(&FlowKey, &FlowEntry)> = self.flows.iter().collect();
        entries.sort_by_key(|(key, entry)| {
            (entry.metadata.kind() != NodeKind::Operator, key.to_string())
        });
        entries.into_iter().map(|(_, entry)| &entry.metadata).collect()
    }
}

impl Registrar for FlowRegistry {
    fn register(
        &mut self,
        type_identifier: TypeIdentifier,
        runtime_type: RuntimeType,
    ) -> Result<(), RegistryError> {
        if let Some(existing) = self.types.get(&type_identifier) {
            if existing.same_type(&runtime_type) {
                return Ok(());
            }
            return Err(RegistryError::DuplicateType {
                type_identifier: type_identifier.to_string(),
                existing: existing.type_name().to_string(),
                attempted: runtime_type.type_name().to_string(),
            });
        }
        tracing::debug!("Registering type: {} -> {}", type_identifier, runtime_type.type_name());
        self.types.insert(type_identifier, runtime_type);
        Ok(())
    }

    fn register_flow(
        &mut self,
        flow_key: FlowKey,
        runtime_type: RuntimeType,
        metadata: Metadata,
    ) -> Result<(), RegistryError> {
        metadata
            .validate()
            .map_err(|source| RegistryError::InvalidMetadata {
                flow_key: flow_key.to_string(),
                source,
            })?;
        if let Some(existing) = self.flows.get(&flow_key) {
            if existing.runtime_type.same_type(&runtime_type) && existing.metadata == metadata {
                return Ok(());
            }
            return Err(RegistryError::DuplicateFlowKey {
                flow_key: flow_key.to_string(),
            });
        }
        tracing::info!("Registering {}: {}", metadata.kind(), flow_key);
        self.flows.insert(
            flow_key,
            FlowEntry {
                runtime_type,
                metadata,
            },
        );
        Ok(())
    }
}

impl Resolver for FlowRegistry {
    fn resolve(&self, type_identifier: &TypeIdentifier) -> Result<&RuntimeType, RegistryError> {
        self.types
            .get(type_identifier)
            .ok_or_else(|| RegistryError::UnknownType(type_identifier.to_string()))
    }

    fn lookup_flow(&self, flow_key: &FlowKey) -> Result<&FlowEntry, RegistryError> {
        self.flows
            .get(flow_key)
            .ok_or_else(|| RegistryError::FlowKeyNotFound(flow_key.to_string()))
    }

    fn flow_keys(&self) -> Vec<FlowKey> {
        let mut keys: Vec<FlowKey> = self.flows.keys().cloned().collect();
        keys.sort_by_cached_key(|key| key.to_string());
        keys
    }
}

static GLOBAL: OnceLock<Arc<FlowRegistry>> = OnceLock::new();

/// Populates the process-wide registry exactly once.
///
/// The first successful call runs `init` and publishes the result; later
/// calls return the published registry without running their closure.
pub fn init_global<F>(init: F) -> Result<Arc<FlowRegistry>, RegistryError>
where
    F: FnOnce(&mut FlowRegistry) -> Result<(), RegistryError>,
{
    if let Some(registry) = GLOBAL.get() {
        return Ok(Arc::clone(registry));
    }
    let mut registry = FlowRegistry::new();
    init(&mut registry)?;
    tracing::info!("Flow registry initialized with {} entries", registry.len());
    let registry = GLOBAL.get_or_init(|| Arc::new(registry));
    Ok(Arc::clone(registry))
}

/// The process-wide registry, if [`init_global`] has run
pub fn global() -> Option<Arc<FlowRegistry>> {
    GLOBAL.get().cloned()
}

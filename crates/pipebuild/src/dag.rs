use crate::binding::OperatorLink;
use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use pipecore::{FlowKey, Operator, ResourceClass, ResourceObject};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// One constructed operator
#[derive(Debug)]
pub struct Task {
    id: String,
    flow_key: FlowKey,
    operator: Box<dyn Operator>,
}

impl Task {
    pub fn new(id: impl Into<String>, flow_key: FlowKey, operator: Box<dyn Operator>) -> Self {
        Self {
            id: id.into(),
            flow_key,
            operator,
        }
    }

    /// Id of the graph node the task was built from
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn flow_key(&self) -> &FlowKey {
        &self.flow_key
    }

    pub fn operator(&self) -> &dyn Operator {
        self.operator.as_ref()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.operator.as_any().downcast_ref::<T>()
    }
}

/// Ports a dependency edge connects
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wire {
    pub source_order: usize,
    pub target_order: usize,
}

/// A resource node after instantiation. Class-kind resources carry only
/// their class.
#[derive(Clone)]
pub struct BuiltResource {
    node_id: String,
    flow_key: FlowKey,
    class: ResourceClass,
    object: Option<ResourceObject>,
}

impl BuiltResource {
    pub fn instance(
        node_id: impl Into<String>,
        flow_key: FlowKey,
        class: ResourceClass,
        object: ResourceObject,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            flow_key,
            class,
            object: Some(object),
        }
    }

    pub fn class_only(node_id: impl Into<String>, flow_key: FlowKey, class: ResourceClass) -> Self {
        Self {
            node_id: node_id.into(),
            flow_key,
            class,
            object: None,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn flow_key(&self) -> &FlowKey {
        &self.flow_key
    }

    pub fn class(&self) -> &ResourceClass {
        &self.class
    }

    pub fn object(&self) -> Option<&ResourceObject> {
        self.object.as_ref()
    }

    pub fn is_class(&self) -> bool {
        self.object.is_none()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.object.clone()?.downcast::<T>().ok()
    }
}

impl fmt::Debug for BuiltResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltResource")
            .field("node_id", &self.node_id)
            .field("flow_key", &self.flow_key)
            .field("is_class", &self.is_class())
            .finish()
    }
}

/// The runnable result of a build: operator tasks wired by their
/// dependencies, plus the resources they were built with
#[derive(Debug)]
pub struct ExecutableGraph {
    id: Uuid,
    built_at: DateTime<Utc>,
    graph: DiGraph<Task, Wire>,
    index: HashMap<String, NodeIndex>,
    resources: Vec<BuiltResource>,
}

impl ExecutableGraph {
    /// Adds every task, then wires each distinct (source, target) pair once,
    /// visiting links by (source_order, target_order).
    pub(crate) fn assemble<'l>(
        tasks: Vec<Task>,
        links: impl IntoIterator<Item = &'l OperatorLink>,
        resources: Vec<BuiltResource>,
    ) -> Self {
        let mut graph = DiGraph::with_capacity(tasks.len(), 0);
        let mut index = HashMap::with_capacity(tasks.len());
        for task in tasks {
            let id = task.id.clone();
            let idx = graph.add_node(task);
            index.insert(id, idx);
        }

        let mut links: Vec<&OperatorLink> = links.into_iter().collect();
        links.sort_by_key(|link| (link.source_order, link.target_order));
        for link in links {
            let (Some(&from), Some(&to)) = (index.get(&link.source), index.get(&link.target)) else {
                continue;
            };
            if graph.find_edge(from, to).is_none() {
                graph.add_edge(
                    from,
                    to,
                    Wire {
                        source_order: link.source_order,
                        target_order: link.target_order,
                    },
                );
            }
        }

        Self {
            id: Uuid::new_v4(),
            built_at: Utc::now(),
            graph,
            index,
            resources,
        }
    }

    /// Unique id of this build
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Tasks in declaration order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.graph.node_weights()
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&idx| &self.graph[idx])
    }

    /// Tasks nothing feeds into
    pub fn sources(&self) -> Vec<&str> {
        self.boundary(Direction::Incoming)
    }

    /// Tasks that feed nothing
    pub fn sinks(&self) -> Vec<&str> {
        self.boundary(Direction::Outgoing)
    }

    fn boundary(&self, dir: Direction) -> Vec<&str> {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph.neighbors_directed(idx, dir).next().is_none())
            .map(|idx| self.graph[idx].id())
            .collect()
    }

    /// Tasks `id` feeds, by (source_order, target_order)
    pub fn downstream(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Tasks feeding `id`, by (source_order, target_order)
    pub fn upstream(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: &str, dir: Direction) -> Vec<&str> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<(Wire, NodeIndex)> = self
            .graph
            .edges_directed(idx, dir)
            .map(|edge| {
                let other = match dir {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (*edge.weight(), other)
            })
            .collect();
        edges.sort_by_key(|(wire, other)| (*wire, other.index()));
        edges.into_iter().map(|(_, other)| self.graph[other].id()).collect()
    }

    /// Every task id mapped to its downstream ids
    pub fn adjacency(&self) -> BTreeMap<String, Vec<String>> {
        self.tasks()
            .map(|task| {
                let next = self.downstream(task.id()).into_iter().map(String::from).collect();
                (task.id().to_string(), next)
            })
            .collect()
    }

    /// Built resources in instantiation order
    pub fn resources(&self) -> &[BuiltResource] {
        &self.resources
    }

    pub fn resource(&self, node_id: &str) -> Option<&BuiltResource> {
        self.resources.iter().find(|r| r.node_id == node_id)
    }

    /// Underlying petgraph graph, for schedulers
    pub fn graph(&self) -> &DiGraph<Task, Wire> {
        &self.graph
    }
}

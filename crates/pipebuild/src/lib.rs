//! Flow graph construction
//!
//! Holds the registry of operator and resource implementations and the
//! factory that turns a declarative [`FlowGraph`](pipecore::FlowGraph) into
//! an [`ExecutableGraph`]: nodes are partitioned, resources bound to the
//! parameters they satisfy, the graph ordered, resources and then operators
//! instantiated, and the operators wired by their dependencies.

mod binding;
mod category;
mod config;
mod dag;
mod factory;
mod ordering;
mod registry;

pub use binding::{BuildPlan, OperatorLink, ResourceBinding};
pub use category::infer_category;
pub use config::FactoryConfig;
pub use dag::{BuiltResource, ExecutableGraph, Task, Wire};
pub use factory::FlowFactory;
pub use ordering::topological_order;
pub use registry::{
    global, init_global, Constructor, FlowEntry, FlowRegistry, Registrar, Resolver, RuntimeType,
};

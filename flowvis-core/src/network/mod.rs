//! Processor network and evaluation.
//!
//! [`ProcessorNetwork`] owns the processors (keyed by identifier) and the
//! set of connections between their ports: the mutable DAG. It propagates
//! invalidation forward through the graph and raises *evaluate requests*
//! when a sink becomes invalid.
//!
//! [`NetworkEvaluator`] is the scheduler: triggered by an evaluate request
//! (or called explicitly), it collects the non-valid processors reachable
//! backward from the requested sinks, orders them topologically by port
//! dependency, and runs `process()` on each in order, marking them valid.
//!
//! [`snapshot`] round-trips the structure of a network (processors by
//! identifier and type key, connections, property links) through serde.

mod evaluator;
mod graph;
pub mod snapshot;

pub use evaluator::{EvaluationReport, NetworkEvaluator};
pub use graph::{Connection, PortAddress, ProcessorNetwork, PropertyAddress, PropertyLink};

//! Flowvis Core
//!
//! This crate provides the evaluation engine for a dataflow visualization
//! pipeline. It implements:
//!
//! - Data objects with lazily converted representations (RAM, texture, disk)
//! - Typed ports and the connection protocol between processors
//! - A mutable processor network with forward invalidation propagation
//! - A topological evaluator that brings invalid processors up to date
//! - Structure snapshots and a background task pool for pending work
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `data`: representations, converter registry, data objects and groups
//! - `port`: typed inports/outports and their shared data slots
//! - `processor`: the `Processor` trait and per-processor state
//! - `network`: the graph, the evaluator, and snapshots
//! - `tasks`: worker pool feeding completions back into evaluation
//!
//! # Example
//!
//! ```rust,ignore
//! use flowvis_core::network::{NetworkEvaluator, PortAddress, ProcessorNetwork};
//!
//! let mut network = ProcessorNetwork::new();
//! let reader = network.add_processor("reader", Box::new(VolumeReader::new()))?;
//! let viewer = network.add_processor("viewer", Box::new(Viewer::new()))?;
//! network.connect(
//!     PortAddress::new(&reader, "volume"),
//!     PortAddress::new(&viewer, "input"),
//! )?;
//!
//! // Fresh processors are invalid; one pass makes the whole chain valid.
//! let mut evaluator = NetworkEvaluator::new();
//! let report = evaluator.evaluate(&mut network)?;
//! assert!(report.is_complete());
//! ```

pub mod data;
pub mod error;
pub mod network;
pub mod port;
pub mod processor;
pub mod tasks;

pub use data::{ConverterRegistry, DataGroup, DataObject, Dimensions, Representation};
pub use error::{ConversionError, NetworkError, PortError, ProcessError};
pub use network::{EvaluationReport, NetworkEvaluator, PortAddress, ProcessorNetwork};
pub use processor::{InvalidationLevel, Processor, Progress};

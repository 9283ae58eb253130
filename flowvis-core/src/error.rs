//! Error types for the evaluation engine.
//!
//! Errors are grouped by the subsystem that raises them:
//!
//! - [`ConversionError`]: representation conversion inside a data object.
//! - [`PortError`]: port connection protocol violations.
//! - [`NetworkError`]: structural network edits, snapshots, and evaluation.
//! - [`ProcessError`]: failures inside a processor's own `process()` body.
//!
//! Structural errors (connection refused, cycle detected) leave the network
//! unchanged. Runtime errors from `process()` are contained per-processor by
//! the evaluator and never abort a whole pass.

use thiserror::Error;

/// Failure to produce a representation of the requested kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// No chain of registered converters links an existing representation
    /// kind to the requested kind.
    #[error("no converter path from {from} to {to}")]
    NoConverterPath {
        from: &'static str,
        to: &'static str,
    },

    /// The data object has no representation at all to convert from.
    #[error("data object has no representation to convert from")]
    NoSourceRepresentation,

    /// A registered converter returned a value of the wrong concrete type.
    #[error("converter produced {produced}, expected {expected}")]
    ConverterMismatch {
        produced: &'static str,
        expected: &'static str,
    },
}

/// Violation of the port connection protocol.
///
/// Raised synchronously at connect time; the refused connection leaves both
/// ports' state unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    /// The outport's payload type does not match the inport's declared type.
    #[error("port types do not match: outport carries {outport}, inport expects {inport}")]
    IncompatibleTypes {
        outport: &'static str,
        inport: &'static str,
    },

    /// Both endpoints belong to the same processor.
    #[error("cannot connect two ports of the same processor")]
    SelfConnection,

    /// The exact outport/inport pair is already connected.
    #[error("ports are already connected")]
    AlreadyConnected,

    /// A single-input inport refused a second connection.
    #[error("inport {0:?} accepts a single connection and is already connected")]
    SingleConnectionExceeded(String),

    /// No port with the given name on the addressed processor.
    #[error("no such port: {0:?}")]
    NoSuchPort(String),
}

/// Structural or evaluation-level network error.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("no processor with identifier {0:?}")]
    NoSuchProcessor(String),

    /// The requested connection would make the graph cyclic.
    #[error("connection would create a cycle: {from} -> {to}")]
    CycleDetected { from: String, to: String },

    /// The scheduler found a cycle among the processors it was asked to run.
    #[error("cannot order processors for evaluation, cycle among: {0:?}")]
    EvaluationCycle(Vec<String>),

    /// Structural mutation was attempted while an evaluation pass holds the
    /// network lock.
    #[error("network is locked by an evaluation pass")]
    Locked,

    #[error("no such connection: {from} -> {to}")]
    NoSuchConnection { from: String, to: String },

    #[error(transparent)]
    Port(#[from] PortError),

    /// A snapshot referenced a processor type with no registered constructor.
    #[error("unknown processor type {0:?}")]
    UnknownProcessorType(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The background task pool could not be built.
    #[error("task pool: {0}")]
    TaskPool(#[from] rayon::ThreadPoolBuildError),
}

/// Failure raised by a processor's `initialize()`, `initialize_resources()`,
/// or `process()` body.
///
/// The evaluator records the message on the failing processor and continues
/// with independent siblings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ProcessError(pub String);

impl ProcessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<ConversionError> for ProcessError {
    fn from(err: ConversionError) -> Self {
        Self(err.to_string())
    }
}

pub type Result<T, E = NetworkError> = std::result::Result<T, E>;

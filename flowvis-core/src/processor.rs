//! Processors.
//!
//! A processor is a node in the dataflow graph: it owns typed inports and
//! outports and computes in `process()`. The network tracks each processor's
//! lifecycle and invalidation state in a [`ProcessorState`] record that
//! lives next to the processor, so implementors only describe their ports
//! and computation.
//!
//! # Invalidation lattice
//!
//! `Valid < InvalidOutput < InvalidResources`. Raising the level is
//! monotone: propagation never lowers a processor's level, only the
//! evaluator resets it to `Valid` after a successful `process()`.
//! `InvalidResources` implies the output is invalid too; the evaluator runs
//! `initialize_resources()` before `process()` at that level.
//!
//! # Pending work
//!
//! `process()` may return [`Progress::Pending`] after dispatching work to a
//! task pool. The processor then stays invalid; completion re-invalidates
//! it (see [`crate::tasks`]) so a later pass picks it up again.

use std::fmt;

use crate::error::ProcessError;
use crate::port::{Inport, Outport};

/// Outcome of a successful `process()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Output is up to date; the evaluator marks the processor valid.
    Done,
    /// Work was dispatched elsewhere; the processor stays invalid and is
    /// revisited after its completion arrives.
    Pending,
}

/// What must be recomputed for a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InvalidationLevel {
    Valid,
    /// Recompute and re-publish output data.
    InvalidOutput,
    /// Recreate resources (shaders, buffers) before recomputing.
    InvalidResources,
}

/// Lifecycle of a processor inside a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    Deinitialized,
}

/// Per-processor bookkeeping owned by the network.
#[derive(Debug, Clone)]
pub struct ProcessorState {
    pub lifecycle: Lifecycle,
    pub invalidation: InvalidationLevel,
    /// Last `process()`/`initialize()` failure, distinct from being invalid:
    /// an errored processor keeps its invalidation level and is retried on
    /// the next pass.
    pub error: Option<String>,
}

impl ProcessorState {
    /// Fresh processors start invalid so their first evaluation runs.
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::Uninitialized,
            invalidation: InvalidationLevel::InvalidOutput,
            error: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.invalidation == InvalidationLevel::Valid
    }

    /// Raise the invalidation level. Returns whether the level actually
    /// rose, which bounds propagation cost: a processor that is already at
    /// the given level stops the spread.
    pub fn invalidate(&mut self, level: InvalidationLevel) -> bool {
        if level > self.invalidation {
            self.invalidation = level;
            true
        } else {
            false
        }
    }

    pub fn set_valid(&mut self) {
        self.invalidation = InvalidationLevel::Valid;
    }
}

impl Default for ProcessorState {
    fn default() -> Self {
        Self::new()
    }
}

/// A computation node with typed ports.
///
/// Implementors own their port instances as struct fields and expose them
/// through the enumeration methods; the network never stores ports itself.
pub trait Processor: Send {
    /// Stable key identifying the concrete processor type, used by the
    /// snapshot factory to reconstruct networks.
    fn type_key(&self) -> &'static str;

    fn inports(&self) -> Vec<&dyn Inport>;

    fn inports_mut(&mut self) -> Vec<&mut dyn Inport>;

    fn outports(&self) -> Vec<&dyn Outport>;

    /// Called once by the network before the first `process()`.
    fn initialize(&mut self) -> Result<(), ProcessError> {
        Ok(())
    }

    /// Called once before the processor is removed or the network dropped.
    fn deinitialize(&mut self) {}

    /// Recreate resources; invoked by the evaluator when the processor is
    /// invalid at `InvalidResources` level.
    fn initialize_resources(&mut self) -> Result<(), ProcessError> {
        Ok(())
    }

    /// Read inport data, compute, publish to outports.
    ///
    /// Only called when the processor is invalid and every mandatory inport
    /// is ready. Must not assume the previous output was discarded.
    fn process(&mut self) -> Result<Progress, ProcessError>;

    /// Hook invoked instead of `process()` when a mandatory inport is not
    /// ready; lets a processor clear its output, for example. Default no-op.
    fn on_not_ready(&mut self) {}
}

impl<'a> dyn Processor + 'a {
    /// Look up an inport by name.
    pub fn inport(&self, name: &str) -> Option<&dyn Inport> {
        self.inports().into_iter().find(|p| p.name() == name)
    }

    pub fn inport_mut(&mut self, name: &str) -> Option<&mut dyn Inport> {
        self.inports_mut().into_iter().find(|p| p.name() == name)
    }

    pub fn outport(&self, name: &str) -> Option<&dyn Outport> {
        self.outports().into_iter().find(|p| p.name() == name)
    }

    /// End processors (sinks) have no outports; their invalidation is what
    /// wakes the scheduler.
    pub fn is_sink(&self) -> bool {
        self.outports().is_empty()
    }

    /// Whether every mandatory inport is ready.
    pub fn all_inports_ready(&self) -> bool {
        self.inports().iter().all(|p| p.is_ready())
    }
}

impl fmt::Debug for dyn Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("type_key", &self.type_key())
            .field("inports", &self.inports().len())
            .field("outports", &self.outports().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidation_is_monotone() {
        let mut state = ProcessorState::new();
        state.set_valid();

        assert!(state.invalidate(InvalidationLevel::InvalidOutput));
        assert_eq!(state.invalidation, InvalidationLevel::InvalidOutput);

        // Same level again does not count as a change.
        assert!(!state.invalidate(InvalidationLevel::InvalidOutput));

        assert!(state.invalidate(InvalidationLevel::InvalidResources));

        // Lower levels never demote.
        assert!(!state.invalidate(InvalidationLevel::InvalidOutput));
        assert_eq!(state.invalidation, InvalidationLevel::InvalidResources);
    }

    #[test]
    fn fresh_state_is_invalid_and_uninitialized() {
        let state = ProcessorState::new();
        assert!(!state.is_valid());
        assert_eq!(state.lifecycle, Lifecycle::Uninitialized);
        assert!(state.error.is_none());
    }

    #[test]
    fn level_ordering() {
        assert!(InvalidationLevel::Valid < InvalidationLevel::InvalidOutput);
        assert!(InvalidationLevel::InvalidOutput < InvalidationLevel::InvalidResources);
    }
}

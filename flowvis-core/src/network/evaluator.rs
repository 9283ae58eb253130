//! Network evaluator.
//!
//! The evaluator brings a network up to date: after a pass, every processor
//! reachable backward from the requested sinks is either valid, skipped
//! because a mandatory inport was not ready, pending on background work, or
//! errored.
//!
//! # Algorithm
//!
//! 1. Lock the network: no structural mutation during the pass.
//! 2. Walk inport -> outport back-edges from the requested sinks and
//!    collect every non-valid processor reached.
//! 3. Order that subset topologically (Kahn's algorithm over the
//!    connection edges restricted to the subset). A shortfall means the
//!    subset contains a cycle; the pass fails instead of hanging.
//! 4. For each processor in order: initialize it if needed, verify that
//!    all mandatory inports are ready (otherwise invoke the `on_not_ready`
//!    hook and skip), re-create resources when the level demands it, then
//!    `process()` and mark valid.
//! 5. Unlock.
//!
//! A `process()` failure is contained: the processor is marked errored and
//! the pass continues with independent siblings. Relative order among
//! processors with no mutual dependency is unspecified.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, trace, warn};

use crate::error::{NetworkError, Result};
use crate::network::ProcessorNetwork;
use crate::processor::{InvalidationLevel, Lifecycle, Progress};

/// What happened to each processor during one evaluation pass.
#[derive(Debug, Default, Clone)]
pub struct EvaluationReport {
    /// Processed successfully and now valid, in execution order.
    pub processed: Vec<String>,
    /// Skipped because a mandatory inport was not ready; still invalid.
    pub skipped_not_ready: Vec<String>,
    /// Returned [`Progress::Pending`]; still invalid, revisited after their
    /// background work completes.
    pub pending: Vec<String>,
    /// Failed inside `initialize()`, `initialize_resources()`, or
    /// `process()`, with the failure message.
    pub errored: Vec<(String, String)>,
}

impl EvaluationReport {
    /// Whether the pass brought every visited processor up to date.
    pub fn is_complete(&self) -> bool {
        self.skipped_not_ready.is_empty() && self.pending.is_empty() && self.errored.is_empty()
    }
}

enum Outcome {
    Done,
    Pending,
    NotReady,
    Failed(String),
}

/// The scheduler over a [`ProcessorNetwork`].
pub struct NetworkEvaluator {
    passes: u64,
}

impl NetworkEvaluator {
    pub fn new() -> Self {
        Self { passes: 0 }
    }

    /// Number of completed evaluation passes.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Evaluate toward every sink in the network.
    pub fn evaluate(&mut self, network: &mut ProcessorNetwork) -> Result<EvaluationReport> {
        let sinks = network.sinks();
        self.evaluate_targets(network, &sinks)
    }

    /// Evaluate toward the given end processors only.
    pub fn evaluate_targets(
        &mut self,
        network: &mut ProcessorNetwork,
        targets: &[String],
    ) -> Result<EvaluationReport> {
        network.lock();
        let result = self.run_pass(network, targets);
        network.unlock();
        result
    }

    fn run_pass(
        &mut self,
        network: &mut ProcessorNetwork,
        targets: &[String],
    ) -> Result<EvaluationReport> {
        self.passes += 1;
        let subset = collect_invalid(network, targets);
        let order = topological_order(network, subset)?;
        trace!(pass = self.passes, order = ?order, "evaluation order");

        let mut report = EvaluationReport::default();
        for identifier in order {
            let outcome = run_processor(network, &identifier);
            match outcome {
                Outcome::Done => {
                    network.set_valid(&identifier);
                    report.processed.push(identifier);
                }
                Outcome::Pending => {
                    trace!(%identifier, "processor pending");
                    report.pending.push(identifier);
                }
                Outcome::NotReady => {
                    trace!(%identifier, "processor not ready, skipped");
                    report.skipped_not_ready.push(identifier);
                }
                Outcome::Failed(message) => {
                    warn!(%identifier, %message, "processor failed, pass continues");
                    network.record_error(&identifier, message.clone());
                    report.errored.push((identifier, message));
                }
            }
        }

        debug!(
            pass = self.passes,
            processed = report.processed.len(),
            skipped = report.skipped_not_ready.len(),
            pending = report.pending.len(),
            errored = report.errored.len(),
            "evaluation pass finished"
        );
        Ok(report)
    }
}

impl Default for NetworkEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-valid processors reachable backward from `targets`, deduplicated.
fn collect_invalid(network: &ProcessorNetwork, targets: &[String]) -> Vec<String> {
    let mut visited = HashSet::new();
    let mut subset = Vec::new();
    let mut queue: VecDeque<String> = targets.iter().cloned().collect();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let Some(state) = network.state(&id) else {
            continue;
        };
        if !state.is_valid() {
            subset.push(id.clone());
        }
        for up in network.upstream(&id) {
            queue.push_back(up);
        }
    }
    subset
}

/// Kahn's algorithm restricted to `subset`; dependencies come first.
///
/// A shortfall in the output means the subset contains a cycle.
fn topological_order(network: &ProcessorNetwork, subset: Vec<String>) -> Result<Vec<String>> {
    let members: HashSet<&str> = subset.iter().map(String::as_str).collect();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut queue = VecDeque::new();

    for id in &subset {
        let degree = network
            .upstream(id)
            .iter()
            .filter(|up| members.contains(up.as_str()))
            .count();
        in_degree.insert(id.as_str(), degree);
        if degree == 0 {
            queue.push_back(id.clone());
        }
    }

    let mut order = Vec::with_capacity(subset.len());
    while let Some(id) = queue.pop_front() {
        for next in network.downstream(&id) {
            if let Some(degree) = in_degree.get_mut(next.as_str()) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    queue.push_back(next);
                }
            }
        }
        order.push(id);
    }

    if order.len() != subset.len() {
        let stuck: Vec<String> = subset
            .into_iter()
            .filter(|id| !order.contains(id))
            .collect();
        return Err(NetworkError::EvaluationCycle(stuck));
    }
    Ok(order)
}

/// Drive one processor through initialization, readiness gating, resource
/// re-creation, and `process()`.
fn run_processor(network: &mut ProcessorNetwork, identifier: &str) -> Outcome {
    let Some(entry) = network.processors.get_mut(identifier) else {
        return Outcome::Failed(format!("processor {identifier:?} disappeared mid-pass"));
    };

    if entry.state.lifecycle == Lifecycle::Uninitialized {
        if let Err(err) = entry.processor.initialize() {
            return Outcome::Failed(format!("initialize: {err}"));
        }
        entry.state.lifecycle = Lifecycle::Initialized;
    }

    if !entry.processor.all_inports_ready() {
        entry.processor.on_not_ready();
        return Outcome::NotReady;
    }

    if entry.state.invalidation == InvalidationLevel::InvalidResources {
        if let Err(err) = entry.processor.initialize_resources() {
            return Outcome::Failed(format!("initialize_resources: {err}"));
        }
    }

    match entry.processor.process() {
        Ok(Progress::Done) => Outcome::Done,
        Ok(Progress::Pending) => Outcome::Pending,
        Err(err) => Outcome::Failed(err.to_string()),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

//! The processor network.
//!
//! # How It Works
//!
//! 1. Processors are added under a requested identifier; collisions are
//!    renamed with a numeric suffix. The set of used identifiers is a
//!    member of the network, scoped to its lifetime.
//!
//! 2. Connections are Outport -> Inport edges addressed by processor
//!    identifier and port name. `connect` rejects self-connections,
//!    duplicates, incompatible type tags, and edges that would make the
//!    graph cyclic; a refused connection leaves the network unchanged.
//!
//! 3. Invalidation spreads forward: raising a processor's level raises
//!    every downstream processor's level, breadth-first and monotone; a
//!    processor already at the level stops the spread. When the spread
//!    reaches a sink, the network fires an *evaluate request* to its
//!    observers; that is what wakes the scheduler.
//!
//! 4. During an evaluation pass the network is locked: structural mutation
//!    (add/remove processor, connect/disconnect) is rejected with
//!    [`NetworkError::Locked`]. State changes (invalidation) stay legal, so
//!    completions of background work may re-invalidate mid-pass.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{NetworkError, PortError, Result};
use crate::processor::{InvalidationLevel, Lifecycle, Processor, ProcessorState};

/// Addresses one port on one processor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortAddress {
    pub processor: String,
    pub port: String,
}

impl PortAddress {
    pub fn new(processor: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            processor: processor.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for PortAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.processor, self.port)
    }
}

/// An Outport -> Inport edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from: PortAddress,
    pub to: PortAddress,
}

/// Addresses one property on one processor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyAddress {
    pub processor: String,
    pub property: String,
}

/// A Property -> Property synchronization edge.
///
/// Link semantics live outside the evaluation core; the network only owns
/// and round-trips the records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyLink {
    pub from: PropertyAddress,
    pub to: PropertyAddress,
}

pub(crate) struct ProcessorEntry {
    pub(crate) processor: Box<dyn Processor>,
    pub(crate) state: ProcessorState,
}

type EvaluateRequestObserver = Box<dyn Fn(&str) + Send>;

/// The mutable dataflow graph: processors, connections, property links.
pub struct ProcessorNetwork {
    pub(crate) processors: IndexMap<String, ProcessorEntry>,
    connections: Vec<Connection>,
    links: Vec<PropertyLink>,
    used_identifiers: HashSet<String>,
    lock_depth: usize,
    observers: Vec<EvaluateRequestObserver>,
}

impl ProcessorNetwork {
    pub fn new() -> Self {
        Self {
            processors: IndexMap::new(),
            connections: Vec::new(),
            links: Vec::new(),
            used_identifiers: HashSet::new(),
            lock_depth: 0,
            observers: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Processors
    // ------------------------------------------------------------------

    /// Add a processor under `requested` or, on collision, the first free
    /// `"{requested} {n}"`. Returns the actual identifier.
    ///
    /// Fresh processors start invalid; adding a sink therefore immediately
    /// raises an evaluate request.
    pub fn add_processor(
        &mut self,
        requested: &str,
        processor: Box<dyn Processor>,
    ) -> Result<String> {
        self.ensure_unlocked()?;

        let identifier = self.unique_identifier(requested);
        self.used_identifiers.insert(identifier.clone());
        let is_sink = processor.is_sink();
        debug!(%identifier, type_key = processor.type_key(), "add processor");
        self.processors.insert(
            identifier.clone(),
            ProcessorEntry {
                processor,
                state: ProcessorState::new(),
            },
        );

        if is_sink {
            self.notify_evaluate_request(&identifier);
        }
        Ok(identifier)
    }

    /// Remove a processor, deinitializing it and detaching every connection
    /// that touches it. Downstream processors are invalidated: they lost an
    /// input.
    pub fn remove_processor(&mut self, identifier: &str) -> Result<Box<dyn Processor>> {
        self.ensure_unlocked()?;
        if !self.processors.contains_key(identifier) {
            return Err(NetworkError::NoSuchProcessor(identifier.to_string()));
        }

        // Detach downstream inports from this processor's outport slots.
        let outgoing: Vec<Connection> = self
            .connections
            .iter()
            .filter(|c| c.from.processor == identifier)
            .cloned()
            .collect();
        let mut downstream = Vec::new();
        for connection in &outgoing {
            let Some(slot) = self
                .processors
                .get(identifier)
                .and_then(|e| e.processor.outport(&connection.from.port))
                .map(|o| o.slot_id())
            else {
                continue;
            };
            if let Some(dst) = self.processors.get_mut(&connection.to.processor) {
                if let Some(inport) = dst.processor.inport_mut(&connection.to.port) {
                    inport.disconnect(slot);
                }
                downstream.push(connection.to.processor.clone());
            }
        }

        self.connections
            .retain(|c| c.from.processor != identifier && c.to.processor != identifier);
        self.links
            .retain(|l| l.from.processor != identifier && l.to.processor != identifier);
        self.used_identifiers.remove(identifier);

        let mut entry = self
            .processors
            .shift_remove(identifier)
            .ok_or_else(|| NetworkError::NoSuchProcessor(identifier.to_string()))?;
        if entry.state.lifecycle == Lifecycle::Initialized {
            entry.processor.deinitialize();
        }
        debug!(identifier, "removed processor");

        for id in downstream {
            self.invalidate(&id, InvalidationLevel::InvalidOutput);
        }
        Ok(entry.processor)
    }

    pub fn processor(&self, identifier: &str) -> Option<&dyn Processor> {
        self.processors
            .get(identifier)
            .map(|e| e.processor.as_ref())
    }

    pub fn processor_mut(&mut self, identifier: &str) -> Option<&mut dyn Processor> {
        match self.processors.get_mut(identifier) {
            Some(e) => Some(e.processor.as_mut()),
            None => None,
        }
    }

    pub fn state(&self, identifier: &str) -> Option<&ProcessorState> {
        self.processors.get(identifier).map(|e| &e.state)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.processors.contains_key(identifier)
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.processors.keys().map(String::as_str)
    }

    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    /// Identifiers of all end processors (no outports), in insertion order.
    pub fn sinks(&self) -> Vec<String> {
        self.processors
            .iter()
            .filter(|(_, e)| e.processor.is_sink())
            .map(|(id, _)| id.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Connect `from` (outport) to `to` (inport).
    ///
    /// Rejected, leaving the network unchanged, when the endpoints share a
    /// processor, the edge already exists, the type tags differ, or the
    /// edge would make the graph cyclic.
    pub fn connect(&mut self, from: PortAddress, to: PortAddress) -> Result<()> {
        self.ensure_unlocked()?;

        if from.processor == to.processor {
            return Err(PortError::SelfConnection.into());
        }
        if self
            .connections
            .iter()
            .any(|c| c.from == from && c.to == to)
        {
            return Err(PortError::AlreadyConnected.into());
        }

        let handle = {
            let entry = self
                .processors
                .get(&from.processor)
                .ok_or_else(|| NetworkError::NoSuchProcessor(from.processor.clone()))?;
            entry
                .processor
                .outport(&from.port)
                .ok_or_else(|| PortError::NoSuchPort(from.to_string()))?
                .handle()
        };

        // Reject cycles while the graph is still unchanged.
        if self.reaches(&to.processor, &from.processor) {
            return Err(NetworkError::CycleDetected {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        {
            let entry = self
                .processors
                .get_mut(&to.processor)
                .ok_or_else(|| NetworkError::NoSuchProcessor(to.processor.clone()))?;
            let inport = entry
                .processor
                .inport_mut(&to.port)
                .ok_or_else(|| PortError::NoSuchPort(to.to_string()))?;
            inport.connect_handle(handle)?;
        }

        debug!(%from, %to, "connected");
        self.connections.push(Connection {
            from,
            to: to.clone(),
        });
        self.invalidate(&to.processor, InvalidationLevel::InvalidOutput);
        Ok(())
    }

    /// Remove the connection between `from` and `to`.
    pub fn disconnect(&mut self, from: &PortAddress, to: &PortAddress) -> Result<()> {
        self.ensure_unlocked()?;

        let index = self
            .connections
            .iter()
            .position(|c| &c.from == from && &c.to == to)
            .ok_or_else(|| NetworkError::NoSuchConnection {
                from: from.to_string(),
                to: to.to_string(),
            })?;

        let slot = self
            .processors
            .get(&from.processor)
            .and_then(|e| e.processor.outport(&from.port))
            .map(|o| o.slot_id());
        if let (Some(slot), Some(entry)) = (slot, self.processors.get_mut(&to.processor)) {
            if let Some(inport) = entry.processor.inport_mut(&to.port) {
                inport.disconnect(slot);
            }
        }

        self.connections.remove(index);
        debug!(%from, %to, "disconnected");
        self.invalidate(&to.processor, InvalidationLevel::InvalidOutput);
        Ok(())
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Processors directly downstream of `identifier`, deduplicated.
    pub fn downstream(&self, identifier: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.connections
            .iter()
            .filter(|c| c.from.processor == identifier)
            .filter_map(|c| {
                seen.insert(c.to.processor.as_str())
                    .then(|| c.to.processor.clone())
            })
            .collect()
    }

    /// Processors directly upstream of `identifier`, deduplicated.
    pub fn upstream(&self, identifier: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.connections
            .iter()
            .filter(|c| c.to.processor == identifier)
            .filter_map(|c| {
                seen.insert(c.from.processor.as_str())
                    .then(|| c.from.processor.clone())
            })
            .collect()
    }

    /// Whether `target` is reachable from `start` along connection edges.
    fn reaches(&self, start: &str, target: &str) -> bool {
        if start == target {
            return true;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start.to_string());
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id.clone()) {
                continue;
            }
            for next in self.downstream(&id) {
                if next == target {
                    return true;
                }
                queue.push_back(next);
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Property links
    // ------------------------------------------------------------------

    pub fn add_link(&mut self, link: PropertyLink) -> Result<()> {
        self.ensure_unlocked()?;
        if !self.processors.contains_key(&link.from.processor) {
            return Err(NetworkError::NoSuchProcessor(link.from.processor));
        }
        if !self.processors.contains_key(&link.to.processor) {
            return Err(NetworkError::NoSuchProcessor(link.to.processor));
        }
        if !self.links.contains(&link) {
            self.links.push(link);
        }
        Ok(())
    }

    pub fn remove_link(&mut self, link: &PropertyLink) -> Result<()> {
        self.ensure_unlocked()?;
        self.links.retain(|l| l != link);
        Ok(())
    }

    pub fn links(&self) -> &[PropertyLink] {
        &self.links
    }

    // ------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------

    /// Raise `identifier`'s invalidation level and spread it breadth-first
    /// to everything downstream. Returns the identifiers whose level rose.
    ///
    /// Fires an evaluate request for every sink the spread reached. Legal
    /// while the network is locked: only state changes, no structure.
    pub fn invalidate(&mut self, identifier: &str, level: InvalidationLevel) -> Vec<String> {
        let mut affected = Vec::new();
        let mut invalid_sinks = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(identifier.to_string());

        while let Some(id) = queue.pop_front() {
            let Some(entry) = self.processors.get_mut(&id) else {
                continue;
            };
            // A processor already at the level stops the spread.
            if !entry.state.invalidate(level) {
                continue;
            }
            if entry.processor.is_sink() {
                invalid_sinks.push(id.clone());
            }
            affected.push(id.clone());
            for next in self.downstream(&id) {
                queue.push_back(next);
            }
        }

        for sink in &invalid_sinks {
            self.notify_evaluate_request(sink);
        }
        affected
    }

    /// Fire evaluate requests for every invalid sink reachable downstream
    /// of `identifier` (itself included). Covers the case where new data
    /// arrives without a level change, e.g. a background task completing
    /// for a processor that stayed invalid while pending.
    pub fn request_evaluation(&self, identifier: &str) {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(identifier.to_string());

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let Some(entry) = self.processors.get(&id) else {
                continue;
            };
            if entry.processor.is_sink() && !entry.state.is_valid() {
                self.notify_evaluate_request(&id);
            }
            for next in self.downstream(&id) {
                queue.push_back(next);
            }
        }
    }

    pub(crate) fn set_valid(&mut self, identifier: &str) {
        if let Some(entry) = self.processors.get_mut(identifier) {
            entry.state.set_valid();
            entry.state.error = None;
        }
    }

    pub(crate) fn record_error(&mut self, identifier: &str, message: String) {
        if let Some(entry) = self.processors.get_mut(identifier) {
            entry.state.error = Some(message);
        }
    }

    // ------------------------------------------------------------------
    // Lock & observers
    // ------------------------------------------------------------------

    /// Enter the structural lock (reentrant). While locked, add/remove and
    /// connect/disconnect are rejected.
    pub fn lock(&mut self) {
        self.lock_depth += 1;
    }

    pub fn unlock(&mut self) {
        self.lock_depth = self.lock_depth.saturating_sub(1);
    }

    pub fn is_locked(&self) -> bool {
        self.lock_depth > 0
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.is_locked() {
            Err(NetworkError::Locked)
        } else {
            Ok(())
        }
    }

    /// Register an observer for evaluate requests: called with the sink's
    /// identifier whenever a sink becomes invalid.
    pub fn on_evaluate_request(&mut self, observer: impl Fn(&str) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn notify_evaluate_request(&self, identifier: &str) {
        for observer in &self.observers {
            observer(identifier);
        }
    }

    fn unique_identifier(&self, requested: &str) -> String {
        if !self.used_identifiers.contains(requested) {
            return requested.to_string();
        }
        let mut n = 2usize;
        loop {
            let candidate = format!("{requested} {n}");
            if !self.used_identifiers.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

impl Default for ProcessorNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessorNetwork {
    /// Every initialized processor is deinitialized before destruction,
    /// mirroring what `remove_processor` does for individual removals.
    fn drop(&mut self) {
        for entry in self.processors.values_mut() {
            if entry.state.lifecycle == Lifecycle::Initialized {
                entry.processor.deinitialize();
                entry.state.lifecycle = Lifecycle::Deinitialized;
            }
        }
    }
}

impl fmt::Debug for ProcessorNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorNetwork")
            .field("processors", &self.processors.len())
            .field("connections", &self.connections.len())
            .field("links", &self.links.len())
            .field("locked", &self.is_locked())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

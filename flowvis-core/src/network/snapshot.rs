//! Network snapshots.
//!
//! A snapshot captures the *structure* of a network: processors by
//! identifier and type key, port connections, and property links. Processor
//! internals (port payloads, caches) are not captured; a restored network
//! starts fully invalid and recomputes everything on its first evaluation.
//!
//! Restoring needs a [`ProcessorFactory`] that maps each type key back to a
//! constructor. Restore replays the structural edits through the normal
//! network API, so every connect-time check (type compatibility, cycle
//! rejection) applies to snapshot data too.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{NetworkError, Result};
use crate::network::{Connection, ProcessorNetwork, PropertyLink};
use crate::processor::Processor;

/// One processor in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorRecord {
    pub identifier: String,
    pub type_key: String,
}

/// Serializable structure of a [`ProcessorNetwork`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub processors: Vec<ProcessorRecord>,
    pub connections: Vec<Connection>,
    pub links: Vec<PropertyLink>,
}

impl NetworkSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Capture the structure of `network`.
pub fn snapshot(network: &ProcessorNetwork) -> NetworkSnapshot {
    let processors = network
        .identifiers()
        .map(|identifier| ProcessorRecord {
            identifier: identifier.to_string(),
            type_key: network
                .processor(identifier)
                .map(|p| p.type_key().to_string())
                .unwrap_or_default(),
        })
        .collect();
    NetworkSnapshot {
        processors,
        connections: network.connections().to_vec(),
        links: network.links().to_vec(),
    }
}

type Constructor = Box<dyn Fn() -> Box<dyn Processor> + Send>;

/// Maps type keys to processor constructors for [`restore`].
#[derive(Default)]
pub struct ProcessorFactory {
    constructors: HashMap<&'static str, Constructor>,
}

impl ProcessorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under its type key. Re-registering a key
    /// replaces the previous constructor.
    pub fn register(
        &mut self,
        type_key: &'static str,
        make: impl Fn() -> Box<dyn Processor> + Send + 'static,
    ) {
        self.constructors.insert(type_key, Box::new(make));
    }

    pub fn create(&self, type_key: &str) -> Result<Box<dyn Processor>> {
        self.constructors
            .get(type_key)
            .map(|make| make())
            .ok_or_else(|| NetworkError::UnknownProcessorType(type_key.to_string()))
    }

    pub fn known_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }
}

/// Rebuild a network from a snapshot.
///
/// Processors are re-created through the factory under their recorded
/// identifiers, then connections and links are replayed through the normal
/// network API. Fails without partial effect guarantees: a snapshot whose
/// edits the network refuses (unknown type key, incompatible ports) returns
/// the first error.
pub fn restore(
    snapshot: &NetworkSnapshot,
    factory: &ProcessorFactory,
) -> Result<ProcessorNetwork> {
    let mut network = ProcessorNetwork::new();
    for record in &snapshot.processors {
        let processor = factory.create(&record.type_key)?;
        let assigned = network.add_processor(&record.identifier, processor)?;
        // Identifiers in a snapshot are unique, so no renaming happens on a
        // fresh network.
        debug_assert_eq!(assigned, record.identifier);
    }
    for connection in &snapshot.connections {
        network.connect(connection.from.clone(), connection.to.clone())?;
    }
    for link in &snapshot.links {
        network.add_link(link.clone())?;
    }
    debug!(
        processors = snapshot.processors.len(),
        connections = snapshot.connections.len(),
        "network restored from snapshot"
    );
    Ok(network)
}

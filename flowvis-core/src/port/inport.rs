//! Inports.
//!
//! An inport holds handles to the slots of the outports it is connected to.
//! [`DataInport`] accepts a single connection; [`MultiDataInport`] accepts
//! any number. Connections are established through the erased
//! [`OutportHandle`] after the type tag check, so the network never needs
//! the payload type in scope.
//!
//! Reading from a disconnected or empty inport yields `None`/empty rather
//! than an error; `process()` bodies are expected to gate on readiness.

use std::any::{type_name, TypeId};
use std::sync::Arc;

use super::outport::OutportSlot;
use super::traits::{Inport, OutportHandle, Port, SlotId};
use crate::error::PortError;

fn downcast_slot<T: Send + Sync + 'static>(
    handle: OutportHandle,
    inport_name: &str,
) -> Result<Arc<OutportSlot<T>>, PortError> {
    let mismatch = PortError::IncompatibleTypes {
        outport: handle.data_type_name,
        inport: type_name::<T>(),
    };
    if handle.data_type != TypeId::of::<T>() {
        return Err(mismatch);
    }
    match handle.slot.downcast::<OutportSlot<T>>() {
        Ok(slot) => Ok(slot),
        Err(_) => {
            tracing::warn!(inport = inport_name, "slot downcast failed after tag match");
            Err(mismatch)
        }
    }
}

/// Single-connection consumer endpoint.
pub struct DataInport<T> {
    name: String,
    optional: bool,
    connection: Option<Arc<OutportSlot<T>>>,
}

impl<T: Send + Sync + 'static> DataInport<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            connection: None,
        }
    }

    /// An optional inport: ready even while unconnected.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: true,
            connection: None,
        }
    }

    /// Data of the connected outport, or `None` while disconnected or while
    /// the outport has nothing published.
    pub fn data(&self) -> Option<Arc<T>> {
        self.connection.as_ref()?.data()
    }

    /// Version of the connected slot; bumps when upstream publishes.
    pub fn source_version(&self) -> Option<u64> {
        self.connection.as_ref().map(|slot| slot.version())
    }
}

impl<T: Send + Sync + 'static> Port for DataInport<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn data_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn data_type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

impl<T: Send + Sync + 'static> Inport for DataInport<T> {
    fn is_optional(&self) -> bool {
        self.optional
    }

    fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn is_ready(&self) -> bool {
        if self.optional && self.connection.is_none() {
            return true;
        }
        self.connection
            .as_ref()
            .is_some_and(|slot| slot.has_data())
    }

    fn connect_handle(&mut self, handle: OutportHandle) -> Result<(), PortError> {
        if let Some(existing) = &self.connection {
            if existing.id() == handle.slot_id {
                return Err(PortError::AlreadyConnected);
            }
            return Err(PortError::SingleConnectionExceeded(self.name.clone()));
        }
        let slot = downcast_slot::<T>(handle, &self.name)?;
        self.connection = Some(slot);
        Ok(())
    }

    fn disconnect(&mut self, slot: SlotId) -> bool {
        match &self.connection {
            Some(existing) if existing.id() == slot => {
                self.connection = None;
                true
            }
            _ => false,
        }
    }

    fn disconnect_all(&mut self) {
        self.connection = None;
    }

    fn connected_slots(&self) -> Vec<SlotId> {
        self.connection.iter().map(|slot| slot.id()).collect()
    }
}

/// Multi-connection consumer endpoint.
///
/// Ready when at least one outport is connected and every connected outport
/// holds data. The optional variant follows the same rule as
/// [`DataInport`]: ready while unconnected, but once connected its outports
/// must hold data.
pub struct MultiDataInport<T> {
    name: String,
    optional: bool,
    connections: Vec<Arc<OutportSlot<T>>>,
}

impl<T: Send + Sync + 'static> MultiDataInport<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            connections: Vec::new(),
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: true,
            connections: Vec::new(),
        }
    }

    /// Data of every connected outport that currently has some, in
    /// connection order.
    pub fn data(&self) -> Vec<Arc<T>> {
        self.connections
            .iter()
            .filter_map(|slot| slot.data())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl<T: Send + Sync + 'static> Port for MultiDataInport<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn data_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn data_type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

impl<T: Send + Sync + 'static> Inport for MultiDataInport<T> {
    fn is_optional(&self) -> bool {
        self.optional
    }

    fn is_connected(&self) -> bool {
        !self.connections.is_empty()
    }

    fn is_ready(&self) -> bool {
        if self.optional && self.connections.is_empty() {
            return true;
        }
        !self.connections.is_empty() && self.connections.iter().all(|slot| slot.has_data())
    }

    fn connect_handle(&mut self, handle: OutportHandle) -> Result<(), PortError> {
        if self.connections.iter().any(|s| s.id() == handle.slot_id) {
            return Err(PortError::AlreadyConnected);
        }
        let slot = downcast_slot::<T>(handle, &self.name)?;
        self.connections.push(slot);
        Ok(())
    }

    fn disconnect(&mut self, slot: SlotId) -> bool {
        let before = self.connections.len();
        self.connections.retain(|s| s.id() != slot);
        self.connections.len() != before
    }

    fn disconnect_all(&mut self) {
        self.connections.clear();
    }

    fn connected_slots(&self) -> Vec<SlotId> {
        self.connections.iter().map(|slot| slot.id()).collect()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

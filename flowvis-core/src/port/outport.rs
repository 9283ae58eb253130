//! Outports.
//!
//! An outport publishes data into a shared slot that connected inports read
//! from. The port either owns its data (`set_data`) or references data kept
//! alive elsewhere (`set_const_data`); ownership can be transferred out
//! again with `detach_data`, which clears the port.

use std::any::{type_name, TypeId};
use std::sync::Arc;

use parking_lot::RwLock;

use super::traits::{Outport, OutportHandle, Port, SlotId};

struct SlotState<T> {
    data: Option<Arc<T>>,
    /// Bumped on every publish so consumers can detect fresh output.
    version: u64,
}

/// The shared data slot behind an outport.
///
/// Inports hold `Arc` handles to this slot; the outport keeps publishing
/// into it across reconnections.
pub struct OutportSlot<T> {
    id: SlotId,
    state: RwLock<SlotState<T>>,
}

impl<T: Send + Sync + 'static> OutportSlot<T> {
    fn new() -> Self {
        Self {
            id: SlotId::new(),
            state: RwLock::new(SlotState {
                data: None,
                version: 0,
            }),
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn has_data(&self) -> bool {
        self.state.read().data.is_some()
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.state.read().data.clone()
    }

    pub fn version(&self) -> u64 {
        self.state.read().version
    }
}

/// Typed producer endpoint.
pub struct DataOutport<T> {
    name: String,
    slot: Arc<OutportSlot<T>>,
    owns_data: bool,
}

impl<T: Send + Sync + 'static> DataOutport<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot: Arc::new(OutportSlot::new()),
            owns_data: false,
        }
    }

    /// Publish data owned by this port.
    pub fn set_data(&mut self, data: T) {
        self.publish(Arc::new(data));
        self.owns_data = true;
    }

    /// Publish externally-owned data; the port only references it.
    pub fn set_const_data(&mut self, data: Arc<T>) {
        self.publish(data);
        self.owns_data = false;
    }

    /// Transfer the current data out, clearing the port.
    ///
    /// Connected inports see the port as having no data afterwards; the
    /// returned handle keeps the data alive for the new owner.
    pub fn detach_data(&mut self) -> Option<Arc<T>> {
        let mut state = self.slot.state.write();
        state.version += 1;
        self.owns_data = false;
        state.data.take()
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.slot.data()
    }

    /// Whether the current data is owned by the port rather than referenced.
    pub fn owns_data(&self) -> bool {
        self.owns_data && self.has_data()
    }

    pub fn slot(&self) -> &Arc<OutportSlot<T>> {
        &self.slot
    }

    fn publish(&self, data: Arc<T>) {
        let mut state = self.slot.state.write();
        state.data = Some(data);
        state.version += 1;
    }
}

impl<T: Send + Sync + 'static> Port for DataOutport<T> {
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

impl<T: Send + Sync + 'static> Outport for DataOutport<T> {
    fn has_data(&self) -> bool {
        self.slot.has_data()
    }

    fn slot_id(&self) -> SlotId {
        self.slot.id
    }

    fn handle(&self) -> OutportHandle {
        OutportHandle {
            slot_id: self.slot.id,
            data_type: TypeId::of::<T>(),
            data_type_name: type_name::<T>(),
            slot: self.slot.clone() as Arc<dyn std::any::Any + Send + Sync>,
        }
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for DataOutport<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataOutport")
            .field("name", &self.name)
            .field("data_type", &type_name::<T>())
            .field("has_data", &self.has_data())
            .finish()
    }
}

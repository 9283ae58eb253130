//! Type-erased port traits.
//!
//! The network stores processors as trait objects and cannot name the
//! payload type of any port. These traits expose exactly what the network
//! needs: name, static type tag, readiness, and enough of a handle to wire
//! an inport to an outport's slot without simultaneous borrows of both
//! processors.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::PortError;

/// Unique identifier for an outport's data slot.
///
/// Inports record the slot IDs they are connected to so a specific
/// connection can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

impl SlotId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

/// Common surface of every port.
pub trait Port: Send + Sync {
    fn name(&self) -> &str;

    /// Static type tag of the payload. Connections compare tags; no
    /// connection is ever established across differing tags.
    fn data_type(&self) -> TypeId;

    /// Human-readable payload type, for logs and errors.
    fn data_type_name(&self) -> &'static str;
}

/// Everything an inport needs to attach to an outport, captured by value.
///
/// The erased slot is downcast back to its typed form by the inport after
/// the tag check succeeds.
pub struct OutportHandle {
    pub slot_id: SlotId,
    pub data_type: TypeId,
    pub data_type_name: &'static str,
    pub slot: Arc<dyn Any + Send + Sync>,
}

/// Producer endpoint.
pub trait Outport: Port {
    fn has_data(&self) -> bool;

    fn slot_id(&self) -> SlotId;

    /// Capture the connection handle for this outport's slot.
    fn handle(&self) -> OutportHandle;
}

/// Consumer endpoint.
pub trait Inport: Port {
    /// Optional inports are ready even when unconnected.
    fn is_optional(&self) -> bool;

    fn is_connected(&self) -> bool;

    fn is_ready(&self) -> bool;

    /// Attach to an outport's slot. Fails without state change if the type
    /// tags differ or the connection limit is reached.
    fn connect_handle(&mut self, handle: OutportHandle) -> Result<(), PortError>;

    /// Convenience wrapper over [`Inport::connect_handle`].
    fn connect(&mut self, outport: &dyn Outport) -> Result<(), PortError>
    where
        Self: Sized,
    {
        self.connect_handle(outport.handle())
    }

    /// Detach the connection to the given slot. Returns whether a
    /// connection was removed.
    fn disconnect(&mut self, slot: SlotId) -> bool;

    fn disconnect_all(&mut self);

    /// Slot IDs of all current connections.
    fn connected_slots(&self) -> Vec<SlotId>;
}
